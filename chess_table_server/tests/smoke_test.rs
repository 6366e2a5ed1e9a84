// Integration smoke test for the table server.
//
// Starts a server on localhost and drives it with plain framed TCP sockets:
// seat assignment, move broadcast, out-of-turn rejection, malformed frames,
// disconnect and seat reuse.
//
// Each client is a raw socket using the protocol crate's framing and message
// types, so this exercises the wire format exactly as a third-party client
// would see it.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use chess_table_protocol::framing::{read_message, recv_json, send_json, write_message};
use chess_table_protocol::message::{ClientMessage, ServerMessage};
use chess_table_protocol::types::{MoveRequest, Occupancy, RejectReason, Role, Seat};
use chess_table_server::error::ServerError;
use chess_table_server::server::{ServerConfig, ServerHandle, start_server};

/// Helper: send a ClientMessage over a framed TCP stream.
fn send(writer: &mut BufWriter<TcpStream>, msg: &ClientMessage) {
    send_json(writer, msg).unwrap();
}

/// Helper: receive a ServerMessage from a framed TCP stream.
fn recv(reader: &mut BufReader<TcpStream>) -> ServerMessage {
    recv_json(reader).unwrap()
}

fn mv(from: &str, to: &str) -> ClientMessage {
    ClientMessage::Move(MoveRequest::parse(from, to).unwrap())
}

fn start() -> (ServerHandle, SocketAddr) {
    let config = ServerConfig {
        port: 0, // OS picks a free port
        ..ServerConfig::default()
    };
    start_server(config).unwrap()
}

/// Connect and read the role greeting. Returns the reader/writer pair and the
/// assigned role.
fn connect(addr: SocketAddr) -> (BufReader<TcpStream>, BufWriter<TcpStream>, Role) {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let reader_stream = stream.try_clone().unwrap();
    let writer = BufWriter::new(stream);
    let mut reader = BufReader::new(reader_stream);

    let role = match recv(&mut reader) {
        ServerMessage::RoleAssigned { role } => role,
        other => panic!("expected RoleAssigned, got {other:?}"),
    };
    (reader, writer, role)
}

/// Let the server process outstanding events, then drain each reader.
fn settle(readers: &mut [&mut BufReader<TcpStream>]) {
    std::thread::sleep(Duration::from_millis(100));
    for reader in readers.iter_mut() {
        drain_messages(reader);
    }
}

/// Expect `MoveMade` followed by `BoardState`; returns the SAN and the side
/// to move afterwards.
fn expect_move_broadcast(reader: &mut BufReader<TcpStream>) -> (String, Seat) {
    let san = match recv(reader) {
        ServerMessage::MoveMade(record) => record.san,
        other => panic!("expected MoveMade, got {other:?}"),
    };
    match recv(reader) {
        ServerMessage::BoardState { status, .. } => (san, status.side_to_move),
        other => panic!("expected BoardState, got {other:?}"),
    }
}

#[test]
fn full_table_lifecycle() {
    let (handle, addr) = start();

    // 1. A, B, C connect in order.
    let (mut reader_a, mut writer_a, role_a) = connect(addr);
    let (mut reader_b, mut writer_b, role_b) = connect(addr);
    let (mut reader_c, _writer_c, role_c) = connect(addr);
    assert_eq!(role_a, Role::White);
    assert_eq!(role_b, Role::Black);
    assert_eq!(role_c, Role::Spectator);
    settle(&mut [&mut reader_a, &mut reader_b, &mut reader_c]);

    // 2. White plays e4; everyone sees it, Black to move.
    send(&mut writer_a, &mv("e2", "e4"));
    for reader in [&mut reader_a, &mut reader_b, &mut reader_c] {
        assert_eq!(
            expect_move_broadcast(reader),
            ("e4".to_string(), Seat::Black)
        );
    }

    // 3. Black answers e5.
    send(&mut writer_b, &mv("e7", "e5"));
    for reader in [&mut reader_a, &mut reader_b, &mut reader_c] {
        assert_eq!(
            expect_move_broadcast(reader),
            ("e5".to_string(), Seat::White)
        );
    }

    // 4. A drops its socket; B and C see White vacated.
    drop(writer_a);
    drop(reader_a);
    let vacated = ServerMessage::Occupancy(Occupancy {
        white: false,
        black: true,
    });
    assert_eq!(recv(&mut reader_b), vacated);
    assert_eq!(recv(&mut reader_c), vacated);

    // 5. D takes the free White seat and can continue the game.
    let (mut reader_d, mut writer_d, role_d) = connect(addr);
    assert_eq!(role_d, Role::White);
    settle(&mut [&mut reader_d]);
    send(&mut writer_d, &mv("g1", "f3"));
    assert_eq!(
        expect_move_broadcast(&mut reader_d),
        ("Nf3".to_string(), Seat::Black)
    );

    handle.stop();
}

#[test]
fn out_of_turn_move_only_reaches_submitter() {
    let (handle, addr) = start();

    let (mut reader_a, mut writer_a, _) = connect(addr);
    let (mut reader_b, mut writer_b, _) = connect(addr);
    let (mut reader_c, _writer_c, _) = connect(addr);
    settle(&mut [&mut reader_a, &mut reader_b, &mut reader_c]);

    // Black tries to move on White's turn.
    send(&mut writer_b, &mv("e7", "e5"));
    match recv(&mut reader_b) {
        ServerMessage::InvalidMove { request, reason } => {
            assert_eq!(reason, RejectReason::Unauthorized);
            assert_eq!(request, Some(MoveRequest::parse("e7", "e5").unwrap()));
        }
        other => panic!("expected InvalidMove, got {other:?}"),
    }

    std::thread::sleep(Duration::from_millis(100));
    assert!(drain_messages(&mut reader_a).is_empty());
    assert!(drain_messages(&mut reader_c).is_empty());

    // The rejected attempt does not block White's move.
    send(&mut writer_a, &mv("e2", "e4"));
    assert_eq!(
        expect_move_broadcast(&mut reader_b),
        ("e4".to_string(), Seat::Black)
    );

    handle.stop();
}

#[test]
fn malformed_frame_is_rejected_without_disconnect() {
    let (handle, addr) = start();
    let (mut reader_a, mut writer_a, _) = connect(addr);
    settle(&mut [&mut reader_a]);

    write_message(&mut writer_a, br#"{"Move":{"from":"z9","to":"e4"}}"#).unwrap();
    assert_eq!(
        recv(&mut reader_a),
        ServerMessage::InvalidMove {
            request: None,
            reason: RejectReason::Malformed,
        }
    );

    // Illegal but well-formed.
    send(&mut writer_a, &mv("e2", "e5"));
    match recv(&mut reader_a) {
        ServerMessage::InvalidMove { reason, .. } => assert_eq!(reason, RejectReason::IllegalMove),
        other => panic!("expected InvalidMove, got {other:?}"),
    }

    // Still connected and still seated.
    send(&mut writer_a, &mv("e2", "e4"));
    assert_eq!(
        expect_move_broadcast(&mut reader_a),
        ("e4".to_string(), Seat::Black)
    );

    handle.stop();
}

#[test]
fn goodbye_frees_seat() {
    let (handle, addr) = start();
    let (mut reader_a, mut writer_a, _) = connect(addr);
    let (mut reader_b, _writer_b, _) = connect(addr);
    settle(&mut [&mut reader_a, &mut reader_b]);

    send(&mut writer_a, &ClientMessage::Goodbye);
    assert_eq!(
        recv(&mut reader_b),
        ServerMessage::Occupancy(Occupancy {
            white: false,
            black: true,
        })
    );

    // The server closes A's socket once it has processed the Goodbye.
    let err = read_message(&mut reader_a).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

    let (_reader_c, _writer_c, role_c) = connect(addr);
    assert_eq!(role_c, Role::White);

    handle.stop();
}

#[test]
fn spectator_that_never_reads_cannot_stall_the_table() {
    let config = ServerConfig {
        port: 0,
        write_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    };
    let (handle, addr) = start_server(config).unwrap();

    let (mut reader_a, mut writer_a, _) = connect(addr);
    let (mut reader_b, _writer_b, _) = connect(addr);
    let (mut reader_c, mut writer_c, role_c) = connect(addr);
    assert_eq!(role_c, Role::Spectator);
    settle(&mut [&mut reader_a, &mut reader_b, &mut reader_c]);

    // C floods state requests and never reads a reply. Writes start failing
    // once the server drops it.
    let flood = std::thread::spawn(move || {
        for _ in 0..200_000 {
            if send_json(&mut writer_c, &ClientMessage::RequestState).is_err() {
                break;
            }
        }
        reader_c
    });

    send(&mut writer_a, &mv("e2", "e4"));
    reader_b
        .get_ref()
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    assert_eq!(
        expect_move_broadcast(&mut reader_b),
        ("e4".to_string(), Seat::Black)
    );

    drop(flood.join().unwrap());
    handle.stop();
}

#[test]
fn stop_closes_client_connections() {
    let (handle, addr) = start();
    let (mut reader_a, _writer_a, _) = connect(addr);
    settle(&mut [&mut reader_a]);

    handle.stop();
    let err = read_message(&mut reader_a).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn configured_starting_position_and_state_request() {
    let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
    let config = ServerConfig {
        port: 0,
        starting_fen: Some(fen.into()),
        ..ServerConfig::default()
    };
    let (handle, addr) = start_server(config).unwrap();

    let (mut reader_a, mut writer_a, _) = connect(addr);
    match recv(&mut reader_a) {
        ServerMessage::BoardState { fen: got, status } => {
            assert_eq!(got, fen);
            assert_eq!(status.side_to_move, Seat::Black);
        }
        other => panic!("expected BoardState, got {other:?}"),
    }
    settle(&mut [&mut reader_a]);

    send(&mut writer_a, &ClientMessage::RequestState);
    match recv(&mut reader_a) {
        ServerMessage::BoardState { fen: got, .. } => assert_eq!(got, fen),
        other => panic!("expected BoardState, got {other:?}"),
    }

    handle.stop();
}

#[test]
fn invalid_starting_position_fails_startup() {
    let config = ServerConfig {
        port: 0,
        starting_fen: Some("not a position".into()),
        ..ServerConfig::default()
    };
    assert!(matches!(
        start_server(config),
        Err(ServerError::StartingPosition(_))
    ));
}

// --- Helpers ---

/// Drain all currently buffered messages using a short read timeout.
fn drain_messages(reader: &mut BufReader<TcpStream>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    reader
        .get_ref()
        .set_read_timeout(Some(Duration::from_millis(10)))
        .ok();
    for _ in 0..50 {
        match read_message(reader) {
            Ok(bytes) => match serde_json::from_slice::<ServerMessage>(&bytes) {
                Ok(msg) => messages.push(msg),
                Err(_) => break,
            },
            Err(_) => break,
        }
    }
    // Restore longer timeout for subsequent blocking reads.
    reader
        .get_ref()
        .set_read_timeout(Some(Duration::from_secs(5)))
        .ok();
    messages
}
