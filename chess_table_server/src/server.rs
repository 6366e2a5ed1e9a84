// TCP server and main event loop for the chess table.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per client): call `framing::read_message()` in a
//   loop, decode `ClientMessage`, and send `InternalEvent::MessageFrom` to the
//   main thread. A frame that arrives intact but does not decode becomes
//   `InternalEvent::MalformedFrom` and the connection stays open. On EOF or
//   a framing error, send `InternalEvent::Disconnected`. Goodbye is an
//   ordinary message; the session closes the socket, which ends the reader.
// - **Main thread**: owns the `Session` and handles one event at a time.
//
// The channel is the serialization point for the whole table: a move's
// authorize → apply → commit runs to completion inside one `handle_event`
// call, so no join, leave or other move can observe or interleave with a
// half-applied move. Moves are applied in the order their events are
// dequeued.
//
// The main thread is the only writer to client TCP streams (via
// `Session::broadcast`/`send_to`). Reader threads only read from streams.
//
// A client that stops reading cannot hold up the loop for longer than the
// configured write timeout (see `Session`).
//
// Shutdown: the main thread checks a `keep_running` flag (set to false by
// `ServerHandle::stop`), closes every client socket so blocked readers wake
// up, and returns.

use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use chess_table_protocol::framing::read_message;
use chess_table_protocol::message::ClientMessage;
use chess_table_protocol::types::ConnectionId;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::rules::StandardChess;
use crate::session::{DEFAULT_WRITE_TIMEOUT, Session};

/// How often idle loops re-check `keep_running`.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
    },
    MessageFrom {
        conn: ConnectionId,
        message: ClientMessage,
    },
    MalformedFrom {
        conn: ConnectionId,
    },
    Disconnected {
        conn: ConnectionId,
    },
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a table server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    /// 0 lets the OS pick a free port.
    pub port: u16,
    /// FEN to start from instead of the standard position.
    pub starting_fen: Option<String>,
    /// Longest a write to one client may block before it is dropped.
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            starting_fen: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Start the server on a background thread. Returns a handle for stopping it
/// and the actual bound address (useful when port 0 is used).
pub fn start_server(config: ServerConfig) -> Result<(ServerHandle, SocketAddr), ServerError> {
    let rules = match config.starting_fen.as_deref() {
        Some(fen) => StandardChess::from_fen(fen)?,
        None => StandardChess::new(),
    };

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&bind_addr).map_err(|source| ServerError::Bind {
        addr: bind_addr,
        source,
    })?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let session = Session::new(rules).with_write_timeout(config.write_timeout);
    info!(%addr, fen = %session.fen(), "table server listening");

    let thread = thread::spawn(move || {
        run_server(listener, session, keep_running_clone);
    });

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main server loop. Runs until `keep_running` is set to false.
fn run_server(listener: TcpListener, mut session: Session, keep_running: Arc<AtomicBool>) {
    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Non-blocking so the accept thread can check keep_running periodically.
    if let Err(e) = listener.set_nonblocking(true) {
        warn!(error = %e, "could not make listener non-blocking");
    }

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted");
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    warn!(error = %e, "accept failed; listener stopping");
                    break;
                }
            }
        }
    });

    let mut next_connection_id = 0u64;

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                handle_event(&mut session, event, &mut next_connection_id, &tx, &keep_running);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    session.shutdown();
    info!("table server stopped");
}

/// Dispatch a single event to the session.
fn handle_event(
    session: &mut Session,
    event: InternalEvent,
    next_connection_id: &mut u64,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            let conn = ConnectionId(*next_connection_id);
            *next_connection_id += 1;
            handle_new_connection(session, conn, stream, tx, keep_running);
        }
        InternalEvent::MessageFrom { conn, message } => match message {
            ClientMessage::Move(request) => session.handle_move(conn, request),
            ClientMessage::RequestState => session.handle_state_request(conn),
            ClientMessage::Goodbye => session.on_disconnect(conn),
        },
        InternalEvent::MalformedFrom { conn } => session.handle_malformed(conn),
        InternalEvent::Disconnected { conn } => session.on_disconnect(conn),
    }
}

/// Seat the new connection and spawn its reader thread.
fn handle_new_connection(
    session: &mut Session,
    conn: ConnectionId,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    let reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(e) => {
            warn!(%conn, error = %e, "could not clone stream; dropping connection");
            return;
        }
    };

    session.on_connect(conn, stream);

    let tx_reader = tx.clone();
    let keep_running_reader = keep_running.clone();
    thread::spawn(move || {
        reader_loop(reader, conn, tx_reader, keep_running_reader);
    });
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    conn: ConnectionId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        let event = match read_message(&mut reader) {
            Ok(bytes) => match serde_json::from_slice::<ClientMessage>(&bytes) {
                Ok(message) => InternalEvent::MessageFrom { conn, message },
                Err(_) => InternalEvent::MalformedFrom { conn },
            },
            Err(e) => {
                debug!(%conn, error = %e, "read ended");
                let _ = tx.send(InternalEvent::Disconnected { conn });
                break;
            }
        };
        if tx.send(event).is_err() {
            // Main loop is gone.
            break;
        }
    }
}
