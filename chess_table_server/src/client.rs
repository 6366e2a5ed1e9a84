// TCP client for connecting to a chess table server.
//
// Provides a non-blocking interface for a caller's main thread. Architecture:
// - `connect()` performs the TCP connect on the calling thread and waits for
//   the server's `RoleAssigned` greeting, then spawns a background reader.
// - The reader thread calls `recv_json()` in a loop and pushes each
//   `ServerMessage` into an `mpsc` channel.
// - The caller holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking, returning all queued messages.
//
// The reader thread handles the blocking reads and the writer flushes
// synchronously (frames are small). Used by the integration tests and by
// any headless bot that wants to sit at the table.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chess_table_protocol::framing::{recv_json, send_json};
use chess_table_protocol::message::{ClientMessage, ServerMessage};
use chess_table_protocol::types::{MoveRequest, Role};
use tracing::debug;

use crate::error::ClientError;

/// How long `connect()` waits for the role greeting.
const GREETING_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP client for one seat (or spectator slot) at the table.
pub struct TableClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
    role: Role,
}

impl TableClient {
    /// Connect, wait for `RoleAssigned`, and spawn the reader thread.
    pub fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(ClientError::Connect)?;
        stream.set_read_timeout(Some(GREETING_TIMEOUT))?;

        let reader_stream = stream.try_clone()?;
        let writer = BufWriter::new(stream);
        let mut reader = BufReader::new(reader_stream);

        let role = match recv_json::<_, ServerMessage>(&mut reader)? {
            ServerMessage::RoleAssigned { role } => role,
            other => return Err(ClientError::UnexpectedGreeting(format!("{other:?}"))),
        };
        debug!(%addr, ?role, "seated");

        // Clear read timeout for the long-lived reader loop.
        reader.get_ref().set_read_timeout(None)?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(reader, tx);
        });

        Ok(Self {
            writer,
            inbox: rx,
            _reader_thread: Some(reader_thread),
            role,
        })
    }

    /// Role the server assigned on connect.
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn send_move(&mut self, request: MoveRequest) -> Result<(), ClientError> {
        self.send(&ClientMessage::Move(request))
    }

    /// Ask the server to resend the current board.
    pub fn request_state(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::RequestState)
    }

    /// Send raw bytes as one frame. Lets tests exercise the server's handling
    /// of frames that are not valid client messages.
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<(), ClientError> {
        chess_table_protocol::framing::write_message(&mut self.writer, payload)?;
        Ok(())
    }

    /// Send Goodbye; the server frees this client's seat.
    pub fn disconnect(&mut self) {
        let _ = self.send(&ClientMessage::Goodbye);
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        self.inbox.try_iter().collect()
    }

    /// Block up to `timeout` for the next server message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ServerMessage> {
        self.inbox.recv_timeout(timeout).ok()
    }

    fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        send_json(&mut self.writer, msg)?;
        Ok(())
    }
}

/// Reader thread: read framed messages in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    while let Ok(msg) = recv_json::<_, ServerMessage>(&mut reader) {
        if tx.send(msg).is_err() {
            break; // Caller dropped the client.
        }
    }
}
