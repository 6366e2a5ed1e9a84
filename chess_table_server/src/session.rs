// Game session coordinator for the chess table.
//
// `Session` is the central data structure that `server.rs` drives. It owns
// the one authoritative game state (behind the `GameRules` adapter), the seat
// registry, and the write half of every connected socket. All mutation
// happens through methods called from the server's single-threaded main
// loop. There is no internal locking: the event channel in front of that loop
// is what keeps two moves (or a move and a seat change) from interleaving.
//
// Key responsibilities:
// - Joins: assign a role, tell the newcomer its role and the current board,
//   then broadcast seat occupancy to everyone.
// - Moves: authorize the sender against the seat whose turn it is, let the
//   rules adapter validate and apply, commit the successor state in one
//   assignment, then broadcast `MoveMade` followed by `BoardState`.
//   Rejections go to the sender only and leave the state untouched.
// - Leaves: drop the socket, free the seat, broadcast occupancy if a seat was
//   actually freed. The game itself is never touched by a leave; whoever
//   takes the seat next continues from the current position.
//
// `submit_move` is the I/O-free core of move handling and is what the
// authorization and ordering tests exercise; `handle_move` wraps it with the
// notifications.
//
// Every socket gets a write timeout. A client that stops reading fills its
// socket buffer, its next write times out, and the connection is dropped as
// if it had disconnected. Write failures are collected in `stalled` and
// processed at the end of each handler, so the main loop never blocks on one
// client for longer than the timeout.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use chess_table_protocol::framing::send_json;
use chess_table_protocol::message::ServerMessage;
use chess_table_protocol::types::{
    ConnectionId, GameStatus, MoveRecord, MoveRequest, Occupancy, RejectReason, Role, Seat,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::registry::SeatRegistry;
use crate::rules::{GameRules, RuleError, StandardChess};

/// How long a single client write may block before the client is dropped.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Notice sent to a connection that arrives when both seats are taken.
pub const GAME_FULL_NOTICE: &str = "The game is full. Please wait for a player to leave.";

/// Why a submitted move was not applied.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("{conn} does not hold the {seat} seat")]
    Unauthorized { conn: ConnectionId, seat: Seat },

    #[error(transparent)]
    IllegalMove(#[from] RuleError),
}

impl Rejection {
    /// Reason code sent to the submitting client.
    #[must_use]
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::Unauthorized { .. } => RejectReason::Unauthorized,
            Self::IllegalMove(_) => RejectReason::IllegalMove,
        }
    }
}

/// Result of an accepted move, ready for broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    pub record: MoveRecord,
    pub fen: String,
    pub status: GameStatus,
}

/// The single table: one game, two seats, any number of watchers.
pub struct Session<R = StandardChess> {
    rules: R,
    registry: SeatRegistry,
    connections: BTreeMap<ConnectionId, BufWriter<TcpStream>>,
    write_timeout: Duration,
    /// Connections whose last write failed, awaiting removal.
    stalled: Vec<ConnectionId>,
}

impl<R: GameRules> Session<R> {
    pub fn new(rules: R) -> Self {
        Self {
            rules,
            registry: SeatRegistry::new(),
            connections: BTreeMap::new(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            stalled: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Register a new connection. Sends `RoleAssigned` (plus `GameFull` for a
    /// spectator) and the current `BoardState` to the newcomer, then
    /// broadcasts `Occupancy` to everyone.
    pub fn on_connect(&mut self, conn: ConnectionId, stream: TcpStream) -> Role {
        let role = self.registry.assign_seat(conn);
        if let Err(e) = stream.set_write_timeout(Some(self.write_timeout)) {
            warn!(%conn, error = %e, "could not set write timeout");
        }
        self.connections.insert(conn, BufWriter::new(stream));
        info!(%conn, ?role, connections = self.connections.len(), "connection joined");

        self.send_to(conn, &ServerMessage::RoleAssigned { role });
        if role.seat().is_none() {
            self.send_to(
                conn,
                &ServerMessage::GameFull {
                    message: GAME_FULL_NOTICE.into(),
                },
            );
        }
        self.send_to(conn, &self.board_state());
        self.broadcast(&ServerMessage::Occupancy(self.registry.occupancy()));
        self.drop_stalled();

        role
    }

    /// Forget a connection and close its socket. Broadcasts `Occupancy` only
    /// if it held a seat. Unknown or already-removed connections are a no-op.
    pub fn on_disconnect(&mut self, conn: ConnectionId) {
        self.remove_connection(conn);
        self.drop_stalled();
    }

    fn remove_connection(&mut self, conn: ConnectionId) {
        let Some(writer) = self.connections.remove(&conn) else {
            return;
        };
        close(conn, writer);
        match self.registry.release_seat(conn) {
            Some(seat) => {
                info!(%conn, %seat, "seat vacated");
                self.broadcast(&ServerMessage::Occupancy(self.registry.occupancy()));
            }
            None => info!(%conn, "spectator left"),
        }
    }

    /// Authorize, validate and commit one move. Performs no I/O.
    ///
    /// On success the game state has been replaced by the successor state; on
    /// any rejection it is exactly as before the call.
    pub fn submit_move(
        &mut self,
        conn: ConnectionId,
        request: &MoveRequest,
    ) -> Result<MoveOutcome, Rejection> {
        let seat = self.rules.side_to_move();
        if !self.registry.authorize(conn, seat) {
            return Err(Rejection::Unauthorized { conn, seat });
        }

        let (next, record) = self.rules.apply_move(request)?;
        self.rules = next;

        Ok(MoveOutcome {
            record,
            fen: self.rules.fen(),
            status: self.rules.status(),
        })
    }

    /// Handle a move from a client: broadcast `MoveMade` then `BoardState` on
    /// success, or answer the sender alone with `InvalidMove`.
    pub fn handle_move(&mut self, conn: ConnectionId, request: MoveRequest) {
        match self.submit_move(conn, &request) {
            Ok(outcome) => {
                info!(
                    %conn,
                    seat = %outcome.record.seat,
                    san = %outcome.record.san,
                    phase = ?outcome.status.phase,
                    "move accepted"
                );
                self.broadcast(&ServerMessage::MoveMade(outcome.record));
                self.broadcast(&ServerMessage::BoardState {
                    fen: outcome.fen,
                    status: outcome.status,
                });
            }
            Err(rejection) => {
                debug!(%conn, %request, %rejection, "move rejected");
                let reason = rejection.reason();
                self.send_to(
                    conn,
                    &ServerMessage::InvalidMove {
                        request: Some(request),
                        reason,
                    },
                );
            }
        }
        self.drop_stalled();
    }

    /// Answer a frame that did not decode as a `ClientMessage`. Treated like a
    /// refused move: sender only, no state change.
    pub fn handle_malformed(&mut self, conn: ConnectionId) {
        debug!(%conn, "malformed frame");
        self.send_to(
            conn,
            &ServerMessage::InvalidMove {
                request: None,
                reason: RejectReason::Malformed,
            },
        );
        self.drop_stalled();
    }

    /// Send the current board to one connection.
    pub fn handle_state_request(&mut self, conn: ConnectionId) {
        self.send_to(conn, &self.board_state());
        self.drop_stalled();
    }

    /// Close every client socket. Used when the server stops so blocked
    /// reader threads return.
    pub fn shutdown(&mut self) {
        for (conn, writer) in std::mem::take(&mut self.connections) {
            close(conn, writer);
            self.registry.release_seat(conn);
        }
        self.stalled.clear();
    }

    /// Canonical snapshot of the current game.
    pub fn fen(&self) -> String {
        self.rules.fen()
    }

    pub fn status(&self) -> GameStatus {
        self.rules.status()
    }

    pub fn occupancy(&self) -> Occupancy {
        self.registry.occupancy()
    }

    /// Role of a live connection, or `None` if it is not connected.
    pub fn role_of(&self, conn: ConnectionId) -> Option<Role> {
        if !self.connections.contains_key(&conn) {
            return None;
        }
        Some(self.registry.seat_of(conn).map_or(Role::Spectator, Role::from))
    }

    /// Returns the number of connected clients, seated or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn board_state(&self) -> ServerMessage {
        ServerMessage::BoardState {
            fen: self.rules.fen(),
            status: self.rules.status(),
        }
    }

    /// Send a message to one connection. A failed write marks the
    /// connection stalled.
    fn send_to(&mut self, conn: ConnectionId, msg: &ServerMessage) {
        let Some(writer) = self.connections.get_mut(&conn) else {
            return;
        };
        if let Err(e) = send_json(writer, msg) {
            warn!(%conn, error = %e, "write failed; dropping connection");
            self.stalled.push(conn);
        }
    }

    /// Broadcast a message to every connection, seated or not.
    fn broadcast(&mut self, msg: &ServerMessage) {
        for (conn, writer) in &mut self.connections {
            if let Err(e) = send_json(writer, msg) {
                warn!(%conn, error = %e, "broadcast write failed; dropping connection");
                self.stalled.push(*conn);
            }
        }
    }

    /// Remove every stalled connection. Removing a seated one broadcasts
    /// occupancy, which can stall further connections; loop until none are
    /// left.
    fn drop_stalled(&mut self) {
        while let Some(conn) = self.stalled.pop() {
            self.remove_connection(conn);
        }
    }
}

/// Close a connection's socket without flushing what is still buffered, so a
/// peer that stopped reading cannot block the close.
fn close(conn: ConnectionId, writer: BufWriter<TcpStream>) {
    let (stream, _unflushed) = writer.into_parts();
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!(%conn, error = %e, "socket shutdown failed");
    }
}
