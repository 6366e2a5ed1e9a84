// Protocol messages for client-server communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by players and spectators to the table server.
// - `ServerMessage`: sent by the table server to clients.
//
// There is no handshake message: accepting the TCP connection is the
// "connect" event, and the server answers with `RoleAssigned` straight away.
// Dropping the socket (or sending `Goodbye`) is the "disconnect" event.
//
// An accepted move produces two broadcasts, in order: `MoveMade` (so a client
// can replay the move incrementally) and `BoardState` (so a client can
// resynchronize from the full FEN instead). All types derive
// `Serialize`/`Deserialize` for JSON framing (see `framing.rs`).

use serde::{Deserialize, Serialize};

use crate::types::{GameStatus, MoveRecord, MoveRequest, Occupancy, RejectReason, Role};

/// Messages sent by a client to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Submit a move for the side the sender plays.
    Move(MoveRequest),
    /// Ask for the current board (answered to the sender only).
    RequestState,
    /// Client is leaving gracefully.
    Goodbye,
}

/// Messages sent by the server to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Role for this connection. Sent once, to the new connection only.
    RoleAssigned { role: Role },
    /// Both seats are taken; the connection is watching.
    GameFull { message: String },
    /// Seat fill status after any seat change.
    Occupancy(Occupancy),
    /// A move was accepted. Always followed by `BoardState`.
    MoveMade(MoveRecord),
    /// Full canonical position.
    BoardState { fen: String, status: GameStatus },
    /// The sender's move was refused. `request` is absent when the frame
    /// could not be decoded at all.
    InvalidMove {
        request: Option<MoveRequest>,
        reason: RejectReason,
    },
}
