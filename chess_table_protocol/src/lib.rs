// chess_table_protocol: wire protocol between the chess table server and
// its clients.
//
// This crate defines the message types, value types and framing used by the
// server (`chess_table_server`) and any client (the bundled `TableClient`,
// integration tests, or a browser bridge). It has no dependency on the rules
// engine: squares are validated coordinates, and legality lives server-side.
//
// Module overview:
// - `types.rs`:    `ConnectionId`, `Seat`, `Role`, `Occupancy`, `Square`,
//                  `Promotion`, `MoveRequest`, `MoveRecord`, `GameStatus`,
//                  `RejectReason`.
// - `message.rs`:  `ClientMessage` and `ServerMessage` enums.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON serialization.** Frames stay human-readable and trivially bridged
//   to a browser client.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing, compatible
//   with both blocking TCP streams and buffered wrappers.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_MESSAGE_SIZE, read_message, recv_json, send_json, write_message};
pub use message::{ClientMessage, ServerMessage};
pub use types::{
    ConnectionId, GamePhase, GameStatus, MoveRecord, MoveRequest, Occupancy, ParseSquareError,
    Promotion, RejectReason, Role, Seat, Square,
};
