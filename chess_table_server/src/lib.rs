// chess_table_server: a two-seat chess table over TCP.
//
// One process hosts one game. Connecting clients are seated White, then
// Black, then as spectators; seated clients submit moves for their side; every
// accepted move is broadcast to all connections. Chess legality is delegated
// to shakmaty behind the `GameRules` trait.
//
// Module overview:
// - `rules.rs`:    `GameRules` trait and `StandardChess` (shakmaty) adapter.
// - `registry.rs`: `SeatRegistry`, tracking which connection holds which seat.
// - `session.rs`:  `Session`, which owns game state, registry and client writers;
//                  authorizes, applies and broadcasts moves.
// - `server.rs`:   TCP listener, reader threads (one per client), and the
//                  main event loop. Uses `std::net` with a thread-per-reader
//                  architecture and an `mpsc` channel to funnel events into
//                  the single-threaded `Session`.
// - `client.rs`:   `TableClient`, a blocking-connect / polling client.
// - `error.rs`:    `ServerError`, `ClientError`.
// - `logging.rs`:  tracing-subscriber setup for the binary.
//
// The server can run as a standalone binary (`main.rs`) or be embedded via
// the library API (`start_server`).

pub mod client;
pub mod error;
pub mod logging;
pub mod registry;
pub mod rules;
pub mod server;
pub mod session;

pub use client::TableClient;
pub use error::{ClientError, ServerError};
pub use server::{ServerConfig, ServerHandle, start_server};
