// Test-only table client for end-to-end tests.
//
// Wraps the real `TableClient` (from `chess_table_server::client`) and keeps a
// local view of the game built only from what the server broadcasts: the
// latest FEN, status and occupancy, plus every `MoveMade` record in arrival
// order. Tests compare these views across clients to check that everyone
// converges on the same game.
//
// The only test-specific code here is the synchronous polling wrappers
// (blocking loops around `TableClient::recv_timeout()`). All networking uses
// the same code paths as a real client.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use chess_table_protocol::message::ServerMessage;
use chess_table_protocol::types::{
    GameStatus, MoveRecord, MoveRequest, Occupancy, RejectReason, Role,
};
use chess_table_server::client::TableClient;

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait slice for a single receive attempt.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A test client that tracks the table as broadcast by the server.
pub struct TestTableClient {
    client: TableClient,
    pub fen: Option<String>,
    pub status: Option<GameStatus>,
    pub occupancy: Option<Occupancy>,
    pub moves: Vec<MoveRecord>,
    /// Number of moves covered by the latest `BoardState`.
    pub synced_moves: usize,
    /// Number of `BoardState` messages received so far.
    pub board_states: usize,
    pub rejections: Vec<RejectReason>,
    pub game_full_notices: usize,
}

impl TestTableClient {
    /// Connect to a server and wait for the role greeting.
    pub fn connect(addr: SocketAddr) -> Self {
        let client = TableClient::connect(addr).expect("TestTableClient::connect failed");
        Self {
            client,
            fen: None,
            status: None,
            occupancy: None,
            moves: Vec::new(),
            synced_moves: 0,
            board_states: 0,
            rejections: Vec::new(),
            game_full_notices: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.client.role()
    }

    pub fn send_move(&mut self, from: &str, to: &str) {
        let request = MoveRequest::parse(from, to).expect("bad square in test");
        self.client.send_move(request).expect("send_move failed");
    }

    pub fn request_state(&mut self) {
        self.client.request_state().expect("request_state failed");
    }

    /// Request the board and block until a new `BoardState` arrives.
    pub fn resync(&mut self) {
        let before = self.board_states;
        self.request_state();
        self.wait_for("state reply", |c| c.board_states > before);
    }

    /// Send one frame of arbitrary bytes.
    pub fn send_raw(&mut self, payload: &[u8]) {
        self.client.send_raw(payload).expect("send_raw failed");
    }

    /// Send Goodbye.
    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    /// Blocking: apply messages until the first `BoardState` (the join-time
    /// snapshot) and `Occupancy` have both been seen.
    pub fn wait_until_synced(&mut self) {
        self.wait_for("join snapshot", |c| {
            c.fen.is_some() && c.occupancy.is_some()
        });
    }

    /// Blocking: apply messages until `n` moves have been seen along with the
    /// `BoardState` that follows the last of them.
    pub fn wait_for_moves(&mut self, n: usize) {
        self.wait_for("move broadcast", |c| c.synced_moves >= n);
    }

    /// Blocking: apply messages until occupancy equals `expected`.
    pub fn wait_for_occupancy(&mut self, expected: Occupancy) {
        self.wait_for("occupancy", |c| c.occupancy == Some(expected));
    }

    /// Blocking: apply messages until a rejection arrives and return it.
    pub fn wait_for_rejection(&mut self) -> RejectReason {
        let seen = self.rejections.len();
        self.wait_for("rejection", |c| c.rejections.len() > seen);
        self.rejections[seen]
    }

    /// Apply whatever is queued right now, without blocking.
    pub fn drain(&mut self) -> usize {
        let messages = self.client.poll();
        let count = messages.len();
        for msg in messages {
            self.apply(msg);
        }
        count
    }

    /// Blocking: apply messages until `done` holds. Panics after `POLL_TIMEOUT`.
    pub fn wait_for(&mut self, what: &str, done: impl Fn(&Self) -> bool) {
        let start = Instant::now();
        while !done(&*self) {
            assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
            if let Some(msg) = self.client.recv_timeout(POLL_INTERVAL) {
                self.apply(msg);
            }
        }
    }

    fn apply(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::RoleAssigned { .. } => {}
            ServerMessage::GameFull { .. } => self.game_full_notices += 1,
            ServerMessage::Occupancy(occupancy) => self.occupancy = Some(occupancy),
            ServerMessage::MoveMade(record) => self.moves.push(record),
            ServerMessage::BoardState { fen, status } => {
                self.fen = Some(fen);
                self.status = Some(status);
                self.synced_moves = self.moves.len();
                self.board_states += 1;
            }
            ServerMessage::InvalidMove { reason, .. } => self.rejections.push(reason),
        }
    }
}
