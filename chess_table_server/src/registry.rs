// Seat registry: which connection holds White and which holds Black.
//
// A plain value owned by `Session`. It never locks; atomicity of the
// check-and-set in `assign_seat` comes from the server's single event-loop
// thread being the only caller (see `server.rs`).
//
// Invariants:
// - at most one connection per seat;
// - a connection holds at most one seat;
// - every connection beyond the two seats is a spectator, and spectators are
//   not recorded at all.

use chess_table_protocol::types::{ConnectionId, Occupancy, Role, Seat};

#[derive(Debug, Default)]
pub struct SeatRegistry {
    white: Option<ConnectionId>,
    black: Option<ConnectionId>,
}

impl SeatRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `conn` the first free seat, White before Black. When both are
    /// taken the connection becomes a spectator; this is not an error.
    pub fn assign_seat(&mut self, conn: ConnectionId) -> Role {
        if let Some(seat) = self.seat_of(conn) {
            return seat.into();
        }
        for seat in [Seat::White, Seat::Black] {
            let slot = self.slot_mut(seat);
            if slot.is_none() {
                *slot = Some(conn);
                return seat.into();
            }
        }
        Role::Spectator
    }

    /// Free the seat held by `conn`, returning it. Spectators and unknown
    /// connections are a no-op, so repeated calls are harmless.
    pub fn release_seat(&mut self, conn: ConnectionId) -> Option<Seat> {
        let seat = self.seat_of(conn)?;
        *self.slot_mut(seat) = None;
        Some(seat)
    }

    /// True iff `conn` currently holds `seat`.
    #[must_use]
    pub fn authorize(&self, conn: ConnectionId, seat: Seat) -> bool {
        self.holder(seat) == Some(conn)
    }

    #[must_use]
    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            white: self.white.is_some(),
            black: self.black.is_some(),
        }
    }

    #[must_use]
    pub fn holder(&self, seat: Seat) -> Option<ConnectionId> {
        match seat {
            Seat::White => self.white,
            Seat::Black => self.black,
        }
    }

    #[must_use]
    pub fn seat_of(&self, conn: ConnectionId) -> Option<Seat> {
        [Seat::White, Seat::Black]
            .into_iter()
            .find(|&seat| self.holder(seat) == Some(conn))
    }

    fn slot_mut(&mut self, seat: Seat) -> &mut Option<ConnectionId> {
        match seat {
            Seat::White => &mut self.white,
            Seat::Black => &mut self.black,
        }
    }
}
