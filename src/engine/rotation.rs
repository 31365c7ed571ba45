//! Seat rotation helpers. Seats are always passed in ascending
//! `seat_number` order, as returned by the store.

use super::types::{Chips, Seat, SeatId, SeatStatus};

fn next_matching(seats: &[Seat], from: SeatId, accept: impl Fn(&Seat) -> bool) -> SeatId {
    let Some(start) = seats.iter().position(|s| s.id == from) else {
        return from;
    };
    for offset in 1..=seats.len() {
        let seat = &seats[(start + offset) % seats.len()];
        if accept(seat) {
            return seat.id;
        }
    }
    from
}

/// First active seat after `from` in rotation order; wraps; returns
/// `from` when no active seat exists in a full cycle.
pub fn next_active(seats: &[Seat], from: SeatId) -> SeatId {
    next_matching(seats, from, |s| s.status == SeatStatus::Active)
}

/// Like [`next_active`] but also accepts all-in seats, which still
/// receive hole cards.
pub fn next_dealable(seats: &[Seat], from: SeatId) -> SeatId {
    next_matching(seats, from, Seat::is_dealable)
}

/// Rotation over everyone still in the game, used for the dealer button
/// and blind positions.
pub fn next_non_eliminated(seats: &[Seat], from: SeatId) -> SeatId {
    next_matching(seats, from, |s| s.status != SeatStatus::Eliminated)
}

/// True iff every active seat matches the highest bet among non-folded
/// seats. Vacuously true when no active seats remain.
pub fn all_active_bets_equal(seats: &[Seat]) -> bool {
    let max_bet = max_non_folded_bet(seats);
    seats
        .iter()
        .filter(|s| s.status == SeatStatus::Active)
        .all(|s| s.current_bet == max_bet)
}

pub fn max_non_folded_bet(seats: &[Seat]) -> Chips {
    seats
        .iter()
        .filter(|s| !matches!(s.status, SeatStatus::Folded | SeatStatus::Eliminated))
        .map(|s| s.current_bet)
        .max()
        .unwrap_or(0)
}

pub fn active_count(seats: &[Seat]) -> usize {
    seats
        .iter()
        .filter(|s| s.status == SeatStatus::Active)
        .count()
}

pub fn non_folded_count(seats: &[Seat]) -> usize {
    seats
        .iter()
        .filter(|s| !matches!(s.status, SeatStatus::Folded | SeatStatus::Eliminated))
        .count()
}

pub fn non_eliminated_count(seats: &[Seat]) -> usize {
    seats
        .iter()
        .filter(|s| s.status != SeatStatus::Eliminated)
        .count()
}
