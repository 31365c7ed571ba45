//! Redacted table views returned by every coordinator entry point.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::engine::cards::HIDDEN_CARD;
use crate::engine::types::{
    Chips, Game, GameId, HandPhase, LastAction, PokerTable, Seat, SeatId, SeatStatus, TableId,
    UserId,
};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub id: TableId,
    pub name: String,
    pub dealer_id: UserId,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub max_seats: u8,
    pub seats: Vec<SeatView>,
    pub game: Option<GameView>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub id: SeatId,
    pub player_id: UserId,
    pub seat_number: u8,
    pub buy_in: Chips,
    pub starting_balance: Chips,
    pub current_bet: Chips,
    /// Card codes; hidden hole cards are the `FD` placeholder.
    pub cards: Vec<String>,
    pub status: SeatStatus,
    pub last_action: Option<LastAction>,
    pub hand_type: Option<String>,
    pub hand_description: Option<String>,
    pub win_amount: Option<Chips>,
    pub winning_cards: Vec<String>,
    /// Encrypted nonces, only delivered to the seat's owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_nonces: Option<JsonValue>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub id: GameId,
    pub state: HandPhase,
    pub is_completed: bool,
    pub dealer_button_seat_id: Option<SeatId>,
    pub assigned_seat_id: Option<SeatId>,
    pub community_cards: Vec<String>,
    pub pot_total: Chips,
    pub bet_count: u32,
    pub required_bet_count: u32,
    pub effective_small_blind: Chips,
    pub effective_big_blind: Chips,
    pub turn_start_time: Option<DateTime<Utc>>,
    pub side_pot_details: Option<JsonValue>,
}

/// Builds the view a given user is allowed to see. Hole cards of other
/// seats are hidden unless the hand is at showdown (and the seat did not
/// fold) or every remaining seat is all-in and the run-out is public.
pub fn redact(
    viewer: Option<UserId>,
    table: &PokerTable,
    seats: &[Seat],
    game: Option<&Game>,
) -> TableView {
    let at_showdown = game.is_some_and(|g| g.phase == HandPhase::Showdown);
    let all_in_runout = {
        let in_hand: Vec<&Seat> = seats.iter().filter(|s| s.is_dealable()).collect();
        in_hand.len() >= 2 && in_hand.iter().all(|s| s.status == SeatStatus::AllIn)
    };

    let seat_views = seats
        .iter()
        .map(|seat| {
            let own = viewer == Some(seat.player_id);
            // Busting out is not folding: a contender eliminated at
            // showdown still shows down like everyone else.
            let folded = seat.status == SeatStatus::Folded;
            let revealed = own || (at_showdown && !folded) || (all_in_runout && !folded);
            let cards = if revealed {
                seat.cards.iter().map(|c| c.code()).collect()
            } else {
                seat.cards.iter().map(|_| HIDDEN_CARD.to_string()).collect()
            };
            SeatView {
                id: seat.id,
                player_id: seat.player_id,
                seat_number: seat.seat_number,
                buy_in: seat.buy_in,
                starting_balance: seat.starting_balance,
                current_bet: seat.current_bet,
                cards,
                status: seat.status,
                last_action: seat.last_action,
                hand_type: seat.hand_type.clone(),
                hand_description: seat.hand_description.clone(),
                win_amount: seat.win_amount,
                winning_cards: seat.winning_cards.iter().map(|c| c.code()).collect(),
                card_nonces: own.then(|| seat.card_nonces.clone()).flatten(),
            }
        })
        .collect();

    TableView {
        id: table.id,
        name: table.name.clone(),
        dealer_id: table.dealer_id,
        small_blind: table.small_blind,
        big_blind: table.big_blind,
        max_seats: table.max_seats,
        seats: seat_views,
        game: game.map(|g| GameView {
            id: g.id,
            state: g.phase,
            is_completed: g.is_completed,
            dealer_button_seat_id: g.dealer_button_seat_id,
            assigned_seat_id: g.assigned_seat_id,
            community_cards: g.community_cards.iter().map(|c| c.code()).collect(),
            pot_total: g.pot_total,
            bet_count: g.bet_count,
            required_bet_count: g.required_bet_count,
            effective_small_blind: g.effective_small_blind,
            effective_big_blind: g.effective_big_blind,
            turn_start_time: g.turn_start_time,
            side_pot_details: g.side_pot_details.clone(),
        }),
    }
}
