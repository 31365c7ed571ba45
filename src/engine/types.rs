use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::cards::Card;

pub type Chips = u64;
pub type UserId = Uuid;
pub type TableId = Uuid;
pub type SeatId = Uuid;
pub type GameId = Uuid;
pub type DeviceId = Uuid;
pub type EventId = i64;

/// Exponent cap for the blind-timer multiplier.
const MAX_BLIND_DOUBLINGS: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Player,
    Dealer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
    pub balance: Chips,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PokerTable {
    pub id: TableId,
    pub name: String,
    pub dealer_id: UserId,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub max_seats: u8,
    pub blind_step_seconds: Option<i64>,
    pub blind_timer_started_at: Option<DateTime<Utc>>,
}

impl PokerTable {
    /// Blind multiplier at `now`: doubles once per elapsed timer step.
    pub fn blind_multiplier(&self, now: DateTime<Utc>) -> Chips {
        let (Some(step), Some(started)) = (self.blind_step_seconds, self.blind_timer_started_at)
        else {
            return 1;
        };
        if step <= 0 {
            return 1;
        }
        let elapsed = (now - started).num_seconds().max(0);
        let doublings = u32::try_from(elapsed / step)
            .unwrap_or(MAX_BLIND_DOUBLINGS)
            .min(MAX_BLIND_DOUBLINGS);
        1u64 << doublings
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeatStatus {
    Active,
    AllIn,
    Folded,
    Eliminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LastAction {
    Raise,
    Call,
    Check,
    Fold,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Seat {
    pub id: SeatId,
    pub table_id: TableId,
    pub player_id: UserId,
    pub seat_number: u8,
    /// Current stack behind.
    pub buy_in: Chips,
    /// Stack at the start of the current hand; anchors conservation.
    pub starting_balance: Chips,
    /// Chips committed in the current betting round.
    pub current_bet: Chips,
    pub cards: Vec<Card>,
    pub status: SeatStatus,
    pub last_action: Option<LastAction>,
    pub hand_type: Option<String>,
    pub hand_description: Option<String>,
    pub win_amount: Option<Chips>,
    pub winning_cards: Vec<Card>,
    /// Encrypted card nonces written by the hardware key layer; the
    /// engine only stores them and hands them to the seat owner.
    pub card_nonces: Option<JsonValue>,
}

impl Seat {
    pub fn new(table_id: TableId, player_id: UserId, seat_number: u8, buy_in: Chips) -> Self {
        Self {
            id: Uuid::new_v4(),
            table_id,
            player_id,
            seat_number,
            buy_in,
            starting_balance: buy_in,
            current_bet: 0,
            cards: Vec::new(),
            status: SeatStatus::Active,
            last_action: None,
            hand_type: None,
            hand_description: None,
            win_amount: None,
            winning_cards: Vec::new(),
            card_nonces: None,
        }
    }

    /// Chips the seat has committed since hand start.
    pub fn cumulative_contribution(&self) -> Chips {
        self.starting_balance.saturating_sub(self.buy_in)
    }

    pub fn is_dealable(&self) -> bool {
        matches!(self.status, SeatStatus::Active | SeatStatus::AllIn)
    }

    /// Clears the per-hand fields. Status is handled by the caller.
    pub fn reset_for_hand(&mut self) {
        self.cards.clear();
        self.current_bet = 0;
        self.last_action = None;
        self.hand_type = None;
        self.hand_description = None;
        self.win_amount = None;
        self.winning_cards.clear();
        self.card_nonces = None;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandPhase {
    DealHoleCards,
    Betting,
    DealFlop,
    DealTurn,
    DealRiver,
    Showdown,
}

impl HandPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            HandPhase::DealHoleCards => "DEAL_HOLE_CARDS",
            HandPhase::Betting => "BETTING",
            HandPhase::DealFlop => "DEAL_FLOP",
            HandPhase::DealTurn => "DEAL_TURN",
            HandPhase::DealRiver => "DEAL_RIVER",
            HandPhase::Showdown => "SHOWDOWN",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Game {
    pub id: GameId,
    pub table_id: TableId,
    pub phase: HandPhase,
    pub is_completed: bool,
    pub dealer_button_seat_id: Option<SeatId>,
    /// Whose turn it is, or who receives the next hole card.
    pub assigned_seat_id: Option<SeatId>,
    pub community_cards: Vec<Card>,
    /// Chips already merged from closed rounds.
    pub pot_total: Chips,
    pub bet_count: u32,
    pub required_bet_count: u32,
    pub effective_small_blind: Chips,
    pub effective_big_blind: Chips,
    pub turn_start_time: Option<DateTime<Utc>>,
    /// Display snapshot of the side pots after showdown.
    pub side_pot_details: Option<JsonValue>,
}

impl Game {
    pub fn new(table_id: TableId, small_blind: Chips, big_blind: Chips) -> Self {
        Self {
            id: Uuid::new_v4(),
            table_id,
            phase: HandPhase::DealHoleCards,
            is_completed: false,
            dealer_button_seat_id: None,
            assigned_seat_id: None,
            community_cards: Vec::new(),
            pot_total: 0,
            bet_count: 0,
            required_bet_count: 0,
            effective_small_blind: small_blind,
            effective_big_blind: big_blind,
            turn_start_time: None,
            side_pot_details: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Scanner,
    Display,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PiDevice {
    pub id: DeviceId,
    pub serial: String,
    pub kind: DeviceKind,
    pub table_id: TableId,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn table_with_timer(step: i64, started_secs_ago: i64) -> PokerTable {
        PokerTable {
            id: Uuid::new_v4(),
            name: "t".into(),
            dealer_id: Uuid::new_v4(),
            small_blind: 5,
            big_blind: 10,
            max_seats: 8,
            blind_step_seconds: Some(step),
            blind_timer_started_at: Some(Utc::now() - Duration::seconds(started_secs_ago)),
        }
    }

    #[test]
    fn blind_multiplier_is_one_without_timer() {
        let mut table = table_with_timer(600, 1200);
        table.blind_timer_started_at = None;
        assert_eq!(table.blind_multiplier(Utc::now()), 1);
    }

    #[test]
    fn blind_multiplier_doubles_per_step() {
        let now = Utc::now();
        assert_eq!(table_with_timer(600, 0).blind_multiplier(now), 1);
        assert_eq!(table_with_timer(600, 650).blind_multiplier(now), 2);
        assert_eq!(table_with_timer(600, 1900).blind_multiplier(now), 8);
    }

    #[test]
    fn cumulative_contribution_tracks_debits() {
        let mut seat = Seat::new(Uuid::new_v4(), Uuid::new_v4(), 0, 200);
        assert_eq!(seat.cumulative_contribution(), 0);
        seat.buy_in = 150;
        assert_eq!(seat.cumulative_contribution(), 50);
    }
}
