//! Append-only game event log: wire types and per-type payload schemas.
//! Events are inserted inside the operation's transaction so the log and
//! the table state commit atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::engine::cards::Card;
use crate::engine::errors::EngineError;
use crate::engine::types::{Chips, EventId, GameId, SeatId, TableId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEventType {
    StartGame,
    Raise,
    Call,
    Check,
    Fold,
    Flop,
    Turn,
    River,
    EndGame,
}

impl GameEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            GameEventType::StartGame => "START_GAME",
            GameEventType::Raise => "RAISE",
            GameEventType::Call => "CALL",
            GameEventType::Check => "CHECK",
            GameEventType::Fold => "FOLD",
            GameEventType::Flop => "FLOP",
            GameEventType::Turn => "TURN",
            GameEventType::River => "RIVER",
            GameEventType::EndGame => "END_GAME",
        }
    }

    pub fn parse(value: &str) -> Result<Self, EngineError> {
        Ok(match value {
            "START_GAME" => GameEventType::StartGame,
            "RAISE" => GameEventType::Raise,
            "CALL" => GameEventType::Call,
            "CHECK" => GameEventType::Check,
            "FOLD" => GameEventType::Fold,
            "FLOP" => GameEventType::Flop,
            "TURN" => GameEventType::Turn,
            "RIVER" => GameEventType::River,
            "END_GAME" => GameEventType::EndGame,
            other => {
                return Err(EngineError::validation(format!(
                    "unknown event type {other:?}"
                )))
            }
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameDetails {
    pub dealer_button_seat_id: SeatId,
}

/// Payload of RAISE/CALL/CHECK: the seat and its resulting round total.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetDetails {
    pub seat_id: SeatId,
    pub total: Chips,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldDetails {
    pub seat_id: SeatId,
}

/// FLOP/TURN/RIVER carry the full community snapshot, not the delta.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreetDetails {
    pub community_all: Vec<Card>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerEntry {
    pub seat_id: SeatId,
    pub amount: Chips,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hand_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<Card>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndGameDetails {
    pub winners: Vec<WinnerEntry>,
}

/// Checks a JSON payload against the schema of its event type.
pub fn validate_details(ty: GameEventType, details: &JsonValue) -> Result<(), EngineError> {
    let result = match ty {
        GameEventType::StartGame => {
            serde_json::from_value::<StartGameDetails>(details.clone()).map(|_| ())
        }
        GameEventType::Raise => {
            let decoded = serde_json::from_value::<BetDetails>(details.clone())
                .map_err(|err| EngineError::validation(err.to_string()))?;
            if decoded.total == 0 {
                return Err(EngineError::validation("RAISE total must be positive"));
            }
            return Ok(());
        }
        GameEventType::Call | GameEventType::Check => {
            serde_json::from_value::<BetDetails>(details.clone()).map(|_| ())
        }
        GameEventType::Fold => serde_json::from_value::<FoldDetails>(details.clone()).map(|_| ()),
        GameEventType::Flop | GameEventType::Turn | GameEventType::River => {
            serde_json::from_value::<StreetDetails>(details.clone()).map(|_| ())
        }
        GameEventType::EndGame => {
            serde_json::from_value::<EndGameDetails>(details.clone()).map(|_| ())
        }
    };
    result.map_err(|err| EngineError::validation(err.to_string()))
}

/// Event row waiting to be appended inside a transaction; the store
/// assigns the monotonically increasing id.
#[derive(Clone, Debug)]
pub struct NewEvent {
    pub table_id: TableId,
    pub game_id: Option<GameId>,
    pub ty: GameEventType,
    pub details: JsonValue,
}

impl NewEvent {
    pub fn validated(
        table_id: TableId,
        game_id: Option<GameId>,
        ty: GameEventType,
        details: JsonValue,
    ) -> Result<Self, EngineError> {
        validate_details(ty, &details)?;
        Ok(Self {
            table_id,
            game_id,
            ty,
            details,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEventRecord {
    pub id: EventId,
    pub table_id: TableId,
    pub game_id: Option<GameId>,
    #[serde(rename = "type")]
    pub ty: GameEventType,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn event_type_wire_names_round_trip() {
        for ty in [
            GameEventType::StartGame,
            GameEventType::Raise,
            GameEventType::Call,
            GameEventType::Check,
            GameEventType::Fold,
            GameEventType::Flop,
            GameEventType::Turn,
            GameEventType::River,
            GameEventType::EndGame,
        ] {
            assert_eq!(GameEventType::parse(ty.as_str()).unwrap(), ty);
        }
        assert!(GameEventType::parse("SHUFFLE").is_err());
    }

    #[test]
    fn raise_total_must_be_positive() {
        let seat_id = Uuid::new_v4();
        let ok = json!({"seatId": seat_id, "total": 50});
        assert!(validate_details(GameEventType::Raise, &ok).is_ok());

        let zero = json!({"seatId": seat_id, "total": 0});
        assert!(validate_details(GameEventType::Raise, &zero).is_err());
        // A check-back is allowed to carry a zero total.
        assert!(validate_details(GameEventType::Check, &zero).is_ok());
    }

    #[test]
    fn street_payload_is_the_full_snapshot() {
        let details = json!({"communityAll": ["2h", "3h", "4h"]});
        assert!(validate_details(GameEventType::Flop, &details).is_ok());
        assert!(validate_details(GameEventType::Flop, &json!({"cards": []})).is_err());
    }

    #[test]
    fn end_game_winners_schema() {
        let details = json!({
            "winners": [
                {"seatId": Uuid::new_v4(), "amount": 150, "handType": "Flush", "cards": ["Ah", "Kh"]},
                {"seatId": Uuid::new_v4(), "amount": 0},
            ]
        });
        assert!(validate_details(GameEventType::EndGame, &details).is_ok());
        assert!(validate_details(GameEventType::EndGame, &json!({})).is_err());
    }
}
