use serde::{Deserialize, Serialize};

use crate::engine::types::{Chips, EventId, PokerTable, TableId, UserId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableRequest {
    pub name: String,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub max_seats: u8,
    #[serde(default)]
    pub blind_step_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub id: TableId,
    pub name: String,
    pub dealer_id: UserId,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub max_seats: u8,
}

impl From<PokerTable> for TableSummary {
    fn from(table: PokerTable) -> Self {
        Self {
            id: table.id,
            name: table.name,
            dealer_id: table.dealer_id,
            small_blind: table.small_blind,
            big_blind: table.big_blind,
            max_seats: table.max_seats,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub buy_in: Chips,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickRequest {
    pub player_id: UserId,
}

/// The single action surface: `{"kind": "...", "params": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionRequest {
    StartGame,
    DealCard { rank: String, suit: String },
    ResetTable,
    Raise { amount: Chips },
    Check,
    Fold,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: EventId,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub serial: String,
    pub barcode: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub status: &'static str,
}
