use sea_orm::DbErr;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::types::Chips;

/// Diagnostic dump attached to a conservation failure: the full event
/// list, seat chip states, and the recomputed pots for the hand.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConservationReport {
    pub reason: String,
    pub table_id: Option<uuid::Uuid>,
    pub game_id: Option<uuid::Uuid>,
    pub starting_total: Chips,
    pub final_total: Chips,
    pub seats: JsonValue,
    pub pots: JsonValue,
    pub events: JsonValue,
}

impl std::fmt::Display for ConservationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (starting total {}, final total {})",
            self.reason, self.starting_total, self.final_total
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("acting out of turn")]
    WrongTurn,
    #[error("raise must be strictly greater than the current highest bet")]
    InvalidRaise,
    #[error("card {0} has already been dealt")]
    DuplicateCard(String),
    #[error("balance too low for the requested buy-in")]
    InsufficientBalance,
    #[error("no seat available at this table")]
    TableFull,
    #[error("player is already seated")]
    Joined,
    #[error("chip conservation violated: {0}")]
    Conservation(Box<ConservationReport>),
    #[error("invalid barcode {0:?}")]
    InvalidBarcode(String),
    #[error("device misconfigured: {0}")]
    DeviceMisconfigured(&'static str),
    #[error("invalid card code {0:?}")]
    InvalidCard(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("operation deadline exceeded")]
    Timeout,
    #[error("store conflict")]
    StoreConflict,
    #[error("database error: {0}")]
    Store(#[from] DbErr),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Machine-readable kind surfaced in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NotFound",
            EngineError::Forbidden(_) => "Forbidden",
            EngineError::InvalidState(_) => "InvalidState",
            EngineError::WrongTurn => "WrongTurn",
            EngineError::InvalidRaise => "InvalidRaise",
            EngineError::DuplicateCard(_) => "DuplicateCard",
            EngineError::InsufficientBalance => "InsufficientBalance",
            EngineError::TableFull => "TableFull",
            EngineError::Joined => "Joined",
            EngineError::Conservation(_) => "ConservationError",
            EngineError::InvalidBarcode(_) => "InvalidBarcode",
            EngineError::DeviceMisconfigured(_) => "DeviceMisconfigured",
            EngineError::InvalidCard(_) => "InvalidCard",
            EngineError::Validation(_) => "Validation",
            EngineError::Timeout => "Timeout",
            EngineError::StoreConflict => "StoreConflict",
            EngineError::Store(_) => "StoreError",
        }
    }

    /// Whether the coordinator may retry the whole transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreConflict)
    }
}

/// Serialization failures and deadlocks are retried by the coordinator;
/// everything else is surfaced as-is.
pub fn classify_db_err(err: DbErr) -> EngineError {
    let message = err.to_string().to_ascii_lowercase();
    if message.contains("serialization") || message.contains("deadlock") {
        EngineError::StoreConflict
    } else {
        EngineError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(EngineError::WrongTurn.kind(), "WrongTurn");
        assert_eq!(EngineError::TableFull.kind(), "TableFull");
        assert_eq!(
            EngineError::DuplicateCard("As".into()).kind(),
            "DuplicateCard"
        );
    }

    #[test]
    fn serialization_failures_are_retryable() {
        let err = classify_db_err(DbErr::Custom(
            "could not serialize access due to concurrent update".into(),
        ));
        assert!(err.is_retryable());

        let err = classify_db_err(DbErr::Custom("relation does not exist".into()));
        assert!(!err.is_retryable());
    }
}
