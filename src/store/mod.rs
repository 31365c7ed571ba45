//! Transactional persistence surface for the table engine.
//!
//! All reads inside a transaction reflect writes made earlier in the same
//! transaction. Serialization per table is enforced by the coordinator;
//! the store only promises snapshot consistency and that `commit` is the
//! single point where effects (including appended events) become visible.

pub mod in_memory;
pub mod sea_orm;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::engine::errors::EngineError;
use crate::engine::types::{
    DeviceId, EventId, Game, GameId, PiDevice, PokerTable, Seat, SeatId, TableId, User, UserId,
};
use crate::events::{GameEventRecord, NewEvent};

pub use self::in_memory::InMemoryTableStore;
pub use self::sea_orm::SeaOrmTableStore;

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, EngineError>;
}

#[async_trait]
pub trait StoreTxn: Send {
    async fn table(&mut self, id: TableId) -> Result<Option<PokerTable>, EngineError>;
    async fn table_owned_by(&mut self, dealer: UserId) -> Result<Option<PokerTable>, EngineError>;
    async fn insert_table(&mut self, table: &PokerTable) -> Result<(), EngineError>;

    async fn user(&mut self, id: UserId) -> Result<Option<User>, EngineError>;
    async fn update_user(&mut self, user: &User) -> Result<(), EngineError>;

    /// Seats of a table in ascending `seat_number` order.
    async fn seats_ordered(&mut self, table: TableId) -> Result<Vec<Seat>, EngineError>;
    async fn seat(&mut self, id: SeatId) -> Result<Option<Seat>, EngineError>;
    /// A player occupies at most one seat across all tables.
    async fn seat_of_player(&mut self, player: UserId) -> Result<Option<Seat>, EngineError>;
    async fn insert_seat(&mut self, seat: &Seat) -> Result<(), EngineError>;
    async fn update_seat(&mut self, seat: &Seat) -> Result<(), EngineError>;
    async fn delete_seat(&mut self, id: SeatId) -> Result<(), EngineError>;

    /// The game with `is_completed == false`, if any (at most one).
    async fn active_game(&mut self, table: TableId) -> Result<Option<Game>, EngineError>;
    /// The most recently created game, completed or not.
    async fn latest_game(&mut self, table: TableId) -> Result<Option<Game>, EngineError>;
    async fn insert_game(&mut self, game: &Game) -> Result<(), EngineError>;
    async fn update_game(&mut self, game: &Game) -> Result<(), EngineError>;

    async fn append_event(&mut self, event: NewEvent) -> Result<GameEventRecord, EngineError>;
    /// Events with `id > since` for the given game plus table-level
    /// events, ascending by id.
    async fn events_after(
        &mut self,
        table: TableId,
        game: Option<GameId>,
        since: EventId,
    ) -> Result<Vec<GameEventRecord>, EngineError>;
    async fn events_for_game(&mut self, game: GameId) -> Result<Vec<GameEventRecord>, EngineError>;

    async fn device_by_serial(&mut self, serial: &str) -> Result<Option<PiDevice>, EngineError>;
    async fn touch_device(&mut self, id: DeviceId, at: DateTime<Utc>) -> Result<(), EngineError>;

    async fn commit(self: Box<Self>) -> Result<(), EngineError>;
    async fn rollback(self: Box<Self>);
}
