//! In-memory store used by the integration tests. A transaction buffers
//! its own writes and reads through to the shared world (pending writes
//! win, giving read-your-writes); only the touched rows are merged into
//! the shared world on commit, so transactions on unrelated tables can
//! interleave without clobbering each other. Event ids come from a
//! shared sequence, like a database sequence: ids consumed by a rolled
//! back transaction are simply skipped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::engine::errors::EngineError;
use crate::engine::types::{
    DeviceId, EventId, Game, GameId, PiDevice, PokerTable, Seat, SeatId, TableId, User, UserId,
};
use crate::events::{GameEventRecord, NewEvent};

use super::{StoreTxn, TableStore};

#[derive(Default)]
struct World {
    users: HashMap<UserId, User>,
    tables: HashMap<TableId, PokerTable>,
    seats: HashMap<SeatId, Seat>,
    games: Vec<Game>,
    events: Vec<GameEventRecord>,
    devices: HashMap<DeviceId, PiDevice>,
}

#[derive(Default)]
pub struct InMemoryTableStore {
    inner: Arc<RwLock<World>>,
    next_event_id: Arc<AtomicI64>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, user: User) {
        self.inner.write().users.insert(user.id, user);
    }

    pub fn seed_device(&self, device: PiDevice) {
        self.inner.write().devices.insert(device.id, device);
    }

    pub fn user_balance(&self, id: UserId) -> Option<u64> {
        self.inner.read().users.get(&id).map(|u| u.balance)
    }

    pub fn all_events(&self) -> Vec<GameEventRecord> {
        self.inner.read().events.clone()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, EngineError> {
        Ok(Box::new(InMemoryTxn {
            shared: Arc::clone(&self.inner),
            next_event_id: Arc::clone(&self.next_event_id),
            users: HashMap::new(),
            tables: HashMap::new(),
            seats: HashMap::new(),
            deleted_seats: HashSet::new(),
            games: Vec::new(),
            events: Vec::new(),
            touched_devices: HashMap::new(),
        }))
    }
}

pub struct InMemoryTxn {
    shared: Arc<RwLock<World>>,
    next_event_id: Arc<AtomicI64>,
    // Buffered writes, merged into the shared world only on commit.
    users: HashMap<UserId, User>,
    tables: HashMap<TableId, PokerTable>,
    seats: HashMap<SeatId, Seat>,
    deleted_seats: HashSet<SeatId>,
    games: Vec<Game>,
    events: Vec<GameEventRecord>,
    touched_devices: HashMap<DeviceId, DateTime<Utc>>,
}

impl InMemoryTxn {
    /// Games of a table as this transaction sees them: shared rows with
    /// pending updates applied, then games inserted by this transaction.
    fn merged_games(&self, table: TableId) -> Vec<Game> {
        let mut games: Vec<Game> = {
            let world = self.shared.read();
            world
                .games
                .iter()
                .filter(|g| g.table_id == table)
                .map(|g| {
                    self.games
                        .iter()
                        .find(|pending| pending.id == g.id)
                        .unwrap_or(g)
                        .clone()
                })
                .collect()
        };
        for pending in &self.games {
            if pending.table_id == table && !games.iter().any(|g| g.id == pending.id) {
                games.push(pending.clone());
            }
        }
        games
    }

    fn upsert_pending_game(&mut self, game: &Game) {
        if let Some(slot) = self.games.iter_mut().find(|g| g.id == game.id) {
            *slot = game.clone();
        } else {
            self.games.push(game.clone());
        }
    }
}

#[async_trait]
impl StoreTxn for InMemoryTxn {
    async fn table(&mut self, id: TableId) -> Result<Option<PokerTable>, EngineError> {
        if let Some(table) = self.tables.get(&id) {
            return Ok(Some(table.clone()));
        }
        Ok(self.shared.read().tables.get(&id).cloned())
    }

    async fn table_owned_by(&mut self, dealer: UserId) -> Result<Option<PokerTable>, EngineError> {
        if let Some(table) = self.tables.values().find(|t| t.dealer_id == dealer) {
            return Ok(Some(table.clone()));
        }
        Ok(self
            .shared
            .read()
            .tables
            .values()
            .find(|t| t.dealer_id == dealer && !self.tables.contains_key(&t.id))
            .cloned())
    }

    async fn insert_table(&mut self, table: &PokerTable) -> Result<(), EngineError> {
        self.tables.insert(table.id, table.clone());
        Ok(())
    }

    async fn user(&mut self, id: UserId) -> Result<Option<User>, EngineError> {
        if let Some(user) = self.users.get(&id) {
            return Ok(Some(user.clone()));
        }
        Ok(self.shared.read().users.get(&id).cloned())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), EngineError> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn seats_ordered(&mut self, table: TableId) -> Result<Vec<Seat>, EngineError> {
        let mut seats: Vec<Seat> = {
            let world = self.shared.read();
            world
                .seats
                .values()
                .filter(|s| s.table_id == table)
                .filter(|s| {
                    !self.deleted_seats.contains(&s.id) && !self.seats.contains_key(&s.id)
                })
                .cloned()
                .collect()
        };
        seats.extend(self.seats.values().filter(|s| s.table_id == table).cloned());
        seats.sort_by_key(|s| s.seat_number);
        Ok(seats)
    }

    async fn seat(&mut self, id: SeatId) -> Result<Option<Seat>, EngineError> {
        if self.deleted_seats.contains(&id) {
            return Ok(None);
        }
        if let Some(seat) = self.seats.get(&id) {
            return Ok(Some(seat.clone()));
        }
        Ok(self.shared.read().seats.get(&id).cloned())
    }

    async fn seat_of_player(&mut self, player: UserId) -> Result<Option<Seat>, EngineError> {
        if let Some(seat) = self.seats.values().find(|s| s.player_id == player) {
            return Ok(Some(seat.clone()));
        }
        Ok(self
            .shared
            .read()
            .seats
            .values()
            .find(|s| {
                s.player_id == player
                    && !self.deleted_seats.contains(&s.id)
                    && !self.seats.contains_key(&s.id)
            })
            .cloned())
    }

    async fn insert_seat(&mut self, seat: &Seat) -> Result<(), EngineError> {
        self.deleted_seats.remove(&seat.id);
        self.seats.insert(seat.id, seat.clone());
        Ok(())
    }

    async fn update_seat(&mut self, seat: &Seat) -> Result<(), EngineError> {
        self.seats.insert(seat.id, seat.clone());
        Ok(())
    }

    async fn delete_seat(&mut self, id: SeatId) -> Result<(), EngineError> {
        self.seats.remove(&id);
        self.deleted_seats.insert(id);
        Ok(())
    }

    async fn active_game(&mut self, table: TableId) -> Result<Option<Game>, EngineError> {
        Ok(self
            .merged_games(table)
            .into_iter()
            .find(|g| !g.is_completed))
    }

    async fn latest_game(&mut self, table: TableId) -> Result<Option<Game>, EngineError> {
        Ok(self.merged_games(table).into_iter().last())
    }

    async fn insert_game(&mut self, game: &Game) -> Result<(), EngineError> {
        self.upsert_pending_game(game);
        Ok(())
    }

    async fn update_game(&mut self, game: &Game) -> Result<(), EngineError> {
        let known = self.games.iter().any(|g| g.id == game.id)
            || self.shared.read().games.iter().any(|g| g.id == game.id);
        if !known {
            return Err(EngineError::NotFound("game"));
        }
        self.upsert_pending_game(game);
        Ok(())
    }

    async fn append_event(&mut self, event: NewEvent) -> Result<GameEventRecord, EngineError> {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = GameEventRecord {
            id,
            table_id: event.table_id,
            game_id: event.game_id,
            ty: event.ty,
            details: event.details,
            created_at: Utc::now(),
        };
        self.events.push(record.clone());
        Ok(record)
    }

    async fn events_after(
        &mut self,
        table: TableId,
        game: Option<GameId>,
        since: EventId,
    ) -> Result<Vec<GameEventRecord>, EngineError> {
        let mut events: Vec<GameEventRecord> = self
            .shared
            .read()
            .events
            .iter()
            .chain(self.events.iter())
            .filter(|e| e.table_id == table && e.id > since)
            .filter(|e| e.game_id.is_none() || e.game_id == game)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.id);
        Ok(events)
    }

    async fn events_for_game(&mut self, game: GameId) -> Result<Vec<GameEventRecord>, EngineError> {
        let mut events: Vec<GameEventRecord> = self
            .shared
            .read()
            .events
            .iter()
            .chain(self.events.iter())
            .filter(|e| e.game_id == Some(game))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.id);
        Ok(events)
    }

    async fn device_by_serial(&mut self, serial: &str) -> Result<Option<PiDevice>, EngineError> {
        let mut device = self
            .shared
            .read()
            .devices
            .values()
            .find(|d| d.serial == serial)
            .cloned();
        if let Some(device) = device.as_mut() {
            if let Some(at) = self.touched_devices.get(&device.id) {
                device.last_seen_at = Some(*at);
            }
        }
        Ok(device)
    }

    async fn touch_device(&mut self, id: DeviceId, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.touched_devices.insert(id, at);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), EngineError> {
        let InMemoryTxn {
            shared,
            users,
            tables,
            seats,
            deleted_seats,
            games,
            events,
            touched_devices,
            ..
        } = *self;

        let mut world = shared.write();
        world.users.extend(users);
        world.tables.extend(tables);
        for id in &deleted_seats {
            world.seats.remove(id);
        }
        world.seats.extend(seats);
        for game in games {
            if let Some(slot) = world.games.iter_mut().find(|g| g.id == game.id) {
                *slot = game;
            } else {
                world.games.push(game);
            }
        }
        world.events.extend(events);
        world.events.sort_by_key(|e| e.id);
        for (id, at) in touched_devices {
            if let Some(device) = world.devices.get_mut(&id) {
                device.last_seen_at = Some(at);
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::UserRole;
    use uuid::Uuid;

    fn player(balance: u64) -> User {
        User {
            id: Uuid::new_v4(),
            name: "p".into(),
            role: UserRole::Player,
            balance,
        }
    }

    #[tokio::test]
    async fn interleaved_commits_keep_both_transactions_writes() {
        let store = InMemoryTableStore::new();
        let alice = player(100);
        let bob = player(100);
        store.seed_user(alice.clone());
        store.seed_user(bob.clone());

        // Two transactions on unrelated rows overlap in time.
        let mut txn_a = store.begin().await.unwrap();
        let mut txn_b = store.begin().await.unwrap();

        let mut a = txn_a.user(alice.id).await.unwrap().unwrap();
        a.balance = 111;
        txn_a.update_user(&a).await.unwrap();

        let mut b = txn_b.user(bob.id).await.unwrap().unwrap();
        b.balance = 222;
        txn_b.update_user(&b).await.unwrap();

        // B commits first, A second; A must not wipe out B's write.
        txn_b.commit().await.unwrap();
        txn_a.commit().await.unwrap();

        assert_eq!(store.user_balance(alice.id), Some(111));
        assert_eq!(store.user_balance(bob.id), Some(222));
    }

    #[tokio::test]
    async fn buffered_writes_are_invisible_until_commit_and_gone_after_rollback() {
        let store = InMemoryTableStore::new();
        let alice = player(100);
        store.seed_user(alice.clone());

        let mut txn = store.begin().await.unwrap();
        let mut a = txn.user(alice.id).await.unwrap().unwrap();
        a.balance = 7;
        txn.update_user(&a).await.unwrap();

        // Read-your-writes inside the transaction...
        assert_eq!(txn.user(alice.id).await.unwrap().unwrap().balance, 7);
        // ...but nothing leaks to the shared world before commit.
        assert_eq!(store.user_balance(alice.id), Some(100));

        txn.rollback().await;
        assert_eq!(store.user_balance(alice.id), Some(100));
    }
}
