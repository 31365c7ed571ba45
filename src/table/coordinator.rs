//! Table coordinator: the single entry point for every player, dealer,
//! and scanner mutation. Mutations for one table are serialized behind a
//! per-table slot; each operation runs inside one store transaction and
//! fires a fan-out notification after commit.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::cards::Card;
use crate::engine::errors::EngineError;
use crate::engine::types::{
    Chips, EventId, PokerTable, Seat, TableId, UserId, UserRole,
};
use crate::events::GameEventRecord;
use crate::notify::TableNotifier;
use crate::store::{StoreTxn, TableStore};

use super::betting::{apply_bet_action, BetAction};
use super::hand;
use super::snapshot::{redact, TableView};

const LOG_TARGET: &str = "felt_poker::table::coordinator";

#[derive(Clone, Copy, Debug)]
pub struct Caller {
    pub user_id: UserId,
    pub role: UserRole,
}

/// The dealer/player action surface, matched exhaustively below.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableAction {
    StartGame,
    DealCard { rank: String, suit: String },
    ResetTable,
    Raise { amount: Chips },
    Check,
    Fold,
}

#[derive(Clone, Copy, Debug)]
enum ActionKind {
    Start,
    Deal(Card),
    Reset,
    Bet(BetAction),
}

#[derive(Clone, Debug)]
pub struct CreateTableParams {
    pub name: String,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub max_seats: u8,
    pub blind_step_seconds: Option<i64>,
}

#[derive(Clone, Copy, Debug)]
pub struct CoordinatorConfig {
    pub op_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

type TxnFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

pub struct TableCoordinator {
    store: Arc<dyn TableStore>,
    notifier: Arc<dyn TableNotifier>,
    locks: DashMap<TableId, Arc<Mutex<()>>>,
    config: CoordinatorConfig,
}

impl TableCoordinator {
    pub fn new(
        store: Arc<dyn TableStore>,
        notifier: Arc<dyn TableNotifier>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            locks: DashMap::new(),
            config,
        }
    }

    fn lock_for(&self, table_id: TableId) -> Arc<Mutex<()>> {
        self.locks
            .entry(table_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs a mutating operation under the table's serialization slot:
    /// begin, apply, commit, notify. Retries on store conflicts with a
    /// bounded backoff; events only ever commit with the winning attempt.
    async fn execute<T, F>(&self, table_id: TableId, mut op: F) -> Result<T, EngineError>
    where
        T: Send,
        F: for<'a> FnMut(&'a mut dyn StoreTxn) -> TxnFuture<'a, T> + Send,
    {
        let lock = self.lock_for(table_id);
        let _slot = lock.lock().await;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut txn = self.store.begin().await?;
            let applied = tokio::time::timeout(self.config.op_timeout, op(txn.as_mut())).await;
            let err = match applied {
                Err(_) => {
                    txn.rollback().await;
                    return Err(EngineError::Timeout);
                }
                Ok(Ok(value)) => match txn.commit().await {
                    Ok(()) => {
                        if let Err(err) = self.notifier.table_updated(table_id).await {
                            warn!(
                                target: LOG_TARGET,
                                table_id = %table_id,
                                error = %err,
                                "table-update notification failed"
                            );
                        }
                        return Ok(value);
                    }
                    Err(err) => err,
                },
                Ok(Err(err)) => {
                    txn.rollback().await;
                    err
                }
            };

            if err.is_retryable() && attempt < self.config.max_attempts {
                warn!(
                    target: LOG_TARGET,
                    table_id = %table_id,
                    attempt,
                    "store conflict; retrying operation"
                );
                tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                continue;
            }
            return Err(err);
        }
    }

    pub async fn create_table(
        &self,
        caller: &Caller,
        params: CreateTableParams,
    ) -> Result<PokerTable, EngineError> {
        if caller.role != UserRole::Dealer {
            return Err(EngineError::Forbidden("only dealers can open tables"));
        }
        if params.name.trim().is_empty() {
            return Err(EngineError::validation("table name must not be empty"));
        }
        if !(2..=8).contains(&params.max_seats) {
            return Err(EngineError::validation("max seats must be between 2 and 8"));
        }
        if params.small_blind == 0 || params.big_blind <= params.small_blind {
            return Err(EngineError::validation(
                "big blind must exceed a nonzero small blind",
            ));
        }

        let mut txn = self.store.begin().await?;
        let result = async {
            if txn.as_mut().table_owned_by(caller.user_id).await?.is_some() {
                return Err(EngineError::Forbidden("dealer already owns a table"));
            }
            let table = PokerTable {
                id: Uuid::new_v4(),
                name: params.name.clone(),
                dealer_id: caller.user_id,
                small_blind: params.small_blind,
                big_blind: params.big_blind,
                max_seats: params.max_seats,
                blind_step_seconds: params.blind_step_seconds,
                blind_timer_started_at: params.blind_step_seconds.map(|_| Utc::now()),
            };
            txn.as_mut().insert_table(&table).await?;
            Ok(table)
        }
        .await;
        match result {
            Ok(table) => {
                txn.commit().await?;
                debug!(target: LOG_TARGET, table_id = %table.id, "table created");
                Ok(table)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn join(
        &self,
        caller: &Caller,
        table_id: TableId,
        buy_in: Chips,
    ) -> Result<TableView, EngineError> {
        if caller.role != UserRole::Player {
            return Err(EngineError::Forbidden("only players can take a seat"));
        }
        if buy_in == 0 {
            return Err(EngineError::validation("buy-in must be positive"));
        }
        let user_id = caller.user_id;
        self.execute(table_id, move |txn| {
            Box::pin(async move { join_in_txn(txn, user_id, table_id, buy_in).await })
        })
        .await
    }

    pub async fn leave(
        &self,
        caller: &Caller,
        table_id: TableId,
    ) -> Result<TableView, EngineError> {
        let user_id = caller.user_id;
        self.execute(table_id, move |txn| {
            Box::pin(async move { release_seat_in_txn(txn, table_id, user_id, user_id).await })
        })
        .await
    }

    /// Dealer kick: same effects as a voluntary leave.
    pub async fn remove_player(
        &self,
        caller: &Caller,
        table_id: TableId,
        player_id: UserId,
    ) -> Result<TableView, EngineError> {
        let dealer_id = caller.user_id;
        self.execute(table_id, move |txn| {
            Box::pin(async move {
                let table = require_table(txn, table_id).await?;
                if table.dealer_id != dealer_id {
                    return Err(EngineError::Forbidden("not the dealer of this table"));
                }
                release_seat_in_txn(txn, table_id, player_id, dealer_id).await
            })
        })
        .await
    }

    pub async fn action(
        &self,
        caller: &Caller,
        table_id: TableId,
        action: TableAction,
    ) -> Result<TableView, EngineError> {
        let kind = match action {
            TableAction::StartGame => ActionKind::Start,
            TableAction::DealCard { rank, suit } => {
                ActionKind::Deal(Card::parse(&format!("{rank}{suit}"))?)
            }
            TableAction::ResetTable => ActionKind::Reset,
            TableAction::Raise { amount } => ActionKind::Bet(BetAction::Raise { amount }),
            TableAction::Check => ActionKind::Bet(BetAction::Check),
            TableAction::Fold => ActionKind::Bet(BetAction::Fold),
        };
        let caller = *caller;
        self.execute(table_id, move |txn| {
            Box::pin(async move { action_in_txn(txn, &caller, table_id, kind).await })
        })
        .await
    }

    /// Dealing path for the hardware scanner: the device registry is the
    /// authorization, so no dealer role check applies.
    pub async fn deal_scanned(
        &self,
        table_id: TableId,
        card: Card,
    ) -> Result<TableView, EngineError> {
        self.execute(table_id, move |txn| {
            Box::pin(async move {
                let table = require_table(txn, table_id).await?;
                hand::deal_card(txn, &table, card, Utc::now()).await?;
                load_view(txn, None, table_id).await
            })
        })
        .await
    }

    /// Read-only consistent snapshot; does not take the mutation slot.
    pub async fn snapshot(
        &self,
        viewer: Option<UserId>,
        table_id: TableId,
    ) -> Result<TableView, EngineError> {
        let mut txn = self.store.begin().await?;
        let view = load_view(txn.as_mut(), viewer, table_id).await;
        txn.rollback().await;
        view
    }

    /// Events with `id > since` for the latest game plus table-level
    /// events, ascending.
    pub async fn events_delta(
        &self,
        table_id: TableId,
        since: EventId,
    ) -> Result<Vec<GameEventRecord>, EngineError> {
        let mut txn = self.store.begin().await?;
        let result = async {
            require_table(txn.as_mut(), table_id).await?;
            let game = txn.as_mut().latest_game(table_id).await?;
            txn.as_mut()
                .events_after(table_id, game.map(|g| g.id), since)
                .await
        }
        .await;
        txn.rollback().await;
        result
    }
}

async fn require_table(
    txn: &mut dyn StoreTxn,
    table_id: TableId,
) -> Result<PokerTable, EngineError> {
    txn.table(table_id)
        .await?
        .ok_or(EngineError::NotFound("table"))
}

async fn load_view(
    txn: &mut dyn StoreTxn,
    viewer: Option<UserId>,
    table_id: TableId,
) -> Result<TableView, EngineError> {
    let table = require_table(txn, table_id).await?;
    let seats = txn.seats_ordered(table_id).await?;
    let game = txn.latest_game(table_id).await?;
    Ok(redact(viewer, &table, &seats, game.as_ref()))
}

async fn join_in_txn(
    txn: &mut dyn StoreTxn,
    user_id: UserId,
    table_id: TableId,
    buy_in: Chips,
) -> Result<TableView, EngineError> {
    let table = require_table(txn, table_id).await?;
    if txn.active_game(table_id).await?.is_some() {
        return Err(EngineError::InvalidState("cannot join during a hand"));
    }
    if txn.seat_of_player(user_id).await?.is_some() {
        return Err(EngineError::Joined);
    }

    let mut user = txn.user(user_id).await?.ok_or(EngineError::NotFound("user"))?;
    if user.balance < buy_in {
        return Err(EngineError::InsufficientBalance);
    }

    let seats = txn.seats_ordered(table_id).await?;
    let seat_number = (0..table.max_seats)
        .find(|n| !seats.iter().any(|s| s.seat_number == *n))
        .ok_or(EngineError::TableFull)?;

    user.balance -= buy_in;
    txn.update_user(&user).await?;
    let seat = Seat::new(table_id, user_id, seat_number, buy_in);
    txn.insert_seat(&seat).await?;

    load_view(txn, Some(user_id), table_id).await
}

async fn release_seat_in_txn(
    txn: &mut dyn StoreTxn,
    table_id: TableId,
    player_id: UserId,
    viewer: UserId,
) -> Result<TableView, EngineError> {
    require_table(txn, table_id).await?;
    let seat = txn
        .seat_of_player(player_id)
        .await?
        .filter(|s| s.table_id == table_id)
        .ok_or(EngineError::NotFound("seat"))?;
    if txn.active_game(table_id).await?.is_some() {
        return Err(EngineError::InvalidState("cannot leave during a hand"));
    }

    let mut user = txn
        .user(player_id)
        .await?
        .ok_or(EngineError::NotFound("user"))?;
    user.balance += seat.buy_in;
    txn.update_user(&user).await?;
    txn.delete_seat(seat.id).await?;

    load_view(txn, Some(viewer), table_id).await
}

async fn action_in_txn(
    txn: &mut dyn StoreTxn,
    caller: &Caller,
    table_id: TableId,
    kind: ActionKind,
) -> Result<TableView, EngineError> {
    let table = require_table(txn, table_id).await?;
    match kind {
        ActionKind::Start | ActionKind::Deal(_) | ActionKind::Reset => {
            if caller.role != UserRole::Dealer || table.dealer_id != caller.user_id {
                return Err(EngineError::Forbidden("not the dealer of this table"));
            }
        }
        ActionKind::Bet(_) => {
            if caller.role != UserRole::Player {
                return Err(EngineError::Forbidden("only seated players can bet"));
            }
        }
    }

    match kind {
        ActionKind::Start => {
            hand::start_game(txn, &table, Utc::now()).await?;
        }
        ActionKind::Deal(card) => {
            hand::deal_card(txn, &table, card, Utc::now()).await?;
        }
        ActionKind::Reset => {
            hand::reset_table(txn, &table).await?;
        }
        ActionKind::Bet(action) => {
            let seat = txn
                .seat_of_player(caller.user_id)
                .await?
                .filter(|s| s.table_id == table_id)
                .ok_or(EngineError::NotFound("seat"))?;
            apply_bet_action(txn, &table, seat.id, action, Utc::now()).await?;
        }
    }

    load_view(txn, Some(caller.user_id), table_id).await
}
