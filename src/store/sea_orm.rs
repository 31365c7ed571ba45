//! Postgres-backed store adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;

use crate::db::entity::sea_orm_active_enums as db_enums;
use crate::db::entity::{game_events, games, pi_devices, poker_tables, seats, users};
use crate::engine::cards::Card;
use crate::engine::errors::{classify_db_err, EngineError};
use crate::engine::types::{
    Chips, DeviceId, DeviceKind, EventId, Game, GameId, HandPhase, LastAction, PiDevice,
    PokerTable, Seat, SeatId, SeatStatus, TableId, User, UserId, UserRole,
};
use crate::events::{GameEventRecord, GameEventType, NewEvent};

use super::{StoreTxn, TableStore};

pub struct SeaOrmTableStore {
    connection: DatabaseConnection,
}

impl SeaOrmTableStore {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl TableStore for SeaOrmTableStore {
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, EngineError> {
        let txn = self.connection.begin().await.map_err(classify_db_err)?;
        Ok(Box::new(SeaOrmTxn { txn }))
    }
}

pub struct SeaOrmTxn {
    txn: DatabaseTransaction,
}

#[async_trait]
impl StoreTxn for SeaOrmTxn {
    async fn table(&mut self, id: TableId) -> Result<Option<PokerTable>, EngineError> {
        let model = poker_tables::Entity::find_by_id(id)
            .one(&self.txn)
            .await
            .map_err(classify_db_err)?;
        model.map(table_from_model).transpose()
    }

    async fn table_owned_by(&mut self, dealer: UserId) -> Result<Option<PokerTable>, EngineError> {
        let model = poker_tables::Entity::find()
            .filter(poker_tables::Column::DealerId.eq(dealer))
            .one(&self.txn)
            .await
            .map_err(classify_db_err)?;
        model.map(table_from_model).transpose()
    }

    async fn insert_table(&mut self, table: &PokerTable) -> Result<(), EngineError> {
        let active = poker_tables::ActiveModel {
            id: Set(table.id),
            name: Set(table.name.clone()),
            dealer_id: Set(table.dealer_id),
            small_blind: Set(chips_to_i64(table.small_blind)?),
            big_blind: Set(chips_to_i64(table.big_blind)?),
            max_seats: Set(i16::from(table.max_seats)),
            blind_step_seconds: Set(table.blind_step_seconds),
            blind_timer_started_at: Set(table.blind_timer_started_at),
            created_at: Set(Utc::now()),
        };
        active.insert(&self.txn).await.map_err(classify_db_err)?;
        Ok(())
    }

    async fn user(&mut self, id: UserId) -> Result<Option<User>, EngineError> {
        let model = users::Entity::find_by_id(id)
            .one(&self.txn)
            .await
            .map_err(classify_db_err)?;
        model.map(user_from_model).transpose()
    }

    async fn update_user(&mut self, user: &User) -> Result<(), EngineError> {
        let active = users::ActiveModel {
            id: Set(user.id),
            name: Set(user.name.clone()),
            role: Set(role_to_db(user.role)),
            balance: Set(chips_to_i64(user.balance)?),
            ..Default::default()
        };
        active.update(&self.txn).await.map_err(classify_db_err)?;
        Ok(())
    }

    async fn seats_ordered(&mut self, table: TableId) -> Result<Vec<Seat>, EngineError> {
        let models = seats::Entity::find()
            .filter(seats::Column::TableId.eq(table))
            .order_by_asc(seats::Column::SeatNumber)
            .all(&self.txn)
            .await
            .map_err(classify_db_err)?;
        models.into_iter().map(seat_from_model).collect()
    }

    async fn seat(&mut self, id: SeatId) -> Result<Option<Seat>, EngineError> {
        let model = seats::Entity::find_by_id(id)
            .one(&self.txn)
            .await
            .map_err(classify_db_err)?;
        model.map(seat_from_model).transpose()
    }

    async fn seat_of_player(&mut self, player: UserId) -> Result<Option<Seat>, EngineError> {
        let model = seats::Entity::find()
            .filter(seats::Column::PlayerId.eq(player))
            .one(&self.txn)
            .await
            .map_err(classify_db_err)?;
        model.map(seat_from_model).transpose()
    }

    async fn insert_seat(&mut self, seat: &Seat) -> Result<(), EngineError> {
        let mut active = seat_to_active(seat)?;
        active.created_at = Set(Utc::now());
        active.insert(&self.txn).await.map_err(classify_db_err)?;
        Ok(())
    }

    async fn update_seat(&mut self, seat: &Seat) -> Result<(), EngineError> {
        let active = seat_to_active(seat)?;
        active.update(&self.txn).await.map_err(classify_db_err)?;
        Ok(())
    }

    async fn delete_seat(&mut self, id: SeatId) -> Result<(), EngineError> {
        seats::Entity::delete_by_id(id)
            .exec(&self.txn)
            .await
            .map_err(classify_db_err)?;
        Ok(())
    }

    async fn active_game(&mut self, table: TableId) -> Result<Option<Game>, EngineError> {
        let model = games::Entity::find()
            .filter(games::Column::TableId.eq(table))
            .filter(games::Column::IsCompleted.eq(false))
            .one(&self.txn)
            .await
            .map_err(classify_db_err)?;
        model.map(game_from_model).transpose()
    }

    async fn latest_game(&mut self, table: TableId) -> Result<Option<Game>, EngineError> {
        let model = games::Entity::find()
            .filter(games::Column::TableId.eq(table))
            .order_by_desc(games::Column::CreatedAt)
            .one(&self.txn)
            .await
            .map_err(classify_db_err)?;
        model.map(game_from_model).transpose()
    }

    async fn insert_game(&mut self, game: &Game) -> Result<(), EngineError> {
        let mut active = game_to_active(game)?;
        active.created_at = Set(Utc::now());
        active.insert(&self.txn).await.map_err(classify_db_err)?;
        Ok(())
    }

    async fn update_game(&mut self, game: &Game) -> Result<(), EngineError> {
        let active = game_to_active(game)?;
        active.update(&self.txn).await.map_err(classify_db_err)?;
        Ok(())
    }

    async fn append_event(&mut self, event: NewEvent) -> Result<GameEventRecord, EngineError> {
        let active = game_events::ActiveModel {
            table_id: Set(event.table_id),
            game_id: Set(event.game_id),
            event_type: Set(event.ty.as_str().to_string()),
            details: Set(event.details.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let inserted = active.insert(&self.txn).await.map_err(classify_db_err)?;
        event_from_model(inserted)
    }

    async fn events_after(
        &mut self,
        table: TableId,
        game: Option<GameId>,
        since: EventId,
    ) -> Result<Vec<GameEventRecord>, EngineError> {
        let mut query = game_events::Entity::find()
            .filter(game_events::Column::TableId.eq(table))
            .filter(game_events::Column::Id.gt(since));
        query = match game {
            Some(game_id) => query.filter(
                Condition::any()
                    .add(game_events::Column::GameId.eq(game_id))
                    .add(game_events::Column::GameId.is_null()),
            ),
            None => query.filter(game_events::Column::GameId.is_null()),
        };
        let models = query
            .order_by_asc(game_events::Column::Id)
            .all(&self.txn)
            .await
            .map_err(classify_db_err)?;
        models.into_iter().map(event_from_model).collect()
    }

    async fn events_for_game(&mut self, game: GameId) -> Result<Vec<GameEventRecord>, EngineError> {
        let models = game_events::Entity::find()
            .filter(game_events::Column::GameId.eq(game))
            .order_by_asc(game_events::Column::Id)
            .all(&self.txn)
            .await
            .map_err(classify_db_err)?;
        models.into_iter().map(event_from_model).collect()
    }

    async fn device_by_serial(&mut self, serial: &str) -> Result<Option<PiDevice>, EngineError> {
        let model = pi_devices::Entity::find()
            .filter(pi_devices::Column::Serial.eq(serial))
            .one(&self.txn)
            .await
            .map_err(classify_db_err)?;
        Ok(model.map(device_from_model))
    }

    async fn touch_device(&mut self, id: DeviceId, at: DateTime<Utc>) -> Result<(), EngineError> {
        let active = pi_devices::ActiveModel {
            id: Set(id),
            last_seen_at: Set(Some(at)),
            ..Default::default()
        };
        active.update(&self.txn).await.map_err(classify_db_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), EngineError> {
        self.txn.commit().await.map_err(classify_db_err)
    }

    async fn rollback(self: Box<Self>) {
        let _ = self.txn.rollback().await;
    }
}

fn chips_to_i64(value: Chips) -> Result<i64, EngineError> {
    i64::try_from(value)
        .map_err(|_| EngineError::validation("chip count exceeds database range"))
}

fn i64_to_chips(value: i64) -> Result<Chips, EngineError> {
    Chips::try_from(value)
        .map_err(|_| EngineError::validation(format!("invalid chip amount: {value}")))
}

fn cards_to_json(cards: &[Card]) -> JsonValue {
    serde_json::to_value(cards).unwrap_or_else(|_| JsonValue::Array(Vec::new()))
}

fn cards_from_json(value: &JsonValue) -> Result<Vec<Card>, EngineError> {
    serde_json::from_value(value.clone())
        .map_err(|err| EngineError::validation(format!("corrupt card column: {err}")))
}

fn role_to_db(role: UserRole) -> db_enums::UserRole {
    match role {
        UserRole::Player => db_enums::UserRole::Player,
        UserRole::Dealer => db_enums::UserRole::Dealer,
    }
}

fn role_from_db(role: db_enums::UserRole) -> UserRole {
    match role {
        db_enums::UserRole::Player => UserRole::Player,
        db_enums::UserRole::Dealer => UserRole::Dealer,
    }
}

fn status_to_db(status: SeatStatus) -> db_enums::SeatStatus {
    match status {
        SeatStatus::Active => db_enums::SeatStatus::Active,
        SeatStatus::AllIn => db_enums::SeatStatus::AllIn,
        SeatStatus::Folded => db_enums::SeatStatus::Folded,
        SeatStatus::Eliminated => db_enums::SeatStatus::Eliminated,
    }
}

fn status_from_db(status: db_enums::SeatStatus) -> SeatStatus {
    match status {
        db_enums::SeatStatus::Active => SeatStatus::Active,
        db_enums::SeatStatus::AllIn => SeatStatus::AllIn,
        db_enums::SeatStatus::Folded => SeatStatus::Folded,
        db_enums::SeatStatus::Eliminated => SeatStatus::Eliminated,
    }
}

fn last_action_to_db(action: LastAction) -> db_enums::LastAction {
    match action {
        LastAction::Raise => db_enums::LastAction::Raise,
        LastAction::Call => db_enums::LastAction::Call,
        LastAction::Check => db_enums::LastAction::Check,
        LastAction::Fold => db_enums::LastAction::Fold,
    }
}

fn last_action_from_db(action: db_enums::LastAction) -> LastAction {
    match action {
        db_enums::LastAction::Raise => LastAction::Raise,
        db_enums::LastAction::Call => LastAction::Call,
        db_enums::LastAction::Check => LastAction::Check,
        db_enums::LastAction::Fold => LastAction::Fold,
    }
}

fn phase_to_db(phase: HandPhase) -> db_enums::GameState {
    match phase {
        HandPhase::DealHoleCards => db_enums::GameState::DealHoleCards,
        HandPhase::Betting => db_enums::GameState::Betting,
        HandPhase::DealFlop => db_enums::GameState::DealFlop,
        HandPhase::DealTurn => db_enums::GameState::DealTurn,
        HandPhase::DealRiver => db_enums::GameState::DealRiver,
        HandPhase::Showdown => db_enums::GameState::Showdown,
    }
}

fn phase_from_db(state: db_enums::GameState) -> HandPhase {
    match state {
        db_enums::GameState::DealHoleCards => HandPhase::DealHoleCards,
        db_enums::GameState::Betting => HandPhase::Betting,
        db_enums::GameState::DealFlop => HandPhase::DealFlop,
        db_enums::GameState::DealTurn => HandPhase::DealTurn,
        db_enums::GameState::DealRiver => HandPhase::DealRiver,
        db_enums::GameState::Showdown => HandPhase::Showdown,
    }
}

fn table_from_model(model: poker_tables::Model) -> Result<PokerTable, EngineError> {
    Ok(PokerTable {
        id: model.id,
        name: model.name,
        dealer_id: model.dealer_id,
        small_blind: i64_to_chips(model.small_blind)?,
        big_blind: i64_to_chips(model.big_blind)?,
        max_seats: u8::try_from(model.max_seats)
            .map_err(|_| EngineError::validation("max_seats out of range"))?,
        blind_step_seconds: model.blind_step_seconds,
        blind_timer_started_at: model.blind_timer_started_at,
    })
}

fn user_from_model(model: users::Model) -> Result<User, EngineError> {
    Ok(User {
        id: model.id,
        name: model.name,
        role: role_from_db(model.role),
        balance: i64_to_chips(model.balance)?,
    })
}

fn seat_from_model(model: seats::Model) -> Result<Seat, EngineError> {
    Ok(Seat {
        id: model.id,
        table_id: model.table_id,
        player_id: model.player_id,
        seat_number: u8::try_from(model.seat_number)
            .map_err(|_| EngineError::validation("seat_number out of range"))?,
        buy_in: i64_to_chips(model.buy_in)?,
        starting_balance: i64_to_chips(model.starting_balance)?,
        current_bet: i64_to_chips(model.current_bet)?,
        cards: cards_from_json(&model.cards)?,
        status: status_from_db(model.seat_status),
        last_action: model.last_action.map(last_action_from_db),
        hand_type: model.hand_type,
        hand_description: model.hand_description,
        win_amount: model.win_amount.map(i64_to_chips).transpose()?,
        winning_cards: cards_from_json(&model.winning_cards)?,
        card_nonces: model.card_nonces,
    })
}

fn seat_to_active(seat: &Seat) -> Result<seats::ActiveModel, EngineError> {
    Ok(seats::ActiveModel {
        id: Set(seat.id),
        table_id: Set(seat.table_id),
        player_id: Set(seat.player_id),
        seat_number: Set(i16::from(seat.seat_number)),
        buy_in: Set(chips_to_i64(seat.buy_in)?),
        starting_balance: Set(chips_to_i64(seat.starting_balance)?),
        current_bet: Set(chips_to_i64(seat.current_bet)?),
        cards: Set(cards_to_json(&seat.cards)),
        seat_status: Set(status_to_db(seat.status)),
        last_action: Set(seat.last_action.map(last_action_to_db)),
        hand_type: Set(seat.hand_type.clone()),
        hand_description: Set(seat.hand_description.clone()),
        win_amount: Set(seat.win_amount.map(chips_to_i64).transpose()?),
        winning_cards: Set(cards_to_json(&seat.winning_cards)),
        card_nonces: Set(seat.card_nonces.clone()),
        ..Default::default()
    })
}

fn game_from_model(model: games::Model) -> Result<Game, EngineError> {
    Ok(Game {
        id: model.id,
        table_id: model.table_id,
        phase: phase_from_db(model.state),
        is_completed: model.is_completed,
        dealer_button_seat_id: model.dealer_button_seat_id,
        assigned_seat_id: model.assigned_seat_id,
        community_cards: cards_from_json(&model.community_cards)?,
        pot_total: i64_to_chips(model.pot_total)?,
        bet_count: u32::try_from(model.bet_count)
            .map_err(|_| EngineError::validation("bet_count out of range"))?,
        required_bet_count: u32::try_from(model.required_bet_count)
            .map_err(|_| EngineError::validation("required_bet_count out of range"))?,
        effective_small_blind: i64_to_chips(model.effective_small_blind)?,
        effective_big_blind: i64_to_chips(model.effective_big_blind)?,
        turn_start_time: model.turn_start_time,
        side_pot_details: model.side_pot_details,
    })
}

fn game_to_active(game: &Game) -> Result<games::ActiveModel, EngineError> {
    Ok(games::ActiveModel {
        id: Set(game.id),
        table_id: Set(game.table_id),
        state: Set(phase_to_db(game.phase)),
        is_completed: Set(game.is_completed),
        dealer_button_seat_id: Set(game.dealer_button_seat_id),
        assigned_seat_id: Set(game.assigned_seat_id),
        community_cards: Set(cards_to_json(&game.community_cards)),
        pot_total: Set(chips_to_i64(game.pot_total)?),
        bet_count: Set(i32::try_from(game.bet_count)
            .map_err(|_| EngineError::validation("bet_count out of range"))?),
        required_bet_count: Set(i32::try_from(game.required_bet_count)
            .map_err(|_| EngineError::validation("required_bet_count out of range"))?),
        effective_small_blind: Set(chips_to_i64(game.effective_small_blind)?),
        effective_big_blind: Set(chips_to_i64(game.effective_big_blind)?),
        turn_start_time: Set(game.turn_start_time),
        side_pot_details: Set(game.side_pot_details.clone()),
        ..Default::default()
    })
}

fn event_from_model(model: game_events::Model) -> Result<GameEventRecord, EngineError> {
    Ok(GameEventRecord {
        id: model.id,
        table_id: model.table_id,
        game_id: model.game_id,
        ty: GameEventType::parse(&model.event_type)?,
        details: model.details,
        created_at: model.created_at,
    })
}

fn device_from_model(model: pi_devices::Model) -> PiDevice {
    PiDevice {
        id: model.id,
        serial: model.serial,
        kind: match model.kind {
            db_enums::DeviceKind::Scanner => DeviceKind::Scanner,
            db_enums::DeviceKind::Display => DeviceKind::Display,
        },
        table_id: model.table_id,
        last_seen_at: model.last_seen_at,
    }
}
