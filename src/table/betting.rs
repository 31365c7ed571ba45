//! Betting executor: validates and applies a player's RAISE, CHECK (or
//! promoted CALL), and FOLD, then advances the turn and runs the
//! round-close evaluator. All chip arithmetic uses values re-read inside
//! the transaction, never the caller's view of the table.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use crate::engine::errors::EngineError;
use crate::engine::rotation::{max_non_folded_bet, next_active};
use crate::engine::types::{
    Chips, Game, HandPhase, LastAction, PokerTable, SeatId, SeatStatus,
};
use crate::events::{BetDetails, FoldDetails, GameEventType, NewEvent};
use crate::store::StoreTxn;

use super::hand;

const LOG_TARGET: &str = "felt_poker::table::betting";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BetAction {
    /// `amount` is the strict new round total, which must exceed the
    /// current highest bet.
    Raise { amount: Chips },
    /// Performs a call when a bet is owed.
    Check,
    Fold,
}

pub async fn apply_bet_action(
    txn: &mut dyn StoreTxn,
    table: &PokerTable,
    actor_seat_id: SeatId,
    action: BetAction,
    now: DateTime<Utc>,
) -> Result<Game, EngineError> {
    let mut game = txn
        .active_game(table.id)
        .await?
        .ok_or(EngineError::NotFound("game"))?;
    if game.phase != HandPhase::Betting {
        return Err(EngineError::InvalidState("betting is not open"));
    }
    if game.assigned_seat_id != Some(actor_seat_id) {
        return Err(EngineError::WrongTurn);
    }

    let mut seats = txn.seats_ordered(table.id).await?;
    let actor_index = seats
        .iter()
        .position(|s| s.id == actor_seat_id)
        .ok_or(EngineError::NotFound("seat"))?;
    if seats[actor_index].status != SeatStatus::Active {
        return Err(EngineError::InvalidState("seat cannot act"));
    }

    let max_bet = max_non_folded_bet(&seats);
    let event;
    {
        let actor = &mut seats[actor_index];
        match action {
            BetAction::Raise { amount } => {
                if amount == 0 || amount <= max_bet {
                    return Err(EngineError::InvalidRaise);
                }
                // Desired debit is capped at the stack: short raises
                // simply put the seat all-in.
                let debit = (amount - actor.current_bet).min(actor.buy_in);
                actor.buy_in -= debit;
                actor.current_bet += debit;
                actor.last_action = Some(LastAction::Raise);
                if actor.buy_in == 0 {
                    actor.status = SeatStatus::AllIn;
                }
                event = NewEvent::validated(
                    table.id,
                    Some(game.id),
                    GameEventType::Raise,
                    json!(BetDetails {
                        seat_id: actor.id,
                        total: actor.current_bet,
                    }),
                )?;
            }
            BetAction::Check => {
                if max_bet > actor.current_bet {
                    // A check facing a bet is promoted to a call.
                    let debit = (max_bet - actor.current_bet).min(actor.buy_in);
                    actor.buy_in -= debit;
                    actor.current_bet += debit;
                    actor.last_action = Some(LastAction::Call);
                    if actor.buy_in == 0 {
                        actor.status = SeatStatus::AllIn;
                    }
                    event = NewEvent::validated(
                        table.id,
                        Some(game.id),
                        GameEventType::Call,
                        json!(BetDetails {
                            seat_id: actor.id,
                            total: actor.current_bet,
                        }),
                    )?;
                } else {
                    actor.last_action = Some(LastAction::Check);
                    event = NewEvent::validated(
                        table.id,
                        Some(game.id),
                        GameEventType::Check,
                        json!(BetDetails {
                            seat_id: actor.id,
                            total: actor.current_bet,
                        }),
                    )?;
                }
            }
            BetAction::Fold => {
                actor.status = SeatStatus::Folded;
                actor.last_action = Some(LastAction::Fold);
                event = NewEvent::validated(
                    table.id,
                    Some(game.id),
                    GameEventType::Fold,
                    json!(FoldDetails { seat_id: actor.id }),
                )?;
            }
        }
    }
    txn.update_seat(&seats[actor_index]).await?;
    txn.append_event(event).await?;

    let next = next_active(&seats, actor_seat_id);
    let next_is_active = seats
        .iter()
        .any(|s| s.id == next && s.status == SeatStatus::Active);
    game.assigned_seat_id = Some(next);
    game.bet_count += 1;
    game.turn_start_time = next_is_active.then_some(now);
    txn.update_game(&game).await?;

    debug!(
        target: LOG_TARGET,
        table_id = %table.id,
        seat_id = %actor_seat_id,
        ?action,
        bet_count = game.bet_count,
        "bet action applied"
    );

    hand::evaluate_round_close(txn, table, &mut game, now).await?;
    Ok(game)
}
