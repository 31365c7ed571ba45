//! Hand state machine: DEAL_HOLE_CARDS → BETTING → DEAL_FLOP/TURN/RIVER
//! → SHOWDOWN, plus blinds, the dealer button, and operator reset.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info};

use crate::engine::cards::Card;
use crate::engine::errors::{ConservationReport, EngineError};
use crate::engine::eval::{solve, RankedHand};
use crate::engine::pot::{build_side_pots, distribute};
use crate::engine::rotation::{
    active_count, all_active_bets_equal, next_active, next_dealable, next_non_eliminated,
    non_eliminated_count,
};
use crate::engine::types::{
    Chips, Game, HandPhase, PokerTable, Seat, SeatId, SeatStatus,
};
use crate::events::{
    EndGameDetails, GameEventType, NewEvent, StartGameDetails, StreetDetails, WinnerEntry,
};
use crate::store::StoreTxn;

const LOG_TARGET: &str = "felt_poker::table::hand";

/// Starts a new hand: resets seats, advances the button, posts blinds,
/// and inserts the game in DEAL_HOLE_CARDS.
pub async fn start_game(
    txn: &mut dyn StoreTxn,
    table: &PokerTable,
    now: DateTime<Utc>,
) -> Result<Game, EngineError> {
    if txn.active_game(table.id).await?.is_some() {
        return Err(EngineError::InvalidState("a hand is already in progress"));
    }

    let multiplier = table.blind_multiplier(now);
    let effective_small_blind = table.small_blind * multiplier;
    let effective_big_blind = table.big_blind * multiplier;

    let mut seats = txn.seats_ordered(table.id).await?;
    let funded = seats
        .iter()
        .filter(|s| s.status != SeatStatus::Eliminated && s.buy_in >= effective_big_blind)
        .count();
    if funded < 2 {
        return Err(EngineError::InvalidState(
            "need at least two seats funded for the big blind",
        ));
    }

    for seat in seats.iter_mut() {
        seat.reset_for_hand();
        if seat.status != SeatStatus::Eliminated {
            seat.status = SeatStatus::Active;
        }
        // For eliminated seats both sides are zero, which keeps the
        // conservation ledger exact over the whole table.
        seat.starting_balance = seat.buy_in;
    }

    let previous_button = txn
        .latest_game(table.id)
        .await?
        .and_then(|g| g.dealer_button_seat_id)
        .filter(|id| seats.iter().any(|s| s.id == *id));
    let button = match previous_button {
        Some(prev) => next_non_eliminated(&seats, prev),
        None => {
            seats
                .iter()
                .find(|s| s.status != SeatStatus::Eliminated)
                .map(|s| s.id)
                .ok_or(EngineError::InvalidState("no seats left in play"))?
        }
    };

    // Heads-up: the button posts the small blind and acts first pre-flop.
    let heads_up = non_eliminated_count(&seats) == 2;
    let small_blind_seat = if heads_up {
        button
    } else {
        next_non_eliminated(&seats, button)
    };
    let big_blind_seat = next_non_eliminated(&seats, small_blind_seat);

    post_blind(&mut seats, small_blind_seat, effective_small_blind);
    post_blind(&mut seats, big_blind_seat, effective_big_blind);

    for seat in &seats {
        txn.update_seat(seat).await?;
    }

    let mut game = Game::new(table.id, effective_small_blind, effective_big_blind);
    game.dealer_button_seat_id = Some(button);
    game.assigned_seat_id = Some(next_dealable(&seats, button));
    txn.insert_game(&game).await?;

    txn.append_event(NewEvent::validated(
        table.id,
        Some(game.id),
        GameEventType::StartGame,
        json!(StartGameDetails {
            dealer_button_seat_id: button,
        }),
    )?)
    .await?;

    info!(
        target: LOG_TARGET,
        table_id = %table.id,
        game_id = %game.id,
        multiplier,
        "hand started"
    );
    Ok(game)
}

fn post_blind(seats: &mut [Seat], seat_id: SeatId, amount: Chips) {
    if let Some(seat) = seats.iter_mut().find(|s| s.id == seat_id) {
        let debit = amount.min(seat.buy_in);
        seat.buy_in -= debit;
        seat.current_bet += debit;
        if seat.buy_in == 0 {
            seat.status = SeatStatus::AllIn;
        }
    }
}

/// Applies one dealt card (dealer action or scan) to the active game.
pub async fn deal_card(
    txn: &mut dyn StoreTxn,
    table: &PokerTable,
    card: Card,
    now: DateTime<Utc>,
) -> Result<Game, EngineError> {
    let mut game = txn
        .active_game(table.id)
        .await?
        .ok_or(EngineError::NotFound("game"))?;
    let mut seats = txn.seats_ordered(table.id).await?;

    let already_dealt = game.community_cards.contains(&card)
        || seats.iter().any(|s| s.cards.contains(&card));
    if already_dealt {
        return Err(EngineError::DuplicateCard(card.code()));
    }

    match game.phase {
        HandPhase::DealHoleCards => {
            let assigned = game
                .assigned_seat_id
                .ok_or(EngineError::NotFound("seat"))?;
            let seat = seats
                .iter_mut()
                .find(|s| s.id == assigned)
                .ok_or(EngineError::NotFound("seat"))?;
            seat.cards.push(card);
            let seat_snapshot = seat.clone();
            txn.update_seat(&seat_snapshot).await?;

            let still_dealing = seats
                .iter()
                .filter(|s| s.is_dealable())
                .any(|s| s.cards.len() < 2);
            if still_dealing {
                game.assigned_seat_id = Some(next_dealable(&seats, assigned));
                txn.update_game(&game).await?;
            } else {
                let first = preflop_first_to_act(&seats, &game)?;
                enter_betting(txn, &mut game, &seats, first, now).await?;
                evaluate_round_close(txn, table, &mut game, now).await?;
            }
        }
        HandPhase::DealFlop | HandPhase::DealTurn | HandPhase::DealRiver => {
            game.community_cards.push(card);
            let threshold = match game.phase {
                HandPhase::DealFlop => 3,
                HandPhase::DealTurn => 4,
                _ => 5,
            };
            if game.community_cards.len() < threshold {
                txn.update_game(&game).await?;
            } else {
                let street_event = match game.phase {
                    HandPhase::DealFlop => GameEventType::Flop,
                    HandPhase::DealTurn => GameEventType::Turn,
                    _ => GameEventType::River,
                };
                txn.append_event(NewEvent::validated(
                    table.id,
                    Some(game.id),
                    street_event,
                    json!(StreetDetails {
                        community_all: game.community_cards.clone(),
                    }),
                )?)
                .await?;

                let button = game
                    .dealer_button_seat_id
                    .ok_or(EngineError::NotFound("seat"))?;
                let first = next_active(&seats, button);
                enter_betting(txn, &mut game, &seats, first, now).await?;
                evaluate_round_close(txn, table, &mut game, now).await?;
            }
        }
        HandPhase::Betting | HandPhase::Showdown => {
            return Err(EngineError::InvalidState("no card is expected right now"));
        }
    }

    Ok(game)
}

/// Pre-flop first-to-act: next active after the big blind, which in a
/// heads-up hand wraps around to the button (small blind).
fn preflop_first_to_act(seats: &[Seat], game: &Game) -> Result<SeatId, EngineError> {
    let button = game
        .dealer_button_seat_id
        .ok_or(EngineError::NotFound("seat"))?;
    let heads_up = non_eliminated_count(seats) == 2;
    let small_blind_seat = if heads_up {
        button
    } else {
        next_non_eliminated(seats, button)
    };
    let big_blind_seat = next_non_eliminated(seats, small_blind_seat);
    Ok(next_active(seats, big_blind_seat))
}

async fn enter_betting(
    txn: &mut dyn StoreTxn,
    game: &mut Game,
    seats: &[Seat],
    first_to_act: SeatId,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    game.phase = HandPhase::Betting;
    game.assigned_seat_id = Some(first_to_act);
    game.bet_count = 0;
    game.required_bet_count = active_count(seats) as u32;
    let first_is_active = seats
        .iter()
        .any(|s| s.id == first_to_act && s.status == SeatStatus::Active);
    game.turn_start_time = first_is_active.then_some(now);
    txn.update_game(game).await
}

/// Round-close predicate and transition, run after every betting action
/// and immediately after betting opens (all-in run-outs close at once).
pub async fn evaluate_round_close(
    txn: &mut dyn StoreTxn,
    table: &PokerTable,
    game: &mut Game,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    if game.phase != HandPhase::Betting {
        return Ok(());
    }
    let mut seats = txn.seats_ordered(table.id).await?;
    let actives = active_count(&seats);
    let all_equal = all_active_bets_equal(&seats);
    let closes = all_equal && (actives <= 1 || game.bet_count >= game.required_bet_count);
    if !closes {
        return Ok(());
    }

    // Merge the round's bets into the pot.
    let mut merged: Chips = 0;
    for seat in seats.iter_mut() {
        if seat.current_bet > 0 {
            merged += seat.current_bet;
            seat.current_bet = 0;
            txn.update_seat(seat).await?;
        }
    }
    game.pot_total += merged;
    game.bet_count = 0;
    game.required_bet_count = 0;

    let contenders = seats.iter().filter(|s| s.is_dealable()).count();
    if contenders <= 1 || game.community_cards.len() == 5 {
        run_showdown(txn, table, game, now).await
    } else {
        game.phase = match game.community_cards.len() {
            0 => HandPhase::DealFlop,
            3 => HandPhase::DealTurn,
            4 => HandPhase::DealRiver,
            _ => return Err(EngineError::InvalidState("community card count is corrupt")),
        };
        game.assigned_seat_id = None;
        game.turn_start_time = None;
        txn.update_game(game).await
    }
}

async fn run_showdown(
    txn: &mut dyn StoreTxn,
    table: &PokerTable,
    game: &mut Game,
    _now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let mut seats = txn.seats_ordered(table.id).await?;
    let contenders: Vec<SeatId> = seats
        .iter()
        .filter(|s| s.is_dealable())
        .map(|s| s.id)
        .collect();

    let mut hands: std::collections::HashMap<SeatId, RankedHand> = Default::default();
    if contenders.len() >= 2 {
        for seat in seats.iter().filter(|s| contenders.contains(&s.id)) {
            let mut cards = seat.cards.clone();
            cards.extend(game.community_cards.iter().copied());
            hands.insert(seat.id, solve(&cards)?);
        }
    }

    let pots = build_side_pots(&seats);
    let distribution = match distribute(pots, &hands, &seats, game.dealer_button_seat_id) {
        Ok(distribution) => distribution,
        Err(EngineError::Conservation(mut report)) => {
            report.table_id = Some(table.id);
            report.game_id = Some(game.id);
            report.events = json!(txn.events_for_game(game.id).await?);
            error!(target: LOG_TARGET, %report, "conservation failure while building pots");
            return Err(EngineError::Conservation(report));
        }
        Err(err) => return Err(err),
    };

    for seat in seats.iter_mut() {
        if contenders.contains(&seat.id) {
            if let Some(hand) = hands.get(&seat.id) {
                seat.hand_type = Some(hand.category.name().to_string());
                seat.hand_description = Some(hand.description.clone());
                seat.winning_cards = hand.best_five.clone();
            }
            let won = distribution.payouts.get(&seat.id).copied().unwrap_or(0);
            seat.win_amount = Some(won);
            seat.buy_in += won;
        }
        if seat.buy_in == 0 {
            seat.status = SeatStatus::Eliminated;
        }
        txn.update_seat(seat).await?;
    }

    // I1: the chips that entered the hand must all be back in stacks.
    let starting_total: Chips = seats.iter().map(|s| s.starting_balance).sum();
    let final_total: Chips = seats.iter().map(|s| s.buy_in).sum();
    if starting_total != final_total {
        let report = Box::new(ConservationReport {
            reason: "stack totals diverged at showdown".to_string(),
            table_id: Some(table.id),
            game_id: Some(game.id),
            starting_total,
            final_total,
            seats: json!(seats
                .iter()
                .map(|s| json!({
                    "seatId": s.id,
                    "seatNumber": s.seat_number,
                    "buyIn": s.buy_in,
                    "startingBalance": s.starting_balance,
                    "currentBet": s.current_bet,
                    "status": s.status,
                    "winAmount": s.win_amount,
                }))
                .collect::<Vec<_>>()),
            pots: json!(distribution.pots),
            events: json!(txn.events_for_game(game.id).await?),
        });
        error!(target: LOG_TARGET, %report, "conservation failure at showdown");
        return Err(EngineError::Conservation(report));
    }

    let mut winners: Vec<WinnerEntry> = Vec::new();
    let mut paid: Vec<(&Seat, Chips)> = seats
        .iter()
        .filter_map(|s| {
            distribution
                .payouts
                .get(&s.id)
                .map(|amount| (s, *amount))
        })
        .collect();
    paid.sort_by_key(|(s, _)| s.seat_number);
    for (seat, amount) in paid {
        winners.push(WinnerEntry {
            seat_id: seat.id,
            amount,
            hand_type: seat.hand_type.clone(),
            cards: (!seat.winning_cards.is_empty()).then(|| seat.winning_cards.clone()),
        });
    }

    game.side_pot_details = Some(json!(distribution.pots));
    game.phase = HandPhase::Showdown;
    game.is_completed = true;
    game.assigned_seat_id = None;
    game.turn_start_time = None;
    // pot_total stays as merged for inspection; the next hand clears it.
    txn.update_game(game).await?;

    txn.append_event(NewEvent::validated(
        table.id,
        Some(game.id),
        GameEventType::EndGame,
        json!(EndGameDetails { winners }),
    )?)
    .await?;

    info!(
        target: LOG_TARGET,
        table_id = %table.id,
        game_id = %game.id,
        pot_total = game.pot_total,
        "hand complete"
    );
    Ok(())
}

/// Operator recovery: completes the current game and hands every
/// non-eliminated seat its hand-start stack back.
pub async fn reset_table(
    txn: &mut dyn StoreTxn,
    table: &PokerTable,
) -> Result<Game, EngineError> {
    let mut game = txn
        .latest_game(table.id)
        .await?
        .ok_or(EngineError::NotFound("game"))?;

    let mut seats = txn.seats_ordered(table.id).await?;
    for seat in seats.iter_mut() {
        seat.reset_for_hand();
        if seat.status != SeatStatus::Eliminated {
            seat.buy_in = seat.starting_balance;
            seat.status = SeatStatus::Active;
        }
        txn.update_seat(seat).await?;
    }

    game.is_completed = true;
    game.phase = HandPhase::Showdown;
    game.assigned_seat_id = None;
    game.turn_start_time = None;
    txn.update_game(&game).await?;

    txn.append_event(NewEvent::validated(
        table.id,
        Some(game.id),
        GameEventType::EndGame,
        json!(EndGameDetails { winners: vec![] }),
    )?)
    .await?;

    info!(target: LOG_TARGET, table_id = %table.id, game_id = %game.id, "table reset");
    Ok(game)
}
