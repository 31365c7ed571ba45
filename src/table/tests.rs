#![cfg(test)]

//! End-to-end hand scenarios over the in-memory store: full hands from
//! START_GAME through showdown, driven through the coordinator exactly
//! like the HTTP layer drives it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::types::{
    Chips, DeviceKind, Game, HandPhase, PiDevice, Seat, SeatStatus, TableId, User, UserRole,
};
use crate::events::GameEventType;
use crate::notify::NoopNotifier;
use crate::scanner::{ScanDelivery, ScanIngester, ScanMessage};
use crate::store::{InMemoryTableStore, TableStore};

use super::coordinator::{
    Caller, CoordinatorConfig, CreateTableParams, TableAction, TableCoordinator,
};
use super::snapshot::TableView;

struct Harness {
    store: Arc<InMemoryTableStore>,
    coordinator: Arc<TableCoordinator>,
    dealer: Caller,
    players: Vec<Caller>,
    table_id: TableId,
}

/// Seats one player per entry of `buy_ins`, in seat order, at a 5/10
/// table. Player `i` holds seat number `i`.
async fn harness(buy_ins: &[Chips]) -> Harness {
    let store = Arc::new(InMemoryTableStore::new());
    let coordinator = Arc::new(TableCoordinator::new(
        store.clone() as Arc<dyn TableStore>,
        Arc::new(NoopNotifier),
        CoordinatorConfig::default(),
    ));

    let dealer_id = Uuid::new_v4();
    store.seed_user(User {
        id: dealer_id,
        name: "dealer".into(),
        role: UserRole::Dealer,
        balance: 0,
    });
    let dealer = Caller {
        user_id: dealer_id,
        role: UserRole::Dealer,
    };
    let table = coordinator
        .create_table(
            &dealer,
            CreateTableParams {
                name: "table-1".into(),
                small_blind: 5,
                big_blind: 10,
                max_seats: 8,
                blind_step_seconds: None,
            },
        )
        .await
        .unwrap();

    let mut players = Vec::new();
    for (i, buy_in) in buy_ins.iter().enumerate() {
        let user_id = Uuid::new_v4();
        store.seed_user(User {
            id: user_id,
            name: format!("p{i}"),
            role: UserRole::Player,
            balance: *buy_in,
        });
        let caller = Caller {
            user_id,
            role: UserRole::Player,
        };
        coordinator.join(&caller, table.id, *buy_in).await.unwrap();
        players.push(caller);
    }

    Harness {
        store,
        coordinator,
        dealer,
        players,
        table_id: table.id,
    }
}

impl Harness {
    async fn start(&self) {
        self.coordinator
            .action(&self.dealer, self.table_id, TableAction::StartGame)
            .await
            .unwrap();
    }

    async fn deal(&self, code: &str) -> TableView {
        let (rank, suit) = code.split_at(code.len() - 1);
        self.coordinator
            .action(
                &self.dealer,
                self.table_id,
                TableAction::DealCard {
                    rank: rank.to_string(),
                    suit: suit.to_string(),
                },
            )
            .await
            .unwrap()
    }

    async fn deal_many(&self, codes: &[&str]) {
        for code in codes {
            self.deal(code).await;
        }
    }

    async fn check(&self, player: usize) {
        self.coordinator
            .action(&self.players[player], self.table_id, TableAction::Check)
            .await
            .unwrap();
    }

    async fn raise(&self, player: usize, amount: Chips) {
        self.coordinator
            .action(
                &self.players[player],
                self.table_id,
                TableAction::Raise { amount },
            )
            .await
            .unwrap();
    }

    async fn fold(&self, player: usize) {
        self.coordinator
            .action(&self.players[player], self.table_id, TableAction::Fold)
            .await
            .unwrap();
    }

    async fn raw_seats(&self) -> Vec<Seat> {
        let mut txn = self.store.begin().await.unwrap();
        let seats = txn.seats_ordered(self.table_id).await.unwrap();
        txn.rollback().await;
        seats
    }

    async fn raw_game(&self) -> Game {
        let mut txn = self.store.begin().await.unwrap();
        let game = txn.latest_game(self.table_id).await.unwrap().unwrap();
        txn.rollback().await;
        game
    }

    fn event_types(&self) -> Vec<GameEventType> {
        self.store.all_events().iter().map(|e| e.ty).collect()
    }
}

fn stack_sum(seats: &[Seat]) -> Chips {
    seats.iter().map(|s| s.buy_in).sum()
}

#[tokio::test]
async fn heads_up_check_down_splits_the_board() {
    let h = harness(&[200, 200]).await;
    h.start().await;

    // First hand: button is seat 0, which heads-up also posts the small
    // blind; seat 1 posts the big blind and receives the first card.
    let seats = h.raw_seats().await;
    assert_eq!(seats[0].current_bet, 5);
    assert_eq!(seats[1].current_bet, 10);

    h.deal_many(&["As", "Ks", "Qs", "Js"]).await;
    let game = h.raw_game().await;
    assert_eq!(game.phase, HandPhase::Betting);
    // Pre-flop heads-up: the button acts first.
    let seats = h.raw_seats().await;
    assert_eq!(game.assigned_seat_id, Some(seats[0].id));

    // The button's check is promoted to a call of the big blind.
    h.check(0).await;
    let seats = h.raw_seats().await;
    assert_eq!(seats[0].current_bet, 10);
    h.check(1).await;

    let game = h.raw_game().await;
    assert_eq!(game.phase, HandPhase::DealFlop);
    assert_eq!(game.pot_total, 20);

    h.deal_many(&["2h", "3h", "4h"]).await;
    // Post-flop the non-button player acts first.
    let game = h.raw_game().await;
    let seats = h.raw_seats().await;
    assert_eq!(game.assigned_seat_id, Some(seats[1].id));
    h.check(1).await;
    h.check(0).await;

    h.deal("5h").await;
    h.check(1).await;
    h.check(0).await;

    h.deal("6h").await;
    h.check(1).await;
    h.check(0).await;

    let game = h.raw_game().await;
    assert_eq!(game.phase, HandPhase::Showdown);
    assert!(game.is_completed);
    // Both players play the board's straight flush and split the pot.
    let seats = h.raw_seats().await;
    assert_eq!(stack_sum(&seats), 400);
    assert_eq!(seats[0].buy_in, 200);
    assert_eq!(seats[1].buy_in, 200);
    for seat in &seats {
        assert_eq!(seat.hand_type.as_deref(), Some("Straight Flush"));
        assert_eq!(seat.win_amount, Some(10));
    }

    // Exactly one event per committed action, in commit order.
    use GameEventType::*;
    assert_eq!(
        h.event_types(),
        vec![
            StartGame, Call, Check, Flop, Check, Check, Turn, Check, Check, River, Check, Check,
            EndGame
        ]
    );
}

#[tokio::test]
async fn raise_call_fold_closes_preflop_into_the_flop() {
    let h = harness(&[300, 300, 300]).await;
    h.start().await;
    // Button seat 0; blinds on seats 1 and 2; seat 0 acts first.
    h.deal_many(&["2c", "3c", "4c", "5c", "6c", "7c"]).await;

    h.raise(0, 50).await;
    // Player 1's check is promoted to a call of 50.
    h.check(1).await;
    h.fold(2).await;

    let game = h.raw_game().await;
    assert_eq!(game.phase, HandPhase::DealFlop);
    // 50 + 50 merged with the small blind completion and the dead big
    // blind: 50 + (5→50) + 10.
    assert_eq!(game.pot_total, 110);

    let seats = h.raw_seats().await;
    assert_eq!(seats[2].status, SeatStatus::Folded);
    assert!(seats.iter().all(|s| s.current_bet == 0));
}

#[tokio::test]
async fn wrong_turn_is_rejected_without_side_effects() {
    let h = harness(&[300, 300, 300]).await;
    h.start().await;
    h.deal_many(&["2c", "3c", "4c", "5c", "6c", "7c"]).await;

    let game_before = h.raw_game().await;
    let seats_before = h.raw_seats().await;
    let events_before = h.event_types().len();

    // Seat 0 is first to act; seat 1 jumps the queue.
    let err = h
        .coordinator
        .action(&h.players[1], h.table_id, TableAction::Check)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "WrongTurn");

    assert_eq!(h.raw_game().await, game_before);
    assert_eq!(h.raw_seats().await, seats_before);
    assert_eq!(h.event_types().len(), events_before);
}

#[tokio::test]
async fn invalid_raise_must_strictly_exceed_the_max_bet() {
    let h = harness(&[300, 300, 300]).await;
    h.start().await;
    h.deal_many(&["2c", "3c", "4c", "5c", "6c", "7c"]).await;

    for bad in [0, 5, 10] {
        let err = h
            .coordinator
            .action(
                &h.players[0],
                h.table_id,
                TableAction::Raise { amount: bad },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidRaise", "amount {bad}");
    }
    h.raise(0, 11).await;
}

#[tokio::test]
async fn single_all_in_builds_a_main_and_a_side_pot() {
    // P1 short with 50; P2 and P3 deep.
    let h = harness(&[50, 300, 300]).await;
    h.start().await;
    // Deal order starts left of the button: P2, P3, P1.
    h.deal_many(&["Ks", "Kc", "As", "Kd", "Kh", "Ad"]).await;

    h.raise(0, 50).await; // P1 all-in
    h.raise(1, 100).await;
    h.check(2).await; // promoted call to 100

    let seats = h.raw_seats().await;
    assert_eq!(seats[0].status, SeatStatus::AllIn);
    let game = h.raw_game().await;
    assert_eq!(game.phase, HandPhase::DealFlop);
    assert_eq!(game.pot_total, 250);

    h.deal_many(&["2h", "3h", "7c"]).await;
    h.check(1).await;
    h.check(2).await;
    h.deal("8c").await;
    h.check(1).await;
    h.check(2).await;
    h.deal("Jd").await;
    h.check(1).await;
    h.check(2).await;

    let game = h.raw_game().await;
    assert_eq!(game.phase, HandPhase::Showdown);
    let pots: Vec<crate::engine::pot::SidePot> =
        serde_json::from_value(game.side_pot_details.clone().unwrap()).unwrap();
    assert_eq!(pots.len(), 2);
    assert_eq!(pots[0].amount, 150);
    assert_eq!(pots[0].eligible.len(), 3);
    assert_eq!(pots[1].amount, 100);
    assert_eq!(pots[1].eligible.len(), 2);

    // P1's aces take the main pot; the kings split the side pot.
    let seats = h.raw_seats().await;
    assert_eq!(seats[0].buy_in, 150);
    assert_eq!(seats[0].win_amount, Some(150));
    assert_eq!(seats[1].buy_in, 250);
    assert_eq!(seats[2].buy_in, 250);
    assert_eq!(stack_sum(&seats), 650);
}

#[tokio::test]
async fn three_way_all_in_layers_pots_and_eliminates_busted_stacks() {
    let h = harness(&[50, 150, 300]).await;
    h.start().await;
    // Deal order is P2, P3, P1: the deep stack P3 gets the aces.
    h.deal_many(&["Ks", "As", "Qs", "Kd", "Ad", "Qd"]).await;

    h.raise(0, 50).await;
    h.raise(1, 150).await;
    h.raise(2, 300).await;

    // Everyone is all-in: every remaining street closes on its own and
    // the dealer just runs the board out.
    let game = h.raw_game().await;
    assert_eq!(game.phase, HandPhase::DealFlop);
    assert_eq!(game.pot_total, 500);
    h.deal_many(&["2h", "3h", "7c", "8c", "Jd"]).await;

    let game = h.raw_game().await;
    assert_eq!(game.phase, HandPhase::Showdown);
    let pots: Vec<crate::engine::pot::SidePot> =
        serde_json::from_value(game.side_pot_details.clone().unwrap()).unwrap();
    let amounts: Vec<Chips> = pots.iter().map(|p| p.amount).collect();
    assert_eq!(amounts, vec![150, 200, 150]);

    let seats = h.raw_seats().await;
    assert_eq!(seats[2].buy_in, 500);
    assert_eq!(seats[0].status, SeatStatus::Eliminated);
    assert_eq!(seats[1].status, SeatStatus::Eliminated);
    assert_eq!(stack_sum(&seats), 500);

    // The busted contenders showed down; elimination must not hide
    // their hole cards in the showdown view.
    let view = h.coordinator.snapshot(None, h.table_id).await.unwrap();
    assert_eq!(view.seats[0].cards, vec!["Qs", "Qd"]);
    assert_eq!(view.seats[1].cards, vec!["Ks", "Kd"]);
    assert_eq!(view.seats[2].cards, vec!["As", "Ad"]);
}

#[tokio::test]
async fn preflop_fold_leaves_a_single_contested_pot() {
    // Equal deep stacks behind the short button: the short stack folds
    // without contributing, so no side pot ever forms.
    let h = harness(&[50, 300, 300]).await;
    h.start().await;
    h.deal_many(&["As", "Ks", "2c", "Ah", "Kh", "7d"]).await;

    h.fold(0).await;
    h.raise(1, 100).await;
    h.check(2).await;

    h.deal_many(&["2h", "3h", "7c"]).await;
    h.check(1).await;
    h.check(2).await;
    h.deal("8c").await;
    h.check(1).await;
    h.check(2).await;
    h.deal("Jd").await;
    h.check(1).await;
    h.check(2).await;

    let game = h.raw_game().await;
    assert_eq!(game.phase, HandPhase::Showdown);
    let pots: Vec<crate::engine::pot::SidePot> =
        serde_json::from_value(game.side_pot_details.clone().unwrap()).unwrap();
    assert_eq!(pots.len(), 1, "fold must not create a side pot");
    assert_eq!(pots[0].amount, 200);
    assert_eq!(pots[0].eligible.len(), 2);

    let seats = h.raw_seats().await;
    assert_eq!(seats[0].buy_in, 50);
    assert_eq!(seats[1].buy_in, 400, "aces take the whole pot");
    assert_eq!(seats[2].buy_in, 200);
    assert_eq!(stack_sum(&seats), 650);
}

#[tokio::test]
async fn duplicate_card_from_the_dealer_is_rejected_without_side_effects() {
    let h = harness(&[200, 200]).await;
    h.start().await;
    h.deal("As").await;

    let seats_before = h.raw_seats().await;
    let err = h
        .coordinator
        .action(
            &h.dealer,
            h.table_id,
            TableAction::DealCard {
                rank: "A".into(),
                suit: "s".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "DuplicateCard");
    assert_eq!(h.raw_seats().await, seats_before);
}

#[tokio::test]
async fn button_rotates_and_pot_resets_on_the_next_hand() {
    let h = harness(&[200, 200]).await;
    h.start().await;
    h.deal_many(&["As", "Ks", "Qs", "Js"]).await;
    h.check(0).await;
    h.check(1).await;
    h.deal_many(&["2h", "3h", "4h"]).await;
    h.check(1).await;
    h.check(0).await;
    h.deal("5h").await;
    h.check(1).await;
    h.check(0).await;
    h.deal("6h").await;
    h.check(1).await;
    h.check(0).await;
    let finished = h.raw_game().await;
    assert!(finished.is_completed);
    assert_eq!(finished.pot_total, 20, "pot is left for inspection");

    h.start().await;
    let game = h.raw_game().await;
    let seats = h.raw_seats().await;
    assert_eq!(game.pot_total, 0);
    assert_eq!(game.dealer_button_seat_id, Some(seats[1].id));
    // New button (seat 1) posts the small blind heads-up.
    assert_eq!(seats[1].current_bet, 5);
    assert_eq!(seats[0].current_bet, 10);
}

#[tokio::test]
async fn reset_table_restores_hand_start_stacks() {
    let h = harness(&[300, 300, 300]).await;
    h.start().await;
    h.deal_many(&["2c", "3c", "4c", "5c", "6c", "7c"]).await;
    h.raise(0, 80).await;

    h.coordinator
        .action(&h.dealer, h.table_id, TableAction::ResetTable)
        .await
        .unwrap();

    let game = h.raw_game().await;
    assert!(game.is_completed);
    let seats = h.raw_seats().await;
    for seat in &seats {
        assert_eq!(seat.buy_in, 300);
        assert_eq!(seat.current_bet, 0);
        assert!(seat.cards.is_empty());
        assert_eq!(seat.status, SeatStatus::Active);
    }
    assert_eq!(h.event_types().last(), Some(&GameEventType::EndGame));
}

#[tokio::test]
async fn join_and_leave_move_chips_between_balance_and_stack() {
    let h = harness(&[200]).await;
    let player = h.players[0];
    assert_eq!(h.store.user_balance(player.user_id), Some(0));

    // Seated players cannot join twice.
    let err = h
        .coordinator
        .join(&player, h.table_id, 50)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Joined");

    let view = h.coordinator.leave(&player, h.table_id).await.unwrap();
    assert!(view.seats.is_empty());
    assert_eq!(h.store.user_balance(player.user_id), Some(200));
}

#[tokio::test]
async fn join_is_rejected_mid_hand_and_on_short_balance() {
    let h = harness(&[200, 200]).await;

    let poor_id = Uuid::new_v4();
    h.store.seed_user(User {
        id: poor_id,
        name: "poor".into(),
        role: UserRole::Player,
        balance: 10,
    });
    let poor = Caller {
        user_id: poor_id,
        role: UserRole::Player,
    };
    let err = h.coordinator.join(&poor, h.table_id, 50).await.unwrap_err();
    assert_eq!(err.kind(), "InsufficientBalance");

    h.start().await;
    let rich_id = Uuid::new_v4();
    h.store.seed_user(User {
        id: rich_id,
        name: "rich".into(),
        role: UserRole::Player,
        balance: 500,
    });
    let rich = Caller {
        user_id: rich_id,
        role: UserRole::Player,
    };
    let err = h.coordinator.join(&rich, h.table_id, 100).await.unwrap_err();
    assert_eq!(err.kind(), "InvalidState");
}

#[tokio::test]
async fn only_the_owning_dealer_may_run_the_table() {
    let h = harness(&[200, 200]).await;

    let err = h
        .coordinator
        .action(&h.players[0], h.table_id, TableAction::StartGame)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Forbidden");

    let other_dealer_id = Uuid::new_v4();
    h.store.seed_user(User {
        id: other_dealer_id,
        name: "other".into(),
        role: UserRole::Dealer,
        balance: 0,
    });
    let other_dealer = Caller {
        user_id: other_dealer_id,
        role: UserRole::Dealer,
    };
    let err = h
        .coordinator
        .action(&other_dealer, h.table_id, TableAction::StartGame)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Forbidden");

    let err = h
        .coordinator
        .remove_player(&h.players[0], h.table_id, h.players[1].user_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Forbidden");
}

#[tokio::test]
async fn events_delta_returns_only_newer_events() {
    let h = harness(&[200, 200]).await;
    h.start().await;
    h.deal_many(&["As", "Ks", "Qs", "Js"]).await;

    let all = h.coordinator.events_delta(h.table_id, 0).await.unwrap();
    assert!(!all.is_empty());
    let cutoff = all[all.len() - 1].id;

    h.check(0).await;
    let delta = h.coordinator.events_delta(h.table_id, cutoff).await.unwrap();
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].ty, GameEventType::Call);
    assert!(delta[0].id > cutoff);
}

const SCANNER_SERIAL: &str = "pi-scan-07";

async fn scan_harness(h: &Harness) -> (mpsc::Sender<ScanDelivery>, CancellationToken) {
    h.store.seed_device(PiDevice {
        id: Uuid::new_v4(),
        serial: SCANNER_SERIAL.into(),
        kind: DeviceKind::Scanner,
        table_id: h.table_id,
        last_seen_at: None,
    });
    let shutdown = CancellationToken::new();
    let ingester = Arc::new(ScanIngester::new(
        Arc::clone(&h.coordinator),
        h.store.clone() as Arc<dyn TableStore>,
        shutdown.clone(),
    ));
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(Arc::clone(&ingester).run(rx));
    (tx, shutdown)
}

async fn send_scan(tx: &mpsc::Sender<ScanDelivery>, serial: &str, barcode: &str) {
    let (delivery, acked) = ScanDelivery::new(ScanMessage {
        serial: serial.into(),
        barcode: barcode.into(),
        enqueued_at: Utc::now(),
    });
    tx.send(delivery).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), acked)
        .await
        .expect("scan must be acknowledged")
        .unwrap();
}

#[tokio::test]
async fn scan_driven_deal_preserves_order_and_rejects_duplicates() {
    let h = harness(&[300, 300, 300]).await;
    h.start().await;
    let (tx, shutdown) = scan_harness(&h).await;

    // As Ks Qs Js Ts 9s, two hole cards per seat, dealt left of button.
    for barcode in ["1010", "1130", "1120", "1110", "1100", "1090"] {
        send_scan(&tx, SCANNER_SERIAL, barcode).await;
    }

    let seats = h.raw_seats().await;
    let codes = |i: usize| -> Vec<String> {
        seats[i].cards.iter().map(|c| c.code()).collect()
    };
    assert_eq!(codes(1), vec!["As", "Js"]);
    assert_eq!(codes(2), vec!["Ks", "Ts"]);
    assert_eq!(codes(0), vec!["Qs", "9s"]);
    assert_eq!(h.raw_game().await.phase, HandPhase::Betting);

    // A duplicate ace is rejected by card uniqueness but still
    // acknowledged so it cannot block the stream.
    let seats_before = h.raw_seats().await;
    let events_before = h.event_types().len();
    send_scan(&tx, SCANNER_SERIAL, "1010").await;
    assert_eq!(h.raw_seats().await, seats_before);
    assert_eq!(h.event_types().len(), events_before);

    // The ingester is still healthy: the device clock was touched.
    let mut txn = h.store.begin().await.unwrap();
    let device = txn
        .device_by_serial(SCANNER_SERIAL)
        .await
        .unwrap()
        .unwrap();
    txn.rollback().await;
    assert!(device.last_seen_at.is_some());

    shutdown.cancel();
}

#[tokio::test]
async fn scans_from_unknown_devices_are_acked_and_dropped() {
    let h = harness(&[300, 300, 300]).await;
    h.start().await;
    let (tx, shutdown) = scan_harness(&h).await;

    let seats_before = h.raw_seats().await;
    send_scan(&tx, "no-such-device", "1010").await;
    send_scan(&tx, SCANNER_SERIAL, "garbage").await;
    assert_eq!(h.raw_seats().await, seats_before);

    shutdown.cancel();
}
