//! Side-pot construction and distribution.
//!
//! Side pots are recomputed from scratch at showdown out of each seat's
//! cumulative contribution (`starting_balance - buy_in`), which is
//! independent of when individual betting rounds closed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::errors::{ConservationReport, EngineError};
use super::eval::RankedHand;
use super::types::{Chips, Seat, SeatId, SeatStatus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidePot {
    pub pot_number: usize,
    pub amount: Chips,
    /// Contribution band `(lower, upper]` this pot collects from.
    pub lower: Chips,
    pub upper: Chips,
    /// Every seat that put chips into this band, folded or not.
    pub contributors: Vec<SeatId>,
    /// Contributors still able to win the pot.
    pub eligible: Vec<SeatId>,
    pub winners: Vec<SeatId>,
}

/// Layers the pots by the distinct nonzero contribution levels.
/// Zero-amount layers are dropped; layers left without an eligible seat
/// are kept so that distribution can report them as a conservation bug.
pub fn build_side_pots(seats: &[Seat]) -> Vec<SidePot> {
    let mut levels: Vec<Chips> = seats
        .iter()
        .map(Seat::cumulative_contribution)
        .filter(|cc| *cc > 0)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let mut pots = Vec::with_capacity(levels.len());
    let mut prev: Chips = 0;
    for level in levels {
        let increment = level - prev;
        let contributors: Vec<&Seat> = seats
            .iter()
            .filter(|s| s.cumulative_contribution() >= level)
            .collect();
        let amount = increment * contributors.len() as Chips;
        if amount == 0 {
            prev = level;
            continue;
        }
        let eligible: Vec<SeatId> = contributors
            .iter()
            .filter(|s| !matches!(s.status, SeatStatus::Folded | SeatStatus::Eliminated))
            .map(|s| s.id)
            .collect();
        pots.push(SidePot {
            pot_number: pots.len(),
            amount,
            lower: prev,
            upper: level,
            contributors: contributors.iter().map(|s| s.id).collect(),
            eligible,
            winners: Vec::new(),
        });
        prev = level;
    }
    pots
}

#[derive(Clone, Debug, Default)]
pub struct PotDistribution {
    pub pots: Vec<SidePot>,
    pub payouts: HashMap<SeatId, Chips>,
}

/// Splits every pot among the best eligible hands. Each winner receives
/// `floor(amount / winners)`; the remainder goes to the winning seat
/// closest after the dealer button so no chip is ever lost.
pub fn distribute(
    mut pots: Vec<SidePot>,
    hands: &HashMap<SeatId, RankedHand>,
    seats: &[Seat],
    button_seat_id: Option<SeatId>,
) -> Result<PotDistribution, EngineError> {
    let mut payouts: HashMap<SeatId, Chips> = HashMap::new();

    for pot in &mut pots {
        if pot.eligible.is_empty() {
            return Err(conservation_bug(pot, seats));
        }

        let mut winners: Vec<SeatId> = if pot.eligible.len() == 1 {
            pot.eligible.clone()
        } else {
            let top = pot
                .eligible
                .iter()
                .filter_map(|id| hands.get(id).map(|h| h.score))
                .max()
                .ok_or_else(|| {
                    EngineError::validation("no evaluated hands for a contested pot")
                })?;
            pot.eligible
                .iter()
                .filter(|id| hands.get(*id).map(|h| h.score) == Some(top))
                .copied()
                .collect()
        };
        sort_after_button(&mut winners, seats, button_seat_id);

        let share = pot.amount / winners.len() as Chips;
        let remainder = pot.amount - share * winners.len() as Chips;
        for (i, winner) in winners.iter().enumerate() {
            let extra = if i == 0 { remainder } else { 0 };
            *payouts.entry(*winner).or_default() += share + extra;
        }
        pot.winners = winners;
    }

    Ok(PotDistribution { pots, payouts })
}

/// Orders seat ids by rotation distance from the seat after the button.
/// Without a button this degrades to plain seat-number order.
fn sort_after_button(ids: &mut [SeatId], seats: &[Seat], button_seat_id: Option<SeatId>) {
    let span = seats
        .iter()
        .map(|s| u16::from(s.seat_number))
        .max()
        .unwrap_or(0)
        + 1;
    let start = button_seat_id
        .and_then(|id| seats.iter().find(|s| s.id == id))
        .map(|s| (u16::from(s.seat_number) + 1) % span)
        .unwrap_or(0);
    let position = |id: &SeatId| -> u16 {
        let number = seats
            .iter()
            .find(|s| s.id == *id)
            .map(|s| u16::from(s.seat_number))
            .unwrap_or(0);
        (number + span - start) % span
    };
    ids.sort_by_key(position);
}

fn conservation_bug(pot: &SidePot, seats: &[Seat]) -> EngineError {
    let total: Chips = seats.iter().map(Seat::cumulative_contribution).sum();
    EngineError::Conservation(Box::new(ConservationReport {
        reason: format!("side pot {} has no eligible seats", pot.pot_number),
        table_id: None,
        game_id: None,
        starting_total: total,
        final_total: total,
        seats: json!(seats
            .iter()
            .map(|s| json!({
                "seatId": s.id,
                "seatNumber": s.seat_number,
                "buyIn": s.buy_in,
                "startingBalance": s.starting_balance,
                "status": s.status,
            }))
            .collect::<Vec<_>>()),
        pots: json!(pot),
        events: json!([]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::eval::solve;
    use crate::engine::Card;
    use uuid::Uuid;

    fn seat_with_cc(number: u8, starting: Chips, behind: Chips, status: SeatStatus) -> Seat {
        let mut seat = Seat::new(Uuid::new_v4(), Uuid::new_v4(), number, behind);
        seat.starting_balance = starting;
        seat.status = status;
        seat
    }

    fn amounts(pots: &[SidePot]) -> Vec<Chips> {
        pots.iter().map(|p| p.amount).collect()
    }

    #[test]
    fn single_all_in_creates_main_and_side_pot() {
        // P1 all-in for 50, P2 and P3 in for 100 each.
        let seats = vec![
            seat_with_cc(0, 50, 0, SeatStatus::AllIn),
            seat_with_cc(1, 300, 200, SeatStatus::Active),
            seat_with_cc(2, 300, 200, SeatStatus::Active),
        ];
        let pots = build_side_pots(&seats);
        assert_eq!(amounts(&pots), vec![150, 100]);
        assert_eq!(pots[0].eligible.len(), 3);
        assert_eq!(
            pots[1].eligible,
            vec![seats[1].id, seats[2].id],
            "short stack is not eligible for the overage"
        );
    }

    #[test]
    fn three_way_all_in_layers_three_pots() {
        // Stacks 50 / 150 / 300, all all-in.
        let seats = vec![
            seat_with_cc(0, 50, 0, SeatStatus::AllIn),
            seat_with_cc(1, 150, 0, SeatStatus::AllIn),
            seat_with_cc(2, 300, 0, SeatStatus::AllIn),
        ];
        let pots = build_side_pots(&seats);
        assert_eq!(amounts(&pots), vec![150, 200, 150]);
        assert_eq!(pots[2].eligible, vec![seats[2].id]);

        let total: Chips = seats.iter().map(Seat::cumulative_contribution).sum();
        assert_eq!(amounts(&pots).iter().sum::<Chips>(), total);
    }

    #[test]
    fn folded_contributions_feed_the_pot_but_not_eligibility() {
        // P1 folds after posting 10; the others play for 100 each.
        let seats = vec![
            seat_with_cc(0, 300, 290, SeatStatus::Folded),
            seat_with_cc(1, 300, 200, SeatStatus::Active),
            seat_with_cc(2, 300, 200, SeatStatus::Active),
        ];
        let pots = build_side_pots(&seats);
        assert_eq!(amounts(&pots), vec![30, 180]);
        assert!(!pots[0].eligible.contains(&seats[0].id));
        assert!(pots[0].contributors.contains(&seats[0].id));
    }

    #[test]
    fn equal_stacks_folding_creates_no_side_pot() {
        // Stacks 50/300/300; the short stack folds pre-flop for free, the
        // other two bet 100 each: one contested pot only.
        let seats = vec![
            seat_with_cc(0, 50, 50, SeatStatus::Folded),
            seat_with_cc(1, 300, 200, SeatStatus::Active),
            seat_with_cc(2, 300, 200, SeatStatus::Active),
        ];
        let pots = build_side_pots(&seats);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 200);
        assert_eq!(pots[0].eligible, vec![seats[1].id, seats[2].id]);
    }

    #[test]
    fn distribution_splits_and_awards_remainder_after_button() {
        let seats = vec![
            seat_with_cc(0, 101, 0, SeatStatus::AllIn),
            seat_with_cc(1, 101, 0, SeatStatus::AllIn),
            seat_with_cc(2, 101, 0, SeatStatus::AllIn),
        ];
        let pots = build_side_pots(&seats);
        assert_eq!(amounts(&pots), vec![303]);

        // All three tie with the board flush.
        let board = ["Ah", "Kh", "Qh", "Jh", "9h"];
        let mut hands = HashMap::new();
        for (seat, hole) in seats.iter().zip([["2c", "2d"], ["3c", "3d"], ["4c", "4d"]]) {
            let mut cards: Vec<Card> = board.iter().map(|c| Card::parse(c).unwrap()).collect();
            cards.extend(hole.iter().map(|c| Card::parse(c).unwrap()));
            hands.insert(seat.id, solve(&cards).unwrap());
        }

        let result = distribute(pots, &hands, &seats, Some(seats[0].id)).unwrap();
        // 303 / 3 == 101 exactly per winner once the remainder rule fires:
        // floor share is 101 with remainder 0 here, so assert the sum.
        let paid: Chips = result.payouts.values().sum();
        assert_eq!(paid, 303);

        // Force a remainder: two winners on 303.
        let seats2 = vec![
            seat_with_cc(0, 151, 0, SeatStatus::AllIn),
            seat_with_cc(1, 152, 0, SeatStatus::AllIn),
        ];
        let pots2 = build_side_pots(&seats2);
        let mut hands2 = HashMap::new();
        for (seat, hole) in seats2.iter().zip([["2c", "2d"], ["3c", "3d"]]) {
            let mut cards: Vec<Card> = board.iter().map(|c| Card::parse(c).unwrap()).collect();
            cards.extend(hole.iter().map(|c| Card::parse(c).unwrap()));
            hands2.insert(seat.id, solve(&cards).unwrap());
        }
        let result2 = distribute(pots2, &hands2, &seats2, Some(seats2[0].id)).unwrap();
        let paid2: Chips = result2.payouts.values().sum();
        let total2: Chips = seats2.iter().map(Seat::cumulative_contribution).sum();
        assert_eq!(paid2, total2, "remainder must not be lost");
        // Seat 1 sits immediately after the button and takes the odd chip.
        assert_eq!(result2.payouts[&seats2[1].id], result2.payouts[&seats2[0].id] + 1);
    }

    #[test]
    fn sole_contender_takes_every_pot_without_evaluation() {
        let seats = vec![
            seat_with_cc(0, 300, 250, SeatStatus::Folded),
            seat_with_cc(1, 300, 250, SeatStatus::Active),
        ];
        let pots = build_side_pots(&seats);
        let result = distribute(pots, &HashMap::new(), &seats, None).unwrap();
        assert_eq!(result.payouts[&seats[1].id], 100);
        assert_eq!(result.pots[0].winners, vec![seats[1].id]);
    }

    #[test]
    fn zero_eligible_pot_is_a_conservation_bug() {
        // Only the folded seat reaches the top contribution level.
        let seats = vec![
            seat_with_cc(0, 300, 200, SeatStatus::Folded),
            seat_with_cc(1, 300, 250, SeatStatus::Active),
        ];
        let pots = build_side_pots(&seats);
        assert_eq!(amounts(&pots), vec![100, 50]);
        let err = distribute(pots, &HashMap::new(), &seats, None).unwrap_err();
        assert_eq!(err.kind(), "ConservationError");
    }
}
