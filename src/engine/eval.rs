//! Best-five hand evaluation over 5 to 7 cards.

use serde::{Deserialize, Serialize};

use super::cards::{Card, Rank};
use super::errors::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HandCategory {
    HighCard,
    Pair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

impl HandCategory {
    pub fn name(self) -> &'static str {
        match self {
            HandCategory::HighCard => "High Card",
            HandCategory::Pair => "Pair",
            HandCategory::TwoPair => "Two Pair",
            HandCategory::ThreeOfAKind => "Three of a Kind",
            HandCategory::Straight => "Straight",
            HandCategory::Flush => "Flush",
            HandCategory::FullHouse => "Full House",
            HandCategory::FourOfAKind => "Four of a Kind",
            HandCategory::StraightFlush => "Straight Flush",
        }
    }

    fn strength(self) -> u32 {
        match self {
            HandCategory::HighCard => 0,
            HandCategory::Pair => 1,
            HandCategory::TwoPair => 2,
            HandCategory::ThreeOfAKind => 3,
            HandCategory::Straight => 4,
            HandCategory::Flush => 5,
            HandCategory::FullHouse => 6,
            HandCategory::FourOfAKind => 7,
            HandCategory::StraightFlush => 8,
        }
    }
}

/// A ranked best-five hand. Higher `score` beats lower; equal scores tie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankedHand {
    pub score: u32,
    pub category: HandCategory,
    pub description: String,
    pub best_five: Vec<Card>,
}

/// Evaluates the best five-card hand available in `cards` (5..=7 cards).
pub fn solve(cards: &[Card]) -> Result<RankedHand, EngineError> {
    if !(5..=7).contains(&cards.len()) {
        return Err(EngineError::validation(format!(
            "hand evaluation needs 5 to 7 cards, got {}",
            cards.len()
        )));
    }

    let mut best: Option<RankedHand> = None;
    let mut five = [cards[0]; 5];
    for combo in combinations(cards.len(), 5) {
        for (slot, idx) in combo.iter().enumerate() {
            five[slot] = cards[*idx];
        }
        let candidate = rank_five(&five);
        if best.as_ref().map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }
    Ok(best.expect("at least one combination"))
}

/// Indices of every hand tied for the maximum score.
pub fn winners(hands: &[RankedHand]) -> Vec<usize> {
    let Some(top) = hands.iter().map(|h| h.score).max() else {
        return Vec::new();
    };
    hands
        .iter()
        .enumerate()
        .filter(|(_, h)| h.score == top)
        .map(|(i, _)| i)
        .collect()
}

fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut combo: Vec<usize> = (0..k).collect();
    loop {
        out.push(combo.clone());
        // advance the rightmost index that still has room
        let mut i = k;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if combo[i] != i + n - k {
                break;
            }
            if i == 0 {
                return out;
            }
        }
        combo[i] += 1;
        for j in i + 1..k {
            combo[j] = combo[j - 1] + 1;
        }
    }
}

fn rank_five(five: &[Card; 5]) -> RankedHand {
    let mut sorted = *five;
    sorted.sort_by(|a, b| b.rank.value().cmp(&a.rank.value()));

    let is_flush = sorted.iter().all(|c| c.suit == sorted[0].suit);
    let straight_high = straight_high(&sorted);

    // (count, rank value) groups, ordered by count then rank.
    let mut groups: Vec<(u8, u8)> = Vec::new();
    for card in &sorted {
        let v = card.rank.value();
        match groups.iter_mut().find(|(_, rank)| *rank == v) {
            Some((count, _)) => *count += 1,
            None => groups.push((1, v)),
        }
    }
    groups.sort_by(|a, b| b.cmp(a));

    let (category, tiebreaks, description) = match (is_flush, straight_high, groups.as_slice()) {
        (true, Some(high), _) => {
            let description = if high == Rank::Ace.value() {
                "Royal Flush".to_string()
            } else {
                format!("Straight Flush, {} High", high_name(high))
            };
            (HandCategory::StraightFlush, [high, 0, 0, 0, 0], description)
        }
        (_, _, [(4, quad), (1, kicker)]) => (
            HandCategory::FourOfAKind,
            [*quad, *kicker, 0, 0, 0],
            format!("Four of a Kind, {}", plural(*quad)),
        ),
        (_, _, [(3, trip), (2, pair)]) => (
            HandCategory::FullHouse,
            [*trip, *pair, 0, 0, 0],
            format!("Full House, {} over {}", plural(*trip), plural(*pair)),
        ),
        (true, None, _) => {
            let t = kicker_values(&groups);
            (
                HandCategory::Flush,
                t,
                format!("Flush, {} High", high_name(t[0])),
            )
        }
        (false, Some(high), _) => (
            HandCategory::Straight,
            [high, 0, 0, 0, 0],
            format!("Straight, {} High", high_name(high)),
        ),
        (_, _, [(3, trip), (1, k1), (1, k2)]) => (
            HandCategory::ThreeOfAKind,
            [*trip, *k1, *k2, 0, 0],
            format!("Three of a Kind, {}", plural(*trip)),
        ),
        (_, _, [(2, hi), (2, lo), (1, kicker)]) => (
            HandCategory::TwoPair,
            [*hi, *lo, *kicker, 0, 0],
            format!("Two Pair, {} & {}", plural(*hi), plural(*lo)),
        ),
        (_, _, [(2, pair), (1, k1), (1, k2), (1, k3)]) => (
            HandCategory::Pair,
            [*pair, *k1, *k2, *k3, 0],
            format!("Pair, {}", plural(*pair)),
        ),
        _ => {
            let t = kicker_values(&groups);
            (
                HandCategory::HighCard,
                t,
                format!("{} High", high_name(t[0])),
            )
        }
    };

    let mut score = category.strength() << 20;
    for (i, t) in tiebreaks.iter().enumerate() {
        score |= u32::from(*t) << (16 - 4 * i);
    }

    RankedHand {
        score,
        category,
        description,
        best_five: sorted.to_vec(),
    }
}

/// High card of a straight if the five sorted-descending cards form one.
/// The wheel (A-5-4-3-2) counts with a high of five.
fn straight_high(sorted: &[Card; 5]) -> Option<u8> {
    let values: Vec<u8> = sorted.iter().map(|c| c.rank.value()).collect();
    if values.windows(2).all(|w| w[0] == w[1] + 1) {
        return Some(values[0]);
    }
    if values == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}

fn kicker_values(groups: &[(u8, u8)]) -> [u8; 5] {
    let mut out = [0u8; 5];
    for (i, (_, rank)) in groups.iter().take(5).enumerate() {
        out[i] = *rank;
    }
    out
}

fn plural(value: u8) -> &'static str {
    rank_of(value).plural()
}

fn high_name(value: u8) -> &'static str {
    rank_of(value).high_name()
}

fn rank_of(value: u8) -> Rank {
    match value {
        2 => Rank::Two,
        3 => Rank::Three,
        4 => Rank::Four,
        5 => Rank::Five,
        6 => Rank::Six,
        7 => Rank::Seven,
        8 => Rank::Eight,
        9 => Rank::Nine,
        10 => Rank::Ten,
        11 => Rank::Jack,
        12 => Rank::Queen,
        13 => Rank::King,
        _ => Rank::Ace,
    }
}
