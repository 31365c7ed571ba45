//! Barcode grammar for the card scanners: one suit digit followed by a
//! three-digit rank code.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::engine::cards::{Card, Rank, Suit};
use crate::engine::errors::EngineError;

static RANK_CODES: Lazy<HashMap<&'static str, Rank>> = Lazy::new(|| {
    HashMap::from([
        ("010", Rank::Ace),
        ("020", Rank::Two),
        ("030", Rank::Three),
        ("040", Rank::Four),
        ("050", Rank::Five),
        ("060", Rank::Six),
        ("070", Rank::Seven),
        ("080", Rank::Eight),
        ("090", Rank::Nine),
        ("100", Rank::Ten),
        ("110", Rank::Jack),
        ("120", Rank::Queen),
        ("130", Rank::King),
    ])
});

pub fn parse_barcode(raw: &str) -> Result<Card, EngineError> {
    let code = raw.trim();
    if code.len() != 4 || !code.is_ascii() {
        return Err(EngineError::InvalidBarcode(raw.to_string()));
    }
    let suit = match &code[..1] {
        "1" => Suit::Spades,
        "2" => Suit::Hearts,
        "3" => Suit::Clubs,
        "4" => Suit::Diamonds,
        _ => return Err(EngineError::InvalidBarcode(raw.to_string())),
    };
    let rank = RANK_CODES
        .get(&code[1..])
        .copied()
        .ok_or_else(|| EngineError::InvalidBarcode(raw.to_string()))?;
    Ok(Card::new(rank, suit))
}
