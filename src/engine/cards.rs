use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::EngineError;

/// Placeholder code shown in place of a hidden hole card.
pub const HIDDEN_CARD: &str = "FD";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    /// Comparison value with ace high (2..=14).
    pub fn value(self) -> u8 {
        match self {
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
            Rank::Jack => 11,
            Rank::Queen => 12,
            Rank::King => 13,
            Rank::Ace => 14,
        }
    }

    pub fn code(self) -> char {
        match self {
            Rank::Two => '2',
            Rank::Three => '3',
            Rank::Four => '4',
            Rank::Five => '5',
            Rank::Six => '6',
            Rank::Seven => '7',
            Rank::Eight => '8',
            Rank::Nine => '9',
            Rank::Ten => 'T',
            Rank::Jack => 'J',
            Rank::Queen => 'Q',
            Rank::King => 'K',
            Rank::Ace => 'A',
        }
    }

    fn from_code(c: char) -> Option<Rank> {
        Some(match c.to_ascii_uppercase() {
            '2' => Rank::Two,
            '3' => Rank::Three,
            '4' => Rank::Four,
            '5' => Rank::Five,
            '6' => Rank::Six,
            '7' => Rank::Seven,
            '8' => Rank::Eight,
            '9' => Rank::Nine,
            'T' => Rank::Ten,
            'J' => Rank::Jack,
            'Q' => Rank::Queen,
            'K' => Rank::King,
            'A' => Rank::Ace,
            _ => return None,
        })
    }

    /// Plural display name used in hand descriptions ("K's", "Aces").
    pub fn plural(self) -> &'static str {
        match self {
            Rank::Two => "2's",
            Rank::Three => "3's",
            Rank::Four => "4's",
            Rank::Five => "5's",
            Rank::Six => "6's",
            Rank::Seven => "7's",
            Rank::Eight => "8's",
            Rank::Nine => "9's",
            Rank::Ten => "10's",
            Rank::Jack => "J's",
            Rank::Queen => "Q's",
            Rank::King => "K's",
            Rank::Ace => "A's",
        }
    }

    pub fn high_name(self) -> &'static str {
        match self {
            Rank::Two => "Two",
            Rank::Three => "Three",
            Rank::Four => "Four",
            Rank::Five => "Five",
            Rank::Six => "Six",
            Rank::Seven => "Seven",
            Rank::Eight => "Eight",
            Rank::Nine => "Nine",
            Rank::Ten => "Ten",
            Rank::Jack => "Jack",
            Rank::Queen => "Queen",
            Rank::King => "King",
            Rank::Ace => "Ace",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Suit {
    Spades,
    Hearts,
    Clubs,
    Diamonds,
}

impl Suit {
    pub fn code(self) -> char {
        match self {
            Suit::Spades => 's',
            Suit::Hearts => 'h',
            Suit::Clubs => 'c',
            Suit::Diamonds => 'd',
        }
    }

    fn from_code(c: char) -> Option<Suit> {
        Some(match c.to_ascii_lowercase() {
            's' => Suit::Spades,
            'h' => Suit::Hearts,
            'c' => Suit::Clubs,
            'd' => Suit::Diamonds,
            _ => return None,
        })
    }
}

/// A playing card identified by its two-character code (rank then suit).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Parses a card code. Accepts mixed case and the `10` rank spelling,
    /// which is normalized to `T`. The `FD` placeholder is not a card.
    pub fn parse(code: &str) -> Result<Card, EngineError> {
        let trimmed = code.trim();
        if !trimmed.is_ascii() {
            return Err(EngineError::InvalidCard(code.to_string()));
        }
        let (rank_part, suit_part) = match trimmed.len() {
            2 => trimmed.split_at(1),
            3 => trimmed.split_at(2),
            _ => return Err(EngineError::InvalidCard(code.to_string())),
        };

        let rank = if rank_part == "10" {
            Rank::Ten
        } else {
            let c = rank_part
                .chars()
                .next()
                .ok_or_else(|| EngineError::InvalidCard(code.to_string()))?;
            Rank::from_code(c).ok_or_else(|| EngineError::InvalidCard(code.to_string()))?
        };
        if rank_part.len() == 2 && rank_part != "10" {
            return Err(EngineError::InvalidCard(code.to_string()));
        }

        let suit_char = suit_part
            .chars()
            .next()
            .ok_or_else(|| EngineError::InvalidCard(code.to_string()))?;
        let suit =
            Suit::from_code(suit_char).ok_or_else(|| EngineError::InvalidCard(code.to_string()))?;

        Ok(Card { rank, suit })
    }

    pub fn code(&self) -> String {
        format!("{}{}", self.rank.code(), self.suit.code())
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.code(), self.suit.code())
    }
}

impl Serialize for Card {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for Card {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Card, D::Error> {
        let code = String::deserialize(deserializer)?;
        Card::parse(&code).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_codes() {
        let card = Card::parse("As").unwrap();
        assert_eq!(card.rank, Rank::Ace);
        assert_eq!(card.suit, Suit::Spades);
        assert_eq!(card.code(), "As");

        let card = Card::parse("Td").unwrap();
        assert_eq!(card.rank, Rank::Ten);
        assert_eq!(card.suit, Suit::Diamonds);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Card::parse("kH").unwrap(), Card::parse("Kh").unwrap());
        assert_eq!(Card::parse("aS").unwrap().code(), "As");
    }

    #[test]
    fn ten_spelling_is_normalized() {
        let card = Card::parse("10c").unwrap();
        assert_eq!(card.rank, Rank::Ten);
        assert_eq!(card.code(), "Tc");
    }

    #[test]
    fn rejects_garbage_and_the_hidden_placeholder() {
        assert!(Card::parse("").is_err());
        assert!(Card::parse("Xs").is_err());
        assert!(Card::parse("A").is_err());
        assert!(Card::parse("11h").is_err());
        assert!(Card::parse(HIDDEN_CARD).is_err());
    }

    #[test]
    fn serde_round_trips_as_code_string() {
        let card = Card::parse("Qh").unwrap();
        let json = serde_json::to_string(&card).unwrap();
        assert_eq!(json, "\"Qh\"");
        let back: Card = serde_json::from_str(&json).unwrap();
        assert_eq!(back, card);
    }
}
