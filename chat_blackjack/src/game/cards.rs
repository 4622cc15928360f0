//! Cards, hands and Blackjack hand scoring.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    fmt,
    sync::Mutex,
};

/// Best possible hand value.
pub const BLACKJACK: u32 = 21;

/// Amount an ace drops by when it is re-counted as 1.
const SOFT_ACE_REDUCTION: u32 = 10;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    #[serde(rename = "♥")]
    Hearts,
    #[serde(rename = "♣")]
    Clubs,
    #[serde(rename = "♠")]
    Spades,
    #[serde(rename = "♦")]
    Diamonds,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Clubs, Suit::Spades, Suit::Diamonds];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Hearts => "♥",
            Self::Clubs => "♣",
            Self::Spades => "♠",
            Self::Diamonds => "♦",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Rank {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    #[serde(rename = "A")]
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// Scoring weight before any soft-ace adjustment.
    pub const fn weight(self) -> u32 {
        match self {
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
            Self::Nine => 9,
            Self::Ten | Self::Jack | Self::Queen | Self::King => 10,
            Self::Ace => 11,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Jack => "J",
            Self::Queen => "Q",
            Self::King => "K",
            Self::Ace => "A",
            numeric => return write!(f, "{}", numeric.weight()),
        };
        write!(f, "{repr}")
    }
}

/// A single playing card. The weight is stored alongside suit and rank so
/// that persisted hands carry exactly what was scored.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
    pub weight: u32,
}

impl Card {
    #[must_use]
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self {
            suit,
            rank,
            weight: rank.weight(),
        }
    }

    #[must_use]
    pub fn is_ace(&self) -> bool {
        self.rank == Rank::Ace
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

/// Ordered cards held by a participant or the dealer.
///
/// Serializes as a plain JSON list of `{suit, rank, weight}` records.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Hand(Vec<Card>);

impl Hand {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, card: Card) {
        self.0.push(card);
    }

    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        hand_value(&self.0)
    }

    /// Two cards totalling 21.
    #[must_use]
    pub fn is_natural(&self) -> bool {
        self.len() == 2 && self.value() == BLACKJACK
    }

    #[must_use]
    pub fn is_bust(&self) -> bool {
        self.value() > BLACKJACK
    }
}

impl From<Vec<Card>> for Hand {
    fn from(cards: Vec<Card>) -> Self {
        Self(cards)
    }
}

impl FromIterator<Card> for Hand {
    fn from_iter<I: IntoIterator<Item = Card>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for card in &self.0 {
            write!(f, "{card}  ")?;
        }
        write!(f, "(~{})", self.value())
    }
}

/// Blackjack value of a set of cards.
///
/// Aces count 11 until the total would bust, then drop to 1 one at a time.
/// A hand that still exceeds 21 with every ace counted low returns that
/// minimal total.
#[must_use]
pub fn hand_value(cards: &[Card]) -> u32 {
    let mut total: u32 = cards.iter().map(|card| card.weight).sum();
    let mut reducible_aces = cards.iter().filter(|card| card.is_ace()).count();
    while total > BLACKJACK && reducible_aces > 0 {
        total -= SOFT_ACE_REDUCTION;
        reducible_aces -= 1;
    }
    total
}

/// Draws one card with suit and rank chosen independently and uniformly.
pub fn draw_card<R: Rng>(rng: &mut R) -> Card {
    let suit = Suit::ALL[rng.random_range(0..Suit::ALL.len())];
    let rank = Rank::ALL[rng.random_range(0..Rank::ALL.len())];
    Card::new(rank, suit)
}

/// Source of cards for dealing. Shared between workers.
pub trait CardSource: Send + Sync {
    fn draw(&self) -> Card;
}

/// Cards from the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCards;

impl CardSource for RandomCards {
    fn draw(&self) -> Card {
        draw_card(&mut rand::rng())
    }
}

/// Reproducible cards from a seeded generator.
#[derive(Debug)]
pub struct SeededCards {
    rng: Mutex<StdRng>,
}

impl SeededCards {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl CardSource for SeededCards {
    fn draw(&self) -> Card {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        draw_card(&mut *rng)
    }
}

/// Deals a fixed sequence of cards, then falls back to a seeded generator.
#[derive(Debug)]
pub struct ScriptedCards {
    script: Mutex<VecDeque<Card>>,
    fallback: SeededCards,
}

impl ScriptedCards {
    #[must_use]
    pub fn new(cards: impl IntoIterator<Item = Card>) -> Self {
        Self {
            script: Mutex::new(cards.into_iter().collect()),
            fallback: SeededCards::new(0),
        }
    }

    /// Appends more cards to the end of the script.
    pub fn extend(&self, cards: impl IntoIterator<Item = Card>) {
        let mut script = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        script.extend(cards);
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl CardSource for ScriptedCards {
    fn draw(&self) -> Card {
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        next.unwrap_or_else(|| self.fallback.draw())
    }
}
