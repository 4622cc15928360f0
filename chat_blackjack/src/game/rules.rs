//! Table rules: payout coefficients, starting money and dealer policy.

use serde::{Deserialize, Serialize};

use super::cards::BLACKJACK;
use super::errors::{GameError, GameResult};
use crate::db::StoreError;

/// Default money given to a player on first interaction.
pub const DEFAULT_STARTING_BALANCE: i64 = 10_000;

/// Default multiple of the bet credited on a win. The stake is withheld
/// when betting, so 2 returns the stake plus even money.
pub const DEFAULT_WIN_COEFFICIENT: i64 = 2;

/// Default multiple of the bet credited on a loss.
pub const DEFAULT_LOSS_COEFFICIENT: i64 = 0;

/// Default bonus multiple credited when a hand reaches exactly 21.
pub const DEFAULT_BLACKJACK_COEFFICIENT: i64 = 2;

/// Default upper bound for the expected participant count.
pub const DEFAULT_MAX_PARTICIPANTS: i32 = 10;

/// Dealer keeps drawing while below this value.
pub const DEALER_STANDS_ON: u32 = 17;

/// Outcome of a finished hand against the dealer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

/// Game rules shared by every chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    /// Balance of a newly created player
    pub starting_balance: i64,

    /// Multiple of the bet credited on a win
    pub win_coefficient: i64,

    /// Multiple of the bet credited on a loss
    pub loss_coefficient: i64,

    /// Bonus multiple credited as soon as a hand hits 21
    pub blackjack_coefficient: i64,

    /// Largest participant count a chat may ask for
    pub max_participants: i32,

    /// Dealer stands once reaching this value
    pub dealer_stands_on: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            starting_balance: DEFAULT_STARTING_BALANCE,
            win_coefficient: DEFAULT_WIN_COEFFICIENT,
            loss_coefficient: DEFAULT_LOSS_COEFFICIENT,
            blackjack_coefficient: DEFAULT_BLACKJACK_COEFFICIENT,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            dealer_stands_on: DEALER_STANDS_ON,
        }
    }
}

impl GameRules {
    /// Create rules from environment variables, falling back to defaults
    ///
    /// Reads `STARTING_BALANCE`, `WIN_COEFFICIENT`, `LOSS_COEFFICIENT`,
    /// `BLACKJACK_COEFFICIENT` and `MAX_PARTICIPANTS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            starting_balance: env_or("STARTING_BALANCE", defaults.starting_balance),
            win_coefficient: env_or("WIN_COEFFICIENT", defaults.win_coefficient),
            loss_coefficient: env_or("LOSS_COEFFICIENT", defaults.loss_coefficient),
            blackjack_coefficient: env_or("BLACKJACK_COEFFICIENT", defaults.blackjack_coefficient),
            max_participants: env_or("MAX_PARTICIPANTS", defaults.max_participants),
            dealer_stands_on: defaults.dealer_stands_on,
        }
    }

    /// Validate rules
    ///
    /// Coefficients may not be negative: the stake is already withheld at bet
    /// time, so settlement only ever credits.
    pub fn validate(&self) -> Result<(), String> {
        if self.starting_balance < 0 {
            return Err("Starting balance must not be negative".to_string());
        }

        if self.win_coefficient < 0 || self.loss_coefficient < 0 || self.blackjack_coefficient < 0
        {
            return Err("Payout coefficients must not be negative".to_string());
        }

        if self.loss_coefficient > self.win_coefficient {
            return Err("Loss coefficient must not exceed win coefficient".to_string());
        }

        if self.max_participants < 1 {
            return Err("Max participants must be at least 1".to_string());
        }

        if self.dealer_stands_on > BLACKJACK {
            return Err("Dealer stand value must not exceed 21".to_string());
        }

        Ok(())
    }

    /// Whether `count` is an acceptable expected participant count.
    pub fn accepts_participant_count(&self, count: i32) -> bool {
        (1..=self.max_participants).contains(&count)
    }

    /// Compare a finished hand with the dealer's.
    ///
    /// A dealer bust pays every finished hand, bust or not. Otherwise the
    /// hand wins only when it stays within 21 and beats the dealer's value.
    pub fn outcome(&self, hand_value: u32, dealer_value: u32) -> Outcome {
        let dealer_bust = dealer_value > BLACKJACK;
        if dealer_bust || (hand_value <= BLACKJACK && hand_value > dealer_value) {
            Outcome::Win
        } else {
            Outcome::Loss
        }
    }

    /// Amount credited at settlement.
    pub fn settlement_credit(&self, outcome: Outcome, bet: i64) -> GameResult<i64> {
        match outcome {
            Outcome::Win => scaled(self.win_coefficient, bet),
            Outcome::Loss => scaled(self.loss_coefficient, bet),
        }
    }

    /// Amount credited the moment a hand reaches 21.
    pub fn blackjack_bonus(&self, bet: i64) -> GameResult<i64> {
        scaled(self.blackjack_coefficient, bet)
    }

    /// Refuse a bet whose payouts don't fit in a balance.
    pub fn check_bet(&self, bet: i64) -> GameResult<()> {
        let win = self.settlement_credit(Outcome::Win, bet)?;
        let bonus = self.blackjack_bonus(bet)?;
        win.checked_add(bonus)
            .map(|_| ())
            .ok_or(GameError::Store(StoreError::InvalidAmount(bet)))
    }

    /// Net change of a balance over a whole round: the withheld stake, the
    /// 21 bonus if any, and the settlement credit.
    pub fn net_result(&self, hand_value: u32, dealer_value: u32, bet: i64) -> GameResult<i64> {
        let bonus = if hand_value == BLACKJACK {
            self.blackjack_bonus(bet)?
        } else {
            0
        };
        let credit = self.settlement_credit(self.outcome(hand_value, dealer_value), bet)?;
        credit
            .checked_add(bonus)
            .and_then(|total| total.checked_sub(bet))
            .ok_or(GameError::Store(StoreError::InvalidAmount(bet)))
    }
}

fn scaled(coefficient: i64, bet: i64) -> GameResult<i64> {
    coefficient
        .checked_mul(bet)
        .ok_or(GameError::Store(StoreError::InvalidAmount(bet)))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
