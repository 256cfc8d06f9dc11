//! Fixed-point currency amounts and the stake-to-score conversion.
//!
//! Amounts are stored as integer base units with two decimal places
//! (100 base units per coin). Quorum stake options arrive as decimal
//! strings (`"0.01"`, `"4000000"`) and are parsed here; one whole coin of
//! stake is worth one unit of voting score.

use std::fmt;

use thiserror::Error;

/// Base units per whole coin.
pub const COIN: i64 = 100;

/// Largest representable supply, in base units.
pub const MAX_MONEY: Amount = Amount(21_000_000_000_000 * COIN);

/// A currency amount in base units. Always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

/// Failures while parsing a decimal amount string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("malformed amount: {0:?}")]
    Malformed(String),

    #[error("amount has more than {max} decimal places: {0:?}", max = 2)]
    TooManyDecimals(String),

    #[error("amount is out of range: {0:?}")]
    OutOfRange(String),
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Builds an amount from whole coins.
    ///
    /// # Panics
    ///
    /// Panics on overflow; intended for constants and fixtures.
    #[must_use]
    pub const fn from_coins(coins: i64) -> Self {
        Self(coins * COIN)
    }

    #[must_use]
    pub const fn from_base_units(units: i64) -> Self {
        Self(units)
    }

    #[must_use]
    pub const fn base_units(&self) -> i64 {
        self.0
    }

    /// Parses a non-negative decimal string with up to two decimal places.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] for empty input, a sign, non-digit
    /// characters, more than two decimals, or values above [`MAX_MONEY`].
    pub fn parse_str(input: &str) -> Result<Self, AmountError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(AmountError::Malformed(input.to_string()));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::Malformed(input.to_string()));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) ||
            !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountError::Malformed(input.to_string()));
        }
        if frac.len() > 2 {
            return Err(AmountError::TooManyDecimals(input.to_string()));
        }

        let whole_units = if whole.is_empty() {
            0i64
        } else {
            whole
                .parse::<i64>()
                .ok()
                .and_then(|w| w.checked_mul(COIN))
                .ok_or_else(|| AmountError::OutOfRange(input.to_string()))?
        };

        // Right-pad the fraction to base-unit precision ("5" reads as 50).
        let mut frac_units = 0i64;
        for (i, c) in frac.chars().enumerate() {
            let digit = i64::from(c.to_digit(10).expect("checked above"));
            frac_units += digit * 10i64.pow(1 - u32::try_from(i).expect("frac.len() <= 2"));
        }

        let total = whole_units
            .checked_add(frac_units)
            .ok_or_else(|| AmountError::OutOfRange(input.to_string()))?;
        if total > MAX_MONEY.0 {
            return Err(AmountError::OutOfRange(input.to_string()));
        }

        Ok(Self(total))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / COIN, self.0 % COIN)
    }
}

/// Converts a stake amount into voting score: one score unit per whole coin.
/// Fractional coins do not contribute.
#[must_use]
pub fn amount_to_score(amount: Amount) -> u64 {
    u64::try_from(amount.base_units() / COIN).unwrap_or(0)
}
