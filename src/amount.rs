//! Atomic (smallest-unit) token amounts.
//!
//! Amounts travel on the wire as decimal digit strings and are held in
//! memory as `u64`, the native width of a fungible-token balance. Human
//! prices such as `"0.01"` are converted with fixed-point decimal
//! arithmetic, never through binary floating point.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Default number of decimals for the settlement asset (USDC).
pub const DEFAULT_ASSET_DECIMALS: u32 = 6;

/// Maximum decimals a fungible token can declare.
const MAX_DECIMALS: u32 = 18;

/// An amount of tokens in the asset's smallest unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomicAmount(u64);

/// Reasons an amount string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Empty input.
    #[error("amount is empty")]
    Empty,
    /// Contains something other than ASCII digits.
    #[error("amount {0:?} is not an unsigned integer string")]
    NotAnInteger(String),
    /// Does not fit in 64 bits.
    #[error("amount {0:?} exceeds the maximum token amount")]
    Overflow(String),
    /// Not a decimal number.
    #[error("price {0:?} is not a decimal number")]
    InvalidDecimal(String),
    /// Negative price.
    #[error("price {0:?} is negative")]
    Negative(String),
    /// More fractional digits than the asset supports.
    #[error("price {price:?} has more than {decimals} fractional digits")]
    TooPrecise {
        /// The offending price.
        price: String,
        /// Decimals supported by the asset.
        decimals: u32,
    },
    /// Decimals outside the supported range.
    #[error("asset decimals {0} out of range")]
    Decimals(u32),
}

impl AtomicAmount {
    /// Zero tokens.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw atomic amount.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw atomic amount.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parse the wire form: ASCII decimal digits only.
    ///
    /// # Errors
    ///
    /// Rejects empty strings, signs, whitespace, fractions, exponents and
    /// values that do not fit in 64 bits.
    pub fn parse_atomic(s: &str) -> Result<Self, AmountError> {
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::NotAnInteger(s.to_string()));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| AmountError::Overflow(s.to_string()))
    }

    /// Convert a human decimal price (e.g. `"0.01"`) into atomic units.
    ///
    /// # Errors
    ///
    /// Rejects negative prices, prices with more fractional digits than
    /// `decimals`, and results that do not fit in 64 bits.
    pub fn from_decimal(price: &str, decimals: u32) -> Result<Self, AmountError> {
        if decimals > MAX_DECIMALS {
            return Err(AmountError::Decimals(decimals));
        }
        let trimmed = price.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        let value = Decimal::from_str(trimmed)
            .map_err(|_| AmountError::InvalidDecimal(price.to_string()))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(price.to_string()));
        }

        let normalized = value.normalize();
        if normalized.scale() > decimals {
            return Err(AmountError::TooPrecise {
                price: price.to_string(),
                decimals,
            });
        }

        let scale = Decimal::from(10_u64.pow(decimals));
        let atomic = normalized
            .checked_mul(scale)
            .ok_or_else(|| AmountError::Overflow(price.to_string()))?;
        atomic
            .trunc()
            .to_u64()
            .map(Self)
            .ok_or_else(|| AmountError::Overflow(price.to_string()))
    }

    /// Render as a human decimal price with the given number of decimals.
    #[must_use]
    pub fn to_decimal_string(self, decimals: u32) -> String {
        let mut value = Decimal::from(self.0);
        // `set_scale` only fails above 28, and MAX_DECIMALS is 18.
        if value.set_scale(decimals.min(MAX_DECIMALS)).is_err() {
            return self.0.to_string();
        }
        value.normalize().to_string()
    }
}

impl fmt::Display for AtomicAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AtomicAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_atomic(s)
    }
}

impl From<u64> for AtomicAmount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for AtomicAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AtomicAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_atomic(&raw).map_err(serde::de::Error::custom)
    }
}
