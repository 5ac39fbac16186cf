//! Fixed-point price representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-point USD price with 6 decimal places.
/// Used for exact target/band comparisons without floating-point errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(pub u64);

/// Why a user-supplied price string was rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePriceError {
    #[error("price is not a number")]
    NotANumber,
    #[error("price must be greater than zero")]
    NotPositive,
    #[error("price cannot have more than {} decimal places", Price::DECIMALS)]
    TooManyDecimals,
    #[error("price is out of range")]
    OutOfRange,
}

impl Price {
    /// Number of decimal places.
    pub const DECIMALS: u32 = 6;
    /// Scale factor: 10^6.
    pub const SCALE: u64 = 1_000_000;

    /// Create from raw micro-units (10^-6 USD).
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Create from f64 (provider payloads), rounded to 6 decimal places.
    pub fn from_f64(value: f64) -> Self {
        Self((value * Self::SCALE as f64).round() as u64)
    }

    /// Convert to f64 (for display/debugging).
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Raw micro-units.
    pub const fn micros(self) -> u64 {
        self.0
    }

    /// The ±1% tolerance band around this observed price.
    /// Both bounds are rounded half-up at the 6th decimal place and the
    /// band is inclusive on both ends: a target T matches an observed
    /// price P iff 0.99·P ≤ T ≤ 1.01·P.
    pub fn tolerance_band(self) -> PriceBand {
        let p = self.0 as u128;
        PriceBand {
            lower: Price(((p * 99 + 50) / 100) as u64),
            upper: Price(((p * 101 + 50) / 100) as u64),
        }
    }
}

impl fmt::Display for Price {
    /// Full precision with trailing zeros trimmed, always at least
    /// two fraction digits (e.g. `50000.00`, `0.512312`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let mut frac = format!("{:06}", self.0 % Self::SCALE);
        while frac.len() > 2 && frac.ends_with('0') {
            frac.pop();
        }
        write!(f, "{whole}.{frac}")
    }
}

impl FromStr for Price {
    type Err = ParsePriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('-') {
            return Err(ParsePriceError::NotPositive);
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(ParsePriceError::NotANumber);
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParsePriceError::NotANumber);
        }
        if frac.len() > Self::DECIMALS as usize {
            return Err(ParsePriceError::TooManyDecimals);
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| ParsePriceError::OutOfRange)?
        };
        let mut micros = whole
            .checked_mul(Self::SCALE)
            .ok_or(ParsePriceError::OutOfRange)?;
        if !frac.is_empty() {
            // Right-pad to 6 digits: "51" -> 510000 micros.
            let frac_micros: u64 = frac.parse::<u64>().unwrap_or(0)
                * 10u64.pow(Self::DECIMALS - frac.len() as u32);
            micros = micros
                .checked_add(frac_micros)
                .ok_or(ParsePriceError::OutOfRange)?;
        }
        if micros == 0 {
            return Err(ParsePriceError::NotPositive);
        }
        Ok(Self(micros))
    }
}

/// Inclusive price interval produced by [`Price::tolerance_band`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBand {
    pub lower: Price,
    pub upper: Price,
}

impl PriceBand {
    /// Whether a target price falls inside the band (boundaries included).
    pub fn contains(&self, target: Price) -> bool {
        self.lower <= target && target <= self.upper
    }
}
