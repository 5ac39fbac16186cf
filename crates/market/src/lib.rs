//! Market-data provider boundary.
//!
//! The engine only ever needs one capability from the outside market:
//! the current spot price for a coin id. That contract is the
//! [`PriceSource`] trait; [`CoinGecko`] is the production implementation
//! and additionally exposes the lookup/search calls the chat surface uses.

pub mod coingecko;

pub use coingecko::{CoinGecko, CoinMatch, CoinSummary, MarketConfig};

use async_trait::async_trait;
use thiserror::Error;
use trendora_core::Price;

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("coin not found: {0}")]
    NotFound(String),
    #[error("price source unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for PriceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Spot-price capability the alert engine depends on.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current USD price for a provider-recognized coin id.
    ///
    /// Fails with [`PriceError::NotFound`] for unknown ids and
    /// [`PriceError::Unavailable`] on transport or rate-limit errors.
    async fn current_price(&self, coin_id: &str) -> Result<Price, PriceError>;
}
