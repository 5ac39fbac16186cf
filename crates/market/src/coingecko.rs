//! CoinGecko REST client.

use crate::{PriceError, PriceSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use trendora_core::Price;

/// Connection settings for the CoinGecko API.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// API base URL.
    pub base_url: String,
    /// Demo API key, sent as `x-cg-demo-api-key` when present.
    pub api_key: Option<String>,
    /// Per-request timeout. A timed-out fetch counts as a fetch failure.
    pub timeout: Duration,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Coin data backing the interactive price lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinSummary {
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub price_usd: Price,
}

/// A search hit for the interactive coin-id lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoinMatch {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
}

#[derive(Deserialize)]
struct CoinPayload {
    name: String,
    symbol: String,
    market_cap_rank: Option<u32>,
    market_data: MarketData,
}

#[derive(Deserialize)]
struct MarketData {
    current_price: CurrentPrice,
}

#[derive(Deserialize)]
struct CurrentPrice {
    usd: Option<f64>,
}

#[derive(Deserialize)]
struct SearchPayload {
    coins: Vec<CoinMatch>,
}

/// CoinGecko-backed market data client.
#[derive(Clone)]
pub struct CoinGecko {
    client: reqwest::Client,
    config: MarketConfig,
}

impl CoinGecko {
    /// Build a client with a bounded request timeout.
    pub fn new(config: MarketConfig) -> Result<Self, PriceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PriceError::Unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(format!("{}{}", self.config.base_url, path))
            .header("accept", "application/json");
        if let Some(key) = &self.config.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }
        req
    }

    async fn fetch_coin(&self, coin_id: &str) -> Result<CoinPayload, PriceError> {
        let response = self.request(&format!("/coins/{coin_id}")).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PriceError::NotFound(coin_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(PriceError::Unavailable(format!(
                "coins/{coin_id} returned HTTP {}",
                response.status()
            )));
        }

        let payload: CoinPayload = response
            .json()
            .await
            .map_err(|e| PriceError::Unavailable(e.to_string()))?;
        Ok(payload)
    }

    /// Coin data for the interactive `/price` lookup.
    pub async fn coin_summary(&self, coin_id: &str) -> Result<CoinSummary, PriceError> {
        let payload = self.fetch_coin(coin_id).await?;
        let usd = usd_price(coin_id, &payload)?;
        Ok(CoinSummary {
            name: payload.name,
            symbol: payload.symbol.to_uppercase(),
            market_cap_rank: payload.market_cap_rank,
            price_usd: usd,
        })
    }

    /// Top coin matches for a free-text query, backing `/find`.
    pub async fn search(&self, query: &str) -> Result<Vec<CoinMatch>, PriceError> {
        let response = self
            .request("/search")
            .query(&[("query", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PriceError::Unavailable(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let payload: SearchPayload = response
            .json()
            .await
            .map_err(|e| PriceError::Unavailable(e.to_string()))?;
        debug!(query, hits = payload.coins.len(), "coin search");
        Ok(payload.coins)
    }
}

#[async_trait]
impl PriceSource for CoinGecko {
    async fn current_price(&self, coin_id: &str) -> Result<Price, PriceError> {
        let payload = self.fetch_coin(coin_id).await?;
        usd_price(coin_id, &payload)
    }
}

fn usd_price(coin_id: &str, payload: &CoinPayload) -> Result<Price, PriceError> {
    payload
        .market_data
        .current_price
        .usd
        .map(Price::from_f64)
        .ok_or_else(|| PriceError::Unavailable(format!("{coin_id} has no USD price")))
}
