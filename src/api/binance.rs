use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::feed::MarketDataSource;
use crate::models::{Interval, RawKline};

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 1200;
const MAX_KLINE_LIMIT: usize = 1000;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the Binance spot REST API (public market data only)
///
/// Does not retry on its own; a failed call is returned to the caller.
/// Clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE, DEFAULT_REQUESTS_PER_MINUTE)
    }

    /// Create a client against a custom endpoint (testnet, mirror, mock server)
    pub fn with_base_url(base_url: impl Into<String>, requests_per_minute: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let rpm = NonZeroU32::new(requests_per_minute)
            .context("requests_per_minute must be greater than zero")?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    /// Get kline rows, oldest first
    /// Endpoint: GET /api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}
    ///
    /// Numeric JSON fields (times, trade count) are turned into strings so every
    /// row has the same all-string shape.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<RawKline>> {
        let limit = limit.clamp(1, MAX_KLINE_LIMIT);
        let url = format!("{}/api/v3/klines", self.base_url);

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", interval.as_str().to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Binance API error ({}): {}", status, error_text);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to decode klines response")?;

        let rows = body
            .as_array()
            .context("Klines response is not an array")?
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.as_array()
                    .map(|fields| fields.iter().map(field_to_string).collect())
                    .with_context(|| format!("Kline row {} is not an array", i))
            })
            .collect::<Result<Vec<RawKline>>>()?;

        tracing::debug!(
            symbol = %symbol,
            interval = %interval,
            rows = rows.len(),
            "Fetched klines"
        );

        Ok(rows)
    }
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<RawKline>> {
        self.get_klines(symbol, interval, limit).await
    }
}

fn field_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
