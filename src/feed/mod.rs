// Market data input: where raw klines come from and how they become candles
pub mod converter;

pub use converter::{convert_rows_to_candles, parse_rows, retain_closed};

use crate::models::{Interval, RawKline};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of raw kline rows, most recent last
///
/// Calls may fail transiently and must be safe to retry.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> anyhow::Result<Vec<RawKline>>;
}

#[async_trait]
impl<T: MarketDataSource + ?Sized> MarketDataSource for Arc<T> {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> anyhow::Result<Vec<RawKline>> {
        (**self).fetch_candles(symbol, interval, limit).await
    }
}
