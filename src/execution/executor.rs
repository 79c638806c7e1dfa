use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{Candle, Signal};

/// Receives actionable signals
///
/// What happens to the order, and what to do when it fails, is up to the
/// implementation. The scheduler only logs a returned error.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn submit(&self, symbol: &str, signal: Signal, candle: &Candle) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: OrderSink + ?Sized> OrderSink for Arc<T> {
    async fn submit(&self, symbol: &str, signal: Signal, candle: &Candle) -> anyhow::Result<()> {
        (**self).submit(symbol, signal, candle).await
    }
}

/// Paper-trading sink: logs what it would do and never touches the exchange
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl OrderSink for DryRunExecutor {
    async fn submit(&self, symbol: &str, signal: Signal, candle: &Candle) -> anyhow::Result<()> {
        if !signal.is_actionable() {
            anyhow::bail!("Refusing to submit a {} signal", signal);
        }

        tracing::info!(
            "  → Would {} {} @ ${:.4} (bar closed {})",
            signal,
            symbol,
            candle.close,
            candle.close_time.format("%Y-%m-%d %H:%M:%S")
        );

        Ok(())
    }
}
