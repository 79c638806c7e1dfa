use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};
use uuid::Uuid;

use super::{DecisionLog, OrderSink};
use crate::error::Error;
use crate::feed::{convert_rows_to_candles, parse_rows, MarketDataSource};
use crate::models::{Interval, RawKline, Signal};
use crate::strategy::{SuperTrendConfig, SuperTrendStrategy};
use crate::Result;

/// How failed fetches are retried within one pass
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// None keeps trying until the fetch succeeds or the bot shuts down
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    fn attempt_limit(&self) -> u32 {
        self.max_attempts.unwrap_or(u32::MAX).max(1)
    }
}

/// Wall-clock source used to tell closed bars from the one still forming
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub symbol: String,
    pub interval: Interval,
    /// Rows requested per fetch
    pub candle_limit: usize,
    pub strategy: SuperTrendConfig,
    pub retry: RetryPolicy,
}

/// Drives one pipeline pass per bar close
///
/// Passes never overlap: the next tick is only awaited once the current pass
/// (including any fetch retries) is done, and ticks missed meanwhile are
/// skipped rather than bunched up.
pub struct Scheduler<S, O, L> {
    source: S,
    orders: O,
    log: L,
    config: SchedulerConfig,
    strategy: SuperTrendStrategy,
    clock: Clock,
}

impl<S, O, L> Scheduler<S, O, L>
where
    S: MarketDataSource,
    O: OrderSink,
    L: DecisionLog,
{
    pub fn new(source: S, orders: O, log: L, config: SchedulerConfig) -> Self {
        let strategy = SuperTrendStrategy::new(config.strategy);
        Self {
            source,
            orders,
            log,
            config,
            strategy,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the system wall clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run until `shutdown` resolves
    ///
    /// Waits and fetch backoffs in flight when shutdown arrives are abandoned
    /// without emitting anything.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let period = self.config.interval.period();
        let first_pass_at = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown before first pass");
                return;
            }
            at = self.first_pass_instant() => at,
        };

        tracing::info!(
            "📈 {} {} passes every {:?}, first in {:?}",
            self.config.symbol,
            self.config.interval,
            period,
            first_pass_at.saturating_duration_since(Instant::now())
        );

        let mut ticker = interval_at(first_pass_at, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            let rows = tokio::select! {
                _ = &mut shutdown => break,
                rows = self.fetch_with_retry() => rows,
            };

            if let Err(e) = self.process(rows).await {
                tracing::warn!("  → Pass skipped: {}", e);
            }
        }

        tracing::info!("Scheduler for {} stopped", self.config.symbol);
    }

    /// Fetch, compute and dispatch once
    pub async fn run_pass(&self) -> Result<Signal> {
        let rows = self.fetch_with_retry().await;
        self.process(rows).await
    }

    /// When the first pass should run: at the close of the newest bar if it
    /// is still forming, otherwise right away
    async fn first_pass_instant(&self) -> Instant {
        match self.fetch_with_retry().await {
            Ok(rows) => match delay_until_close(&rows, (self.clock)()) {
                Some(wait) => {
                    tracing::info!("Current bar still open, aligning to its close in {:?}", wait);
                    Instant::now() + wait
                }
                None => Instant::now(),
            },
            Err(e) => {
                tracing::warn!("Could not align to bar close ({}), starting now", e);
                Instant::now()
            }
        }
    }

    async fn fetch_with_retry(&self) -> Result<Vec<RawKline>> {
        let retry = &self.config.retry;
        let limit = retry.attempt_limit();
        let mut last_error = String::new();

        for attempt in 1..=limit {
            match self
                .source
                .fetch_candles(
                    &self.config.symbol,
                    self.config.interval,
                    self.config.candle_limit,
                )
                .await
            {
                Ok(rows) => {
                    if attempt > 1 {
                        tracing::info!(
                            "✓ Fetched {} after {} attempts",
                            self.config.symbol,
                            attempt
                        );
                    }
                    return Ok(rows);
                }
                Err(e) => {
                    last_error = format!("{:#}", e);
                    if attempt < limit {
                        tracing::warn!(
                            "Fetch attempt {} failed for {}: {}. Retrying in {:?}...",
                            attempt,
                            self.config.symbol,
                            last_error,
                            retry.delay
                        );
                        sleep(retry.delay).await;
                    }
                }
            }
        }

        Err(Error::FetchFailure(format!(
            "{} after {} attempts: {}",
            self.config.symbol, limit, last_error
        )))
    }

    async fn process(&self, rows: Result<Vec<RawKline>>) -> Result<Signal> {
        let pass_id = Uuid::new_v4();
        let symbol = &self.config.symbol;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                self.log
                    .record(&format!("[{}] {} fetch failed: {}", pass_id, symbol, e));
                return Err(e);
            }
        };

        let candles = convert_rows_to_candles(&rows, (self.clock)());

        let output = match self.strategy.evaluate(&candles) {
            Ok(output) => output,
            Err(e) => {
                self.log
                    .record(&format!("[{}] {} no decision: {}", pass_id, symbol, e));
                return Err(e);
            }
        };

        // evaluate() only succeeds with at least two candles
        let Some(candle) = candles.last() else {
            return Err(Error::InsufficientHistory {
                needed: self.strategy.config().min_candles_required(),
                available: 0,
            });
        };

        let trend = output
            .last_trend()
            .map(|t| format!("{:.4}", t))
            .unwrap_or_else(|| "undefined".to_string());

        tracing::info!(
            "💹 {} {} close=${:.4} trend={} → {}",
            symbol,
            self.config.interval,
            candle.close,
            trend,
            output.signal
        );

        self.log.record(&format!(
            "[{}] {} {} {} close={} trend={} | {}",
            pass_id,
            symbol,
            self.config.interval,
            output.signal,
            candle.close,
            trend,
            candle
        ));

        if output.signal.is_actionable() {
            if let Err(e) = self.orders.submit(symbol, output.signal, candle).await {
                tracing::error!("  ✗ Order sink rejected {} {}: {:#}", output.signal, symbol, e);
            }
        }

        Ok(output.signal)
    }
}

/// Time left until the newest row's bar closes, if it is still open
pub fn delay_until_close(rows: &[RawKline], now: DateTime<Utc>) -> Option<Duration> {
    let last = parse_rows(rows).into_iter().rev().find_map(|r| r.ok())?;
    (last.close_time - now).to_std().ok().filter(|d| !d.is_zero())
}
