use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};
use chrono::{TimeZone, Utc};
use trendbot::execution::{
    Clock, DecisionLog, OrderSink, RetryPolicy, Scheduler, SchedulerConfig,
};
use trendbot::feed::MarketDataSource;
use trendbot::strategy::SuperTrendConfig;
use trendbot::{Candle, Error, Interval, RawKline, Signal};

/// Serves a fixed set of rows after failing a configurable number of times
struct FlakySource {
    rows: Vec<RawKline>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    fetched_at: Mutex<Vec<Instant>>,
}

impl FlakySource {
    fn new(rows: Vec<RawKline>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            rows,
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            fetched_at: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for FlakySource {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        _interval: Interval,
        _limit: usize,
    ) -> anyhow::Result<Vec<RawKline>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fetched_at.lock().unwrap().push(Instant::now());
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("connection reset");
        }
        Ok(self.rows.clone())
    }
}

#[derive(Default)]
struct RecordingSink {
    orders: Mutex<Vec<(String, Signal, f64)>>,
}

#[async_trait]
impl OrderSink for RecordingSink {
    async fn submit(&self, symbol: &str, signal: Signal, candle: &Candle) -> anyhow::Result<()> {
        self.orders
            .lock()
            .unwrap()
            .push((symbol.to_string(), signal, candle.close));
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl OrderSink for FailingSink {
    async fn submit(&self, _: &str, _: Signal, _: &Candle) -> anyhow::Result<()> {
        anyhow::bail!("exchange rejected order")
    }
}

#[derive(Default)]
struct RecordingLog {
    lines: Mutex<Vec<String>>,
}

impl DecisionLog for RecordingLog {
    fn record(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

fn raw_row(i: i64, ohlc: (f64, f64, f64, f64)) -> RawKline {
    let open_ms = 1_619_827_200_000 + i * 900_000;
    let (open, high, low, close) = ohlc;
    vec![
        open_ms.to_string(),
        open.to_string(),
        high.to_string(),
        low.to_string(),
        close.to_string(),
        "1000".to_string(),
        (open_ms + 899_999).to_string(),
        "0".to_string(),
        "10".to_string(),
        "0".to_string(),
        "0".to_string(),
        "0".to_string(),
    ]
}

/// Flat range then a breakout bar: yields BUY with a 2-period ATR
fn breakout_rows() -> Vec<RawKline> {
    let mut rows: Vec<_> = (0..6)
        .map(|i| raw_row(i, (100.0, 101.0, 99.0, 100.0)))
        .collect();
    rows.push(raw_row(6, (110.0, 120.0, 110.0, 119.0)));
    rows
}

fn flat_rows() -> Vec<RawKline> {
    (0..8)
        .map(|i| raw_row(i, (100.0, 101.0, 99.0, 100.0)))
        .collect()
}

/// Wall clock that starts at `start_ms` and follows tokio's (paused) clock
fn clock_starting_at(start_ms: i64) -> Clock {
    let origin = Instant::now();
    let wall = Utc.timestamp_millis_opt(start_ms).unwrap();
    Arc::new(move || wall + chrono::Duration::from_std(origin.elapsed()).unwrap())
}

fn config(max_attempts: Option<u32>) -> SchedulerConfig {
    SchedulerConfig {
        symbol: "BTCUSDT".to_string(),
        interval: Interval::FifteenMinutes,
        candle_limit: 50,
        strategy: SuperTrendConfig {
            atr_period: 2,
            multiplier: 3.0,
        },
        retry: RetryPolicy {
            delay: Duration::from_secs(5),
            max_attempts,
        },
    }
}

#[tokio::test(start_paused = true)]
async fn test_pass_dispatches_buy() {
    let source = FlakySource::new(breakout_rows(), 0);
    let sink = Arc::new(RecordingSink::default());
    let log = Arc::new(RecordingLog::default());
    let scheduler = Scheduler::new(source.clone(), sink.clone(), log.clone(), config(None));

    let signal = scheduler.run_pass().await.unwrap();

    assert_eq!(signal, Signal::Buy);
    assert_eq!(
        *sink.orders.lock().unwrap(),
        vec![("BTCUSDT".to_string(), Signal::Buy, 119.0)]
    );

    let lines = log.lines.lock().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("BUY"));
    assert!(lines[0].contains("close=119"));
}

#[tokio::test(start_paused = true)]
async fn test_hold_is_logged_but_not_dispatched() {
    let source = FlakySource::new(flat_rows(), 0);
    let sink = Arc::new(RecordingSink::default());
    let log = Arc::new(RecordingLog::default());
    let scheduler = Scheduler::new(source, sink.clone(), log.clone(), config(None));

    assert_eq!(scheduler.run_pass().await, Ok(Signal::Hold));
    assert!(sink.orders.lock().unwrap().is_empty());
    assert!(log.lines.lock().unwrap()[0].contains("NONE"));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_retried_with_fixed_backoff() {
    let source = FlakySource::new(breakout_rows(), 3);
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(
        source.clone(),
        sink.clone(),
        Arc::new(RecordingLog::default()),
        config(None),
    );

    let started = Instant::now();
    let signal = scheduler.run_pass().await.unwrap();

    assert_eq!(signal, Signal::Buy);
    assert_eq!(source.calls(), 4);
    assert_eq!(started.elapsed(), Duration::from_secs(15));
    assert_eq!(sink.orders.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_retry_gives_fetch_failure() {
    let source = FlakySource::new(breakout_rows(), usize::MAX);
    let sink = Arc::new(RecordingSink::default());
    let log = Arc::new(RecordingLog::default());
    let scheduler = Scheduler::new(source.clone(), sink.clone(), log.clone(), config(Some(3)));

    let result = scheduler.run_pass().await;

    assert!(matches!(result, Err(Error::FetchFailure(_))));
    assert_eq!(source.calls(), 3);
    assert!(sink.orders.lock().unwrap().is_empty());
    assert!(log.lines.lock().unwrap()[0].contains("fetch failed"));
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_history_skips_pass() {
    let source = FlakySource::new(breakout_rows()[..3].to_vec(), 0);
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(
        source,
        sink.clone(),
        Arc::new(RecordingLog::default()),
        config(None),
    );

    let result = scheduler.run_pass().await;

    assert!(matches!(result, Err(Error::InsufficientHistory { .. })));
    assert!(sink.orders.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_order_sink_failure_is_not_retried() {
    let source = FlakySource::new(breakout_rows(), 0);
    let scheduler = Scheduler::new(
        source.clone(),
        FailingSink,
        Arc::new(RecordingLog::default()),
        config(None),
    );

    assert_eq!(scheduler.run_pass().await, Ok(Signal::Buy));
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_polls_once_per_interval() {
    let source = FlakySource::new(breakout_rows(), 0);
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Scheduler::new(
        source.clone(),
        sink.clone(),
        Arc::new(RecordingLog::default()),
        config(None),
    );

    // Bars in the fixture are long closed, so the first pass runs at once,
    // then at +15m and +30m before shutdown at +40m
    scheduler
        .run(tokio::time::sleep(Duration::from_secs(40 * 60)))
        .await;

    // One alignment fetch plus three passes
    assert_eq!(source.calls(), 4);
    assert_eq!(sink.orders.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_backoff_without_signal() {
    let source = FlakySource::new(breakout_rows(), usize::MAX);
    let sink = Arc::new(RecordingSink::default());
    let log = Arc::new(RecordingLog::default());
    let scheduler = Scheduler::new(source.clone(), sink.clone(), log.clone(), config(None));

    scheduler
        .run(tokio::time::sleep(Duration::from_secs(12)))
        .await;

    // Attempts at 0s, 5s and 10s, then shutdown during the next backoff
    assert_eq!(source.calls(), 3);
    assert!(sink.orders.lock().unwrap().is_empty());
    assert!(log.lines.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_first_pass_waits_for_open_bar_to_close() {
    let mut rows = breakout_rows();
    rows.push(raw_row(7, (119.0, 119.0, 119.0, 119.0)));
    let newest_close_ms = 1_619_827_200_000 + 7 * 900_000 + 899_999;

    let source = FlakySource::new(rows, 0);
    let log = Arc::new(RecordingLog::default());
    let scheduler = Scheduler::new(
        source.clone(),
        Arc::new(RecordingSink::default()),
        log.clone(),
        config(None),
    )
    .with_clock(clock_starting_at(newest_close_ms - 10 * 60 * 1000));

    let started = Instant::now();
    scheduler
        .run(tokio::time::sleep(Duration::from_secs(12 * 60)))
        .await;

    // Alignment fetch at start, first pass once the open bar has closed
    let offsets: Vec<_> = source
        .fetched_at
        .lock()
        .unwrap()
        .iter()
        .map(|t| t.duration_since(started))
        .collect();
    assert_eq!(offsets, vec![Duration::ZERO, Duration::from_secs(600)]);
    assert_eq!(log.lines.lock().unwrap().len(), 1);
}
