use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::time::Duration;

use crate::api::binance::{BINANCE_API_BASE, DEFAULT_REQUESTS_PER_MINUTE};
use crate::execution::{RetryPolicy, SchedulerConfig};
use crate::models::Interval;
use crate::strategy::SuperTrendConfig;

const DEFAULT_CONFIG_FILE: &str = "trendbot.toml";
const ENV_PREFIX: &str = "TRENDBOT";

/// Bot settings
///
/// Layered as: built-in defaults, then `trendbot.toml` (optional), then
/// `TRENDBOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub symbol: String,
    pub interval: Interval,
    pub candle_limit: usize,
    pub atr_period: usize,
    pub multiplier: f64,
    pub retry_delay_secs: u64,
    pub max_fetch_attempts: Option<u32>,
    pub api_base_url: String,
    pub requests_per_minute: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: Interval::FifteenMinutes,
            candle_limit: 100,
            atr_period: 10,
            multiplier: 3.0,
            retry_delay_secs: 5,
            max_fetch_attempts: None,
            api_base_url: BINANCE_API_BASE.to_string(),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the environment
    ///
    /// An explicitly given path must exist; the default file may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            anyhow::bail!("symbol must not be empty");
        }

        self.strategy()
            .validate()
            .context("Invalid strategy settings")?;

        let min_limit = self.min_candle_limit();
        if self.candle_limit < min_limit {
            anyhow::bail!(
                "candle_limit ({}) must be at least {} for ATR({}) to produce a signal",
                self.candle_limit,
                min_limit,
                self.atr_period
            );
        }

        if self.requests_per_minute == 0 {
            anyhow::bail!("requests_per_minute must be greater than zero");
        }

        Ok(())
    }

    /// Smallest fetch that can still yield a decision: the strategy's closed
    /// candles plus the newest row, which is usually still forming
    pub fn min_candle_limit(&self) -> usize {
        self.strategy().min_candles_required() + 1
    }

    pub fn strategy(&self) -> SuperTrendConfig {
        SuperTrendConfig {
            atr_period: self.atr_period,
            multiplier: self.multiplier,
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_secs(self.retry_delay_secs),
            max_attempts: self.max_fetch_attempts,
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            symbol: self.symbol.to_uppercase(),
            interval: self.interval,
            candle_limit: self.candle_limit,
            strategy: self.strategy(),
            retry: self.retry(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::convert_rows_to_candles;
    use crate::models::{RawKline, Signal};
    use crate::strategy::run_pipeline_once;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

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

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.interval, Interval::FifteenMinutes);
        assert_eq!(settings.strategy(), SuperTrendConfig::default());
        assert_eq!(settings.retry(), RetryPolicy::default());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("trendbot-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "symbol = \"ethusdt\"\ninterval = \"1h\"\natr_period = 14\nmultiplier = 2.5\nmax_fetch_attempts = 4"
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.interval, Interval::OneHour);
        assert_eq!(settings.atr_period, 14);
        assert_eq!(settings.multiplier, 2.5);
        assert_eq!(settings.candle_limit, 100);
        assert_eq!(settings.retry().max_attempts, Some(4));
        assert_eq!(settings.scheduler().symbol, "ETHUSDT");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let path = std::env::temp_dir().join("trendbot-does-not-exist.toml");
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_candle_limit_must_cover_period() {
        let settings = Settings::default();
        assert_eq!(settings.min_candle_limit(), 14);

        for candle_limit in [11, 12, 13] {
            let settings = Settings {
                candle_limit,
                ..Settings::default()
            };
            assert!(settings.validate().is_err(), "limit {}", candle_limit);
        }
    }

    #[test]
    fn test_minimum_candle_limit_can_signal() {
        let settings = Settings {
            candle_limit: Settings::default().min_candle_limit(),
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());

        // Flat range, a breakout on the last closed bar, then the forming bar
        let n = settings.candle_limit as i64;
        let mut rows: Vec<_> = (0..n - 2)
            .map(|i| raw_row(i, (100.0, 101.0, 99.0, 100.0)))
            .collect();
        rows.push(raw_row(n - 2, (100.0, 125.0, 100.0, 124.0)));
        rows.push(raw_row(n - 1, (124.0, 124.0, 124.0, 124.0)));

        // Partway through the forming bar
        let now = Utc
            .timestamp_millis_opt(1_619_827_200_000 + (n - 1) * 900_000 + 60_000)
            .unwrap();
        let candles = convert_rows_to_candles(&rows, now);
        assert_eq!(candles.len(), settings.candle_limit - 1);

        let output = run_pipeline_once(&candles, &settings.strategy()).unwrap();
        assert_eq!(output.signal, Signal::Buy);
    }

    #[test]
    fn test_zero_period_rejected() {
        let settings = Settings {
            atr_period: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
