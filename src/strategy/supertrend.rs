use serde::{Deserialize, Serialize};

use super::{crossover::decide, Strategy};
use crate::error::Error;
use crate::indicators::{calculate_atr_series, calculate_supertrend, AtrSeries, SuperTrendSeries};
use crate::models::{Candle, Signal};
use crate::Result;

/// Parameters for the SuperTrend crossover
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperTrendConfig {
    pub atr_period: usize,
    pub multiplier: f64,
}

impl Default for SuperTrendConfig {
    fn default() -> Self {
        Self {
            atr_period: 10,
            multiplier: 3.0,
        }
    }
}

impl SuperTrendConfig {
    pub fn validate(&self) -> Result<()> {
        if self.atr_period == 0 {
            return Err(Error::InvalidParameter("atr_period must be positive".to_string()));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "multiplier must be positive, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }

    /// Closed candles needed before the crossover has two defined trend
    /// values to compare
    ///
    /// `atr_period` bars seed the ATR, the first ATR bar has no trend yet, and
    /// two more bars carry the compared trend values.
    pub fn min_candles_required(&self) -> usize {
        self.atr_period + 3
    }
}

/// Everything one pipeline pass produced
///
/// The ATR and SuperTrend series are kept so callers can log or inspect the
/// numbers behind the signal.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub signal: Signal,
    pub atr: AtrSeries,
    pub supertrend: SuperTrendSeries,
}

impl PipelineOutput {
    /// Latest defined SuperTrend value
    pub fn last_trend(&self) -> Option<f64> {
        self.supertrend.last().and_then(|p| p.trend)
    }
}

/// Run ATR -> SuperTrend -> crossover over closed candles, oldest first
pub fn run_pipeline_once(candles: &[Candle], config: &SuperTrendConfig) -> Result<PipelineOutput> {
    config.validate()?;

    let needed = config.min_candles_required();
    if candles.len() < needed {
        return Err(Error::InsufficientHistory {
            needed,
            available: candles.len(),
        });
    }

    let atr = calculate_atr_series(candles, config.atr_period)?;
    let supertrend = calculate_supertrend(candles, &atr, config.multiplier)?;
    let signal = decide(atr.aligned_candles(candles), &supertrend.trend_values())?;

    if let (Some(last), Some(point)) = (candles.last(), supertrend.last()) {
        tracing::debug!(
            "SuperTrend: close={:.4}, ATR={:.4}, upper={:.4}, lower={:.4}, trend={:?}, direction={:?}",
            last.close,
            atr.last().unwrap_or(f64::NAN),
            point.final_upper,
            point.final_lower,
            point.trend,
            point.direction
        );
    }

    Ok(PipelineOutput {
        signal,
        atr,
        supertrend,
    })
}

/// SuperTrend crossover strategy
///
/// Buys when the close crosses above the SuperTrend line and sells when it
/// crosses below. The whole history is recomputed on every call.
#[derive(Debug, Clone, Default)]
pub struct SuperTrendStrategy {
    config: SuperTrendConfig,
}

impl SuperTrendStrategy {
    pub fn new(config: SuperTrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SuperTrendConfig {
        &self.config
    }

    /// Like `generate_signal` but keeps the indicator series
    pub fn evaluate(&self, candles: &[Candle]) -> Result<PipelineOutput> {
        run_pipeline_once(candles, &self.config)
    }
}

impl Strategy for SuperTrendStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal> {
        Ok(self.evaluate(candles)?.signal)
    }

    fn name(&self) -> &str {
        "SuperTrendStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.config.min_candles_required()
    }
}
