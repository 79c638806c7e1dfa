//! Average True Range (ATR) indicator
//!
//! Measures market volatility by calculating the average of true ranges over a period.
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! Uses Wilder's smoothing: the first ATR is the simple mean of the first
//! `period` true ranges, then `atr = atr + (tr - atr) / period`.

use crate::error::Error;
use crate::models::Candle;
use crate::Result;
use chrono::{DateTime, Utc};

/// One ATR value, tagged with the candle it describes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrPoint {
    /// Index into the candle slice the series was computed from
    pub index: usize,
    pub open_time: DateTime<Utc>,
    pub value: f64,
}

/// ATR values for candles `period..len`
///
/// The k-th point always describes candle `period + k`.
#[derive(Debug, Clone, PartialEq)]
pub struct AtrSeries {
    pub period: usize,
    pub points: Vec<AtrPoint>,
}

impl AtrSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn last(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    /// The candles this series has values for
    pub fn aligned_candles<'a>(&self, candles: &'a [Candle]) -> &'a [Candle] {
        match self.points.first() {
            Some(first) => &candles[first.index..first.index + self.points.len()],
            None => &[],
        }
    }
}

/// True range of `candle` given the previous close
pub fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    (candle.high - candle.low)
        .max((candle.high - prev_close).abs())
        .max((candle.low - prev_close).abs())
}

/// True ranges for candles `1..len`; candle 0 has none
///
/// `result[i - 1]` is the true range of candle `i`.
pub fn calculate_true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect()
}

/// Calculate the full ATR series
///
/// Returns an empty series when `candles.len() <= period`.
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Result<AtrSeries> {
    if period == 0 {
        return Err(Error::InvalidParameter("ATR period must be positive".to_string()));
    }

    let mut series = AtrSeries {
        period,
        points: Vec::new(),
    };

    if candles.len() <= period {
        return Ok(series);
    }

    let true_ranges = calculate_true_ranges(candles);
    let period_f = period as f64;

    // First ATR is simple average of first 'period' true ranges
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period_f;
    series.points.push(AtrPoint {
        index: period,
        open_time: candles[period].open_time,
        value: atr,
    });

    // Wilder's smoothing for subsequent values
    for (offset, tr) in true_ranges[period..].iter().enumerate() {
        let index = period + 1 + offset;
        atr += (tr - atr) / period_f;
        series.points.push(AtrPoint {
            index,
            open_time: candles[index].open_time,
            value: atr,
        });
    }

    Ok(series)
}
