//! SuperTrend indicator
//!
//! Trend-following overlay built from ATR-scaled bands around the bar
//! mid-price. Final bands only move in the direction that tightens around
//! price, and the trend line sits on the lower band in an uptrend and on the
//! upper band in a downtrend.
//!
//! Every bar depends on the one before it, so the series is computed as a
//! single forward scan with the carried state held in `BandState`.

use crate::error::Error;
use crate::indicators::atr::AtrSeries;
use crate::models::Candle;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
}

/// SuperTrend values for one candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperTrendPoint {
    /// Index into the candle slice, same as the ATR point it was built from
    pub index: usize,
    pub basic_upper: f64,
    pub basic_lower: f64,
    pub final_upper: f64,
    pub final_lower: f64,
    /// None on the first bar, which has no previous state to resolve from
    pub direction: Option<TrendDirection>,
    /// The SuperTrend line; None where the direction is undefined
    pub trend: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuperTrendSeries {
    pub multiplier: f64,
    pub points: Vec<SuperTrendPoint>,
}

impl SuperTrendSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn trend_values(&self) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.trend).collect()
    }

    pub fn final_upper(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.final_upper).collect()
    }

    pub fn final_lower(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.final_lower).collect()
    }

    pub fn last(&self) -> Option<&SuperTrendPoint> {
        self.points.last()
    }
}

/// State carried from one bar to the next
#[derive(Debug, Clone, Copy)]
struct BandState {
    final_upper: f64,
    final_lower: f64,
    close: f64,
    direction: Option<TrendDirection>,
}

/// Calculate SuperTrend over the candles covered by `atr`
///
/// `candles` is the same slice the ATR series was computed from.
pub fn calculate_supertrend(
    candles: &[Candle],
    atr: &AtrSeries,
    multiplier: f64,
) -> Result<SuperTrendSeries> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "SuperTrend multiplier must be positive, got {}",
            multiplier
        )));
    }

    for point in &atr.points {
        match candles.get(point.index) {
            Some(c) if c.open_time == point.open_time => {}
            _ => {
                return Err(Error::InvalidParameter(format!(
                    "ATR point {} does not line up with the candle series",
                    point.index
                )))
            }
        }
    }

    let points = atr
        .points
        .iter()
        .scan(None::<BandState>, |state, atr_point| {
            let candle = &candles[atr_point.index];
            let point = next_point(
                state.as_ref(),
                candle,
                atr_point.index,
                atr_point.value,
                multiplier,
            );

            *state = Some(BandState {
                final_upper: point.final_upper,
                final_lower: point.final_lower,
                close: candle.close,
                direction: point.direction,
            });

            Some(point)
        })
        .collect();

    Ok(SuperTrendSeries { multiplier, points })
}

fn next_point(
    prev: Option<&BandState>,
    candle: &Candle,
    index: usize,
    atr: f64,
    multiplier: f64,
) -> SuperTrendPoint {
    let mid = candle.mid();
    let basic_upper = mid + multiplier * atr;
    let basic_lower = mid - multiplier * atr;

    let Some(prev) = prev else {
        return SuperTrendPoint {
            index,
            basic_upper,
            basic_lower,
            final_upper: basic_upper,
            final_lower: basic_lower,
            direction: None,
            trend: None,
        };
    };

    // Non-finite bands are taken as-is so an ATR anomaly shows up in the
    // trend line instead of being masked by the previous band
    let final_upper = if !basic_upper.is_finite()
        || basic_upper < prev.final_upper
        || prev.close > prev.final_upper
    {
        basic_upper
    } else {
        prev.final_upper
    };

    let final_lower = if !basic_lower.is_finite()
        || basic_lower > prev.final_lower
        || prev.close < prev.final_lower
    {
        basic_lower
    } else {
        prev.final_lower
    };

    // An undefined previous leg resolves as a downtrend
    let direction = match prev.direction.unwrap_or(TrendDirection::Down) {
        TrendDirection::Down if candle.close > final_upper => TrendDirection::Up,
        TrendDirection::Down => TrendDirection::Down,
        TrendDirection::Up if candle.close < final_lower => TrendDirection::Down,
        TrendDirection::Up => TrendDirection::Up,
    };

    let trend = match direction {
        TrendDirection::Up => final_lower,
        TrendDirection::Down => final_upper,
    };

    SuperTrendPoint {
        index,
        basic_upper,
        basic_lower,
        final_upper,
        final_lower,
        direction: Some(direction),
        trend: Some(trend),
    }
}
