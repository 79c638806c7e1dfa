use crate::error::Error;
use crate::models::{Candle, Signal};
use crate::Result;

/// Classify a crossover of the close price through the trend line
///
/// Only the last two candles and the last two trend values are looked at:
/// - `Buy` when the close moves from below the line to above it
/// - `Sell` when it moves from above to below
/// - `Hold` otherwise, including exact ties with the line
///
/// An undefined trend value never produces a signal. NaN or infinity in any
/// of the compared values is reported as `NumericAnomaly`.
pub fn decide(candles: &[Candle], trend_values: &[Option<f64>]) -> Result<Signal> {
    if candles.len() < 2 || trend_values.len() < 2 {
        return Err(Error::InsufficientHistory {
            needed: 2,
            available: candles.len().min(trend_values.len()),
        });
    }

    let prev_close = candles[candles.len() - 2].close;
    let last_close = candles[candles.len() - 1].close;

    let (prev_trend, last_trend) = match (
        trend_values[trend_values.len() - 2],
        trend_values[trend_values.len() - 1],
    ) {
        (Some(prev), Some(last)) => (prev, last),
        _ => {
            tracing::debug!("Trend line undefined on the last two bars, no signal");
            return Ok(Signal::Hold);
        }
    };

    let values = [prev_close, last_close, prev_trend, last_trend];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::NumericAnomaly(format!(
            "non-finite crossover inputs: closes {}/{}, trend {}/{}",
            prev_close, last_close, prev_trend, last_trend
        )));
    }

    let signal = if prev_close < prev_trend && last_close > last_trend {
        Signal::Buy
    } else if prev_close > prev_trend && last_close < last_trend {
        Signal::Sell
    } else {
        Signal::Hold
    };

    Ok(signal)
}
