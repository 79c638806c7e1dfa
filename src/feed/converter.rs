use chrono::{DateTime, TimeZone, Utc};

use crate::error::Error;
use crate::models::{Candle, RawKline};
use crate::Result;

const FIELD_NAMES: [&str; 11] = [
    "open_time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "close_time",
    "asset_volume",
    "trade_count",
    "buy_base_volume",
    "buy_asset_volume",
];

/// Convert raw kline rows into closed candles, oldest first
///
/// Malformed rows are skipped with a warning rather than failing the batch,
/// so one corrupt row cannot poison the series. So are rows that do not open
/// strictly after the last kept candle (duplicates, out-of-order bars). Bars
/// whose close time is after `now` are still forming and are dropped.
pub fn convert_rows_to_candles(rows: &[RawKline], now: DateTime<Utc>) -> Vec<Candle> {
    let mut candles: Vec<Candle> = Vec::with_capacity(rows.len());

    for (i, result) in parse_rows(rows).into_iter().enumerate() {
        let candle = match result {
            Ok(candle) => candle,
            Err(e) => {
                tracing::warn!("Skipping kline row: {}", e);
                continue;
            }
        };

        if let Some(prev) = candles.last() {
            if candle.open_time <= prev.open_time {
                tracing::warn!(
                    "Skipping kline row {}: opens at {}, not after previous bar at {}",
                    i,
                    candle.open_time,
                    prev.open_time
                );
                continue;
            }
        }

        candles.push(candle);
    }

    retain_closed(candles, now)
}

/// Parse every row, keeping a per-row result
pub fn parse_rows(rows: &[RawKline]) -> Vec<Result<Candle>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| parse_row(i, row))
        .collect()
}

/// Drop candles that have not closed yet
pub fn retain_closed(mut candles: Vec<Candle>, now: DateTime<Utc>) -> Vec<Candle> {
    let before = candles.len();
    candles.retain(|c| c.is_closed(now));

    let dropped = before - candles.len();
    if dropped > 0 {
        tracing::debug!("Dropped {} unclosed candle(s)", dropped);
    }

    candles
}

fn parse_row(index: usize, row: &RawKline) -> Result<Candle> {
    if row.len() < FIELD_NAMES.len() {
        return Err(Error::MalformedRow {
            row: index,
            field: "row",
            value: format!("{} fields", row.len()),
        });
    }

    let price = |i: usize| parse_f64(index, i, &row[i]);
    let time = |i: usize| parse_time(index, i, &row[i]);

    let candle = Candle {
        open_time: time(0)?,
        open: price(1)?,
        high: price(2)?,
        low: price(3)?,
        close: price(4)?,
        volume: price(5)?,
        close_time: time(6)?,
        asset_volume: price(7)?,
        trade_count: row[8].trim().parse().map_err(|_| malformed(index, 8, &row[8]))?,
        buy_base_volume: price(9)?,
        buy_asset_volume: price(10)?,
    };

    // low <= open, close <= high
    let in_range = |p: f64| candle.low <= p && p <= candle.high;
    if !in_range(candle.open) || !in_range(candle.close) {
        return Err(malformed(index, 2, &row[2]));
    }

    Ok(candle)
}

fn parse_f64(row: usize, field: usize, raw: &str) -> Result<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(malformed(row, field, raw)),
    }
}

fn parse_time(row: usize, field: usize, raw: &str) -> Result<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| malformed(row, field, raw))
}

fn malformed(row: usize, field: usize, raw: &str) -> Error {
    Error::MalformedRow {
        row,
        field: FIELD_NAMES[field],
        value: raw.to_string(),
    }
}
