use thiserror::Error;

/// Errors raised by the signal pipeline.
///
/// Only `FetchFailure` is ever retried (by the scheduler). Everything else
/// fails fast and is handled by the caller skipping the pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A raw kline row could not be parsed
    #[error("Malformed row {row}: field `{field}` has invalid value {value:?}")]
    MalformedRow {
        row: usize,
        field: &'static str,
        value: String,
    },

    /// Not enough candles (or trend values) to compute anything meaningful
    #[error("Insufficient history: need {needed}, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    /// Transient market data failure
    #[error("Fetch failure: {0}")]
    FetchFailure(String),

    /// NaN or infinity reached a comparison
    #[error("Numeric anomaly: {0}")]
    NumericAnomaly(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
