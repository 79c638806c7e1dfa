// Technical indicators module
// Implements ATR and SuperTrend for volatility-adaptive trend following

pub mod atr;
pub mod supertrend;

pub use atr::{calculate_atr_series, calculate_true_ranges, true_range, AtrPoint, AtrSeries};
pub use supertrend::{calculate_supertrend, SuperTrendPoint, SuperTrendSeries, TrendDirection};
