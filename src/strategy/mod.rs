// Trading strategy module
pub mod crossover;
pub mod supertrend;

pub use crossover::decide;
pub use supertrend::{run_pipeline_once, PipelineOutput, SuperTrendConfig, SuperTrendStrategy};

use crate::models::{Candle, Signal};
use crate::Result;

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Generate a trading signal from closed candles, oldest first
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
