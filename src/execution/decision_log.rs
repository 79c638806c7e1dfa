use std::sync::Arc;

/// Fire-and-forget record of every decision the bot makes
pub trait DecisionLog: Send + Sync {
    fn record(&self, line: &str);
}

impl<T: DecisionLog + ?Sized> DecisionLog for Arc<T> {
    fn record(&self, line: &str) {
        (**self).record(line)
    }
}

/// Writes decisions to the `trendbot::decisions` tracing target
#[derive(Debug, Clone, Default)]
pub struct TracingDecisionLog;

impl DecisionLog for TracingDecisionLog {
    fn record(&self, line: &str) {
        tracing::info!(target: "trendbot::decisions", "{}", line);
    }
}
