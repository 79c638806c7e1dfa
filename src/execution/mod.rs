// Signal dispatch and the polling loop
pub mod decision_log;
pub mod executor;
pub mod scheduler;

pub use decision_log::{DecisionLog, TracingDecisionLog};
pub use executor::{DryRunExecutor, OrderSink};
pub use scheduler::{delay_until_close, Clock, RetryPolicy, Scheduler, SchedulerConfig};
