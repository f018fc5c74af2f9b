//! Built-in handler chain members.

pub mod caller;
pub mod stats;

pub use caller::Caller;
pub use stats::{BucketUsage, ClientUsage, StatsError, StatsHandler, StatsReport, GLOBAL_LABEL};
