//! Random-key sampling: per-type samplers, the run loop and the
//! multi-instance driver built on top of it.

pub mod engine;
pub mod fleet;
pub mod progress;
pub mod types;

pub use engine::{key_count, progress_interval, random_key, run, run_with};
pub use fleet::{
    sample_connected, sample_fleet, sample_instance, FailurePolicy, FleetSummary,
    InstanceFailure, InstanceSample,
};
pub use progress::{BarProgress, LogProgress, Progress, Silent};
pub use types::{sample_key, SampledKey};
