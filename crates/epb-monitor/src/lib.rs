//! Performance monitoring for EddyPro runs
//!
//! A [`PerformanceMonitor`] samples system metrics, and those of one child
//! process when given its pid, on a background thread. Stopping it writes a
//! per-sample CSV and a JSON summary with min, max, mean and percentiles per
//! field.
//!
//! - [`MonitorConfig`]: interval, output directory and scenario suffix
//! - [`MetricsSource`]: where samples come from; [`SysinfoSource`] by default
//! - [`MonitorState`]: `Idle -> Monitoring -> Stopped`, restartable

#![warn(unreachable_pub)]

pub mod error;
pub mod monitor;
pub mod sample;
pub mod source;
pub mod state;
pub mod stats;

pub use error::MonitorError;
pub use monitor::{
    MonitorConfig, MonitorSummary, PerformanceMonitor, SummaryConfig, SummaryReport,
    SummarySamples, SummaryTiming, DEFAULT_INTERVAL, MIN_INTERVAL,
};
pub use sample::{MonitorSample, ProcessMetrics, SystemMetrics};
pub use source::{MetricsSource, SysinfoSource};
pub use state::{allowed_transitions, validate_transition, MonitorState};
pub use stats::{compute_stats, percentile, FieldStats};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for monitoring a run
    pub use crate::{MonitorConfig, MonitorError, MonitorSummary, PerformanceMonitor};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
