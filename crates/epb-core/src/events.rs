//! Batch lifecycle events
//!
//! Executors report progress through an [`EventSink`] passed in by the
//! caller. [`TracingSink`] forwards to `tracing`; [`EventLog`] keeps events
//! in memory for inspection.

use parking_lot::Mutex;
use serde::Serialize;

/// Lifecycle event of a batch run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Batch accepted its work list
    BatchStarted {
        /// Site being processed
        site_id: String,
        /// Years in processing order
        years: Vec<i32>,
        /// Scenarios per year, `1` for a baseline run
        scenarios_per_year: usize,
    },
    /// A scenario began preparation
    ScenarioStarted {
        /// Processing year
        year: i32,
        /// 1-based scenario index
        index: usize,
        /// Scenario suffix, empty for baseline
        suffix: String,
    },
    /// One EddyPro stage finished
    PipelineStage {
        /// Processing year
        year: i32,
        /// Scenario suffix
        suffix: String,
        /// Stage name (`rp` or `fcc`)
        stage: String,
        /// Exit code of the stage
        return_code: i32,
    },
    /// A scenario ended, successfully or not
    ScenarioFinished {
        /// Processing year
        year: i32,
        /// 1-based scenario index
        index: usize,
        /// Scenario suffix
        suffix: String,
        /// Whether every step succeeded
        success: bool,
        /// Wall-clock duration
        duration_seconds: f64,
        /// Captured error, if any
        error: Option<String>,
    },
    /// Every scenario of the batch ended
    BatchFinished {
        /// Successful scenarios
        successful: usize,
        /// Failed scenarios
        failed: usize,
    },
}

/// Receiver of [`BatchEvent`]s
pub trait EventSink: Send + Sync {
    /// Record one event
    fn emit(&self, event: BatchEvent);
}

/// Sink that logs events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: BatchEvent) {
        match event {
            BatchEvent::BatchStarted {
                site_id,
                years,
                scenarios_per_year,
            } => tracing::info!(
                site_id = %site_id,
                "Processing {} year(s) {:?} with {} scenario(s) each",
                years.len(),
                years,
                scenarios_per_year
            ),
            BatchEvent::ScenarioStarted { year, index, suffix } => tracing::info!(
                year,
                index,
                "Starting scenario {}",
                display_suffix(&suffix)
            ),
            BatchEvent::PipelineStage {
                year,
                suffix,
                stage,
                return_code,
            } => tracing::debug!(
                year,
                stage = %stage,
                return_code,
                "Stage eddypro_{} finished for {}",
                stage,
                display_suffix(&suffix)
            ),
            BatchEvent::ScenarioFinished {
                year,
                index,
                suffix,
                success: true,
                duration_seconds,
                ..
            } => tracing::info!(
                year,
                index,
                "Scenario {} completed in {:.1}s",
                display_suffix(&suffix),
                duration_seconds
            ),
            BatchEvent::ScenarioFinished {
                year,
                index,
                suffix,
                error,
                ..
            } => tracing::error!(
                year,
                index,
                "Scenario {} failed: {}",
                display_suffix(&suffix),
                error.as_deref().unwrap_or("unknown error")
            ),
            BatchEvent::BatchFinished { successful, failed } => tracing::info!(
                "Batch processing completed: {} successful, {} failed",
                successful,
                failed
            ),
        }
    }
}

fn display_suffix(suffix: &str) -> &str {
    if suffix.is_empty() {
        "baseline"
    } else {
        suffix
    }
}

/// In-memory event sink
#[derive(Debug, Default)]
pub struct EventLog {
    inner: Mutex<Vec<BatchEvent>>,
}

impl EventLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn append(&self, event: BatchEvent) {
        self.inner.lock().push(event);
    }

    /// Snapshot of recorded events
    #[must_use]
    pub fn events(&self) -> Vec<BatchEvent> {
        self.inner.lock().clone()
    }

    /// Number of recorded events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: BatchEvent) {
        self.append(event);
    }
}
