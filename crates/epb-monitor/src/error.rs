//! Monitor error types

use std::path::PathBuf;

use crate::state::MonitorState;

/// Errors raised by [`PerformanceMonitor`](crate::PerformanceMonitor)
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Lifecycle call not allowed from the current state
    #[error("illegal monitor transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: MonitorState,
        /// Requested state
        to: MonitorState,
    },

    /// Sampler thread could not be started
    #[error("failed to start sampler: {0}")]
    Spawn(String),

    /// Output could not be written
    #[error("io error on {}: {source}", .path.display())]
    Io {
        /// Output path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Series CSV encoding failure
    #[error("metrics csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Summary JSON encoding failure
    #[error("metrics json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MonitorError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
