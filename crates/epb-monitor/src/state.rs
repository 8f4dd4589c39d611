use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Lifecycle of a [`PerformanceMonitor`](crate::PerformanceMonitor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorState {
    /// Constructed, never started
    Idle,
    /// Sampler thread running
    Monitoring,
    /// Sampler joined, outputs written
    Stopped,
}

/// Validates a monitor state transition.
///
/// Restarting a stopped monitor is allowed and begins a fresh series.
pub fn validate_transition(from: MonitorState, to: MonitorState) -> Result<(), MonitorError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(MonitorError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: MonitorState) -> Vec<MonitorState> {
    use MonitorState::*;
    match from {
        Idle => vec![Monitoring],
        Monitoring => vec![Stopped],
        Stopped => vec![Monitoring],
    }
}
