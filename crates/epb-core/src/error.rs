//! Error types for batch execution
//!
//! [`BatchError`] wraps the errors of every lower crate so a scenario can be
//! prepared with `?` and the failure captured once at the scenario boundary.

use std::path::PathBuf;

use epb_ecmd::EcmdError;
use epb_ini::IniError;
use epb_monitor::MonitorError;
use epb_scenario::ScenarioError;

/// Main batch error type
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Parameter or scenario error
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// Template patching or preflight error
    #[error(transparent)]
    Ini(#[from] IniError),

    /// ECMD read or selection error
    #[error(transparent)]
    Ecmd(#[from] EcmdError),

    /// Performance monitor error
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// External process failure
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Configuration missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Pipeline setup or teardown failure
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Filesystem failure
    #[error("io error on {}: {source}", .path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML decoding failure
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BatchError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the error came from a preflight check
    #[inline]
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::Ini(IniError::PreflightError(_)))
    }
}

/// Failure of an EddyPro executable
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Executable missing from the staged `bin/` directory
    #[error("EddyPro {stage} executable not found: {}", .path.display())]
    MissingExecutable {
        /// Stage name (`rp` or `fcc`)
        stage: &'static str,
        /// Expected location
        path: PathBuf,
    },

    /// Process could not be started
    #[error("failed to start eddypro_{stage}: {source}")]
    Spawn {
        /// Stage name
        stage: &'static str,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Process exited unsuccessfully
    #[error("eddypro_{stage} failed with return code {return_code}")]
    NonZeroExit {
        /// Stage name
        stage: &'static str,
        /// Exit code, `-1` if killed by a signal
        return_code: i32,
    },
}

impl ExecutionError {
    /// Exit code to record for this failure
    #[inline]
    #[must_use]
    pub fn return_code(&self) -> i32 {
        match self {
            Self::NonZeroExit { return_code, .. } => *return_code,
            Self::MissingExecutable { .. } | Self::Spawn { .. } => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_lower_errors() {
        let err: BatchError = IniError::PreflightError("no csv".to_string()).into();
        assert!(err.is_preflight());
        assert_eq!(err.to_string(), "preflight check failed: no csv");

        let err: BatchError = ScenarioError::EmptyOptions.into();
        assert!(!err.is_preflight());
    }

    #[test]
    fn execution_return_codes() {
        let err = ExecutionError::NonZeroExit {
            stage: "rp",
            return_code: 2,
        };
        assert_eq!(err.return_code(), 2);
        assert_eq!(err.to_string(), "eddypro_rp failed with return code 2");

        let err = ExecutionError::MissingExecutable {
            stage: "fcc",
            path: PathBuf::from("bin/eddypro_fcc"),
        };
        assert_eq!(err.return_code(), -1);
    }
}
