//! ECMD error types

use std::path::PathBuf;

/// Errors raised while reading the ECMD log
#[derive(Debug, thiserror::Error)]
pub enum EcmdError {
    /// File does not exist
    #[error("ECMD file not found: {0}")]
    NotFound(PathBuf),

    /// Header lacks columns the caller depends on
    #[error("ECMD file {} missing required columns: {}", .path.display(), .columns.join(", "))]
    MissingColumns {
        /// ECMD file
        path: PathBuf,
        /// Absent column names, in declaration order
        columns: Vec<String>,
    },

    /// No row carries the requested site id
    #[error("no ECMD rows found for site {site_id} in {}", .path.display())]
    NoRowsForSite {
        /// Requested site
        site_id: String,
        /// ECMD file
        path: PathBuf,
    },

    /// Effective date is empty or not `YYYYMMDDHHMM`
    #[error("invalid ECMD date format '{value}': {reason}")]
    InvalidDate {
        /// Raw cell content
        value: String,
        /// Parser message
        reason: String,
    },

    /// Every site row is effective after the start of the target year
    #[error("no ECMD row for site {site_id} effective on or before {year}-01-01 00:00")]
    NoApplicableRow {
        /// Requested site
        site_id: String,
        /// Target year
        year: i32,
    },

    /// CSV decoding or encoding failure
    #[error("ECMD CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem failure
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl EcmdError {
    pub(crate) fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
