//! Error types for template handling

use std::path::PathBuf;

/// Errors raised while loading, patching or checking a project template
#[derive(Debug, thiserror::Error)]
pub enum IniError {
    /// Template file does not exist
    #[error("INI template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// Template text could not be parsed
    #[error("malformed INI at line {line}: {reason}")]
    MalformedTemplate {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// A section the operation writes to is absent
    #[error("required section '{section}' missing from template ({detail})")]
    MissingSection {
        /// Section name
        section: String,
        /// Which operation or rule needed it
        detail: String,
    },

    /// Source values the operation depends on are empty or absent
    #[error("missing required values: {} ({context})", .fields.join(", "))]
    MissingValue {
        /// Field names
        fields: Vec<String>,
        /// Where the values were expected
        context: String,
    },

    /// Parameter name not present in the parameter table
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// Inputs or metadata would make EddyPro fail at startup
    #[error("preflight check failed: {0}")]
    PreflightError(String),

    /// Filesystem failure
    #[error("io error on {}: {source}", .path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl IniError {
    /// Create a missing-section error
    pub fn missing_section(section: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MissingSection {
            section: section.into(),
            detail: detail.into(),
        }
    }

    /// Create a malformed-template error
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            line,
            reason: reason.into(),
        }
    }

    /// Create an IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
