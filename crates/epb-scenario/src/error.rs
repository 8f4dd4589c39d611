//! Error types for parameter validation and scenario generation

use std::collections::BTreeMap;

/// Errors raised before any batch work begins
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    /// Unknown parameter name, non-integer value, or value outside the allowed set
    #[error("invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Parameter name as supplied by the caller
        parameter: String,
        /// Human-readable explanation
        reason: String,
    },

    /// No parameter options were supplied
    #[error("parameter options cannot be empty")]
    EmptyOptions,

    /// A parameter was listed with zero values
    #[error("parameter '{parameter}' has no values; remove it or provide at least one value")]
    EmptyValueList {
        /// Offending parameter
        parameter: String,
    },

    /// Cartesian product is larger than the configured cap
    #[error(
        "scenario count ({count}) exceeds maximum ({max}); parameter value counts: \
         {per_parameter:?}; reduce the number of values for some parameters"
    )]
    ScenarioLimitExceeded {
        /// Number of combinations requested
        count: usize,
        /// Cap in force
        max: usize,
        /// Value count per parameter, so the caller can decide what to trim
        per_parameter: BTreeMap<String, usize>,
    },

    /// Scenario record violates its invariants
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
}

impl ScenarioError {
    /// Shorthand for an `InvalidParameter` error
    #[inline]
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_exceeded_reports_counts() {
        let mut per_parameter = BTreeMap::new();
        per_parameter.insert("rot_meth".to_string(), 2);
        let err = ScenarioError::ScenarioLimitExceeded {
            count: 16,
            max: 8,
            per_parameter,
        };
        let msg = err.to_string();
        assert!(msg.contains("(16)"));
        assert!(msg.contains("(8)"));
        assert!(msg.contains("rot_meth"));
    }

    #[test]
    fn invalid_parameter_display() {
        let err = ScenarioError::invalid_parameter("rot_meth", "must be an integer, got: x");
        assert_eq!(
            err.to_string(),
            "invalid parameter 'rot_meth': must be an integer, got: x"
        );
    }
}
