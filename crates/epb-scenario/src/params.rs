//! Processing-method parameter table
//!
//! Every parameter that can vary between scenarios is declared once here:
//! - the INI section that owns it
//! - the on-disk key (EddyPro keeps some legacy names)
//! - the allowed integer values
//! - a description surfaced in validation errors
//!
//! Validation always goes through [`PARAMETER_SPECS`]; nothing else decides
//! whether a name or value is acceptable.

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::error::ScenarioError;

/// Static description of one tunable parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    /// External parameter name
    pub name: &'static str,
    /// Section of the project file that holds the value
    pub section: &'static str,
    /// Key written to disk
    pub ini_key: &'static str,
    /// Allowed values, ascending
    pub allowed: &'static [i64],
    /// Human description
    pub description: &'static str,
}

impl ParameterSpec {
    /// Whether `value` is in the allowed set
    #[inline]
    #[must_use]
    pub fn allows(&self, value: i64) -> bool {
        self.allowed.contains(&value)
    }
}

/// Rotation method value selecting planar fit
pub const ROT_METH_PLANAR_FIT: i64 = 3;

/// Time-lag method value selecting optimization
pub const TLAG_METH_OPTIMIZATION: i64 = 4;

/// All recognized parameters
pub const PARAMETER_SPECS: &[ParameterSpec] = &[
    ParameterSpec {
        name: "rot_meth",
        section: "RawProcess_Settings",
        ini_key: "rot_meth",
        allowed: &[1, 3],
        description: "Rotation method (1=DR double rotation, 3=PF planar fit)",
    },
    ParameterSpec {
        name: "tlag_meth",
        section: "RawProcess_Settings",
        ini_key: "tlag_meth",
        allowed: &[2, 4],
        description: "Time lag method (2=CMD, 4=AO)",
    },
    ParameterSpec {
        name: "detrend_meth",
        section: "RawProcess_Settings",
        ini_key: "detrend_meth",
        allowed: &[0, 1],
        description: "Detrend method (0=BA, 1=LD)",
    },
    ParameterSpec {
        name: "despike_meth",
        section: "RawProcess_ParameterSettings",
        ini_key: "despike_vm",
        allowed: &[0, 1],
        description: "Spike removal method (0=VM97, 1=M13)",
    },
];

/// The full parameter table
#[inline]
#[must_use]
pub fn parameter_specs() -> &'static [ParameterSpec] {
    PARAMETER_SPECS
}

/// Look up a parameter by its external name
#[inline]
#[must_use]
pub fn parameter_spec(name: &str) -> Option<&'static ParameterSpec> {
    PARAMETER_SPECS.iter().find(|spec| spec.name == name)
}

/// Names of all recognized parameters, in table order
#[must_use]
pub fn parameter_names() -> Vec<&'static str> {
    PARAMETER_SPECS.iter().map(|spec| spec.name).collect()
}

/// Validate a single raw value for `name`
///
/// # Errors
/// Returns [`ScenarioError::InvalidParameter`] if the name is unknown, the
/// value does not parse as an integer, or the integer is not allowed.
pub fn validate_parameter(name: &str, raw: impl Display) -> Result<i64, ScenarioError> {
    let spec = parameter_spec(name).ok_or_else(|| {
        ScenarioError::invalid_parameter(
            name,
            format!(
                "unknown parameter; available parameters: {}",
                parameter_names().join(", ")
            ),
        )
    })?;

    let text = raw.to_string();
    let value: i64 = text.trim().parse().map_err(|_| {
        ScenarioError::invalid_parameter(name, format!("must be an integer, got: {text}"))
    })?;

    if !spec.allows(value) {
        return Err(ScenarioError::invalid_parameter(
            name,
            format!(
                "value {value} is not allowed; allowed values: {:?}. {}",
                spec.allowed, spec.description
            ),
        ));
    }

    Ok(value)
}

/// Validate every entry of a parameter mapping, stopping at the first failure
///
/// # Errors
/// Returns the first [`ScenarioError::InvalidParameter`] encountered.
pub fn validate_parameters<I, K, V>(parameters: I) -> Result<BTreeMap<String, i64>, ScenarioError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Display,
{
    let mut validated = BTreeMap::new();
    for (name, raw) in parameters {
        let name = name.as_ref();
        let value = validate_parameter(name, raw)?;
        validated.insert(name.to_string(), value);
    }
    tracing::debug!("Validated parameters: {:?}", validated);
    Ok(validated)
}

/// Check an option map before scenario generation
///
/// Every name must be recognized and every listed value allowed.
///
/// # Errors
/// Returns [`ScenarioError::InvalidParameter`] for the first bad name or value.
pub fn validate_scenario_parameters(
    options: &BTreeMap<String, Vec<i64>>,
) -> Result<(), ScenarioError> {
    for (name, values) in options {
        if parameter_spec(name).is_none() {
            let mut known = parameter_names();
            known.sort_unstable();
            return Err(ScenarioError::invalid_parameter(
                name,
                format!("unrecognized parameter; valid parameters: {}", known.join(", ")),
            ));
        }
        for value in values {
            validate_parameter(name, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_one_spec_per_name() {
        let mut names = parameter_names();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn despike_uses_legacy_key() {
        let spec = parameter_spec("despike_meth").unwrap();
        assert_eq!(spec.ini_key, "despike_vm");
        assert_eq!(spec.section, "RawProcess_ParameterSettings");
    }

    #[test]
    fn validate_accepts_allowed_values() {
        assert_eq!(validate_parameter("rot_meth", 1).unwrap(), 1);
        assert_eq!(validate_parameter("rot_meth", "3").unwrap(), 3);
        assert_eq!(validate_parameter("tlag_meth", " 4 ").unwrap(), 4);
        assert_eq!(validate_parameter("detrend_meth", 0).unwrap(), 0);
        assert_eq!(validate_parameter("despike_meth", 1).unwrap(), 1);
    }

    #[test]
    fn validate_rejects_unknown_name() {
        let err = validate_parameter("hf_meth", 1).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("hf_meth"));
        assert!(msg.contains("available parameters"));
        assert!(msg.contains("rot_meth"));
    }

    #[test]
    fn validate_rejects_non_integer() {
        let err = validate_parameter("rot_meth", "planar").unwrap_err();
        assert!(err.to_string().contains("must be an integer"));
    }

    #[test]
    fn validate_rejects_disallowed_value() {
        let err = validate_parameter("rot_meth", 2).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("value 2 is not allowed"));
        assert!(msg.contains("[1, 3]"));
        assert!(msg.contains("planar fit"));
    }

    #[test]
    fn validate_parameters_short_circuits() {
        let input = vec![("rot_meth", "1"), ("tlag_meth", "9"), ("bogus", "1")];
        let err = validate_parameters(input).unwrap_err();
        match err {
            ScenarioError::InvalidParameter { parameter, .. } => assert_eq!(parameter, "tlag_meth"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validate_parameters_collects_sorted() {
        let validated = validate_parameters([("tlag_meth", 2), ("rot_meth", 3)]).unwrap();
        let keys: Vec<_> = validated.keys().cloned().collect();
        assert_eq!(keys, vec!["rot_meth".to_string(), "tlag_meth".to_string()]);
    }

    #[test]
    fn scenario_option_check_rejects_unknown_name() {
        let mut options = BTreeMap::new();
        options.insert("hf_meth".to_string(), vec![1, 4]);
        let err = validate_scenario_parameters(&options).unwrap_err();
        assert!(err.to_string().contains("unrecognized parameter"));
    }

    #[test]
    fn scenario_option_check_rejects_bad_value() {
        let mut options = BTreeMap::new();
        options.insert("rot_meth".to_string(), vec![1, 2]);
        assert!(validate_scenario_parameters(&options).is_err());

        options.insert("rot_meth".to_string(), vec![1, 3]);
        assert!(validate_scenario_parameters(&options).is_ok());
    }
}
