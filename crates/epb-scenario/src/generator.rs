//! Deterministic scenario enumeration
//!
//! A scenario is one point in the Cartesian product of parameter options.
//! Enumeration order depends only on the option values: names are sorted,
//! and the last name varies fastest.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::ScenarioError;

/// Default cap on the number of generated scenarios
pub const MAX_SCENARIOS: usize = 32;

/// Canonical suffix order; anything not listed follows alphabetically under its own name
const SUFFIX_ABBREVIATIONS: &[(&str, &str)] = &[
    ("rot_meth", "rot"),
    ("tlag_meth", "tlag"),
    ("detrend_meth", "det"),
    ("despike_meth", "spk"),
];

/// One combination of parameter values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    parameters: BTreeMap<String, i64>,
    suffix: String,
    index: usize,
}

impl Scenario {
    /// Build a scenario; the suffix is derived from `parameters`
    ///
    /// # Errors
    /// Returns [`ScenarioError::InvalidScenario`] if `parameters` is empty or
    /// `index` is zero.
    pub fn new(parameters: BTreeMap<String, i64>, index: usize) -> Result<Self, ScenarioError> {
        if parameters.is_empty() {
            return Err(ScenarioError::InvalidScenario(
                "scenario parameters cannot be empty".to_string(),
            ));
        }
        if index == 0 {
            return Err(ScenarioError::InvalidScenario(format!(
                "scenario index must be >= 1, got: {index}"
            )));
        }
        let suffix = scenario_suffix(&parameters);
        Ok(Self {
            parameters,
            suffix,
            index,
        })
    }

    /// Parameter values by name
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, i64> {
        &self.parameters
    }

    /// Suffix token, including the leading underscore
    #[inline]
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Suffix without the leading underscore
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        self.suffix.trim_start_matches('_')
    }

    /// 1-based position in enumeration order
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Compute the suffix for a parameter set
///
/// `{rot_meth: 1, tlag_meth: 2}` becomes `_rot1_tlag2`. An empty set yields
/// an empty string.
#[must_use]
pub fn scenario_suffix(parameters: &BTreeMap<String, i64>) -> String {
    let mut parts = Vec::with_capacity(parameters.len());

    for (name, abbrev) in SUFFIX_ABBREVIATIONS {
        if let Some(value) = parameters.get(*name) {
            parts.push(format!("{abbrev}{value}"));
        }
    }

    // BTreeMap iteration is already alphabetical
    for (name, value) in parameters {
        if !SUFFIX_ABBREVIATIONS.iter().any(|(known, _)| known == name) {
            parts.push(format!("{name}{value}"));
        }
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!("_{}", parts.join("_"))
    }
}

/// Enumerate every combination of `options`
///
/// # Errors
/// - [`ScenarioError::EmptyOptions`] if `options` is empty
/// - [`ScenarioError::EmptyValueList`] if any value list is empty
/// - [`ScenarioError::ScenarioLimitExceeded`] if the product exceeds `max_scenarios`
pub fn generate_scenarios(
    options: &BTreeMap<String, Vec<i64>>,
    max_scenarios: usize,
) -> Result<Vec<Scenario>, ScenarioError> {
    if options.is_empty() {
        return Err(ScenarioError::EmptyOptions);
    }
    if let Some((name, _)) = options.iter().find(|(_, values)| values.is_empty()) {
        return Err(ScenarioError::EmptyValueList {
            parameter: name.clone(),
        });
    }

    let total = options
        .values()
        .try_fold(1usize, |acc, values| acc.checked_mul(values.len()))
        .unwrap_or(usize::MAX);

    if total > max_scenarios {
        return Err(ScenarioError::ScenarioLimitExceeded {
            count: total,
            max: max_scenarios,
            per_parameter: options
                .iter()
                .map(|(name, values)| (name.clone(), values.len()))
                .collect(),
        });
    }

    let names: Vec<&String> = options.keys().collect();
    let lists: Vec<&Vec<i64>> = options.values().collect();
    let mut cursor = vec![0usize; lists.len()];
    let mut scenarios = Vec::with_capacity(total);

    for index in 1..=total {
        let parameters: BTreeMap<String, i64> = names
            .iter()
            .zip(&lists)
            .zip(&cursor)
            .map(|((name, values), &pos)| ((*name).clone(), values[pos]))
            .collect();
        scenarios.push(Scenario::new(parameters, index)?);

        for pos in (0..cursor.len()).rev() {
            cursor[pos] += 1;
            if cursor[pos] < lists[pos].len() {
                break;
            }
            cursor[pos] = 0;
        }
    }

    tracing::info!(
        "Generated {} scenarios from {} parameters",
        scenarios.len(),
        options.len()
    );
    Ok(scenarios)
}

/// Human-readable listing of scenarios
#[must_use]
pub fn format_scenario_summary(scenarios: &[Scenario]) -> String {
    if scenarios.is_empty() {
        return "No scenarios generated.".to_string();
    }

    let mut out = format!("Generated {} scenario(s):\n\n", scenarios.len());
    for scenario in scenarios {
        let params = scenario
            .parameters()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "  Scenario {}: {params}", scenario.index());
        let _ = writeln!(out, "    Suffix: {}", scenario.suffix());
    }
    out
}
