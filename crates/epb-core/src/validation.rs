//! Configuration and input validation
//!
//! Unlike [`BatchConfig::validate`](crate::BatchConfig::validate), these
//! checks work on the raw YAML mapping so a broken file still gets a full,
//! categorized report instead of the first decoding error.

use std::fmt::Write as _;
use std::path::PathBuf;

use epb_ecmd::{validate_ecmd_sanity, validate_ecmd_schema};
use serde_yaml::{Mapping, Value};

use crate::config::{format_pattern, LOG_LEVELS};

/// Keys every configuration must define
pub const REQUIRED_KEYS: &[&str] = &[
    "eddypro_executable",
    "site_id",
    "years_to_process",
    "input_dir_pattern",
    "output_dir_pattern",
    "ecmd_file",
];

const CHART_MODES: &[&str] = &["plotly", "svg", "none"];

/// Validation category, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Required keys and value types
    ConfigStructure,
    /// Value ranges
    ConfigSanity,
    /// Executable, input directory and ECMD file existence
    Paths,
    /// ECMD header columns
    EcmdSchema,
    /// ECMD value ranges
    EcmdSanity,
}

impl Category {
    /// All categories in report order
    pub const ALL: [Self; 5] = [
        Self::ConfigStructure,
        Self::ConfigSanity,
        Self::Paths,
        Self::EcmdSchema,
        Self::EcmdSanity,
    ];

    /// Title used in the report
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::ConfigStructure => "Config Structure",
            Self::ConfigSanity => "Config Sanity",
            Self::Paths => "Paths",
            Self::EcmdSchema => "Ecmd Schema",
            Self::EcmdSanity => "Ecmd Sanity",
        }
    }
}

/// Which checks to skip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Skip filesystem existence checks
    pub skip_paths: bool,
    /// Skip every ECMD check
    pub skip_ecmd: bool,
}

/// Errors per category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    entries: Vec<(Category, Vec<String>)>,
}

impl ValidationReport {
    /// Errors recorded for `category`
    #[must_use]
    pub fn errors(&self, category: Category) -> &[String] {
        self.entries
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, errors)| errors.as_slice())
            .unwrap_or_default()
    }

    /// Total number of errors
    #[must_use]
    pub fn total_errors(&self) -> usize {
        self.entries.iter().map(|(_, e)| e.len()).sum()
    }

    /// No category reported an error
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.total_errors() == 0
    }

    fn set(&mut self, category: Category, errors: Vec<String>) {
        self.entries.retain(|(c, _)| *c != category);
        self.entries.push((category, errors));
        self.entries.sort_by_key(|(c, _)| *c);
    }

    /// Human-readable report
    #[must_use]
    pub fn format(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = format!("Validation Report\n{rule}\n\n");
        for category in Category::ALL {
            let errors = self.errors(category);
            if errors.is_empty() {
                let _ = writeln!(out, "[PASS] {}: OK", category.title());
                continue;
            }
            let _ = writeln!(out, "[FAIL] {}: {} error(s)", category.title(), errors.len());
            for error in errors {
                let mut lines = error.lines();
                if let Some(first) = lines.next() {
                    let _ = writeln!(out, "   - {first}");
                }
                for line in lines {
                    let _ = writeln!(out, "     {line}");
                }
            }
            out.push('\n');
        }
        let _ = write!(out, "\n{rule}\n");
        if self.is_valid() {
            out.push_str("[PASS] All validations passed!");
        } else {
            let _ = write!(out, "[FAIL] Total errors: {}", self.total_errors());
        }
        out
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn string_of<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Check required keys and value types
#[must_use]
pub fn validate_config_structure(map: &Mapping) -> Vec<String> {
    let mut errors = Vec::new();

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !map.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        errors.push(format!(
            "Missing required configuration keys: {}",
            missing.join(", ")
        ));
    }

    check_type(map, "site_id", Value::is_string, "a string", &mut errors);
    check_type(map, "years_to_process", Value::is_sequence, "a list", &mut errors);
    check_type(map, "multiprocessing", Value::is_bool, "a boolean", &mut errors);
    check_type(map, "stream_output", Value::is_bool, "a boolean", &mut errors);
    check_type(map, "max_processes", is_integer, "an integer", &mut errors);
    check_type(map, "metrics_interval_seconds", Value::is_number, "a number", &mut errors);

    if let Some(Value::Sequence(years)) = map.get("years_to_process") {
        if years.iter().any(|y| y.as_i64().is_none()) {
            errors.push("'years_to_process' must contain only integer years".to_string());
        }
    }

    if let Some(value) = map.get("report_charts") {
        if !value.as_str().is_some_and(|s| CHART_MODES.contains(&s)) {
            errors.push(format!(
                "'report_charts' must be one of [plotly, svg, none], got '{}'",
                display_value(value)
            ));
        }
    }
    if let Some(value) = map.get("log_level") {
        if !value.as_str().is_some_and(|s| LOG_LEVELS.contains(&s)) {
            errors.push(format!(
                "'log_level' must be one of [{}], got '{}'",
                LOG_LEVELS.join(", "),
                display_value(value)
            ));
        }
    }

    errors
}

fn check_type(
    map: &Mapping,
    key: &str,
    ok: fn(&Value) -> bool,
    what: &str,
    errors: &mut Vec<String>,
) {
    if let Some(value) = map.get(key) {
        if !ok(value) {
            errors.push(format!("'{key}' must be {what}, got {}", type_name(value)));
        }
    }
}

fn is_integer(value: &Value) -> bool {
    value.as_i64().is_some() || value.as_u64().is_some()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Check value ranges
#[must_use]
pub fn validate_config_sanity(map: &Mapping) -> Vec<String> {
    let mut errors = Vec::new();

    let years_empty = match map.get("years_to_process") {
        Some(Value::Sequence(years)) => years.is_empty(),
        _ => true,
    };
    if years_empty {
        errors.push("'years_to_process' cannot be empty".to_string());
    }

    if string_of(map, "site_id").map_or(true, |s| s.trim().is_empty()) {
        errors.push("'site_id' cannot be empty".to_string());
    }

    let multiprocessing = map
        .get("multiprocessing")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if multiprocessing {
        let max = map.get("max_processes").and_then(Value::as_i64).unwrap_or(0);
        if max <= 0 {
            errors.push(format!(
                "'max_processes' must be positive when multiprocessing is enabled, got {max}"
            ));
        }
    }

    if let Some(value) = map.get("metrics_interval_seconds") {
        let interval = value.as_f64().unwrap_or(0.0);
        if interval <= 0.0 {
            errors.push(format!(
                "'metrics_interval_seconds' must be positive, got {}",
                display_value(value)
            ));
        }
    }

    errors
}

fn ecmd_path(map: &Mapping) -> Option<PathBuf> {
    let ecmd_file = string_of(map, "ecmd_file").filter(|s| !s.is_empty())?;
    let site_id = string_of(map, "site_id").unwrap_or_default();
    Some(PathBuf::from(format_pattern(ecmd_file, site_id, None)))
}

/// Check that the executable, first input directory and ECMD file exist
#[must_use]
pub fn validate_paths(map: &Mapping, skip_ecmd: bool) -> Vec<String> {
    let mut errors = Vec::new();

    let executable = PathBuf::from(string_of(map, "eddypro_executable").unwrap_or_default());
    if !executable.exists() {
        errors.push(format!(
            "EddyPro executable not found: {}\n  -> Check 'eddypro_executable' path in config",
            executable.display()
        ));
    }

    let input_pattern = string_of(map, "input_dir_pattern").unwrap_or_default();
    let output_pattern = string_of(map, "output_dir_pattern").unwrap_or_default();
    for (key, pattern) in [
        ("input_dir_pattern", input_pattern),
        ("output_dir_pattern", output_pattern),
    ] {
        for placeholder in ["{site_id}", "{year}"] {
            if !pattern.contains(placeholder) {
                errors.push(format!(
                    "Invalid '{key}': must contain '{placeholder}' placeholder"
                ));
            }
        }
    }

    let site_id = string_of(map, "site_id").unwrap_or_default();
    let first_year = match map.get("years_to_process") {
        Some(Value::Sequence(years)) => years.first().and_then(Value::as_i64),
        _ => None,
    };
    if let (false, Some(year)) = (site_id.is_empty(), first_year) {
        match i32::try_from(year) {
            Ok(year) => {
                let input_dir = PathBuf::from(format_pattern(input_pattern, site_id, Some(year)));
                if !input_dir.exists() {
                    errors.push(format!(
                        "Input directory for year {year} not found: {}\n  -> Check 'input_dir_pattern' and ensure raw data exists",
                        input_dir.display()
                    ));
                }
            }
            Err(_) => errors.push(format!("Year {year} is out of range")),
        }
    }

    if !skip_ecmd {
        if let Some(path) = ecmd_path(map) {
            if !path.exists() {
                errors.push(format!(
                    "ECMD file not found: {}\n  -> Check 'ecmd_file' path in config",
                    path.display()
                ));
            }
        }
    }

    errors
}

/// Run every check allowed by `options`
#[must_use]
pub fn validate_all(map: &Mapping, options: ValidationOptions) -> ValidationReport {
    let mut report = ValidationReport::default();
    report.set(Category::ConfigStructure, validate_config_structure(map));
    report.set(Category::ConfigSanity, validate_config_sanity(map));
    report.set(
        Category::Paths,
        if options.skip_paths {
            Vec::new()
        } else {
            validate_paths(map, options.skip_ecmd)
        },
    );

    let (schema, sanity) = if options.skip_ecmd {
        (Vec::new(), Vec::new())
    } else {
        match ecmd_path(map) {
            Some(path) if path.exists() => {
                (validate_ecmd_schema(&path), validate_ecmd_sanity(&path))
            }
            Some(path) => (
                vec![format!("ECMD file not found: {}", path.display())],
                Vec::new(),
            ),
            None => (
                vec!["ECMD file path not specified in config".to_string()],
                Vec::new(),
            ),
        }
    };
    report.set(Category::EcmdSchema, schema);
    report.set(Category::EcmdSanity, sanity);

    tracing::debug!("Validation finished with {} error(s)", report.total_errors());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mapping(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    const VALID: &str = "\
eddypro_executable: /bin/sh
site_id: S
years_to_process: [2021]
input_dir_pattern: /{site_id}/{year}
output_dir_pattern: /out/{site_id}/{year}
ecmd_file: '{site_id}_ecmd.csv'
log_level: INFO
report_charts: svg
";

    #[test]
    fn structure_reports_missing_keys_and_types() {
        let map = mapping(
            "site_id: 5\nyears_to_process: 2021\nmultiprocessing: 'yes'\nlog_level: LOUD\nreport_charts: bokeh\n",
        );
        let errors = validate_config_structure(&map);
        assert!(errors[0].starts_with("Missing required configuration keys: eddypro_executable"));
        assert!(errors.iter().any(|e| e == "'site_id' must be a string, got integer"));
        assert!(errors.iter().any(|e| e == "'years_to_process' must be a list, got integer"));
        assert!(errors.iter().any(|e| e == "'multiprocessing' must be a boolean, got string"));
        assert!(errors.iter().any(|e| e.contains("got 'LOUD'")));
        assert!(errors.iter().any(|e| e.contains("got 'bokeh'")));
    }

    #[test]
    fn structure_accepts_valid_config() {
        assert!(validate_config_structure(&mapping(VALID)).is_empty());
        assert!(validate_config_sanity(&mapping(VALID)).is_empty());
    }

    #[test]
    fn sanity_checks_ranges() {
        let map = mapping(
            "site_id: ' '\nyears_to_process: []\nmultiprocessing: true\nmax_processes: 0\nmetrics_interval_seconds: -1\n",
        );
        let errors = validate_config_sanity(&map);
        assert_eq!(
            errors,
            vec![
                "'years_to_process' cannot be empty".to_string(),
                "'site_id' cannot be empty".to_string(),
                "'max_processes' must be positive when multiprocessing is enabled, got 0"
                    .to_string(),
                "'metrics_interval_seconds' must be positive, got -1".to_string(),
            ]
        );
    }

    #[test]
    fn paths_are_checked() {
        let map = mapping(
            "eddypro_executable: /nonexistent/eddypro_rp\nsite_id: S\nyears_to_process: [2021]\ninput_dir_pattern: /nonexistent/{site_id}/{year}\noutput_dir_pattern: out/{year}\necmd_file: /nonexistent/{site_id}.csv\n",
        );
        let errors = validate_paths(&map, false);
        assert!(errors[0].starts_with("EddyPro executable not found"));
        assert!(errors
            .iter()
            .any(|e| e == "Invalid 'output_dir_pattern': must contain '{site_id}' placeholder"));
        assert!(errors
            .iter()
            .any(|e| e.starts_with("Input directory for year 2021 not found: /nonexistent/S/2021")));
        assert!(errors
            .iter()
            .any(|e| e.starts_with("ECMD file not found: /nonexistent/S.csv")));

        let skipped = validate_paths(&map, true);
        assert!(!skipped.iter().any(|e| e.contains("ECMD")));
    }

    #[test]
    fn report_format() {
        let map = mapping(VALID);
        let report = validate_all(
            &map,
            ValidationOptions {
                skip_paths: true,
                skip_ecmd: true,
            },
        );
        assert!(report.is_valid());
        let rule = "=".repeat(60);
        assert_eq!(
            report.format(),
            format!(
                "Validation Report\n{rule}\n\n\
[PASS] Config Structure: OK\n\
[PASS] Config Sanity: OK\n\
[PASS] Paths: OK\n\
[PASS] Ecmd Schema: OK\n\
[PASS] Ecmd Sanity: OK\n\
\n{rule}\n[PASS] All validations passed!"
            )
        );
    }

    #[test]
    fn failing_report_counts_errors() {
        let map = mapping("site_id: S\n");
        let report = validate_all(
            &map,
            ValidationOptions {
                skip_paths: true,
                skip_ecmd: false,
            },
        );
        assert_eq!(report.errors(Category::EcmdSchema).len(), 1);
        let text = report.format();
        assert!(text.contains("[FAIL] Config Structure: 1 error(s)"));
        assert!(text.contains("   - Missing required configuration keys"));
        assert!(text.contains("[FAIL] Ecmd Schema: 1 error(s)"));
        assert!(text.ends_with(&format!("[FAIL] Total errors: {}", report.total_errors())));
    }

    #[test]
    fn multiline_errors_are_indented() {
        let mut report = ValidationReport::default();
        report.set(Category::Paths, vec!["first\nsecond".to_string()]);
        let text = report.format();
        assert!(text.contains("   - first\n     second\n"));
    }
}
