//! Batch configuration
//!
//! [`BatchConfig`] is read once from YAML and validated at the boundary.
//! Directory patterns carry `{site_id}` and `{year}` placeholders that are
//! filled per processing year.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Default location of the YAML configuration
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Log levels accepted in `log_level`
pub const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Chart engine used by the HTML report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartMode {
    /// Plotly traces loaded from the CDN
    #[default]
    Plotly,
    /// Inline SVG polylines
    Svg,
    /// No charts
    None,
}

impl ChartMode {
    /// Configuration spelling
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plotly => "plotly",
            Self::Svg => "svg",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ChartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartMode {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plotly" => Ok(Self::Plotly),
            "svg" => Ok(Self::Svg),
            "none" => Ok(Self::None),
            other => Err(BatchError::config(format!(
                "invalid report_charts '{other}', must be one of: plotly, svg, none"
            ))),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_max_processes() -> usize {
    1
}

fn default_metrics_interval() -> f64 {
    0.5
}

fn default_project_template() -> PathBuf {
    PathBuf::from("config/EddyProProject_template.ini")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("config")
}

fn default_max_scenarios() -> usize {
    epb_scenario::MAX_SCENARIOS
}

/// Batch run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Path to the `eddypro_rp` executable; its directory is staged per run
    pub eddypro_executable: PathBuf,
    /// Site identifier
    pub site_id: String,
    /// Years to process, in order
    pub years_to_process: Vec<i32>,
    /// Raw input directory, with `{site_id}` and `{year}`
    pub input_dir_pattern: String,
    /// Output directory, with `{site_id}` and `{year}`
    pub output_dir_pattern: String,
    /// ECMD CSV, optionally with `{site_id}`
    pub ecmd_file: String,
    /// Echo EddyPro output to stdout
    #[serde(default = "default_true")]
    pub stream_output: bool,
    /// DEBUG, INFO, WARNING, ERROR or CRITICAL
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Run distinct years concurrently
    #[serde(default)]
    pub multiprocessing: bool,
    /// Concurrent years when `multiprocessing` is set
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    /// Performance sampling interval
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_seconds: f64,
    /// Where the run manifest and report go
    #[serde(default)]
    pub reports_dir: Option<PathBuf>,
    /// Chart engine for the HTML report
    #[serde(default)]
    pub report_charts: ChartMode,
    /// EddyPro project template
    #[serde(default = "default_project_template")]
    pub project_template: PathBuf,
    /// Directory holding the metadata templates
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Cap on generated scenarios
    #[serde(default = "default_max_scenarios")]
    pub max_scenarios: usize,
    /// Prepare project files without running EddyPro
    #[serde(default)]
    pub dry_run: bool,
    /// Keys this version does not interpret, kept for the snapshot
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Fill `{site_id}` and `{year}` placeholders
#[must_use]
pub fn format_pattern(pattern: &str, site_id: &str, year: Option<i32>) -> String {
    let out = pattern.replace("{site_id}", site_id);
    match year {
        Some(year) => out.replace("{year}", &year.to_string()),
        None => out,
    }
}

impl BatchConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// - [`BatchError::Config`] if the file does not exist
    /// - [`BatchError::Yaml`] if it is not a valid configuration
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let text = read_config_text(path)?;
        let config: Self = serde_yaml::from_str(&text)?;
        tracing::info!("Configuration loaded successfully from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    /// Returns [`BatchError::Yaml`] if the text is not a valid configuration.
    pub fn from_yaml(text: &str) -> Result<Self, BatchError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Check value rules not expressed by the types
    ///
    /// # Errors
    /// Returns [`BatchError::Config`] listing every violated rule.
    pub fn validate(&self) -> Result<(), BatchError> {
        let mut errors = Vec::new();

        if self.site_id.trim().is_empty() {
            errors.push("'site_id' cannot be empty".to_string());
        }
        if self.years_to_process.is_empty() {
            errors.push("'years_to_process' cannot be empty".to_string());
        }
        if self.eddypro_executable.as_os_str().is_empty() {
            errors.push("'eddypro_executable' cannot be empty".to_string());
        }
        for (key, pattern) in [
            ("input_dir_pattern", &self.input_dir_pattern),
            ("output_dir_pattern", &self.output_dir_pattern),
        ] {
            for placeholder in ["{site_id}", "{year}"] {
                if !pattern.contains(placeholder) {
                    errors.push(format!("'{key}' must contain '{placeholder}' placeholder"));
                }
            }
        }
        if self.ecmd_file.trim().is_empty() {
            errors.push("'ecmd_file' cannot be empty".to_string());
        }
        if self.max_processes < 1 {
            errors.push(format!(
                "'max_processes' must be a positive integer, got {}",
                self.max_processes
            ));
        }
        if !(self.metrics_interval_seconds.is_finite() && self.metrics_interval_seconds > 0.0) {
            errors.push(format!(
                "'metrics_interval_seconds' must be positive, got {}",
                self.metrics_interval_seconds
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_uppercase().as_str()) {
            errors.push(format!(
                "'log_level' must be one of [{}], got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            ));
        }
        if self.max_scenarios < 1 {
            errors.push("'max_scenarios' must be at least 1".to_string());
        }

        if errors.is_empty() {
            tracing::info!("Configuration validation passed.");
            Ok(())
        } else {
            Err(BatchError::Config(errors.join("; ")))
        }
    }

    /// Override the site
    #[inline]
    #[must_use]
    pub fn with_site(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = site_id.into();
        self
    }

    /// Override the years to process
    #[inline]
    #[must_use]
    pub fn with_years(mut self, years: Vec<i32>) -> Self {
        self.years_to_process = years;
        self
    }

    /// Enable or disable dry-run mode
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the report chart engine
    #[inline]
    #[must_use]
    pub fn with_report_charts(mut self, charts: ChartMode) -> Self {
        self.report_charts = charts;
        self
    }

    /// Override the metrics sampling interval
    #[inline]
    #[must_use]
    pub fn with_metrics_interval(mut self, seconds: f64) -> Self {
        self.metrics_interval_seconds = seconds;
        self
    }

    /// Raw input directory for `year`
    #[must_use]
    pub fn input_dir(&self, year: i32) -> PathBuf {
        PathBuf::from(format_pattern(&self.input_dir_pattern, &self.site_id, Some(year)))
    }

    /// Output directory for `year`
    #[must_use]
    pub fn output_dir(&self, year: i32) -> PathBuf {
        PathBuf::from(format_pattern(&self.output_dir_pattern, &self.site_id, Some(year)))
    }

    /// ECMD CSV for the configured site
    #[must_use]
    pub fn ecmd_path(&self) -> PathBuf {
        PathBuf::from(format_pattern(&self.ecmd_file, &self.site_id, None))
    }

    /// Directory for the run manifest and report
    ///
    /// Defaults to `reports/` under the first year's output directory.
    #[must_use]
    pub fn reports_dir(&self) -> PathBuf {
        match (&self.reports_dir, self.years_to_process.first()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(year)) => self.output_dir(*year).join("reports"),
            (None, None) => PathBuf::from("reports"),
        }
    }

    /// Sampling interval as a duration
    #[must_use]
    pub fn metrics_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.metrics_interval_seconds)
            .unwrap_or(epb_monitor::DEFAULT_INTERVAL)
    }

    /// JSON snapshot of the configuration, unknown keys included
    ///
    /// # Errors
    /// Returns [`BatchError::Json`] if a value cannot be represented as JSON.
    pub fn snapshot(&self) -> Result<serde_json::Value, BatchError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Read a configuration file as an untyped mapping
///
/// Used by the validator, which reports missing keys and wrong types
/// instead of failing on the first one.
///
/// # Errors
/// - [`BatchError::Config`] if the file does not exist or is not a mapping
/// - [`BatchError::Yaml`] if it is not valid YAML
pub fn load_config_mapping(path: &Path) -> Result<serde_yaml::Mapping, BatchError> {
    let text = read_config_text(path)?;
    match serde_yaml::from_str::<serde_yaml::Value>(&text)? {
        serde_yaml::Value::Mapping(mapping) => Ok(mapping),
        _ => Err(BatchError::config(format!(
            "configuration file {} is not a mapping",
            path.display()
        ))),
    }
}

fn read_config_text(path: &Path) -> Result<String, BatchError> {
    if !path.exists() {
        return Err(BatchError::config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }
    fs::read_to_string(path).map_err(|e| BatchError::io_error(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = "\
eddypro_executable: /opt/eddypro/bin/eddypro_rp
site_id: GL-ZaF
years_to_process: [2021, 2022]
input_dir_pattern: data/{site_id}/raw/{year}
output_dir_pattern: data/{site_id}/processed/{year}
ecmd_file: data/{site_id}_ecmd.csv
";

    #[test]
    fn defaults_apply() {
        let config = BatchConfig::from_yaml(MINIMAL).unwrap();
        assert!(config.stream_output);
        assert_eq!(config.log_level, "INFO");
        assert!(!config.multiprocessing);
        assert_eq!(config.max_processes, 1);
        assert_eq!(config.metrics_interval_seconds, 0.5);
        assert_eq!(config.report_charts, ChartMode::Plotly);
        assert_eq!(config.max_scenarios, 32);
        assert_eq!(config.config_dir, PathBuf::from("config"));
        assert!(config.extra.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn patterns_are_formatted() {
        let config = BatchConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.input_dir(2021), PathBuf::from("data/GL-ZaF/raw/2021"));
        assert_eq!(
            config.output_dir(2022),
            PathBuf::from("data/GL-ZaF/processed/2022")
        );
        assert_eq!(config.ecmd_path(), PathBuf::from("data/GL-ZaF_ecmd.csv"));
        assert_eq!(
            config.reports_dir(),
            PathBuf::from("data/GL-ZaF/processed/2021/reports")
        );
    }

    #[test]
    fn unknown_keys_are_kept_in_snapshot() {
        let text = format!("{MINIMAL}custom_note: hello\n");
        let config = BatchConfig::from_yaml(&text).unwrap();
        assert_eq!(
            config.extra.get("custom_note"),
            Some(&serde_yaml::Value::String("hello".to_string()))
        );
        let snapshot = config.snapshot().unwrap();
        assert_eq!(snapshot["custom_note"], "hello");
        assert_eq!(snapshot["site_id"], "GL-ZaF");
        assert_eq!(snapshot["report_charts"], "plotly");
    }

    #[test]
    fn builders_override() {
        let config = BatchConfig::from_yaml(MINIMAL)
            .unwrap()
            .with_site("DK-Sor")
            .with_years(vec![2019])
            .with_dry_run(true)
            .with_report_charts(ChartMode::Svg);
        assert_eq!(config.site_id, "DK-Sor");
        assert_eq!(config.years_to_process, vec![2019]);
        assert!(config.dry_run);
        assert_eq!(config.input_dir(2019), PathBuf::from("data/DK-Sor/raw/2019"));
        assert_eq!(config.report_charts, ChartMode::Svg);
    }

    #[test]
    fn validate_reports_every_rule() {
        let text = "\
eddypro_executable: eddypro_rp
site_id: ' '
years_to_process: []
input_dir_pattern: data/raw
output_dir_pattern: data/{site_id}/{year}
ecmd_file: x.csv
max_processes: 0
metrics_interval_seconds: 0
log_level: VERBOSE
";
        let config = BatchConfig::from_yaml(text).unwrap();
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("'site_id' cannot be empty"));
        assert!(message.contains("'years_to_process' cannot be empty"));
        assert!(message.contains("'input_dir_pattern' must contain '{site_id}'"));
        assert!(message.contains("'input_dir_pattern' must contain '{year}'"));
        assert!(message.contains("'max_processes'"));
        assert!(message.contains("'metrics_interval_seconds'"));
        assert!(message.contains("'log_level'"));
    }

    #[test]
    fn invalid_chart_mode_is_yaml_error() {
        let text = format!("{MINIMAL}report_charts: bokeh\n");
        assert!(matches!(
            BatchConfig::from_yaml(&text),
            Err(BatchError::Yaml(_))
        ));
        assert!("bokeh".parse::<ChartMode>().is_err());
        assert_eq!("SVG".parse::<ChartMode>().unwrap(), ChartMode::Svg);
    }

    #[test]
    fn load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = BatchConfig::load(&dir.path().join("config.yaml")).unwrap_err();
        assert!(matches!(err, BatchError::Config(ref m) if m.contains("Configuration file not found")));
    }

    #[test]
    fn load_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "site_id: [unclosed\n").unwrap();
        assert!(matches!(BatchConfig::load(&path), Err(BatchError::Yaml(_))));
    }

    #[test]
    fn mapping_loader_rejects_scalars() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "just a string\n").unwrap();
        assert!(matches!(
            load_config_mapping(&path),
            Err(BatchError::Config(_))
        ));
        fs::write(&path, MINIMAL).unwrap();
        let mapping = load_config_mapping(&path).unwrap();
        assert!(mapping.contains_key("site_id"));
    }
}
