//! Run manifests
//!
//! A [`RunManifest`] records what one batch invocation did: the configuration
//! it ran with, every scenario result, where outputs went and which software
//! produced them. It is written atomically to `run_manifest.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::batch::BatchOutcome;
use crate::checksum::ConfigChecksum;
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::executor::ScenarioResult;
use crate::fs::{atomic_write, collect_output_files};

/// File name of the run manifest inside the reports directory
pub const MANIFEST_FILE_NAME: &str = "run_manifest.json";

/// Software and platform that produced a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Batch processor version and build target
    pub runtime_version: String,
    /// Operating system and architecture
    pub platform: String,
    /// Operating system family
    pub os_family: String,
    /// Versions of the batch processor crates
    pub package_versions: BTreeMap<String, String>,
}

impl Environment {
    /// Describe the running process
    #[must_use]
    pub fn capture() -> Self {
        let package_versions = BTreeMap::from([
            ("epb-core".to_string(), crate::VERSION.to_string()),
            ("epb-ecmd".to_string(), epb_ecmd::VERSION.to_string()),
            ("epb-ini".to_string(), epb_ini::VERSION.to_string()),
            ("epb-monitor".to_string(), epb_monitor::VERSION.to_string()),
            ("epb-scenario".to_string(), epb_scenario::VERSION.to_string()),
        ]);
        Self {
            runtime_version: format!(
                "eddypro-batch {} ({}-{})",
                crate::VERSION,
                std::env::consts::ARCH,
                std::env::consts::OS
            ),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            os_family: std::env::consts::FAMILY.to_string(),
            package_versions,
        }
    }
}

/// Record of one batch invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// `{site}_{YYYYmmdd_HHMMSS}` of the start time
    pub run_id: String,
    /// When the manifest was built
    pub timestamp: NaiveDateTime,
    /// Batch start
    pub start_time: NaiveDateTime,
    /// Batch end
    pub end_time: NaiveDateTime,
    /// Batch wall-clock duration
    pub duration_seconds: f64,
    /// Site processed
    pub site_id: String,
    /// Years processed, in request order
    pub years_processed: Vec<i32>,
    /// SHA-256 of the canonical configuration snapshot
    pub config_checksum: String,
    /// Configuration the batch ran with
    pub config_snapshot: serde_json::Value,
    /// Every scenario succeeded
    pub overall_success: bool,
    /// Scenario results ordered by year and index
    pub scenarios: Vec<ScenarioResult>,
    /// Output directory per year
    pub output_dirs: Vec<PathBuf>,
    /// EddyPro result tables found under each output directory
    #[serde(default)]
    pub output_files: BTreeMap<String, Vec<PathBuf>>,
    /// Software and platform
    pub environment: Environment,
    /// Whether EddyPro was skipped
    pub dry_run: bool,
}

/// Run id for `site_id` started at `start`
#[must_use]
pub fn run_id(site_id: &str, start: NaiveDateTime) -> String {
    format!("{site_id}_{}", start.format("%Y%m%d_%H%M%S"))
}

#[allow(clippy::cast_precision_loss)]
fn seconds_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let delta = end - start;
    delta
        .num_microseconds()
        .map_or(delta.num_seconds() as f64, |us| us as f64 / 1e6)
}

impl RunManifest {
    /// Build the manifest of a finished batch
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be snapshotted or an
    /// output directory cannot be scanned.
    pub fn build(
        config: &BatchConfig,
        years: &[i32],
        outcome: &BatchOutcome,
    ) -> Result<Self, BatchError> {
        let config_snapshot = config.snapshot()?;
        let config_checksum = ConfigChecksum::of_value(&config_snapshot).to_hex();

        let output_dirs: Vec<PathBuf> = years.iter().map(|&y| config.output_dir(y)).collect();
        let mut output_files = BTreeMap::new();
        for dir in &output_dirs {
            let files = collect_output_files(dir, &config.site_id)?;
            output_files.insert(dir.display().to_string(), files);
        }

        Ok(Self {
            run_id: run_id(&config.site_id, outcome.start_time),
            timestamp: Local::now().naive_local(),
            start_time: outcome.start_time,
            end_time: outcome.end_time,
            duration_seconds: seconds_between(outcome.start_time, outcome.end_time),
            site_id: config.site_id.clone(),
            years_processed: years.to_vec(),
            config_checksum,
            config_snapshot,
            overall_success: outcome.overall_success(),
            scenarios: outcome.results.clone(),
            output_dirs,
            output_files,
            environment: Environment::capture(),
            dry_run: config.dry_run,
        })
    }

    /// Path of the manifest inside `reports_dir`
    #[must_use]
    pub fn path_in(reports_dir: &Path) -> PathBuf {
        reports_dir.join(MANIFEST_FILE_NAME)
    }

    /// Write the manifest atomically into `reports_dir`
    ///
    /// Returns the manifest path.
    ///
    /// # Errors
    /// Returns an error if encoding or writing fails.
    pub fn write(&self, reports_dir: &Path) -> Result<PathBuf, BatchError> {
        let path = Self::path_in(reports_dir);
        let json = serde_json::to_vec_pretty(self)?;
        atomic_write(&path, &json)?;
        tracing::info!("Run manifest written to {}", path.display());
        Ok(path)
    }

    /// Read a manifest file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let text = fs::read_to_string(path).map_err(|e| BatchError::io_error(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Number of successful scenarios
    #[must_use]
    pub fn successful(&self) -> usize {
        self.scenarios.iter().filter(|s| s.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn result(year: i32, index: usize, success: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_index: index,
            scenario_suffix: format!("_rot{index}"),
            scenario_params: BTreeMap::from([("rot_meth".to_string(), 1)]),
            project_file: PathBuf::from("p.eddypro"),
            output_dir: PathBuf::from("out"),
            start_time: at(10, 0, 0),
            end_time: at(10, 0, 5),
            duration_seconds: 5.0,
            success,
            return_code: if success { 0 } else { -1 },
            error: (!success).then(|| "boom".to_string()),
            dry_run: false,
            year,
        }
    }

    fn config(dir: &Path) -> BatchConfig {
        BatchConfig::from_yaml(&format!(
            "\
eddypro_executable: /opt/eddypro/bin/eddypro_rp
site_id: S
years_to_process: [2021]
input_dir_pattern: {root}/raw/{{site_id}}/{{year}}
output_dir_pattern: {root}/out/{{site_id}}/{{year}}
ecmd_file: ecmd.csv
",
            root = dir.display()
        ))
        .unwrap()
    }

    #[test]
    fn run_id_format() {
        assert_eq!(run_id("GL-ZaF", at(9, 5, 7)), "GL-ZaF_20240305_090507");
    }

    #[test]
    fn build_write_load() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let out = config.output_dir(2021);
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("eddypro_S_full_output_2021.csv"), "").unwrap();

        let outcome = BatchOutcome {
            results: vec![result(2021, 1, true), result(2021, 2, false)],
            start_time: at(10, 0, 0),
            end_time: at(10, 1, 30),
        };
        let manifest = RunManifest::build(&config, &[2021], &outcome).unwrap();
        assert_eq!(manifest.run_id, "S_20240305_100000");
        assert!(!manifest.overall_success);
        assert_eq!(manifest.successful(), 1);
        assert!((manifest.duration_seconds - 90.0).abs() < 1e-9);
        assert_eq!(manifest.config_checksum.len(), 64);
        assert_eq!(manifest.output_files[&out.display().to_string()].len(), 1);
        assert!(manifest.environment.package_versions.contains_key("epb-core"));

        let reports = dir.path().join("reports");
        let path = manifest.write(&reports).unwrap();
        assert_eq!(path, reports.join(MANIFEST_FILE_NAME));
        let loaded = RunManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["scenarios"][0].get("error").is_none());
        assert_eq!(json["scenarios"][1]["error"], "boom");
    }

    #[test]
    fn checksum_tracks_config() {
        let dir = TempDir::new().unwrap();
        let outcome = BatchOutcome {
            results: vec![],
            start_time: at(10, 0, 0),
            end_time: at(10, 0, 0),
        };
        let a = RunManifest::build(&config(dir.path()), &[2021], &outcome).unwrap();
        let b = RunManifest::build(&config(dir.path()), &[2021], &outcome).unwrap();
        let c = RunManifest::build(&config(dir.path()).with_site("T"), &[2021], &outcome)
            .unwrap();
        assert_eq!(a.config_checksum, b.config_checksum);
        assert_ne!(a.config_checksum, c.config_checksum);
        assert!(a.overall_success);
    }
}
