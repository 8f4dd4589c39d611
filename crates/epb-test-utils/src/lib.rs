//! Testing utilities for the EddyPro batch workspace
//!
//! Shared fixtures: a complete site layout on disk and a pipeline runner
//! that records requests instead of spawning EddyPro.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use epb_core::{BatchConfig, BatchError, PipelineOutcome, PipelineRequest, PipelineRunner};
use parking_lot::Mutex;
use tempfile::TempDir;

pub const SITE_ID: &str = "GL-ZaF";

/// Years with raw data and an ECMD row
pub const FIXTURE_YEARS: &[i32] = &[2019, 2020, 2021];

pub const PROJECT_TEMPLATE: &str = "\
[Project]
creation_date=
last_change_date=
project_title=
project_id=
file_name=
proj_file=
dyn_metadata_file=
out_path=
use_pfile=0
use_dyn_md_file=0

[RawProcess_General]
data_path=

[RawProcess_Settings]
rot_meth=1
tlag_meth=2
detrend_meth=0

[RawProcess_ParameterSettings]
despike_vm=0

[RawProcess_TiltCorrection_Settings]
pf_start_date=
pf_end_date=
pf_start_time=
pf_end_time=

[RawProcess_TimelagOptimization_Settings]
to_start_date=
to_end_date=
to_start_time=
to_end_time=
";

pub const METADATA_TEMPLATE: &str = "\
[Project]
title=
file_name=

[Site]
site_name=Zackenberg Fen
altitude=
canopy_height=
latitude=
longitude=

[Station]
station_name=GL-ZaF

[Timing]
acquisition_frequency=
file_duration=

[Instruments]
instr_1_manufacturer=gill
instr_1_height=
instr_1_wformat=
instr_1_wref=
instr_1_north_offset=
instr_2_manufacturer=licor
instr_2_northward_separation=
instr_2_eastward_separation=
instr_2_vertical_separation=

[FileDescription]
col_1_variable=u
col_2_variable=v
col_3_variable=w
col_4_variable=ts
col_5_variable=co2
";

pub const ECMD_HEADER: &str = "DATE_OF_VARIATION_EF,SITEID,ALTITUDE,CANOPY_HEIGHT,LATITUDE,\
LONGITUDE,ACQUISITION_FREQUENCY,FILE_DURATION,SA_MANUFACTURER,SA_MODEL,SA_HEIGHT,\
SA_WIND_DATA_FORMAT,SA_NORTH_ALIGNEMENT,SA_NORTH_OFFSET,GA_MANUFACTURER,GA_MODEL,\
GA_NORTHWARD_SEPARATION,GA_EASTWARD_SEPARATION,GA_VERTICAL_SEPARATION";

/// One ECMD data line for `site_id`, effective from January 1st of `year`
#[must_use]
pub fn ecmd_line(site_id: &str, year: i32, canopy_height: f64) -> String {
    format!(
        "{year}01010000,{site_id},40,{canopy_height},74.48,-20.55,20,30,gill,hs_50,3.5,\
uvw,spar,0,licor,li7200,0,0.2,0"
    )
}

/// A site layout in a temporary directory
///
/// Holds a project template, a metadata template, an ECMD file with one row
/// per fixture year, raw data directories and a fake EddyPro install.
pub struct SiteFixture {
    dir: TempDir,
    pub site_id: String,
    pub template_path: PathBuf,
    pub ecmd_path: PathBuf,
    pub config_dir: PathBuf,
    pub executable: PathBuf,
}

impl SiteFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();

        let config_dir = root.join("config");
        fs::create_dir_all(&config_dir).unwrap();
        let template_path = config_dir.join("EddyProProject_template.ini");
        fs::write(&template_path, PROJECT_TEMPLATE).unwrap();
        fs::write(config_dir.join("metadata_template.ini"), METADATA_TEMPLATE).unwrap();

        let ecmd_path = root.join("metadata").join(format!("{SITE_ID}_ecmd.csv"));
        let mut ecmd = format!("{ECMD_HEADER}\n");
        for (&year, canopy) in FIXTURE_YEARS.iter().zip([0.1, 0.15, 0.2]) {
            ecmd.push_str(&ecmd_line(SITE_ID, year, canopy));
            ecmd.push('\n');
        }
        ecmd.push_str(&ecmd_line("DK-Other", 2021, 1.0));
        ecmd.push('\n');
        write_file(&ecmd_path, &ecmd);

        let install = root.join("eddypro").join("bin");
        fs::create_dir_all(&install).unwrap();
        let executable = install.join("eddypro_rp");
        fs::write(&executable, "").unwrap();
        fs::write(install.join("eddypro_fcc"), "").unwrap();

        let fixture = Self {
            dir,
            site_id: SITE_ID.to_string(),
            template_path,
            ecmd_path,
            config_dir,
            executable,
        };
        for &year in FIXTURE_YEARS {
            let input = fixture.input_dir(year);
            write_file(
                &input.join(format!("{year}-06-01T000000_raw.csv")),
                "u,v,w,ts\n0.1,0.2,0.0,271.3\n",
            );
        }
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_dir(&self, year: i32) -> PathBuf {
        self.root().join("raw").join(&self.site_id).join(year.to_string())
    }

    pub fn output_dir(&self, year: i32) -> PathBuf {
        self.root().join("output").join(&self.site_id).join(year.to_string())
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root().join("reports")
    }

    /// YAML configuration pointing at this layout
    pub fn config_yaml(&self, years: &[i32]) -> String {
        let root = self.root().display().to_string().replace('\\', "/");
        let years: Vec<String> = years.iter().map(ToString::to_string).collect();
        format!(
            "\
eddypro_executable: '{executable}'
site_id: {site}
years_to_process: [{years}]
input_dir_pattern: '{root}/raw/{{site_id}}/{{year}}'
output_dir_pattern: '{root}/output/{{site_id}}/{{year}}'
ecmd_file: '{root}/metadata/{{site_id}}_ecmd.csv'
project_template: '{template}'
config_dir: '{config_dir}'
reports_dir: '{root}/reports'
stream_output: false
log_level: INFO
metrics_interval_seconds: 0.1
",
            executable = self.executable.display().to_string().replace('\\', "/"),
            site = self.site_id,
            years = years.join(", "),
            template = self.template_path.display().to_string().replace('\\', "/"),
            config_dir = self.config_dir.display().to_string().replace('\\', "/"),
        )
    }

    /// Write [`Self::config_yaml`] to `config/config.yaml` and return its path
    pub fn write_config(&self, years: &[i32]) -> PathBuf {
        let path = self.config_dir.join("config.yaml");
        fs::write(&path, self.config_yaml(years)).unwrap();
        path
    }

    pub fn batch_config(&self, years: &[i32]) -> BatchConfig {
        BatchConfig::from_yaml(&self.config_yaml(years)).unwrap()
    }
}

impl Default for SiteFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// [`PipelineRunner`] that records requests and replays queued outcomes
///
/// Once the queue is drained every run succeeds.
#[derive(Default)]
pub struct FakePipelineRunner {
    outcomes: Mutex<VecDeque<PipelineOutcome>>,
    requests: Mutex<Vec<PipelineRequest>>,
}

impl FakePipelineRunner {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: Vec<PipelineOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<PipelineRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PipelineRunner for FakePipelineRunner {
    async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome, BatchError> {
        self.requests.lock().push(request.clone());
        let outcome = self.outcomes.lock().pop_front().unwrap_or(PipelineOutcome {
            rp_return_code: 0,
            fcc_return_code: Some(0),
        });
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_layout() {
        let fixture = SiteFixture::new();
        assert!(fixture.template_path.is_file());
        assert!(fixture.config_dir.join("metadata_template.ini").is_file());
        assert!(fixture.ecmd_path.is_file());
        for &year in FIXTURE_YEARS {
            assert!(fixture.input_dir(year).is_dir());
        }

        let config = fixture.batch_config(&[2021]);
        assert_eq!(config.input_dir(2021), fixture.input_dir(2021));
        assert_eq!(config.output_dir(2021), fixture.output_dir(2021));
        assert_eq!(config.ecmd_path(), fixture.ecmd_path);
        assert!(config.validate().is_ok());
    }
}
