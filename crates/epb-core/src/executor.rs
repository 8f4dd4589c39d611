//! Single-scenario execution
//!
//! [`ScenarioExecutor::execute`] prepares one scenario directory from the
//! project template and runs the pipeline on it. Failures after the
//! directory is chosen never escape: they are recorded in the returned
//! [`ScenarioResult`] so the batch can continue.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use epb_ecmd::{generate_dynamic_metadata, select_row_for_year, EcmdError};
use epb_ini::{
    patch_conditional_date_ranges, patch_parameters, patch_paths, patch_project_metadata,
    validate_inputs_preflight, validate_metadata_preflight, write_project_file_with_metadata,
    ConfigDocument, MetadataTarget, PatchPathsRequest,
};
use epb_scenario::{validate_parameters, Scenario};
use serde::{Deserialize, Serialize};

use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::events::{BatchEvent, EventSink};
use crate::fs::atomic_write;
use crate::pipeline::{PipelineOutcome, PipelineRequest, PipelineRunner, STAGE_FCC, STAGE_RP};

/// Everything a scenario needs to know about its year
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioContext {
    /// Site identifier
    pub site_id: String,
    /// Processing year
    pub year: i32,
    /// EddyPro project template
    pub template_path: PathBuf,
    /// Year output directory; scenarios get subdirectories of it
    pub output_base_dir: PathBuf,
    /// Raw data directory used when the template leaves `data_path` blank
    pub input_dir: PathBuf,
    /// ECMD CSV
    pub ecmd_path: PathBuf,
    /// Directory holding the metadata templates
    pub config_dir: PathBuf,
    /// Configured `eddypro_rp`
    pub eddypro_executable: PathBuf,
    /// Echo EddyPro output to stdout
    pub stream_output: bool,
    /// Metrics sampling interval
    pub metrics_interval: Duration,
    /// Stop before running EddyPro
    pub dry_run: bool,
}

impl ScenarioContext {
    /// Context for `year` under `config`
    #[must_use]
    pub fn from_config(config: &BatchConfig, year: i32) -> Self {
        Self {
            site_id: config.site_id.clone(),
            year,
            template_path: config.project_template.clone(),
            output_base_dir: config.output_dir(year),
            input_dir: config.input_dir(year),
            ecmd_path: config.ecmd_path(),
            config_dir: config.config_dir.clone(),
            eddypro_executable: config.eddypro_executable.clone(),
            stream_output: config.stream_output,
            metrics_interval: config.metrics_interval(),
            dry_run: config.dry_run,
        }
    }

    /// Metadata template for the site, falling back to the generic one
    #[must_use]
    pub fn metadata_template(&self) -> PathBuf {
        let site_specific = self
            .config_dir
            .join(format!("{}_metadata_template.ini", self.site_id));
        if site_specific.exists() {
            site_specific
        } else {
            self.config_dir.join("metadata_template.ini")
        }
    }
}

/// Where a scenario writes its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioLayout {
    /// Scenario directory
    pub dir: PathBuf,
    /// EddyPro project file
    pub project_file: PathBuf,
    /// Static `.metadata` file
    pub metadata_file: PathBuf,
    /// Dynamic metadata table
    pub dynamic_metadata_file: PathBuf,
    /// Result written after the run
    pub manifest_file: PathBuf,
}

impl ScenarioLayout {
    /// Layout for `scenario`, or for a baseline run when `None`
    #[must_use]
    pub fn new(ctx: &ScenarioContext, scenario: Option<&Scenario>) -> Self {
        let suffix = scenario.map_or("", Scenario::suffix);
        let (dir, project_name) = match scenario {
            Some(s) => (
                ctx.output_base_dir.join(format!("scenario{}", s.suffix())),
                format!("{}_{}_{}.eddypro", ctx.site_id, ctx.year, s.id()),
            ),
            None => (
                ctx.output_base_dir.clone(),
                format!("{}_{}.eddypro", ctx.site_id, ctx.year),
            ),
        };
        Self {
            project_file: dir.join(project_name),
            metadata_file: dir.join(format!("{}.metadata", ctx.site_id)),
            dynamic_metadata_file: dir.join(format!("{}_dynamic_metadata.txt", ctx.site_id)),
            manifest_file: dir.join(format!("scenario_manifest{suffix}.json")),
            dir,
        }
    }
}

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// 1-based scenario index within the year
    pub scenario_index: usize,
    /// Scenario suffix, empty for baseline
    pub scenario_suffix: String,
    /// Parameter values applied to the template
    pub scenario_params: BTreeMap<String, i64>,
    /// Project file written for the scenario
    pub project_file: PathBuf,
    /// Scenario directory
    pub output_dir: PathBuf,
    /// Local start time
    pub start_time: NaiveDateTime,
    /// Local end time
    pub end_time: NaiveDateTime,
    /// Wall-clock duration
    pub duration_seconds: f64,
    /// Whether preparation and both stages succeeded
    pub success: bool,
    /// Pipeline exit code, `-1` when an error was captured
    pub return_code: i32,
    /// Captured error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether EddyPro was skipped
    pub dry_run: bool,
    /// Processing year
    pub year: i32,
}

/// Runs scenarios through a [`PipelineRunner`]
#[derive(Clone)]
pub struct ScenarioExecutor {
    runner: Arc<dyn PipelineRunner>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ScenarioExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioExecutor").finish_non_exhaustive()
    }
}

impl ScenarioExecutor {
    /// Create an executor
    #[must_use]
    pub fn new(runner: Arc<dyn PipelineRunner>, events: Arc<dyn EventSink>) -> Self {
        Self { runner, events }
    }

    /// Prepare and run one scenario, or a baseline run when `scenario` is `None`
    pub async fn execute(&self, ctx: &ScenarioContext, scenario: Option<&Scenario>) -> ScenarioResult {
        let layout = ScenarioLayout::new(ctx, scenario);
        let suffix = scenario.map_or_else(String::new, |s| s.suffix().to_string());
        let index = scenario.map_or(1, Scenario::index);
        let params = scenario.map(|s| s.parameters().clone()).unwrap_or_default();

        self.events.emit(BatchEvent::ScenarioStarted {
            year: ctx.year,
            index,
            suffix: suffix.clone(),
        });

        let start_time = Local::now().naive_local();
        let started = Instant::now();
        let outcome = self.prepare_and_run(ctx, scenario, &layout).await;
        let duration_seconds = started.elapsed().as_secs_f64();
        let end_time = Local::now().naive_local();

        let (success, return_code, error) = match &outcome {
            Ok(None) => (true, 0, None),
            Ok(Some(pipeline)) => {
                for (stage, code) in [
                    (STAGE_RP, Some(pipeline.rp_return_code)),
                    (STAGE_FCC, pipeline.fcc_return_code),
                ] {
                    if let Some(return_code) = code {
                        self.events.emit(BatchEvent::PipelineStage {
                            year: ctx.year,
                            suffix: suffix.clone(),
                            stage: stage.to_string(),
                            return_code,
                        });
                    }
                }
                (
                    pipeline.success(),
                    pipeline.return_code(),
                    pipeline.failure().map(|e| e.to_string()),
                )
            }
            Err(e) => (false, -1, Some(e.to_string())),
        };

        let result = ScenarioResult {
            scenario_index: index,
            scenario_suffix: suffix.clone(),
            scenario_params: params,
            project_file: layout.project_file.clone(),
            output_dir: layout.dir.clone(),
            start_time,
            end_time,
            duration_seconds,
            success,
            return_code,
            error: error.clone(),
            dry_run: ctx.dry_run,
            year: ctx.year,
        };

        if let Err(e) = write_scenario_manifest(&layout.manifest_file, &result) {
            tracing::warn!("Failed to write scenario manifest: {}", e);
        }

        self.events.emit(BatchEvent::ScenarioFinished {
            year: ctx.year,
            index,
            suffix,
            success,
            duration_seconds,
            error,
        });
        result
    }

    async fn prepare_and_run(
        &self,
        ctx: &ScenarioContext,
        scenario: Option<&Scenario>,
        layout: &ScenarioLayout,
    ) -> Result<Option<PipelineOutcome>, BatchError> {
        let suffix = scenario.map_or("", Scenario::suffix);
        let doc = prepare_project(ctx, scenario, layout)?;

        let csv_count = validate_inputs_preflight(&doc)?;
        tracing::info!("Found {} raw data file(s)", csv_count);
        validate_metadata_preflight(&doc)?;

        if ctx.dry_run {
            tracing::info!(
                "Dry run: project file ready at {}",
                layout.project_file.display()
            );
            return Ok(None);
        }

        let request = PipelineRequest {
            project_file: layout.project_file.clone(),
            eddypro_executable: ctx.eddypro_executable.clone(),
            scenario_suffix: suffix.to_string(),
            stream_output: ctx.stream_output,
            metrics_interval: ctx.metrics_interval,
        };
        self.runner.run(&request).await.map(Some)
    }
}

/// Build and write the project file and its metadata side-files
///
/// Returns the patched project document.
///
/// # Errors
/// Returns the first failing step's error. Missing metadata templates and
/// dynamic metadata failures are only logged.
pub fn prepare_project(
    ctx: &ScenarioContext,
    scenario: Option<&Scenario>,
    layout: &ScenarioLayout,
) -> Result<ConfigDocument, BatchError> {
    fs::create_dir_all(&layout.dir).map_err(|e| BatchError::io_error(&layout.dir, e))?;

    let mut doc = ConfigDocument::load(&ctx.template_path)?;

    if let Some(scenario) = scenario {
        let params = validate_parameters(scenario.parameters())?;
        patch_parameters(&mut doc, &params)?;
    }

    let data_path = match doc.get("RawProcess_General", "data_path") {
        Some(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
        _ => ctx.input_dir.clone(),
    };

    materialize_metadata(ctx, layout);

    if !ctx.ecmd_path.exists() {
        return Err(EcmdError::NotFound(ctx.ecmd_path.clone()).into());
    }
    let row = select_row_for_year(&ctx.ecmd_path, &ctx.site_id, ctx.year)?;
    tracing::info!(
        "Using ECMD row effective {} for {}",
        row.effective_date(),
        ctx.year
    );

    patch_paths(
        &mut doc,
        &PatchPathsRequest {
            proj_file: layout.metadata_file.clone(),
            dyn_metadata_file: layout.dynamic_metadata_file.clone(),
            data_path,
            out_path: layout.dir.clone(),
        },
    )?;
    patch_project_metadata(
        &mut doc,
        &ctx.site_id,
        ctx.year,
        scenario.map_or("", Scenario::suffix),
    )?;
    patch_conditional_date_ranges(&mut doc, ctx.year)?;

    write_project_file_with_metadata(
        &doc,
        &layout.project_file,
        &MetadataTarget {
            metadata_path: layout.metadata_file.clone(),
            site_id: ctx.site_id.clone(),
            output_dir: layout.dir.clone(),
        },
        &row,
    )?;
    tracing::info!("Wrote project file {}", layout.project_file.display());
    Ok(doc)
}

fn materialize_metadata(ctx: &ScenarioContext, layout: &ScenarioLayout) {
    let template = ctx.metadata_template();
    if template.exists() {
        match fs::copy(&template, &layout.metadata_file) {
            Ok(_) => tracing::debug!(
                "Copied metadata template {} to {}",
                template.display(),
                layout.metadata_file.display()
            ),
            Err(e) => tracing::warn!(
                "Failed to copy metadata template {}: {}",
                template.display(),
                e
            ),
        }
    } else {
        tracing::warn!("Metadata template not found: {}", template.display());
    }

    match generate_dynamic_metadata(&ctx.ecmd_path, &layout.dynamic_metadata_file, &ctx.site_id) {
        Ok(rows) => tracing::debug!(
            "Wrote {} dynamic metadata row(s) to {}",
            rows,
            layout.dynamic_metadata_file.display()
        ),
        Err(e) => tracing::warn!("Failed to generate dynamic metadata: {}", e),
    }
}

fn write_scenario_manifest(path: &Path, result: &ScenarioResult) -> Result<(), BatchError> {
    let json = serde_json::to_vec_pretty(result)?;
    atomic_write(path, &json)?;
    tracing::debug!("Wrote scenario manifest {}", path.display());
    Ok(())
}
