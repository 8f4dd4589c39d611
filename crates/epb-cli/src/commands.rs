//! Subcommand handlers
//!
//! Each handler returns the process exit code; errors bubble up to `main`,
//! which prints them and exits with 1.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use epb_core::{
    load_config_mapping, publish_run, validate_all, BatchConfig, BatchExecutor, ChartMode,
    RunManifest, TokioPipelineRunner, TracingSink, ValidationOptions,
};
use epb_scenario::{
    format_scenario_summary, generate_scenarios, validate_scenario_parameters, Scenario,
};

/// `scenarios` flags and the parameter each one sets
const SCENARIO_FLAGS: &[(&str, &str)] = &[
    ("rot-meth", "rot_meth"),
    ("tlag-meth", "tlag_meth"),
    ("detrend-meth", "detrend_meth"),
    ("despike-meth", "despike_meth"),
];

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Load the configuration and apply the `run` overrides
fn load_config(config_path: &Path, args: &ArgMatches) -> Result<BatchConfig> {
    let mut config = BatchConfig::load(config_path)?;

    if let Some(site) = args.get_one::<String>("site") {
        config = config.with_site(site.as_str());
    }
    if let Some(years) = args.get_many::<i32>("years") {
        config = config.with_years(years.copied().collect());
    }
    if args.get_flag("dry-run") {
        config = config.with_dry_run(true);
    }
    if let Some(mode) = args.get_one::<String>("report-charts") {
        config = config.with_report_charts(ChartMode::from_str(mode)?);
    }
    if let Some(&seconds) = args.get_one::<f64>("metrics-interval") {
        config = config.with_metrics_interval(seconds);
    }

    config.validate()?;
    Ok(config)
}

async fn execute_batch(config: BatchConfig, scenarios: &[Scenario]) -> Result<ExitCode> {
    let years = config.years_to_process.clone();
    let batch = BatchExecutor::new(
        config,
        Arc::new(TokioPipelineRunner::new()),
        Arc::new(TracingSink),
    );
    let outcome = batch.run(&years, scenarios).await?;

    let published = publish_run(batch.config(), &years, &outcome)
        .context("failed to write run manifest and report")?;
    println!(
        "Processed {} scenario(s): {} successful, {} failed",
        outcome.results.len(),
        outcome.successful(),
        outcome.failed()
    );
    println!("Run manifest: {}", published.manifest_path.display());
    println!("Report: {}", published.report_path.display());

    Ok(exit_code(outcome.overall_success()))
}

/// `run`: baseline batch over the configured years
pub(crate) async fn run(config_path: &Path, args: &ArgMatches) -> Result<ExitCode> {
    println!("Starting EddyPro batch processing");
    let config = load_config(config_path, args)?;
    if config.dry_run {
        println!("Dry run mode enabled");
    }
    tracing::info!(
        "Processing site {} for years {:?}",
        config.site_id,
        config.years_to_process
    );
    execute_batch(config, &[]).await
}

fn scenario_options(args: &ArgMatches) -> BTreeMap<String, Vec<i64>> {
    SCENARIO_FLAGS
        .iter()
        .filter_map(|(flag, param)| {
            args.get_many::<i64>(flag)
                .map(|values| ((*param).to_string(), values.copied().collect()))
        })
        .collect()
}

/// `scenarios`: parameter matrix over the configured years
///
/// Parameter values and the matrix size are checked before any output is
/// written.
pub(crate) async fn scenarios(config_path: &Path, args: &ArgMatches) -> Result<ExitCode> {
    let options = scenario_options(args);
    if options.is_empty() {
        let flags: Vec<String> = SCENARIO_FLAGS.iter().map(|(f, _)| format!("--{f}")).collect();
        bail!(
            "No scenario parameters provided; pass at least one of {}",
            flags.join(", ")
        );
    }
    validate_scenario_parameters(&options)?;

    tracing::info!("Starting scenario matrix processing");
    println!("Parameter options for scenarios:");
    for (name, values) in &options {
        println!("  {name}: {values:?}");
    }
    println!();

    let config = load_config(config_path, args)?;
    let max = max_scenarios(args, &config);
    let scenarios = generate_scenarios(&options, max)?;
    println!("{}", format_scenario_summary(&scenarios));

    if config.dry_run {
        println!("Dry run mode enabled");
    }
    execute_batch(config, &scenarios).await
}

/// `--max-scenarios`, falling back to the configured cap
fn max_scenarios(args: &ArgMatches, config: &BatchConfig) -> usize {
    args.get_one::<usize>("max-scenarios")
        .copied()
        .unwrap_or(config.max_scenarios)
}

/// `validate`: categorized configuration report
pub(crate) fn validate(config_path: &Path, args: &ArgMatches) -> Result<ExitCode> {
    let mapping = load_config_mapping(config_path)?;
    let report = validate_all(
        &mapping,
        ValidationOptions {
            skip_paths: args.get_flag("skip-paths"),
            skip_ecmd: args.get_flag("skip-ecmd"),
        },
    );
    println!("{}", report.format());
    Ok(exit_code(report.is_valid()))
}

fn reports_dir(config_path: &Path, args: &ArgMatches) -> Result<PathBuf> {
    if let Some(dir) = args.get_one::<PathBuf>("reports-dir") {
        return Ok(dir.clone());
    }
    let config = BatchConfig::load(config_path)
        .context("pass --reports-dir or a readable --config")?;
    Ok(config.reports_dir())
}

/// `status`: summary of the last recorded run
pub(crate) fn status(config_path: &Path, args: &ArgMatches) -> Result<ExitCode> {
    let dir = reports_dir(config_path, args)?;
    let path = RunManifest::path_in(&dir);
    if !path.exists() {
        println!("No run manifest found at {}", path.display());
        return Ok(ExitCode::FAILURE);
    }
    let manifest = RunManifest::load(&path)?;
    print!("{}", format_status(&manifest));
    Ok(ExitCode::SUCCESS)
}

fn format_status(manifest: &RunManifest) -> String {
    let mut out = String::new();
    out.push_str(&format!("Run ID: {}\n", manifest.run_id));
    out.push_str(&format!("Site: {}\n", manifest.site_id));
    out.push_str(&format!(
        "Window: {} -> {} ({:.1}s)\n",
        manifest.start_time.format("%Y-%m-%d %H:%M:%S"),
        manifest.end_time.format("%Y-%m-%d %H:%M:%S"),
        manifest.duration_seconds
    ));
    out.push_str(&format!("Dry run: {}\n", manifest.dry_run));
    out.push_str(&format!(
        "Scenarios: {} ({} successful, {} failed)\n",
        manifest.scenarios.len(),
        manifest.successful(),
        manifest.scenarios.len() - manifest.successful()
    ));
    for s in &manifest.scenarios {
        let name = if s.scenario_suffix.is_empty() {
            "baseline"
        } else {
            s.scenario_suffix.trim_start_matches('_')
        };
        let tag = if s.success { "[OK]  " } else { "[FAIL]" };
        out.push_str(&format!(
            "  {tag} {} #{} {name} ({:.1}s)",
            s.year, s.scenario_index, s.duration_seconds
        ));
        if let Some(error) = &s.error {
            out.push_str(&format!(": {error}"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use epb_core::ScenarioResult;

    fn manifest_with(results: Vec<ScenarioResult>) -> RunManifest {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        RunManifest {
            run_id: "S_20240101_000000".to_string(),
            timestamp: start,
            start_time: start,
            end_time: start,
            duration_seconds: 2.0,
            site_id: "S".to_string(),
            years_processed: vec![2021],
            config_checksum: String::new(),
            config_snapshot: serde_json::Value::Null,
            overall_success: results.iter().all(|r| r.success),
            scenarios: results,
            output_dirs: Vec::new(),
            output_files: BTreeMap::new(),
            environment: epb_core::Environment::capture(),
            dry_run: true,
        }
    }

    fn result(suffix: &str, success: bool) -> ScenarioResult {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        ScenarioResult {
            scenario_index: 1,
            scenario_suffix: suffix.to_string(),
            scenario_params: BTreeMap::new(),
            project_file: PathBuf::from("p.eddypro"),
            output_dir: PathBuf::from("out"),
            start_time: at,
            end_time: at,
            duration_seconds: 1.0,
            success,
            return_code: if success { 0 } else { 3 },
            error: (!success).then(|| "eddypro_rp failed with return code 3".to_string()),
            dry_run: true,
            year: 2021,
        }
    }

    #[test]
    fn status_lists_scenarios() {
        let text = format_status(&manifest_with(vec![
            result("", true),
            result("_rot3", false),
        ]));
        assert!(text.contains("Run ID: S_20240101_000000"));
        assert!(text.contains("Dry run: true"));
        assert!(text.contains("Scenarios: 2 (1 successful, 1 failed)"));
        assert!(text.contains("[OK]   2021 #1 baseline"));
        assert!(text.contains("[FAIL] 2021 #1 rot3 (1.0s): eddypro_rp failed"));
    }
}
