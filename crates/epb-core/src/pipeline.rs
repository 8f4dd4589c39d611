//! EddyPro pipeline execution
//!
//! A pipeline run stages the EddyPro binaries inside the scenario directory,
//! runs `eddypro_rp` and then `eddypro_fcc` on the project file, and samples
//! performance metrics for each stage. Staging is private to the run, so
//! concurrent years never share `bin/` or `tmp/`.
//!
//! [`PipelineRunner`] is the seam the scenario executor calls through;
//! [`TokioPipelineRunner`] spawns the real processes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use epb_monitor::{MonitorConfig, PerformanceMonitor};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{BatchError, ExecutionError};
use crate::fs::copy_dir_recursive;

/// Raw processing stage
pub const STAGE_RP: &str = "rp";
/// Flux computation and correction stage
pub const STAGE_FCC: &str = "fcc";

/// One pipeline invocation
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    /// Project file to process
    pub project_file: PathBuf,
    /// Configured `eddypro_rp`; its directory is staged into `bin/`
    pub eddypro_executable: PathBuf,
    /// Scenario suffix, empty for baseline
    pub scenario_suffix: String,
    /// Echo process output to stdout
    pub stream_output: bool,
    /// Metrics sampling interval
    pub metrics_interval: Duration,
}

impl PipelineRequest {
    /// Directory the stages run in and `bin/`, `tmp/` are staged under
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.scenario_dir()
    }

    /// Directory holding the project file; metrics are written here
    #[must_use]
    pub fn scenario_dir(&self) -> PathBuf {
        self.project_file
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Metrics suffix for `stage`
    #[must_use]
    pub fn metrics_suffix(&self, stage: &str) -> String {
        if self.scenario_suffix.is_empty() {
            stage.to_string()
        } else {
            format!("{}_{stage}", self.scenario_suffix)
        }
    }
}

/// Exit codes of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// `eddypro_rp` exit code
    pub rp_return_code: i32,
    /// `eddypro_fcc` exit code, `None` if the stage was skipped
    pub fcc_return_code: Option<i32>,
}

impl PipelineOutcome {
    /// Both stages ran and exited with 0
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.rp_return_code == 0 && self.fcc_return_code == Some(0)
    }

    /// Code to record for the scenario: the first non-zero stage code
    #[must_use]
    pub fn return_code(&self) -> i32 {
        match (self.rp_return_code, self.fcc_return_code) {
            (0, Some(fcc)) => fcc,
            (0, None) => -1,
            (rp, _) => rp,
        }
    }

    /// Failure of the first stage that did not succeed, if any
    #[must_use]
    pub fn failure(&self) -> Option<ExecutionError> {
        if self.rp_return_code != 0 {
            return Some(ExecutionError::NonZeroExit {
                stage: STAGE_RP,
                return_code: self.rp_return_code,
            });
        }
        match self.fcc_return_code {
            Some(0) => None,
            Some(code) => Some(ExecutionError::NonZeroExit {
                stage: STAGE_FCC,
                return_code: code,
            }),
            None => Some(ExecutionError::NonZeroExit {
                stage: STAGE_FCC,
                return_code: -1,
            }),
        }
    }
}

/// Runs the EddyPro stages for one project file
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    /// Run the pipeline and report the stage exit codes
    ///
    /// A non-zero exit is reported in the outcome, not as an error.
    ///
    /// # Errors
    /// Returns an error if staging fails or a stage cannot be started.
    async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome, BatchError>;
}

/// [`PipelineRunner`] spawning the EddyPro executables with tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPipelineRunner;

impl TokioPipelineRunner {
    /// Create a runner
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// `-s` argument EddyPro expects for this platform
#[must_use]
pub fn platform_arg() -> &'static str {
    if cfg!(windows) {
        "win"
    } else {
        "linux"
    }
}

/// File name of a stage executable on this platform
#[must_use]
pub fn executable_name(stage: &str) -> String {
    if cfg!(windows) {
        format!("eddypro_{stage}.exe")
    } else {
        format!("eddypro_{stage}")
    }
}

#[async_trait]
impl PipelineRunner for TokioPipelineRunner {
    async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome, BatchError> {
        let work_dir = request.work_dir();
        let bin_dir = work_dir.join("bin");
        let tmp_dir = work_dir.join("tmp");

        let result = run_stages(request, &work_dir, &bin_dir, &tmp_dir).await;
        cleanup(&[bin_dir, tmp_dir]).await;
        result
    }
}

async fn run_stages(
    request: &PipelineRequest,
    work_dir: &Path,
    bin_dir: &Path,
    tmp_dir: &Path,
) -> Result<PipelineOutcome, BatchError> {
    stage_binaries(request, work_dir, bin_dir, tmp_dir).await?;

    let rp_return_code = run_stage(request, STAGE_RP, bin_dir, work_dir).await?;
    if rp_return_code != 0 {
        tracing::error!("eddypro_rp failed with return code {}", rp_return_code);
        return Ok(PipelineOutcome {
            rp_return_code,
            fcc_return_code: None,
        });
    }

    let fcc_return_code = run_stage(request, STAGE_FCC, bin_dir, work_dir).await?;
    if fcc_return_code != 0 {
        tracing::error!("eddypro_fcc failed with return code {}", fcc_return_code);
    }
    Ok(PipelineOutcome {
        rp_return_code,
        fcc_return_code: Some(fcc_return_code),
    })
}

async fn stage_binaries(
    request: &PipelineRequest,
    work_dir: &Path,
    bin_dir: &Path,
    tmp_dir: &Path,
) -> Result<(), BatchError> {
    for dir in [work_dir, tmp_dir, bin_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| BatchError::io_error(dir, e))?;
    }

    let source_dir = request
        .eddypro_executable
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            BatchError::Pipeline(format!(
                "executable {} has no parent directory",
                request.eddypro_executable.display()
            ))
        })?;
    if !source_dir.is_dir() {
        return Err(BatchError::Pipeline(format!(
            "EddyPro bin directory not found: {}",
            source_dir.display()
        )));
    }

    let dst = bin_dir.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir_recursive(&source_dir, &dst))
        .await
        .map_err(|e| BatchError::Pipeline(format!("staging task failed: {e}")))??;
    tracing::debug!("Staged EddyPro binaries into {}", bin_dir.display());
    Ok(())
}

async fn run_stage(
    request: &PipelineRequest,
    stage: &'static str,
    bin_dir: &Path,
    work_dir: &Path,
) -> Result<i32, BatchError> {
    let executable = bin_dir.join(executable_name(stage));
    if !executable.exists() {
        return Err(ExecutionError::MissingExecutable {
            stage,
            path: executable,
        }
        .into());
    }

    tracing::info!(
        "Running eddypro_{} on {}",
        stage,
        request.project_file.display()
    );

    let mut child = Command::new(&executable)
        .arg("-s")
        .arg(platform_arg())
        .arg(&request.project_file)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutionError::Spawn { stage, source })?;

    let monitor_config = MonitorConfig::new(request.scenario_dir())
        .with_interval(request.metrics_interval)
        .with_scenario_suffix(request.metrics_suffix(stage));
    let monitor = start_monitor(monitor_config, child.id()).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(BufReader::new(stdout), tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(BufReader::new(stderr), tx.clone())));
    }
    drop(tx);

    let mut stdout = tokio::io::stdout();
    while let Some(line) = rx.recv().await {
        if request.stream_output {
            let _ = stdout.write_all(line.as_bytes()).await;
            let _ = stdout.write_all(b"\n").await;
        } else {
            tracing::debug!(stage, "{}", line);
        }
    }
    let _ = stdout.flush().await;
    for reader in readers {
        let _ = reader.await;
    }

    let status = child
        .wait()
        .await
        .map_err(|source| ExecutionError::Spawn { stage, source })?;

    if let Some(monitor) = monitor {
        stop_monitor(monitor).await;
    }

    Ok(status.code().unwrap_or(-1))
}

async fn forward_lines<R>(reader: BufReader<R>, tx: mpsc::UnboundedSender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Stopped reading process output: {}", e);
                break;
            }
        }
    }
}

async fn start_monitor(config: MonitorConfig, pid: Option<u32>) -> Option<PerformanceMonitor> {
    let started = tokio::task::spawn_blocking(move || {
        let mut monitor = PerformanceMonitor::new(config);
        monitor.start(pid).map(|()| monitor)
    })
    .await;
    match started {
        Ok(Ok(monitor)) => Some(monitor),
        Ok(Err(e)) => {
            tracing::warn!("Performance monitoring unavailable: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("Performance monitor task failed: {}", e);
            None
        }
    }
}

async fn stop_monitor(mut monitor: PerformanceMonitor) {
    let stopped = tokio::task::spawn_blocking(move || monitor.stop()).await;
    match stopped {
        Ok(Ok(Some(summary))) => {
            if let Some(report) = summary.report() {
                tracing::debug!("Collected {} performance samples", report.samples.count);
            }
        }
        Ok(Ok(None)) => {}
        Ok(Err(e)) => tracing::warn!("Failed to write performance metrics: {}", e),
        Err(e) => tracing::warn!("Performance monitor task failed: {}", e),
    }
}

async fn cleanup(dirs: &[PathBuf]) {
    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => tracing::debug!("Removed {}", dir.display()),
            Err(e) => tracing::warn!("Failed to clean up {}: {}", dir.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(project: &str, suffix: &str) -> PipelineRequest {
        PipelineRequest {
            project_file: PathBuf::from(project),
            eddypro_executable: PathBuf::from("/opt/eddypro/bin/eddypro_rp"),
            scenario_suffix: suffix.to_string(),
            stream_output: false,
            metrics_interval: Duration::from_millis(100),
        }
    }

    #[test]
    fn directories_follow_project_file() {
        let req = request("/out/2021/scenario_rot1/S_2021_rot1.eddypro", "_rot1");
        assert_eq!(req.scenario_dir(), PathBuf::from("/out/2021/scenario_rot1"));
        assert_eq!(req.work_dir(), req.scenario_dir());
        assert_eq!(req.metrics_suffix(STAGE_RP), "_rot1_rp");

        let baseline = request("/out/2021/S_2021.eddypro", "");
        assert_eq!(baseline.metrics_suffix(STAGE_FCC), "fcc");
    }

    #[test]
    fn outcome_codes() {
        let ok = PipelineOutcome {
            rp_return_code: 0,
            fcc_return_code: Some(0),
        };
        assert!(ok.success());
        assert_eq!(ok.return_code(), 0);
        assert!(ok.failure().is_none());

        let rp_failed = PipelineOutcome {
            rp_return_code: 3,
            fcc_return_code: None,
        };
        assert!(!rp_failed.success());
        assert_eq!(rp_failed.return_code(), 3);
        assert_eq!(
            rp_failed.failure().unwrap().to_string(),
            "eddypro_rp failed with return code 3"
        );

        let fcc_failed = PipelineOutcome {
            rp_return_code: 0,
            fcc_return_code: Some(1),
        };
        assert_eq!(fcc_failed.return_code(), 1);
        assert_eq!(
            fcc_failed.failure().unwrap().to_string(),
            "eddypro_fcc failed with return code 1"
        );
    }

    #[test]
    fn platform_names() {
        if cfg!(windows) {
            assert_eq!(executable_name("rp"), "eddypro_rp.exe");
        } else {
            assert_eq!(executable_name("rp"), "eddypro_rp");
            assert_eq!(platform_arg(), "linux");
        }
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(path: &Path, body: &str) {
            fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn setup(rp_exit: i32, fcc_exit: i32) -> (TempDir, PipelineRequest) {
            let dir = TempDir::new().unwrap();
            let install = dir.path().join("eddypro").join("bin");
            fs::create_dir_all(&install).unwrap();
            script(
                &install.join("eddypro_rp"),
                &format!("echo rp \"$@\"\necho warn >&2\nexit {rp_exit}"),
            );
            script(
                &install.join("eddypro_fcc"),
                &format!("sleep 0.2\necho fcc done\nexit {fcc_exit}"),
            );

            let scenario_dir = dir.path().join("out").join("scenario_rot1");
            fs::create_dir_all(&scenario_dir).unwrap();
            let project = scenario_dir.join("S_2021_rot1.eddypro");
            fs::write(&project, "[Project]\n").unwrap();

            let request = PipelineRequest {
                project_file: project,
                eddypro_executable: install.join("eddypro_rp"),
                scenario_suffix: "_rot1".to_string(),
                stream_output: false,
                metrics_interval: Duration::from_millis(100),
            };
            (dir, request)
        }

        #[tokio::test]
        async fn runs_both_stages_and_cleans_up() {
            let (dir, request) = setup(0, 0);
            let outcome = TokioPipelineRunner::new().run(&request).await.unwrap();
            assert!(outcome.success());

            let work_dir = request.work_dir();
            assert!(work_dir.starts_with(dir.path().join("out")));
            assert!(!work_dir.join("bin").exists());
            assert!(!work_dir.join("tmp").exists());

            let scenario_dir = request.scenario_dir();
            assert!(scenario_dir.join("metrics_summary_rot1_rp.json").exists());
            assert!(scenario_dir.join("metrics_summary_rot1_fcc.json").exists());
        }

        #[tokio::test]
        async fn fcc_skipped_when_rp_fails() {
            let (_dir, request) = setup(2, 0);
            let outcome = TokioPipelineRunner::new().run(&request).await.unwrap();
            assert_eq!(outcome.rp_return_code, 2);
            assert_eq!(outcome.fcc_return_code, None);
            assert!(!request
                .scenario_dir()
                .join("metrics_summary_rot1_fcc.json")
                .exists());
        }

        #[tokio::test]
        async fn fcc_failure_is_reported() {
            let (_dir, request) = setup(0, 4);
            let outcome = TokioPipelineRunner::new().run(&request).await.unwrap();
            assert_eq!(outcome.fcc_return_code, Some(4));
            assert!(!outcome.success());
        }

        #[tokio::test]
        async fn missing_install_dir_is_error() {
            let (dir, mut request) = setup(0, 0);
            request.eddypro_executable = dir.path().join("nowhere").join("eddypro_rp");
            let err = TokioPipelineRunner::new().run(&request).await.unwrap_err();
            assert!(matches!(err, BatchError::Pipeline(_)));
            assert!(!request.work_dir().join("bin").exists());
        }
    }
}
