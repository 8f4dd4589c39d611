//! Background performance monitor
//!
//! [`PerformanceMonitor`] samples system metrics, and optionally those of one
//! child process, on a dedicated `perf-monitor` thread. The thread appends to
//! a shared buffer and waits on a crossbeam stop channel between samples, so
//! [`PerformanceMonitor::stop`] never waits out a full interval.
//!
//! On stop the monitor writes two files into its output directory:
//! - `metrics{_suffix}.csv`: one row per sample
//! - `metrics_summary{_suffix}.json`: per-field statistics

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::sample::MonitorSample;
use crate::source::{MetricsSource, SysinfoSource};
use crate::state::{validate_transition, MonitorState};
use crate::stats::{compute_stats, FieldStats};

/// Sampling interval used when none is configured
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Shortest accepted sampling interval
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// How long `stop` waits for the sampler to acknowledge
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

const SAMPLER_THREAD_NAME: &str = "perf-monitor";

/// Monitor settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    interval: Duration,
    output_dir: PathBuf,
    scenario_suffix: String,
}

impl MonitorConfig {
    /// Config writing into `output_dir` at the default interval
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            output_dir: output_dir.into(),
            scenario_suffix: String::new(),
        }
    }

    /// Set the sampling interval, clamped to [`MIN_INTERVAL`]
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the sampling interval in seconds
    ///
    /// Non-finite or negative values fall back to [`MIN_INTERVAL`].
    #[must_use]
    pub fn with_interval_secs(self, seconds: f64) -> Self {
        let interval = Duration::try_from_secs_f64(seconds).unwrap_or(MIN_INTERVAL);
        self.with_interval(interval)
    }

    /// Set the scenario suffix used in output file names
    #[must_use]
    pub fn with_scenario_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.scenario_suffix = suffix.into();
        self
    }

    /// Sampling interval
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Directory receiving the output files
    #[inline]
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Scenario suffix, possibly empty
    #[inline]
    #[must_use]
    pub fn scenario_suffix(&self) -> &str {
        &self.scenario_suffix
    }

    /// Path of the per-sample CSV
    #[must_use]
    pub fn metrics_csv_path(&self) -> PathBuf {
        self.output_dir
            .join(output_file_name("metrics", "csv", &self.scenario_suffix))
    }

    /// Path of the summary JSON
    #[must_use]
    pub fn summary_json_path(&self) -> PathBuf {
        self.output_dir
            .join(output_file_name("metrics_summary", "json", &self.scenario_suffix))
    }
}

fn output_file_name(stem: &str, ext: &str, suffix: &str) -> String {
    let suffix = suffix.trim_start_matches('_');
    if suffix.is_empty() {
        format!("{stem}.{ext}")
    } else {
        format!("{stem}_{suffix}.{ext}")
    }
}

/// `monitoring_config` block of the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub interval_seconds: f64,
    pub scenario_suffix: String,
    pub output_dir: String,
}

/// `timing` block of the summary, in Unix seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTiming {
    pub start_time: f64,
    pub end_time: f64,
    pub duration_seconds: f64,
}

/// `samples` block of the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySamples {
    pub count: usize,
    pub first_timestamp: f64,
    pub last_timestamp: f64,
}

/// Summary of a monitoring session with at least one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub monitoring_config: SummaryConfig,
    pub timing: SummaryTiming,
    pub samples: SummarySamples,
    pub metrics: BTreeMap<String, FieldStats>,
}

/// Result of [`PerformanceMonitor::stop`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonitorSummary {
    /// Statistics over the collected samples
    Collected(SummaryReport),
    /// Nothing was sampled
    Empty {
        /// Always `"No samples collected"`
        error: String,
    },
}

impl MonitorSummary {
    fn empty() -> Self {
        Self::Empty {
            error: "No samples collected".to_string(),
        }
    }

    /// Report, if any samples were collected
    #[must_use]
    pub fn report(&self) -> Option<&SummaryReport> {
        match self {
            Self::Collected(report) => Some(report),
            Self::Empty { .. } => None,
        }
    }
}

/// Build the summary for a finished session
pub(crate) fn summarize(
    config: &MonitorConfig,
    samples: &[MonitorSample],
    start_time: f64,
    end_time: f64,
) -> MonitorSummary {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return MonitorSummary::empty();
    };

    let mut series: BTreeMap<&'static str, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        for (name, value) in sample.metric_fields() {
            series.entry(name).or_default().push(value);
        }
    }
    let metrics = series
        .into_iter()
        .filter_map(|(name, values)| compute_stats(&values).map(|s| (name.to_string(), s)))
        .collect();

    MonitorSummary::Collected(SummaryReport {
        monitoring_config: SummaryConfig {
            interval_seconds: config.interval.as_secs_f64(),
            scenario_suffix: config.scenario_suffix.clone(),
            output_dir: config.output_dir.display().to_string(),
        },
        timing: SummaryTiming {
            start_time,
            end_time,
            duration_seconds: end_time - start_time,
        },
        samples: SummarySamples {
            count: samples.len(),
            first_timestamp: first.timestamp,
            last_timestamp: last.timestamp,
        },
        metrics,
    })
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

struct Worker {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<Box<dyn MetricsSource>>,
}

/// Samples metrics on a background thread between `start` and `stop`
pub struct PerformanceMonitor {
    config: MonitorConfig,
    state: MonitorState,
    samples: Arc<Mutex<Vec<MonitorSample>>>,
    source: Option<Box<dyn MetricsSource>>,
    worker: Option<Worker>,
    start_time: Option<f64>,
    end_time: Option<f64>,
}

impl PerformanceMonitor {
    /// Monitor reading the live machine through [`SysinfoSource`]
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_source(config, Box::new(SysinfoSource::new()))
    }

    /// Monitor reading from a custom source
    #[must_use]
    pub fn with_source(config: MonitorConfig, source: Box<dyn MetricsSource>) -> Self {
        Self {
            config,
            state: MonitorState::Idle,
            samples: Arc::new(Mutex::new(Vec::new())),
            source: Some(source),
            worker: None,
            start_time: None,
            end_time: None,
        }
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Monitor settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Path of the per-sample CSV
    #[must_use]
    pub fn metrics_csv_path(&self) -> PathBuf {
        self.config.metrics_csv_path()
    }

    /// Path of the summary JSON
    #[must_use]
    pub fn summary_json_path(&self) -> PathBuf {
        self.config.summary_json_path()
    }

    /// Copy of the samples collected so far
    #[must_use]
    pub fn samples(&self) -> Vec<MonitorSample> {
        self.samples.lock().clone()
    }

    /// Start sampling, optionally following process `pid`
    ///
    /// An unknown `pid` is logged and sampling continues with system metrics
    /// only. Calling `start` while monitoring does nothing.
    ///
    /// # Errors
    /// Returns [`MonitorError::Spawn`] if the sampler thread cannot start.
    pub fn start(&mut self, pid: Option<u32>) -> Result<(), MonitorError> {
        if self.state == MonitorState::Monitoring {
            tracing::warn!("Performance monitor already running");
            return Ok(());
        }
        validate_transition(self.state, MonitorState::Monitoring)?;

        let mut source = self
            .source
            .take()
            .unwrap_or_else(|| Box::new(SysinfoSource::new()));

        let pid = pid.and_then(|pid| {
            if source.process(pid).is_some() {
                Some(pid)
            } else {
                tracing::warn!("Process {pid} not found; monitoring system metrics only");
                None
            }
        });

        self.samples.lock().clear();
        self.end_time = None;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let samples = Arc::clone(&self.samples);
        let interval = self.config.interval;
        let start_time = unix_now();
        let started = Instant::now();

        let handle = thread::Builder::new()
            .name(SAMPLER_THREAD_NAME.to_string())
            .spawn(move || {
                let mut pid = pid;
                loop {
                    let sample = collect_sample(source.as_mut(), &mut pid, started);
                    samples.lock().push(sample);
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = done_tx.send(());
                source
            })
            .map_err(|e| MonitorError::Spawn(e.to_string()))?;

        self.worker = Some(Worker {
            stop_tx,
            done_rx,
            handle,
        });
        self.start_time = Some(start_time);
        self.state = MonitorState::Monitoring;

        tracing::info!(
            "Started performance monitoring (interval: {:.2}s, pid: {:?})",
            interval.as_secs_f64(),
            pid
        );
        Ok(())
    }

    /// Stop sampling, write the outputs and return the summary
    ///
    /// Returns `Ok(None)` if the monitor was not running. The CSV is written
    /// only when samples exist; the summary JSON is always written.
    ///
    /// # Errors
    /// Returns IO, CSV or JSON errors from writing the outputs.
    pub fn stop(&mut self) -> Result<Option<MonitorSummary>, MonitorError> {
        if self.state != MonitorState::Monitoring {
            tracing::debug!("Performance monitor not running; nothing to stop");
            return Ok(None);
        }
        validate_transition(self.state, MonitorState::Stopped)?;

        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            match worker.done_rx.recv_timeout(STOP_TIMEOUT) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        "Sampler did not stop within {}s; detaching it",
                        STOP_TIMEOUT.as_secs()
                    );
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => match worker.handle.join() {
                    Ok(source) => self.source = Some(source),
                    Err(_) => tracing::error!("Sampler thread panicked"),
                },
            }
        }

        let end_time = unix_now();
        self.end_time = Some(end_time);
        self.state = MonitorState::Stopped;

        let samples = self.samples.lock().clone();
        let summary = summarize(
            &self.config,
            &samples,
            self.start_time.unwrap_or(end_time),
            end_time,
        );

        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| MonitorError::io_error(&self.config.output_dir, e))?;
        if samples.is_empty() {
            tracing::warn!("No samples to write to CSV");
        } else {
            write_metrics_csv(&self.metrics_csv_path(), &samples)?;
        }
        write_summary_json(&self.summary_json_path(), &summary)?;

        tracing::info!("Stopped performance monitoring ({} samples)", samples.len());
        Ok(Some(summary))
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
        }
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("samples", &self.samples.lock().len())
            .finish_non_exhaustive()
    }
}

fn collect_sample(
    source: &mut dyn MetricsSource,
    pid: &mut Option<u32>,
    started: Instant,
) -> MonitorSample {
    let system = source.system();
    let process = match *pid {
        Some(p) => {
            let metrics = source.process(p);
            if metrics.is_none() {
                tracing::debug!("Process {p} no longer available; continuing with system metrics");
                *pid = None;
            }
            metrics
        }
        None => None,
    };
    MonitorSample {
        timestamp: unix_now(),
        relative_time: started.elapsed().as_secs_f64(),
        system,
        process,
    }
}

fn write_metrics_csv(path: &Path, samples: &[MonitorSample]) -> Result<(), MonitorError> {
    let rows: Vec<Vec<(&'static str, f64)>> =
        samples.iter().map(MonitorSample::csv_fields).collect();
    let header: BTreeSet<&'static str> = rows.iter().flatten().map(|(name, _)| *name).collect();

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&header)?;
    for row in &rows {
        let cells: BTreeMap<&str, f64> = row.iter().copied().collect();
        writer.write_record(
            header
                .iter()
                .map(|name| cells.get(name).map(f64::to_string).unwrap_or_default()),
        )?;
    }
    writer.flush().map_err(|e| MonitorError::io_error(path, e))?;

    tracing::info!("Wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}

fn write_summary_json(path: &Path, summary: &MonitorSummary) -> Result<(), MonitorError> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).map_err(|e| MonitorError::io_error(path, e))?;
    tracing::info!("Wrote summary to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ProcessMetrics, SystemMetrics};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Deterministic source whose process disappears after `process_lives` reads
    struct ScriptedSource {
        ticks: u64,
        process_lives: usize,
        process_reads: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(process_lives: usize) -> (Self, Arc<AtomicUsize>) {
            let reads = Arc::new(AtomicUsize::new(0));
            let source = Self {
                ticks: 0,
                process_lives,
                process_reads: Arc::clone(&reads),
            };
            (source, reads)
        }
    }

    impl MetricsSource for ScriptedSource {
        #[allow(clippy::cast_precision_loss)]
        fn system(&mut self) -> SystemMetrics {
            self.ticks += 1;
            SystemMetrics {
                cpu_percent: Some(10.0 * self.ticks as f64),
                memory_total: Some(1000),
                memory_available: Some(400),
                memory_percent: Some(60.0),
                ..SystemMetrics::default()
            }
        }

        fn process(&mut self, _pid: u32) -> Option<ProcessMetrics> {
            let n = self.process_reads.fetch_add(1, Ordering::SeqCst);
            (n < self.process_lives).then(|| ProcessMetrics {
                cpu_percent: Some(50.0),
                memory_rss: Some(128),
                ..ProcessMetrics::default()
            })
        }
    }

    fn monitor_in(dir: &TempDir, process_lives: usize) -> PerformanceMonitor {
        let (source, _) = ScriptedSource::new(process_lives);
        let config = MonitorConfig::new(dir.path()).with_interval(MIN_INTERVAL);
        PerformanceMonitor::with_source(config, Box::new(source))
    }

    #[test]
    fn interval_is_clamped() {
        let config = MonitorConfig::new("out").with_interval(Duration::from_millis(10));
        assert_eq!(config.interval(), MIN_INTERVAL);
        let config = MonitorConfig::new("out").with_interval_secs(-1.0);
        assert_eq!(config.interval(), MIN_INTERVAL);
        assert_eq!(MonitorConfig::new("out").interval(), DEFAULT_INTERVAL);
    }

    #[test]
    fn output_names_follow_suffix() {
        let config = MonitorConfig::new("out");
        assert_eq!(config.metrics_csv_path(), Path::new("out/metrics.csv"));
        let config = config.with_scenario_suffix("_rot3_tlag4");
        assert_eq!(config.metrics_csv_path(), Path::new("out/metrics_rot3_tlag4.csv"));
        assert_eq!(
            config.summary_json_path(),
            Path::new("out/metrics_summary_rot3_tlag4.json")
        );
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut monitor = monitor_in(&dir, usize::MAX);
        assert!(monitor.stop().unwrap().is_none());
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(!monitor.summary_json_path().exists());
    }

    #[test]
    fn start_stop_writes_outputs() {
        let dir = TempDir::new().unwrap();
        let mut monitor = monitor_in(&dir, usize::MAX);
        monitor.start(Some(4242)).unwrap();
        assert_eq!(monitor.state(), MonitorState::Monitoring);
        // second start is ignored
        monitor.start(Some(4242)).unwrap();
        thread::sleep(Duration::from_millis(350));

        let summary = monitor.stop().unwrap().unwrap();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        let report = summary.report().unwrap();
        assert!(report.samples.count >= 2);
        assert!(report.metrics.contains_key("system_cpu_percent"));
        assert!(report.metrics.contains_key("process_memory_rss"));
        assert!(!report.metrics.contains_key("timestamp"));
        assert!(report.timing.duration_seconds >= 0.0);

        let csv_text = fs::read_to_string(monitor.metrics_csv_path()).unwrap();
        let header: Vec<&str> = csv_text.lines().next().unwrap().split(',').collect();
        let mut sorted = header.clone();
        sorted.sort_unstable();
        assert_eq!(header, sorted);
        assert!(header.contains(&"timestamp"));
        assert!(header.contains(&"relative_time"));
        assert_eq!(csv_text.lines().count(), report.samples.count + 1);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(monitor.summary_json_path()).unwrap())
                .unwrap();
        assert_eq!(json["samples"]["count"], report.samples.count);
        assert_eq!(json["monitoring_config"]["interval_seconds"], 0.1);
    }

    #[test]
    fn unknown_pid_samples_system_only() {
        let dir = TempDir::new().unwrap();
        let mut monitor = monitor_in(&dir, 0);
        monitor.start(Some(7)).unwrap();
        thread::sleep(Duration::from_millis(150));
        monitor.stop().unwrap();
        let samples = monitor.samples();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.process.is_none()));
    }

    #[test]
    fn exited_process_degrades_to_system_metrics() {
        let dir = TempDir::new().unwrap();
        // probe plus the first sample see the process
        let (source, reads) = ScriptedSource::new(2);
        let config = MonitorConfig::new(dir.path()).with_interval(MIN_INTERVAL);
        let mut monitor = PerformanceMonitor::with_source(config, Box::new(source));
        monitor.start(Some(99)).unwrap();
        thread::sleep(Duration::from_millis(450));
        monitor.stop().unwrap();

        let samples = monitor.samples();
        assert!(samples.len() >= 3);
        assert!(samples[0].process.is_some());
        assert!(samples[1..].iter().all(|s| s.process.is_none()));
        // no reads after the process went away
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn restart_clears_samples() {
        let dir = TempDir::new().unwrap();
        let mut monitor = monitor_in(&dir, usize::MAX);
        monitor.start(None).unwrap();
        thread::sleep(Duration::from_millis(250));
        monitor.stop().unwrap();
        let first_run = monitor.samples().len();

        monitor.start(None).unwrap();
        monitor.stop().unwrap();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(monitor.samples().len() < first_run);
    }

    #[test]
    fn empty_summary_shape() {
        let config = MonitorConfig::new("out");
        let summary = summarize(&config, &[], 1.0, 2.0);
        assert!(summary.report().is_none());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json, serde_json::json!({"error": "No samples collected"}));
    }

    #[test]
    fn summary_of_known_samples() {
        let config = MonitorConfig::new("out").with_scenario_suffix("_rot1");
        let samples: Vec<MonitorSample> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .iter()
            .map(|cpu| MonitorSample {
                timestamp: 100.0 + cpu,
                relative_time: *cpu,
                system: SystemMetrics {
                    cpu_percent: Some(*cpu),
                    ..SystemMetrics::default()
                },
                process: None,
            })
            .collect();
        let summary = summarize(&config, &samples, 100.0, 106.0);
        let report = summary.report().unwrap();
        assert_eq!(report.samples.first_timestamp, 101.0);
        assert_eq!(report.samples.last_timestamp, 105.0);
        assert_eq!(report.timing.duration_seconds, 6.0);
        assert_eq!(report.monitoring_config.scenario_suffix, "_rot1");
        let cpu = &report.metrics["system_cpu_percent"];
        assert_eq!(cpu.count, 5);
        assert_eq!(cpu.p50, Some(3.0));
    }
}
