//! HTML run report
//!
//! The report is rendered from a [`RunManifest`] and the per-stage metrics
//! CSVs found in the scenario directories. Charts are optional: when they
//! cannot be drawn the report carries a note in their place.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::batch::BatchOutcome;
use crate::config::{BatchConfig, ChartMode};
use crate::error::BatchError;
use crate::fs::atomic_write;
use crate::manifest::RunManifest;

/// File name of the report inside the reports directory
pub const REPORT_FILE_NAME: &str = "run_report.html";

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const SVG_WIDTH: f64 = 800.0;
const SVG_HEIGHT: f64 = 200.0;
const SVG_PAD: f64 = 10.0;

const STYLE: &str = "\
body { font-family: Arial, sans-serif; margin: 20px; background-color: #f5f5f5; }
.container { max-width: 1200px; margin: auto; background: white; padding: 20px; }
table { width: 100%; border-collapse: collapse; margin: 20px 0; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #4CAF50; color: white; }
.success { color: green; font-weight: bold; }
.failure { color: red; font-weight: bold; }
.summary-box { background-color: #e7f3ff; padding: 15px; border-left: 4px solid #2196F3; margin: 20px 0; }
.chart-container { margin: 30px 0; }
.note { color: #666; font-style: italic; }
";

/// CPU usage over time from one metrics CSV
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    /// Chart title
    pub label: String,
    /// Column plotted on the y axis
    pub field: String,
    /// `(relative_time, value)` points in file order
    pub points: Vec<(f64, f64)>,
}

/// Escape text for inclusion in HTML
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Read CPU series from a metrics CSV
///
/// Uses `process_cpu_percent` when any row has it, otherwise
/// `system_cpu_percent`. Returns `None` when neither column has data.
///
/// # Errors
/// Returns [`BatchError::Pipeline`] if the file is not readable CSV.
pub fn load_metric_series(path: &Path, label: &str) -> Result<Option<MetricSeries>, BatchError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| BatchError::Pipeline(format!("cannot read {}: {e}", path.display())))?;
    let headers = reader
        .headers()
        .map_err(|e| BatchError::Pipeline(format!("cannot read {}: {e}", path.display())))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let Some(time_col) = column("relative_time") else {
        return Ok(None);
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| BatchError::Pipeline(format!("cannot read {}: {e}", path.display())))?;
        rows.push(record);
    }

    for field in ["process_cpu_percent", "system_cpu_percent"] {
        let Some(value_col) = column(field) else {
            continue;
        };
        let points: Vec<(f64, f64)> = rows
            .iter()
            .filter_map(|r| {
                let x = r.get(time_col)?.trim().parse::<f64>().ok()?;
                let y = r.get(value_col)?.trim().parse::<f64>().ok()?;
                Some((x, y))
            })
            .collect();
        if !points.is_empty() {
            return Ok(Some(MetricSeries {
                label: label.to_string(),
                field: field.to_string(),
                points,
            }));
        }
    }
    Ok(None)
}

fn metrics_csv_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("metrics") && n.ends_with(".csv"))
        })
        .collect();
    files.sort();
    files
}

/// Collect CPU series from every scenario directory in the manifest
///
/// Unreadable files are skipped with a warning.
#[must_use]
pub fn collect_metric_series(manifest: &RunManifest) -> Vec<MetricSeries> {
    let mut series = Vec::new();
    for scenario in &manifest.scenarios {
        let name = if scenario.scenario_suffix.is_empty() {
            "baseline"
        } else {
            scenario.scenario_suffix.trim_start_matches('_')
        };
        for path in metrics_csv_files(&scenario.output_dir) {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let label = format!("{} {name} ({stem})", scenario.year);
            match load_metric_series(&path, &label) {
                Ok(Some(s)) => series.push(s),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping metrics file: {}", e),
            }
        }
    }
    series
}

fn render_svg(series: &[MetricSeries]) -> Result<String, String> {
    if series.is_empty() {
        return Err("no metrics data".to_string());
    }
    let mut out = String::new();
    for s in series {
        let (x_min, x_max) = bounds(s.points.iter().map(|p| p.0));
        let (_, y_max) = bounds(s.points.iter().map(|p| p.1));
        let y_max = y_max.max(1.0);
        let x_span = (x_max - x_min).max(f64::EPSILON);

        let points: Vec<String> = s
            .points
            .iter()
            .map(|(x, y)| {
                let px = SVG_PAD + (x - x_min) / x_span * (SVG_WIDTH - 2.0 * SVG_PAD);
                let py = SVG_HEIGHT - SVG_PAD - y / y_max * (SVG_HEIGHT - 2.0 * SVG_PAD);
                format!("{px:.1},{py:.1}")
            })
            .collect();

        let _ = write!(
            out,
            "<div class=\"chart-container\"><h3>{}</h3>\
<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{SVG_WIDTH}\" height=\"{SVG_HEIGHT}\" role=\"img\">\
<title>{}</title>\
<rect x=\"0\" y=\"0\" width=\"{SVG_WIDTH}\" height=\"{SVG_HEIGHT}\" fill=\"#fafafa\" stroke=\"#ddd\"/>\
<polyline fill=\"none\" stroke=\"#2196F3\" stroke-width=\"1.5\" points=\"{}\"/>\
</svg><p class=\"note\">{} (max {:.1}%)</p></div>\n",
            escape_html(&s.label),
            escape_html(&s.field),
            points.join(" "),
            escape_html(&s.field),
            y_max
        );
    }
    Ok(out)
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn render_plotly(series: &[MetricSeries]) -> Result<String, String> {
    if series.is_empty() {
        return Err("no metrics data".to_string());
    }
    let mut out = format!("<script src=\"{PLOTLY_CDN}\"></script>\n");
    for (i, s) in series.iter().enumerate() {
        let (x, y): (Vec<f64>, Vec<f64>) = s.points.iter().copied().unzip();
        let traces = json!([{
            "x": x,
            "y": y,
            "mode": "lines",
            "name": s.field,
        }]);
        let layout = json!({
            "title": s.label,
            "height": 320,
            "xaxis": {"title": "Elapsed (s)"},
            "yaxis": {"title": "CPU %"},
        });
        let _ = write!(
            out,
            "<div id=\"chart-{i}\" class=\"chart-container\"></div>\n\
<script>Plotly.newPlot(\"chart-{i}\", {}, {});</script>\n",
            script_json(&traces),
            script_json(&layout)
        );
    }
    Ok(out)
}

fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

fn status(success: bool) -> (&'static str, &'static str) {
    if success {
        ("success", "SUCCESS")
    } else {
        ("failure", "FAILURE")
    }
}

/// Render the report as a standalone HTML document
#[must_use]
pub fn render_html_report(
    manifest: &RunManifest,
    series: &[MetricSeries],
    charts: ChartMode,
) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
<title>EddyPro Batch Processing Report</title>\n<style>\n{STYLE}</style>\n</head>\n\
<body>\n<div class=\"container\">\n<h1>EddyPro Batch Processing Report</h1>\n"
    );

    let (class, text) = status(manifest.overall_success);
    let years: Vec<String> = manifest
        .years_processed
        .iter()
        .map(ToString::to_string)
        .collect();
    let _ = write!(
        html,
        "<div class=\"summary-box\">\n<h2>Run Summary</h2>\n\
<p><strong>Run ID:</strong> {}</p>\n\
<p><strong>Timestamp:</strong> {}</p>\n\
<p><strong>Duration:</strong> {:.2} seconds ({:.2} minutes)</p>\n\
<p><strong>Site ID:</strong> {}</p>\n\
<p><strong>Years Processed:</strong> {}</p>\n\
<p><strong>Dry Run:</strong> {}</p>\n\
<p><strong>Overall Status:</strong> <span class=\"{class}\">{text}</span></p>\n</div>\n",
        escape_html(&manifest.run_id),
        manifest.timestamp.format("%Y-%m-%d %H:%M:%S"),
        manifest.duration_seconds,
        manifest.duration_seconds / 60.0,
        escape_html(&manifest.site_id),
        years.join(", "),
        if manifest.dry_run { "yes" } else { "no" },
    );

    if !manifest.scenarios.is_empty() {
        html.push_str(
            "<h2>Scenario Results</h2>\n<table>\n<tr><th>Year</th><th>Scenario</th>\
<th>Parameters</th><th>Duration (s)</th><th>Status</th><th>Error</th></tr>\n",
        );
        for scenario in &manifest.scenarios {
            let name = if scenario.scenario_suffix.is_empty() {
                "baseline"
            } else {
                scenario.scenario_suffix.trim_start_matches('_')
            };
            let params: Vec<String> = scenario
                .scenario_params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            let params = if params.is_empty() {
                "baseline".to_string()
            } else {
                params.join(", ")
            };
            let (class, text) = status(scenario.success);
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td>\
<td class=\"{class}\">{text}</td><td>{}</td></tr>\n",
                scenario.year,
                escape_html(name),
                escape_html(&params),
                scenario.duration_seconds,
                escape_html(scenario.error.as_deref().unwrap_or("")),
            );
        }
        html.push_str("</table>\n");
    }

    if charts != ChartMode::None {
        html.push_str("<h2>Performance Metrics</h2>\n");
        let rendered = match charts {
            ChartMode::Svg => render_svg(series),
            _ => render_plotly(series),
        };
        match rendered {
            Ok(chart_html) => html.push_str(&chart_html),
            Err(reason) => {
                let _ = writeln!(
                    html,
                    "<p class=\"note\">Charts not available: {}</p>",
                    escape_html(&reason)
                );
            }
        }
    }

    let env = &manifest.environment;
    let _ = write!(
        html,
        "<h2>Environment</h2>\n<div class=\"summary-box\">\n\
<p><strong>Runtime:</strong> {}</p>\n\
<p><strong>Platform:</strong> {}</p>\n\
<p><strong>OS Family:</strong> {}</p>\n\
<p><strong>Config Checksum:</strong> {}</p>\n</div>\n",
        escape_html(&env.runtime_version),
        escape_html(&env.platform),
        escape_html(&env.os_family),
        escape_html(&manifest.config_checksum),
    );

    if !env.package_versions.is_empty() {
        html.push_str(
            "<h3>Package Versions</h3>\n<table>\n<tr><th>Package</th><th>Version</th></tr>\n",
        );
        for (package, version) in &env.package_versions {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td></tr>",
                escape_html(package),
                escape_html(version)
            );
        }
        html.push_str("</table>\n");
    }

    html.push_str("</div>\n</body>\n</html>\n");
    html
}

/// Render the report and write it into `reports_dir`
///
/// Returns the report path.
///
/// # Errors
/// Returns [`BatchError::Io`] if the file cannot be written.
pub fn write_html_report(
    manifest: &RunManifest,
    charts: ChartMode,
    reports_dir: &Path,
) -> Result<PathBuf, BatchError> {
    let series = if charts == ChartMode::None {
        Vec::new()
    } else {
        collect_metric_series(manifest)
    };
    let html = render_html_report(manifest, &series, charts);
    let path = reports_dir.join(REPORT_FILE_NAME);
    atomic_write(&path, html.as_bytes())?;
    tracing::info!("HTML report written to {}", path.display());
    Ok(path)
}

/// Manifest and report of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRun {
    /// The run manifest
    pub manifest: RunManifest,
    /// Where the manifest was written
    pub manifest_path: PathBuf,
    /// Where the HTML report was written
    pub report_path: PathBuf,
}

/// Build the manifest of `outcome` and write it with the HTML report
///
/// Both files go to [`BatchConfig::reports_dir`].
///
/// # Errors
/// Returns an error if the manifest cannot be built or either file cannot
/// be written.
pub fn publish_run(
    config: &BatchConfig,
    years: &[i32],
    outcome: &BatchOutcome,
) -> Result<PublishedRun, BatchError> {
    let reports_dir = config.reports_dir();
    let manifest = RunManifest::build(config, years, outcome)?;
    let manifest_path = manifest.write(&reports_dir)?;
    let report_path = write_html_report(&manifest, config.report_charts, &reports_dir)?;
    Ok(PublishedRun {
        manifest,
        manifest_path,
        report_path,
    })
}
