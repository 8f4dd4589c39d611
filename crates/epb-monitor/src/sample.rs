//! Metric samples
//!
//! Every collector field is optional: a metric the platform cannot provide is
//! left out of the sample rather than recorded as zero.

use serde::{Deserialize, Serialize};

/// System-wide metrics at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: Option<f64>,
    pub memory_total: Option<u64>,
    pub memory_available: Option<u64>,
    pub memory_percent: Option<f64>,
    pub disk_read_bytes: Option<u64>,
    pub disk_write_bytes: Option<u64>,
    pub network_bytes_sent: Option<u64>,
    pub network_bytes_recv: Option<u64>,
}

/// Metrics of the monitored process at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub cpu_percent: Option<f64>,
    pub memory_rss: Option<u64>,
    pub memory_vms: Option<u64>,
    pub memory_percent: Option<f64>,
    pub io_read_bytes: Option<u64>,
    pub io_write_bytes: Option<u64>,
}

/// One observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSample {
    /// Unix seconds
    pub timestamp: f64,
    /// Seconds since the monitor started
    pub relative_time: f64,
    pub system: SystemMetrics,
    /// Absent when no process is monitored or it has exited
    pub process: Option<ProcessMetrics>,
}

#[allow(clippy::cast_precision_loss)]
fn push_u64(out: &mut Vec<(&'static str, f64)>, name: &'static str, value: Option<u64>) {
    if let Some(v) = value {
        out.push((name, v as f64));
    }
}

fn push_f64(out: &mut Vec<(&'static str, f64)>, name: &'static str, value: Option<f64>) {
    if let Some(v) = value {
        out.push((name, v));
    }
}

impl MonitorSample {
    /// Flattened numeric fields, excluding `timestamp` and `relative_time`
    ///
    /// Names are prefixed with `system_` or `process_`.
    #[must_use]
    pub fn metric_fields(&self) -> Vec<(&'static str, f64)> {
        let mut out = Vec::with_capacity(14);
        let s = &self.system;
        push_f64(&mut out, "system_cpu_percent", s.cpu_percent);
        push_u64(&mut out, "system_memory_total", s.memory_total);
        push_u64(&mut out, "system_memory_available", s.memory_available);
        push_f64(&mut out, "system_memory_percent", s.memory_percent);
        push_u64(&mut out, "system_disk_read_bytes", s.disk_read_bytes);
        push_u64(&mut out, "system_disk_write_bytes", s.disk_write_bytes);
        push_u64(&mut out, "system_network_bytes_sent", s.network_bytes_sent);
        push_u64(&mut out, "system_network_bytes_recv", s.network_bytes_recv);

        if let Some(p) = &self.process {
            push_f64(&mut out, "process_cpu_percent", p.cpu_percent);
            push_u64(&mut out, "process_memory_rss", p.memory_rss);
            push_u64(&mut out, "process_memory_vms", p.memory_vms);
            push_f64(&mut out, "process_memory_percent", p.memory_percent);
            push_u64(&mut out, "process_io_read_bytes", p.io_read_bytes);
            push_u64(&mut out, "process_io_write_bytes", p.io_write_bytes);
        }
        out
    }

    /// All CSV columns of this sample, including the two time fields
    #[must_use]
    pub fn csv_fields(&self) -> Vec<(&'static str, f64)> {
        let mut out = vec![
            ("timestamp", self.timestamp),
            ("relative_time", self.relative_time),
        ];
        out.extend(self.metric_fields());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_fields_are_not_flattened() {
        let sample = MonitorSample {
            timestamp: 10.0,
            relative_time: 0.5,
            system: SystemMetrics {
                cpu_percent: Some(12.5),
                memory_total: Some(1024),
                ..SystemMetrics::default()
            },
            process: Some(ProcessMetrics {
                memory_rss: Some(64),
                ..ProcessMetrics::default()
            }),
        };
        let fields = sample.metric_fields();
        assert_eq!(
            fields,
            vec![
                ("system_cpu_percent", 12.5),
                ("system_memory_total", 1024.0),
                ("process_memory_rss", 64.0),
            ]
        );
        assert_eq!(sample.csv_fields().len(), 5);
    }

    #[test]
    fn system_only_sample() {
        let sample = MonitorSample {
            timestamp: 1.0,
            relative_time: 0.0,
            system: SystemMetrics::default(),
            process: None,
        };
        assert!(sample.metric_fields().is_empty());
    }
}
