//! Metric sources
//!
//! [`MetricsSource`] is the seam between the sampler loop and the platform.
//! [`SysinfoSource`] reads the live machine; tests drive the monitor with a
//! scripted source instead.

use sysinfo::{Disks, Networks, Pid, ProcessesToUpdate, System};

use crate::sample::{ProcessMetrics, SystemMetrics};

/// Provider of system and process metrics
///
/// Sources are moved into the sampler thread while monitoring and handed
/// back on stop, so they need `Send` but not `Sync`.
pub trait MetricsSource: Send {
    /// Read system-wide metrics
    fn system(&mut self) -> SystemMetrics;

    /// Read metrics of `pid`, or `None` if the process does not exist
    fn process(&mut self, pid: u32) -> Option<ProcessMetrics>;
}

/// [`MetricsSource`] backed by `sysinfo`
pub struct SysinfoSource {
    system: System,
    networks: Networks,
    disks: Disks,
}

impl SysinfoSource {
    /// Create a source with refreshed network and disk lists
    #[must_use]
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SysinfoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoSource").finish_non_exhaustive()
    }
}

/// Pass `value` through, logging the field when it could not be collected
fn collected<T>(field: &'static str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        tracing::debug!("Metric {} unavailable; omitted from sample", field);
    }
    value
}

#[allow(clippy::cast_precision_loss)]
fn percent_of(part: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64 * 100.0)
}

impl MetricsSource for SysinfoSource {
    fn system(&mut self) -> SystemMetrics {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.networks.refresh(true);
        self.disks.refresh(true);

        let total = self.system.total_memory();
        let available = self.system.available_memory();

        let (mut read, mut written) = (0_u64, 0_u64);
        for disk in self.disks.list() {
            let usage = disk.usage();
            read = read.saturating_add(usage.total_read_bytes);
            written = written.saturating_add(usage.total_written_bytes);
        }

        let (mut sent, mut recv) = (0_u64, 0_u64);
        for (_, data) in &self.networks {
            sent = sent.saturating_add(data.total_transmitted());
            recv = recv.saturating_add(data.total_received());
        }

        let has_disks = !self.disks.list().is_empty();
        SystemMetrics {
            cpu_percent: Some(f64::from(self.system.global_cpu_usage())),
            memory_total: collected("memory_total", (total > 0).then_some(total)),
            memory_available: collected("memory_available", (total > 0).then_some(available)),
            memory_percent: collected(
                "memory_percent",
                percent_of(total.saturating_sub(available), total),
            ),
            disk_read_bytes: collected("disk_read_bytes", has_disks.then_some(read)),
            disk_write_bytes: collected("disk_write_bytes", has_disks.then_some(written)),
            network_bytes_sent: Some(sent),
            network_bytes_recv: Some(recv),
        }
    }

    fn process(&mut self, pid: u32) -> Option<ProcessMetrics> {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = self.system.process(pid) else {
            tracing::debug!("Process {} not found; omitting process metrics", pid);
            return None;
        };
        let io = process.disk_usage();
        Some(ProcessMetrics {
            cpu_percent: Some(f64::from(process.cpu_usage())),
            memory_rss: Some(process.memory()),
            memory_vms: Some(process.virtual_memory()),
            memory_percent: collected(
                "process_memory_percent",
                percent_of(process.memory(), self.system.total_memory()),
            ),
            io_read_bytes: Some(io.total_read_bytes),
            io_write_bytes: Some(io.total_written_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_zero_total_is_none() {
        assert_eq!(percent_of(5, 0), None);
        assert_eq!(percent_of(25, 100), Some(25.0));
    }

    #[test]
    fn collected_passes_values_through() {
        assert_eq!(collected("memory_total", Some(8_u64)), Some(8));
        assert_eq!(collected::<u64>("disk_read_bytes", None), None);
    }

    #[test]
    fn current_process_is_visible() {
        let mut source = SysinfoSource::new();
        let metrics = source.process(std::process::id());
        assert!(metrics.is_some());
        assert!(metrics.unwrap().memory_rss.is_some());
    }

    #[test]
    fn unknown_pid_is_none() {
        let mut source = SysinfoSource::new();
        assert!(source.process(u32::MAX - 1).is_none());
    }
}
