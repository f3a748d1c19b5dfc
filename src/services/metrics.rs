use std::sync::atomic::{AtomicU64, Ordering};

use super::reconciler::TickReport;

/// Process-wide counters, updated once per tick
#[derive(Debug, Default)]
pub struct Metrics {
    /// Ticks completed
    pub ticks: AtomicU64,
    /// Family fetches that failed and fell back to stale data
    pub fetch_failures: AtomicU64,
    pub channels_created: AtomicU64,
    pub renames: AtomicU64,
    pub rename_failures: AtomicU64,
    /// Roles that had no usable label or no channel on a tick
    pub skipped: AtomicU64,
    pub nickname_updates: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick's report into the counters
    pub fn record_tick(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.fetch_failures
            .fetch_add(report.fetch_failures.len() as u64, Ordering::Relaxed);
        self.channels_created
            .fetch_add(report.created.len() as u64, Ordering::Relaxed);
        self.renames
            .fetch_add(report.renamed.len() as u64, Ordering::Relaxed);
        self.rename_failures
            .fetch_add(report.rename_failed.len() as u64, Ordering::Relaxed);
        self.skipped
            .fetch_add(report.skipped.len() as u64, Ordering::Relaxed);
        if report.nickname_updated {
            self.nickname_updates.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One-line summary for the log
    pub fn summary(&self) -> String {
        format!(
            "ticks={} renames={} rename_failures={} created={} fetch_failures={} skipped={}",
            self.ticks.load(Ordering::Relaxed),
            self.renames.load(Ordering::Relaxed),
            self.rename_failures.load(Ordering::Relaxed),
            self.channels_created.load(Ordering::Relaxed),
            self.fetch_failures.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
        )
    }

    /// Export counters in Prometheus text format
    pub fn prometheus(&self) -> String {
        let counters = [
            ("ticks_total", "Reconciliation ticks completed", &self.ticks),
            (
                "fetch_failures_total",
                "Stat family fetches that failed",
                &self.fetch_failures,
            ),
            (
                "channels_created_total",
                "Stat channels created",
                &self.channels_created,
            ),
            ("renames_total", "Channel renames issued", &self.renames),
            (
                "rename_failures_total",
                "Channel renames rejected by the platform",
                &self.rename_failures,
            ),
            (
                "skipped_total",
                "Role updates skipped for lack of a label or channel",
                &self.skipped,
            ),
            (
                "nickname_updates_total",
                "Bot nickname changes",
                &self.nickname_updates,
            ),
        ];

        let mut out = String::new();
        for (name, help, counter) in counters {
            out.push_str(&format!(
                "# HELP statbot_{name} {help}\n# TYPE statbot_{name} counter\nstatbot_{name} {}\n\n",
                counter.load(Ordering::Relaxed)
            ));
        }
        out
    }
}
