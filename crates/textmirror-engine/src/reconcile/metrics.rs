//! Per-run reconciler statistics and where they go.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::fallback::FallbackReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcilePath {
    Fast,
    Full,
}

/// One record per committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerMetric {
    /// Version of the snapshot that was reconciled.
    pub version: u64,
    pub path: ReconcilePath,
    pub duration: Duration,
    pub dirty_nodes: usize,
    pub ranges_added: usize,
    pub ranges_deleted: usize,
    pub nodes_visited: usize,
    pub chars_inserted: usize,
    pub chars_deleted: usize,
    /// Number of buffer replacements.
    pub edits: usize,
    /// Bytes removed plus bytes inserted across all replacements.
    pub replaced_len: usize,
    pub fallback_reason: Option<FallbackReason>,
}

/// Counters gathered while a path runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunStats {
    pub nodes_visited: usize,
    pub ranges_added: usize,
    pub ranges_deleted: usize,
    pub chars_inserted: usize,
    pub chars_deleted: usize,
    pub edits: usize,
    pub replaced_len: usize,
}

impl RunStats {
    pub fn record_edit(&mut self, deleted: &str, inserted: &str) {
        self.edits += 1;
        self.chars_deleted += deleted.chars().count();
        self.chars_inserted += inserted.chars().count();
        self.replaced_len += deleted.len() + inserted.len();
    }
}

/// Emitted when shadow compare finds the two paths disagreeing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivergenceReport {
    pub version: u64,
    pub fast_len: usize,
    pub full_len: usize,
    /// First byte at which the buffers differ, if their text differs.
    pub first_difference: Option<usize>,
    /// Keys whose cache entries differ between the two paths.
    pub mismatched_entries: Vec<crate::model::NodeKey>,
}

/// Receives reconciler output.
pub trait MetricsSink {
    fn record(&mut self, metric: &ReconcilerMetric);

    fn divergence(&mut self, report: &DivergenceReport) {
        log::error!(
            "reconciler divergence at version {}: fast {} bytes, full {} bytes, first difference {:?}, {} mismatched entries",
            report.version,
            report.fast_len,
            report.full_len,
            report.first_difference,
            report.mismatched_entries.len()
        );
    }
}

/// Drops every metric.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn record(&mut self, _metric: &ReconcilerMetric) {}
}

/// Writes each metric to the log at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn record(&mut self, metric: &ReconcilerMetric) {
        log::debug!(
            "reconcile v{} {:?} in {:?}: dirty={} visited={} +{}/-{} chars, {} edits, ranges +{}/-{}{}",
            metric.version,
            metric.path,
            metric.duration,
            metric.dirty_nodes,
            metric.nodes_visited,
            metric.chars_inserted,
            metric.chars_deleted,
            metric.edits,
            metric.ranges_added,
            metric.ranges_deleted,
            metric
                .fallback_reason
                .map(|reason| format!(" (fallback: {reason})"))
                .unwrap_or_default()
        );
    }
}

#[derive(Debug)]
struct Recorded {
    capacity: usize,
    metrics: VecDeque<ReconcilerMetric>,
    divergences: VecDeque<DivergenceReport>,
    /// Totals over every run recorded since the last `clear`, evicted ones included.
    totals: MetricsSummary,
}

impl Recorded {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            metrics: VecDeque::new(),
            divergences: VecDeque::new(),
            totals: MetricsSummary::default(),
        }
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, capacity: usize, item: T) {
    if queue.len() == capacity {
        queue.pop_front();
    }
    queue.push_back(item);
}

/// Shared in-memory sink. Clones write to the same log.
///
/// Keeps the most recent `capacity` metrics and divergence reports; older
/// ones are evicted. [`summary`](Self::summary) still counts every run.
#[derive(Debug, Clone)]
pub struct MetricsLog {
    inner: Arc<Mutex<Recorded>>,
}

impl Default for MetricsLog {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl MetricsLog {
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Recorded::new(capacity))),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        // A panic while recording leaves plain data behind; keep using it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn metrics(&self) -> Vec<ReconcilerMetric> {
        self.lock().metrics.iter().cloned().collect()
    }

    pub fn divergences(&self) -> Vec<DivergenceReport> {
        self.lock().divergences.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<ReconcilerMetric> {
        self.lock().metrics.back().cloned()
    }

    pub fn clear(&self) {
        let mut recorded = self.lock();
        recorded.metrics.clear();
        recorded.divergences.clear();
        recorded.totals = MetricsSummary::default();
    }

    pub fn summary(&self) -> MetricsSummary {
        self.lock().totals.clone()
    }
}

impl MetricsSink for MetricsLog {
    fn record(&mut self, metric: &ReconcilerMetric) {
        let mut recorded = self.lock();
        recorded.totals.add(metric);
        let capacity = recorded.capacity;
        push_bounded(&mut recorded.metrics, capacity, metric.clone());
    }

    fn divergence(&mut self, report: &DivergenceReport) {
        log::error!("reconciler divergence at version {}", report.version);
        let mut recorded = self.lock();
        recorded.totals.divergences += 1;
        let capacity = recorded.capacity;
        push_bounded(&mut recorded.divergences, capacity, report.clone());
    }
}

/// Aggregate view over a [`MetricsLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub runs: usize,
    pub fast_runs: usize,
    pub full_runs: usize,
    pub fast_duration: Duration,
    pub full_duration: Duration,
    pub chars_inserted: usize,
    pub chars_deleted: usize,
    pub fallbacks: BTreeMap<FallbackReason, usize>,
    pub divergences: usize,
}

impl MetricsSummary {
    fn add(&mut self, metric: &ReconcilerMetric) {
        self.runs += 1;
        match metric.path {
            ReconcilePath::Fast => {
                self.fast_runs += 1;
                self.fast_duration += metric.duration;
            }
            ReconcilePath::Full => {
                self.full_runs += 1;
                self.full_duration += metric.duration;
            }
        }
        self.chars_inserted += metric.chars_inserted;
        self.chars_deleted += metric.chars_deleted;
        if let Some(reason) = metric.fallback_reason {
            *self.fallbacks.entry(reason).or_default() += 1;
        }
    }

    pub fn mean_fast(&self) -> Option<Duration> {
        mean(self.fast_duration, self.fast_runs)
    }

    pub fn mean_full(&self) -> Option<Duration> {
        mean(self.full_duration, self.full_runs)
    }
}

fn mean(total: Duration, runs: usize) -> Option<Duration> {
    let runs = u32::try_from(runs).ok().filter(|&n| n > 0)?;
    Some(total / runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn metric(path: ReconcilePath, micros: u64, reason: Option<FallbackReason>) -> ReconcilerMetric {
        ReconcilerMetric {
            version: 1,
            path,
            duration: Duration::from_micros(micros),
            dirty_nodes: 1,
            ranges_added: 0,
            ranges_deleted: 0,
            nodes_visited: 1,
            chars_inserted: 1,
            chars_deleted: 0,
            edits: 1,
            replaced_len: 1,
            fallback_reason: reason,
        }
    }

    #[test]
    fn test_record_edit_counts_chars_and_bytes() {
        let mut stats = RunStats::default();
        stats.record_edit("ab", "é");
        assert_eq!(stats.edits, 1);
        assert_eq!(stats.chars_deleted, 2);
        assert_eq!(stats.chars_inserted, 1);
        assert_eq!(stats.replaced_len, 4);
    }

    #[test]
    fn test_metrics_log_clones_share_storage() {
        let log = MetricsLog::new();
        let mut sink = log.clone();
        sink.record(&metric(ReconcilePath::Fast, 10, None));
        assert_eq!(log.metrics().len(), 1);
        assert_eq!(log.last().unwrap().path, ReconcilePath::Fast);
    }

    #[test]
    fn test_summary_splits_paths() {
        let log = MetricsLog::new();
        let mut sink = log.clone();
        sink.record(&metric(ReconcilePath::Fast, 10, None));
        sink.record(&metric(ReconcilePath::Fast, 30, None));
        sink.record(&metric(
            ReconcilePath::Full,
            100,
            Some(FallbackReason::StructuralChange),
        ));

        let summary = log.summary();
        assert_eq!(summary.runs, 3);
        assert_eq!(summary.fast_runs, 2);
        assert_eq!(summary.mean_fast(), Some(Duration::from_micros(20)));
        assert_eq!(summary.mean_full(), Some(Duration::from_micros(100)));
        assert_eq!(
            summary.fallbacks.get(&FallbackReason::StructuralChange),
            Some(&1)
        );
    }

    #[test]
    fn test_empty_summary_has_no_means() {
        let summary = MetricsLog::new().summary();
        assert_eq!(summary.mean_fast(), None);
        assert_eq!(summary.runs, 0);
    }

    #[test]
    fn test_full_log_evicts_oldest_but_keeps_totals() {
        let log = MetricsLog::with_capacity(2);
        let mut sink = log.clone();
        sink.record(&metric(
            ReconcilePath::Full,
            100,
            Some(FallbackReason::InitialLoad),
        ));
        sink.record(&metric(ReconcilePath::Fast, 10, None));
        sink.record(&metric(ReconcilePath::Fast, 30, None));

        let paths: Vec<ReconcilePath> = log.metrics().iter().map(|m| m.path).collect();
        assert_eq!(paths, vec![ReconcilePath::Fast, ReconcilePath::Fast]);
        let summary = log.summary();
        assert_eq!(summary.runs, 3);
        assert_eq!(summary.full_runs, 1);
        assert_eq!(summary.fallbacks.get(&FallbackReason::InitialLoad), Some(&1));

        log.clear();
        assert_eq!(log.summary(), MetricsSummary::default());
        assert_eq!(log.capacity(), 2);
    }

    #[test]
    fn test_zero_capacity_still_keeps_the_latest() {
        let log = MetricsLog::with_capacity(0);
        let mut sink = log.clone();
        sink.record(&metric(ReconcilePath::Fast, 10, None));
        sink.record(&metric(ReconcilePath::Full, 20, None));
        assert_eq!(log.metrics().len(), 1);
        assert_eq!(log.last().unwrap().path, ReconcilePath::Full);
    }
}
