/*!
 * # Reconciliation
 *
 * Keeps the flat [`TextBuffer`] in step with the document tree. Each commit
 * hands the reconciler the previous snapshot, the next one and the dirty set.
 *
 * ## Paths
 *
 * - **Fast path** ([`delta`]): patches only the spans of dirty nodes. Spans
 *   come from the [`RangeCache`], whose locations sit in a Fenwick tree
 *   ([`OffsetIndex`]) so a length change shifts everything after it in
 *   O(log n). Anchor markers around blocks are checked before any write.
 * - **Full path** ([`legacy`]): renders the whole document and writes the
 *   trimmed difference. Used for the initial load and whenever
 *   [`classify`] or the fast path itself reports a [`FallbackReason`].
 *
 * ## Safety nets
 *
 * - Strict mode verifies the cache against a fresh render after every fast run.
 * - Shadow compare runs the full path on clones and compares text and cache;
 *   on mismatch the fast path is switched off for the rest of the session and
 *   the divergence goes to the [`MetricsSink`].
 *
 * Either a transaction's whole edit set lands, or the full path resets buffer
 * and cache to the rendered document.
 */

pub mod anchors;
pub mod contribution;
pub(crate) mod delta;
pub mod diff;
pub mod fallback;
pub(crate) mod legacy;
pub mod metrics;
pub mod offset_index;
pub mod range_cache;
pub(crate) mod shadow;

use std::time::Instant;

pub use anchors::{MarkerError, strip_markers, strip_markers_rich, validate_pairing};
pub use contribution::{NodeLengths, RenderedSubtree, render_subtree};
pub use fallback::{Classification, FallbackReason, classify};
pub use metrics::{
    DivergenceReport, LogMetricsSink, MetricsLog, MetricsSink, MetricsSummary, NullMetricsSink,
    ReconcilePath, ReconcilerMetric,
};
pub use offset_index::OffsetIndex;
pub use range_cache::{CacheInconsistency, RangeCache, RangeCacheEntry};

use self::metrics::RunStats;
use self::shadow::ShadowOutcome;
use crate::buffer::TextBuffer;
use crate::editing::DirtySet;
use crate::flags::FeatureFlags;
use crate::model::Snapshot;

pub struct Reconciler {
    flags: FeatureFlags,
    fast_path_enabled: bool,
    cache: RangeCache,
    /// Forces the next run onto the full path.
    pending_full: Option<FallbackReason>,
    sink: Box<dyn MetricsSink>,
    last_metric: Option<ReconcilerMetric>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("flags", &self.flags)
            .field("fast_path_enabled", &self.fast_path_enabled)
            .field("cache_entries", &self.cache.len())
            .field("pending_full", &self.pending_full)
            .finish()
    }
}

impl Reconciler {
    pub fn new(flags: FeatureFlags) -> Self {
        Self {
            fast_path_enabled: flags.fast_path,
            flags,
            cache: RangeCache::new(),
            pending_full: None,
            sink: Box::new(LogMetricsSink),
            last_metric: None,
        }
    }

    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    pub fn set_flags(&mut self, flags: FeatureFlags) {
        if flags.anchors_enabled != self.flags.anchors_enabled {
            self.pending_full = Some(FallbackReason::AnchorsToggled);
        }
        self.fast_path_enabled = flags.fast_path;
        self.flags = flags;
    }

    /// Takes effect on the next commit, which re-renders the whole buffer.
    pub fn set_anchors_enabled(&mut self, enabled: bool) {
        if self.flags.anchors_enabled != enabled {
            log::info!("anchors {}", if enabled { "enabled" } else { "disabled" });
            self.flags.anchors_enabled = enabled;
            self.pending_full = Some(FallbackReason::AnchorsToggled);
        }
    }

    pub fn set_fast_path_enabled(&mut self, enabled: bool) {
        self.fast_path_enabled = enabled;
    }

    pub fn fast_path_enabled(&self) -> bool {
        self.fast_path_enabled
    }

    pub fn set_metrics_sink(&mut self, sink: Box<dyn MetricsSink>) {
        self.sink = sink;
    }

    pub fn range_cache(&self) -> &RangeCache {
        &self.cache
    }

    pub fn last_metric(&self) -> Option<&ReconcilerMetric> {
        self.last_metric.as_ref()
    }

    /// Bring `buffer` and the range cache in line with `next`.
    ///
    /// `prev` is `None` on the initial load.
    pub fn reconcile<B: TextBuffer + Clone>(
        &mut self,
        prev: Option<&Snapshot>,
        next: &Snapshot,
        dirty: &DirtySet,
        buffer: &mut B,
    ) -> ReconcilerMetric {
        let started = Instant::now();
        let (path, stats, fallback_reason) = match self.fast_path_target(prev, next, dirty) {
            Ok(prev) => self.run_fast(prev, next, dirty, buffer),
            Err(reason) => (
                ReconcilePath::Full,
                self.run_full(next, buffer, reason),
                Some(reason),
            ),
        };

        let metric = ReconcilerMetric {
            version: next.version(),
            path,
            duration: started.elapsed(),
            dirty_nodes: dirty.len(),
            ranges_added: stats.ranges_added,
            ranges_deleted: stats.ranges_deleted,
            nodes_visited: stats.nodes_visited,
            chars_inserted: stats.chars_inserted,
            chars_deleted: stats.chars_deleted,
            edits: stats.edits,
            replaced_len: stats.replaced_len,
            fallback_reason,
        };
        self.sink.record(&metric);
        self.last_metric = Some(metric.clone());
        metric
    }

    /// The previous snapshot to diff against, or why the full path must run.
    fn fast_path_target<'a>(
        &mut self,
        prev: Option<&'a Snapshot>,
        next: &Snapshot,
        dirty: &DirtySet,
    ) -> Result<&'a Snapshot, FallbackReason> {
        let pending = self.pending_full.take();
        let prev = match prev {
            Some(prev) if !self.cache.is_empty() => prev,
            _ => return Err(FallbackReason::InitialLoad),
        };
        if !self.flags.anchors_enabled {
            return Err(FallbackReason::AnchorsDisabled);
        }
        if let Some(reason) = pending {
            return Err(reason);
        }
        if !self.fast_path_enabled {
            return Err(FallbackReason::FastPathDisabled);
        }
        match classify(prev, next, dirty, &self.flags) {
            Classification::Local => Ok(prev),
            Classification::Structural(reason) => Err(reason),
        }
    }

    fn run_fast<B: TextBuffer + Clone>(
        &mut self,
        prev: &Snapshot,
        next: &Snapshot,
        dirty: &DirtySet,
        buffer: &mut B,
    ) -> (ReconcilePath, RunStats, Option<FallbackReason>) {
        let attempt = if self.flags.shadow_compare {
            match shadow::compare(prev, next, dirty, &mut self.cache, buffer, &self.flags) {
                ShadowOutcome::Agreed(stats) => Ok(stats),
                ShadowOutcome::FastFailed(reason) => Err(reason),
                ShadowOutcome::Diverged(report) => {
                    log::error!(
                        "fast path diverged from full reconcile at version {}, disabling it for this session",
                        next.version()
                    );
                    self.fast_path_enabled = false;
                    self.sink.divergence(&report);
                    Err(FallbackReason::ShadowDivergence)
                }
            }
        } else {
            delta::apply(prev, next, dirty, &mut self.cache, buffer, &self.flags)
        };

        let stats = match attempt {
            Ok(stats) => stats,
            Err(reason) => {
                return (
                    ReconcilePath::Full,
                    self.run_full(next, buffer, reason),
                    Some(reason),
                );
            }
        };

        if self.flags.strict_mode
            && let Err(problem) = self.check_invariants(next, buffer)
        {
            log::error!("range cache invariant violated after fast path: {problem}");
            let reason = FallbackReason::StrictModeViolation;
            return (
                ReconcilePath::Full,
                self.run_full(next, buffer, reason),
                Some(reason),
            );
        }
        (ReconcilePath::Fast, stats, None)
    }

    fn run_full<B: TextBuffer>(
        &mut self,
        next: &Snapshot,
        buffer: &mut B,
        reason: FallbackReason,
    ) -> RunStats {
        match reason {
            FallbackReason::CacheMiss | FallbackReason::AnchorIntegrity => {
                log::warn!("falling back to full reconcile: {reason}")
            }
            _ => log::debug!("full reconcile: {reason}"),
        }
        legacy::apply(next, &mut self.cache, buffer, &self.flags)
    }

    fn check_invariants<B: TextBuffer>(
        &self,
        next: &Snapshot,
        buffer: &B,
    ) -> Result<(), CacheInconsistency> {
        self.cache.verify(next)?;
        if buffer.len() != self.cache.total_len() {
            return Err(CacheInconsistency::BufferLength {
                expected: self.cache.total_len(),
                found: buffer.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RopeBuffer;
    use crate::editing::DirtyCause;
    use crate::model::NodeKey;
    use pretty_assertions::assert_eq;

    fn loaded(flags: FeatureFlags) -> (Reconciler, Snapshot, Vec<NodeKey>, RopeBuffer) {
        let mut builder = Snapshot::builder();
        let paragraphs = ["A", "B", "C"]
            .iter()
            .map(|t| builder.paragraph(t).unwrap())
            .collect();
        let snapshot = builder.build();
        let mut reconciler = Reconciler::new(flags);
        reconciler.set_metrics_sink(Box::new(NullMetricsSink));
        let mut buffer = RopeBuffer::new();
        reconciler.reconcile(None, &snapshot, &DirtySet::empty(), &mut buffer);
        (reconciler, snapshot, paragraphs, buffer)
    }

    fn edit_b(prev: &Snapshot, paragraphs: &[NodeKey]) -> (Snapshot, DirtySet) {
        let text = prev.node(paragraphs[1]).unwrap().children[0];
        let mut next = prev.clone();
        next.node_mut(text).unwrap().text.push('x');
        next.bump_version();
        let dirty = [
            (text, DirtyCause::UserEdit),
            (paragraphs[1], DirtyCause::SystemDerived),
        ]
        .into_iter()
        .collect();
        (next, dirty)
    }

    #[test]
    fn test_initial_load_is_full() {
        let (reconciler, _, _, buffer) = loaded(FeatureFlags::default());
        let metric = reconciler.last_metric().unwrap();
        assert_eq!(metric.path, ReconcilePath::Full);
        assert_eq!(metric.fallback_reason, Some(FallbackReason::InitialLoad));
        assert_eq!(strip_markers(&buffer.text()), "A\nB\nC\n");
    }

    #[test]
    fn test_local_edit_takes_fast_path() {
        let (mut reconciler, prev, paragraphs, mut buffer) = loaded(FeatureFlags::default());
        let (next, dirty) = edit_b(&prev, &paragraphs);
        let metric = reconciler.reconcile(Some(&prev), &next, &dirty, &mut buffer);

        assert_eq!(metric.path, ReconcilePath::Fast);
        assert_eq!(metric.fallback_reason, None);
        assert_eq!(metric.dirty_nodes, 2);
        assert_eq!(strip_markers(&buffer.text()), "A\nBx\nC\n");
    }

    #[test]
    fn test_disabled_fast_path_falls_back() {
        let (mut reconciler, prev, paragraphs, mut buffer) = loaded(FeatureFlags::default());
        reconciler.set_fast_path_enabled(false);
        let (next, dirty) = edit_b(&prev, &paragraphs);
        let metric = reconciler.reconcile(Some(&prev), &next, &dirty, &mut buffer);
        assert_eq!(metric.fallback_reason, Some(FallbackReason::FastPathDisabled));
        assert_eq!(metric.edits, 1);
    }

    #[test]
    fn test_reenabling_anchors_forces_one_full_run() {
        let (mut reconciler, prev, paragraphs, mut buffer) = loaded(FeatureFlags::default());
        reconciler.set_anchors_enabled(false);
        let metric = reconciler.reconcile(Some(&prev), &prev, &DirtySet::empty(), &mut buffer);
        assert_eq!(metric.fallback_reason, Some(FallbackReason::AnchorsDisabled));
        assert_eq!(buffer.text(), "A\nB\nC\n");

        reconciler.set_anchors_enabled(true);
        let metric = reconciler.reconcile(Some(&prev), &prev, &DirtySet::empty(), &mut buffer);
        assert_eq!(metric.fallback_reason, Some(FallbackReason::AnchorsToggled));

        let (next, dirty) = edit_b(&prev, &paragraphs);
        let metric = reconciler.reconcile(Some(&prev), &next, &dirty, &mut buffer);
        assert_eq!(metric.path, ReconcilePath::Fast);
    }

    #[test]
    fn test_strict_mode_passes_on_correct_runs() {
        let flags = FeatureFlags {
            strict_mode: true,
            ..FeatureFlags::default()
        };
        let (mut reconciler, prev, paragraphs, mut buffer) = loaded(flags);
        let (next, dirty) = edit_b(&prev, &paragraphs);
        let metric = reconciler.reconcile(Some(&prev), &next, &dirty, &mut buffer);
        assert_eq!(metric.path, ReconcilePath::Fast);
    }

    #[test]
    fn test_divergence_disables_fast_path() {
        let flags = FeatureFlags {
            shadow_compare: true,
            ..FeatureFlags::default()
        };
        let (mut reconciler, prev, paragraphs, mut buffer) = loaded(flags);
        let log = MetricsLog::new();
        reconciler.set_metrics_sink(Box::new(log.clone()));

        let a_text = prev.node(paragraphs[0]).unwrap().children[0];
        let at = reconciler.range_cache().location_of(a_text).unwrap();
        buffer.replace(at..at + 1, "Q");

        let (next, dirty) = edit_b(&prev, &paragraphs);
        let metric = reconciler.reconcile(Some(&prev), &next, &dirty, &mut buffer);

        assert_eq!(metric.fallback_reason, Some(FallbackReason::ShadowDivergence));
        assert!(!reconciler.fast_path_enabled());
        assert_eq!(log.divergences().len(), 1);
        assert_eq!(strip_markers(&buffer.text()), "A\nBx\nC\n");
    }
}
