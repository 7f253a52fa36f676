//! Full reconcile: render the whole document and diff it into the buffer.
//!
//! Always correct, cost proportional to the document. Used for the initial
//! load, every fallback, and as the reference in shadow compare.

use super::contribution::render_subtree;
use super::diff::{TextEdit, minimal_edit};
use super::metrics::RunStats;
use super::range_cache::RangeCache;
use crate::buffer::TextBuffer;
use crate::flags::FeatureFlags;
use crate::model::Snapshot;

pub(crate) fn apply<B: TextBuffer>(
    next: &Snapshot,
    cache: &mut RangeCache,
    buffer: &mut B,
    flags: &FeatureFlags,
) -> RunStats {
    let anchors = flags.anchors_enabled;
    let rendered = render_subtree(next, next.root(), anchors);

    let kept = rendered
        .nodes
        .iter()
        .filter(|node| cache.contains(node.key))
        .count();
    let mut stats = RunStats {
        nodes_visited: rendered.nodes.len(),
        ranges_added: rendered.nodes.len() - kept,
        ranges_deleted: cache.len().saturating_sub(kept),
        ..RunStats::default()
    };

    let old = buffer.text();
    let edit = if flags.optimizations.legacy_diff_trimming {
        minimal_edit(&old, &rendered.text)
    } else if old != rendered.text {
        Some(TextEdit {
            range: 0..old.len(),
            replacement: rendered.text.clone(),
        })
    } else {
        None
    };

    if let Some(edit) = edit {
        log::trace!(
            "full reconcile replaces {:?} with {} bytes",
            edit.range,
            edit.replacement.len()
        );
        stats.record_edit(&old[edit.range.clone()], &edit.replacement);
        let batch = flags.optimizations.batch_edits;
        if batch {
            buffer.begin_editing();
        }
        buffer.replace(edit.range, &edit.replacement);
        if batch {
            buffer.end_editing();
        }
    }

    *cache = RangeCache::from_rendered(&rendered, anchors);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RopeBuffer;
    use crate::reconcile::anchors::strip_markers;
    use pretty_assertions::assert_eq;

    fn abc() -> Snapshot {
        let mut builder = Snapshot::builder();
        for text in ["A", "B", "C"] {
            builder.paragraph(text).unwrap();
        }
        builder.build()
    }

    #[test]
    fn test_initial_load_fills_buffer_and_cache() {
        let snapshot = abc();
        let mut cache = RangeCache::new();
        let mut buffer = RopeBuffer::new();
        let stats = apply(&snapshot, &mut cache, &mut buffer, &FeatureFlags::default());

        assert_eq!(strip_markers(&buffer.text()), "A\nB\nC\n");
        assert_eq!(stats.ranges_added, 7);
        assert_eq!(stats.ranges_deleted, 0);
        assert_eq!(stats.nodes_visited, 7);
        assert!(cache.verify(&snapshot).is_ok());
    }

    #[test]
    fn test_second_run_is_a_noop() {
        let snapshot = abc();
        let mut cache = RangeCache::new();
        let mut buffer = RopeBuffer::new();
        let flags = FeatureFlags::legacy_only();
        apply(&snapshot, &mut cache, &mut buffer, &flags);
        let entries = cache.entries();

        let stats = apply(&snapshot, &mut cache, &mut buffer, &flags);
        assert_eq!(stats.edits, 0);
        assert_eq!(stats.ranges_added, 0);
        assert_eq!(cache.entries(), entries);
    }

    #[test]
    fn test_diff_trimming_repairs_only_the_damage() {
        let snapshot = abc();
        let mut cache = RangeCache::new();
        let flags = FeatureFlags::legacy_only();
        let mut buffer = RopeBuffer::from_text("A\nQ\nC\n");

        let stats = apply(&snapshot, &mut cache, &mut buffer, &flags);
        assert_eq!(buffer.text(), "A\nB\nC\n");
        assert_eq!(buffer.last_batch()[0].range, 2..3);
        assert_eq!(stats.replaced_len, 2);
    }

    #[test]
    fn test_without_trimming_the_buffer_is_rewritten() {
        let snapshot = abc();
        let mut cache = RangeCache::new();
        let mut flags = FeatureFlags::legacy_only();
        flags.optimizations.legacy_diff_trimming = false;
        let mut buffer = RopeBuffer::from_text("A\nQ\nC\n");

        apply(&snapshot, &mut cache, &mut buffer, &flags);
        assert_eq!(buffer.text(), "A\nB\nC\n");
        assert_eq!(buffer.last_batch()[0].range, 0..6);
    }
}
