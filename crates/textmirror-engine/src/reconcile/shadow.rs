//! Shadow compare: run the full reconcile on clones next to the fast path
//! and check they agree.

use std::collections::HashMap;

use super::diff::common_prefix_len;
use super::fallback::FallbackReason;
use super::metrics::{DivergenceReport, RunStats};
use super::range_cache::{RangeCache, RangeCacheEntry};
use super::{delta, legacy};
use crate::buffer::TextBuffer;
use crate::editing::DirtySet;
use crate::flags::FeatureFlags;
use crate::model::{NodeKey, Snapshot};

#[derive(Debug)]
pub(crate) enum ShadowOutcome {
    Agreed(RunStats),
    /// The fast path declined before writing anything.
    FastFailed(FallbackReason),
    /// The fast path wrote something the full path would not have.
    Diverged(DivergenceReport),
}

pub(crate) fn compare<B: TextBuffer + Clone>(
    prev: &Snapshot,
    next: &Snapshot,
    dirty: &DirtySet,
    cache: &mut RangeCache,
    buffer: &mut B,
    flags: &FeatureFlags,
) -> ShadowOutcome {
    let mut full_buffer = buffer.clone();
    let mut full_cache = cache.clone();
    legacy::apply(next, &mut full_cache, &mut full_buffer, flags);

    let stats = match delta::apply(prev, next, dirty, cache, buffer, flags) {
        Ok(stats) => stats,
        Err(reason) => return ShadowOutcome::FastFailed(reason),
    };

    let fast_text = buffer.text();
    let full_text = full_buffer.text();
    let fast_entries = cache.entries();
    let full_entries = full_cache.entries();
    if fast_text == full_text && fast_entries == full_entries {
        return ShadowOutcome::Agreed(stats);
    }

    ShadowOutcome::Diverged(DivergenceReport {
        version: next.version(),
        fast_len: fast_text.len(),
        full_len: full_text.len(),
        first_difference: (fast_text != full_text)
            .then(|| common_prefix_len(&fast_text, &full_text)),
        mismatched_entries: mismatched(&fast_entries, &full_entries),
    })
}

fn mismatched(fast: &[RangeCacheEntry], full: &[RangeCacheEntry]) -> Vec<NodeKey> {
    let full_by_key: HashMap<NodeKey, &RangeCacheEntry> =
        full.iter().map(|entry| (entry.key, entry)).collect();
    let fast_by_key: HashMap<NodeKey, &RangeCacheEntry> =
        fast.iter().map(|entry| (entry.key, entry)).collect();

    let mut keys: Vec<NodeKey> = fast
        .iter()
        .filter(|entry| full_by_key.get(&entry.key) != Some(entry))
        .map(|entry| entry.key)
        .chain(
            full.iter()
                .filter(|entry| !fast_by_key.contains_key(&entry.key))
                .map(|entry| entry.key),
        )
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RopeBuffer;
    use crate::editing::DirtyCause;
    use crate::reconcile::contribution::render_subtree;
    use pretty_assertions::assert_eq;

    fn setup(texts: &[&str]) -> (Snapshot, Vec<NodeKey>, RangeCache, RopeBuffer) {
        let mut builder = Snapshot::builder();
        let paragraphs = texts.iter().map(|t| builder.paragraph(t).unwrap()).collect();
        let snapshot = builder.build();
        let rendered = render_subtree(&snapshot, snapshot.root(), true);
        let cache = RangeCache::from_rendered(&rendered, true);
        let buffer = RopeBuffer::from_text(&rendered.text);
        (snapshot, paragraphs, cache, buffer)
    }

    #[test]
    fn test_agreeing_paths() {
        let (prev, paragraphs, mut cache, mut buffer) = setup(&["A", "B"]);
        let text = prev.node(paragraphs[1]).unwrap().children[0];
        let mut next = prev.clone();
        next.node_mut(text).unwrap().text = "Bee".into();
        let dirty: DirtySet = [(text, DirtyCause::UserEdit)].into_iter().collect();

        let outcome = compare(
            &prev,
            &next,
            &dirty,
            &mut cache,
            &mut buffer,
            &FeatureFlags::default(),
        );
        assert!(matches!(outcome, ShadowOutcome::Agreed(stats) if stats.edits == 1));
    }

    #[test]
    fn test_tampered_buffer_diverges() {
        let (prev, paragraphs, mut cache, mut buffer) = setup(&["A", "B"]);
        // Same length, markers intact, wrong text.
        let a_at = cache.location_of(prev.node(paragraphs[0]).unwrap().children[0]).unwrap();
        buffer.replace(a_at..a_at + 1, "Q");

        let text = prev.node(paragraphs[1]).unwrap().children[0];
        let mut next = prev.clone();
        next.node_mut(text).unwrap().text = "Bx".into();
        let dirty: DirtySet = [(text, DirtyCause::UserEdit)].into_iter().collect();

        let outcome = compare(
            &prev,
            &next,
            &dirty,
            &mut cache,
            &mut buffer,
            &FeatureFlags::default(),
        );
        match outcome {
            ShadowOutcome::Diverged(report) => {
                assert_eq!(report.first_difference, Some(a_at));
                assert_eq!(report.fast_len, report.full_len);
                assert!(report.mismatched_entries.is_empty());
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }
}
