//! Node key to buffer span.
//!
//! Lengths live in a hash map; locations live in an [`OffsetIndex`] so that a
//! length change shifts every later node in O(log n) without touching them.

use std::collections::HashMap;

use super::contribution::{NodeLengths, RenderedSubtree, render_subtree};
use super::offset_index::OffsetIndex;
use crate::model::{NodeKey, Snapshot};

/// A resolved cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeCacheEntry {
    pub key: NodeKey,
    pub location: usize,
    pub lengths: NodeLengths,
}

impl RangeCacheEntry {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.location..self.location + self.lengths.total()
    }

    pub fn content_end(&self) -> usize {
        self.location + self.lengths.content_end()
    }
}

#[derive(Debug, Clone, Copy)]
struct Cached {
    slot: usize,
    lengths: NodeLengths,
}

/// Why a cache failed verification against a fresh render.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheInconsistency {
    #[error("cache holds {found} entries, document has {expected} nodes")]
    CountMismatch { expected: usize, found: usize },
    #[error("node {0} has no cache entry")]
    Missing(NodeKey),
    #[error("entry for {key} is stale: expected {expected:?}, found {found:?}")]
    Stale {
        key: NodeKey,
        expected: Box<RangeCacheEntry>,
        found: Box<RangeCacheEntry>,
    },
    #[error("buffer holds {found} bytes, cache describes {expected}")]
    BufferLength { expected: usize, found: usize },
    #[error("slot {slot} holds {found}, expected {expected}")]
    OutOfOrder {
        slot: usize,
        expected: NodeKey,
        found: NodeKey,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RangeCache {
    nodes: HashMap<NodeKey, Cached>,
    index: OffsetIndex,
    anchors: bool,
}

impl RangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache for a full render of a document.
    pub fn from_rendered(rendered: &RenderedSubtree, anchors: bool) -> Self {
        let nodes = rendered
            .nodes
            .iter()
            .enumerate()
            .map(|(slot, node)| {
                (
                    node.key,
                    Cached {
                        slot,
                        lengths: node.lengths,
                    },
                )
            })
            .collect();
        let index = OffsetIndex::from_locations(rendered.nodes.iter().map(|n| (n.key, n.offset)));
        Self {
            nodes,
            index,
            anchors,
        }
    }

    /// Recompute every entry from `snapshot`. Costs as much as a full render.
    pub fn rebuild_full(&mut self, snapshot: &Snapshot, anchors: bool) {
        let rendered = render_subtree(snapshot, snapshot.root(), anchors);
        *self = Self::from_rendered(&rendered, anchors);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the cached spans include anchor markers.
    pub fn anchors(&self) -> bool {
        self.anchors
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn slot_of(&self, key: NodeKey) -> Option<usize> {
        self.nodes.get(&key).map(|cached| cached.slot)
    }

    pub fn location_of(&self, key: NodeKey) -> Option<usize> {
        self.index.location(self.nodes.get(&key)?.slot)
    }

    pub fn entry_of(&self, key: NodeKey) -> Option<RangeCacheEntry> {
        let cached = self.nodes.get(&key)?;
        Some(RangeCacheEntry {
            key,
            location: self.index.location(cached.slot)?,
            lengths: cached.lengths,
        })
    }

    /// Total length of the document the cache describes.
    pub fn total_len(&self) -> usize {
        self.index
            .key_at(0)
            .and_then(|root| self.nodes.get(&root))
            .map_or(0, |cached| cached.lengths.total())
    }

    /// Shift every node from `slot` on (document order) by `delta` bytes.
    pub fn apply_delta(&mut self, slot: usize, delta: i64) {
        self.index.add_from(slot, delta);
    }

    /// All entries in document order.
    pub fn entries(&self) -> Vec<RangeCacheEntry> {
        self.index
            .keys()
            .iter()
            .filter_map(|&key| self.entry_of(key))
            .collect()
    }

    pub(crate) fn adjust_text(&mut self, key: NodeKey, delta: i64) {
        if let Some(cached) = self.nodes.get_mut(&key) {
            cached.lengths.text = add_signed(cached.lengths.text, delta);
        }
    }

    pub(crate) fn adjust_children(&mut self, key: NodeKey, delta: i64) {
        if let Some(cached) = self.nodes.get_mut(&key) {
            cached.lengths.children = add_signed(cached.lengths.children, delta);
        }
    }

    /// Splice a freshly rendered forest in after `after_slot`, with
    /// `location` being where the forest starts in the buffer.
    pub(crate) fn insert_rendered(
        &mut self,
        after_slot: usize,
        location: usize,
        rendered: &RenderedSubtree,
    ) {
        let first = after_slot + 1;
        let appending = first >= self.index.len();
        let entries: Vec<(NodeKey, usize)> = rendered
            .nodes
            .iter()
            .map(|node| (node.key, location + node.offset))
            .collect();
        self.index.insert(first, &entries);

        for (i, node) in rendered.nodes.iter().enumerate() {
            self.nodes.insert(
                node.key,
                Cached {
                    slot: first + i,
                    lengths: node.lengths,
                },
            );
        }
        if !appending {
            // Everything after the splice moved down.
            let shifted = first + rendered.nodes.len();
            for slot in shifted..self.index.len() {
                if let Some(key) = self.index.key_at(slot)
                    && let Some(cached) = self.nodes.get_mut(&key)
                {
                    cached.slot = slot;
                }
            }
        }
    }

    /// Compare against a fresh render of `snapshot`.
    pub fn verify(&self, snapshot: &Snapshot) -> Result<(), CacheInconsistency> {
        let rendered = render_subtree(snapshot, snapshot.root(), self.anchors);
        if rendered.nodes.len() != self.nodes.len() || self.index.len() != self.nodes.len() {
            return Err(CacheInconsistency::CountMismatch {
                expected: rendered.nodes.len(),
                found: self.nodes.len(),
            });
        }
        for (slot, node) in rendered.nodes.iter().enumerate() {
            let found = self
                .entry_of(node.key)
                .ok_or(CacheInconsistency::Missing(node.key))?;
            let expected = RangeCacheEntry {
                key: node.key,
                location: node.offset,
                lengths: node.lengths,
            };
            if found != expected {
                return Err(CacheInconsistency::Stale {
                    key: node.key,
                    expected: Box::new(expected),
                    found: Box::new(found),
                });
            }
            if let Some(at_slot) = self.index.key_at(slot)
                && at_slot != node.key
            {
                return Err(CacheInconsistency::OutOfOrder {
                    slot,
                    expected: node.key,
                    found: at_slot,
                });
            }
        }
        Ok(())
    }
}

fn add_signed(value: usize, delta: i64) -> usize {
    usize::try_from(value as i64 + delta).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeKind, TextFormat};
    use crate::reconcile::contribution::render_forest;
    use pretty_assertions::assert_eq;

    fn abc() -> (Snapshot, Vec<NodeKey>) {
        let mut builder = Snapshot::builder();
        let keys = ["A", "B", "C"]
            .iter()
            .map(|t| builder.paragraph(t).unwrap())
            .collect();
        (builder.build(), keys)
    }

    #[test]
    fn test_rebuild_full_locations() {
        let (snapshot, paragraphs) = abc();
        let mut cache = RangeCache::new();
        cache.rebuild_full(&snapshot, false);

        let locations: Vec<usize> = paragraphs
            .iter()
            .map(|&p| cache.location_of(p).unwrap())
            .collect();
        assert_eq!(locations, vec![0, 2, 4]);
        assert_eq!(cache.total_len(), 6);
        assert_eq!(cache.len(), 7);
        assert!(cache.verify(&snapshot).is_ok());
    }

    #[test]
    fn test_missing_key_is_none() {
        let (snapshot, _) = abc();
        let mut cache = RangeCache::new();
        cache.rebuild_full(&snapshot, true);
        assert_eq!(cache.entry_of(NodeKey(999)), None);
        assert_eq!(cache.location_of(NodeKey(999)), None);
    }

    #[test]
    fn test_apply_delta_shifts_later_nodes() {
        let (snapshot, paragraphs) = abc();
        let mut cache = RangeCache::new();
        cache.rebuild_full(&snapshot, false);

        let b_text = snapshot.node(paragraphs[1]).unwrap().children[0];
        let slot = cache.slot_of(b_text).unwrap();
        cache.adjust_text(b_text, 1);
        cache.adjust_children(paragraphs[1], 1);
        cache.adjust_children(NodeKey::ROOT, 1);
        cache.apply_delta(slot + 1, 1);

        assert_eq!(cache.location_of(paragraphs[0]), Some(0));
        assert_eq!(cache.location_of(paragraphs[1]), Some(2));
        assert_eq!(cache.location_of(paragraphs[2]), Some(5));
        assert_eq!(cache.entry_of(paragraphs[1]).unwrap().range(), 2..5);
        assert_eq!(cache.total_len(), 7);
    }

    #[test]
    fn test_verify_reports_stale_entry() {
        let (snapshot, paragraphs) = abc();
        let mut cache = RangeCache::new();
        cache.rebuild_full(&snapshot, false);
        cache.adjust_children(paragraphs[0], 3);

        assert!(matches!(
            cache.verify(&snapshot),
            Err(CacheInconsistency::Stale { key, .. }) if key == paragraphs[0]
        ));
    }

    #[test]
    fn test_insert_rendered_in_the_middle() {
        let (snapshot, paragraphs) = abc();
        let mut cache = RangeCache::new();
        cache.rebuild_full(&snapshot, false);

        // Append a text run to A, as a trailing append would.
        let mut builder_snapshot = snapshot.clone();
        let extra = builder_snapshot
            .insert_child(
                paragraphs[0],
                None,
                NodeKind::Text,
                "yz".into(),
                TextFormat::ITALIC,
            )
            .unwrap();
        let rendered = render_forest(&builder_snapshot, &[extra], false);
        let a_text = snapshot.node(paragraphs[0]).unwrap().children[0];
        let after = cache.slot_of(a_text).unwrap();
        let at = cache.entry_of(paragraphs[0]).unwrap().content_end();

        cache.apply_delta(after + 1, 2);
        cache.adjust_children(paragraphs[0], 2);
        cache.adjust_children(NodeKey::ROOT, 2);
        cache.insert_rendered(after, at, &rendered);

        assert_eq!(cache.location_of(extra), Some(1));
        assert_eq!(cache.location_of(paragraphs[1]), Some(4));
        assert!(cache.verify(&builder_snapshot).is_ok());
    }
}
