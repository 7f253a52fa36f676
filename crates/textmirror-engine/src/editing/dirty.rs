//! Per-transaction record of changed nodes.

use std::collections::BTreeMap;

use crate::model::NodeKey;

/// Who made a node dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirtyCause {
    /// Marked because a child changed length or shape.
    SystemDerived,
    /// Changed directly by the transaction.
    UserEdit,
}

/// What changed about a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirtyKind {
    /// Own text (or a child's text) changed; lengths can be patched by a delta.
    Content,
    /// Child list, parent or type changed.
    Structural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyEntry {
    pub cause: DirtyCause,
    pub kind: DirtyKind,
}

impl DirtyEntry {
    fn merge(&mut self, other: DirtyEntry) {
        self.cause = self.cause.max(other.cause);
        self.kind = self.kind.max(other.kind);
    }
}

#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    entries: BTreeMap<NodeKey, DirtyEntry>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as content-dirty. Marking twice changes nothing.
    pub fn mark_dirty(&mut self, key: NodeKey, cause: DirtyCause) {
        self.mark(key, cause, DirtyKind::Content);
    }

    /// Mark `key`, merging with any existing entry: `Structural` beats
    /// `Content` and `UserEdit` beats `SystemDerived`.
    pub fn mark(&mut self, key: NodeKey, cause: DirtyCause, kind: DirtyKind) {
        let entry = DirtyEntry { cause, kind };
        self.entries
            .entry(key)
            .and_modify(|existing| existing.merge(entry))
            .or_insert(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn freeze(self) -> DirtySet {
        DirtySet {
            entries: self.entries,
        }
    }
}

/// Immutable dirty set handed to the reconciler at commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    entries: BTreeMap<NodeKey, DirtyEntry>,
}

impl DirtySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: NodeKey) -> Option<DirtyEntry> {
        self.entries.get(&key).copied()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, DirtyEntry)> + '_ {
        self.entries.iter().map(|(&key, &entry)| (key, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn user_edits(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.cause == DirtyCause::UserEdit)
            .count()
    }
}

impl FromIterator<(NodeKey, DirtyCause)> for DirtySet {
    fn from_iter<I: IntoIterator<Item = (NodeKey, DirtyCause)>>(iter: I) -> Self {
        let mut tracker = DirtyTracker::new();
        for (key, cause) in iter {
            tracker.mark_dirty(key, cause);
        }
        tracker.freeze()
    }
}
