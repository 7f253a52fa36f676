use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::arena::NodeArena;
use super::node::{Node, NodeKey, NodeKind, TextFormat};
use crate::error::EditorError;

/// A caret position: a node and a byte offset into its own text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn caret(key: NodeKey, offset: usize) -> Self {
        let point = Point { key, offset };
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Immutable, versioned document tree.
///
/// Snapshots are cheap to clone; a transaction clones the current snapshot
/// into a draft and only the nodes it touches are copied.
#[derive(Debug, Clone)]
pub struct Snapshot {
    arena: NodeArena,
    root: NodeKey,
    selection: Option<Selection>,
    next_key: u32,
    version: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    /// A document holding only its root.
    pub fn empty() -> Self {
        let mut arena = NodeArena::default();
        arena.insert(Node::new(NodeKey::ROOT, NodeKind::Root, None));
        Self {
            arena,
            root: NodeKey::ROOT,
            selection: None,
            next_key: 1,
            version: 0,
        }
    }

    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.arena.get(key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.arena.get(key).is_some()
    }

    /// Number of nodes reachable from the root.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node(self.root)
            .is_none_or(|root| root.children.is_empty())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// True when both snapshots hold the very same node allocation.
    pub fn shares_node(&self, other: &Snapshot, key: NodeKey) -> bool {
        match (self.arena.get_shared(key), other.arena.get_shared(key)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Pre-order walk starting at the root.
    pub fn document_order(&self) -> DocumentOrder<'_> {
        DocumentOrder {
            snapshot: self,
            stack: vec![self.root],
        }
    }

    /// Ancestors of `key`, nearest first, excluding `key` itself.
    pub fn ancestors(&self, key: NodeKey) -> Ancestors<'_> {
        Ancestors {
            snapshot: self,
            next: self.node(key).and_then(|node| node.parent),
        }
    }

    pub fn depth(&self, key: NodeKey) -> usize {
        self.ancestors(key).count()
    }

    /// The last node of `key`'s subtree in document order.
    pub fn last_descendant(&self, key: NodeKey) -> NodeKey {
        let mut current = key;
        while let Some(&last) = self.node(current).and_then(|node| node.children.last()) {
            current = last;
        }
        current
    }

    /// Nearest node at or above `key` whose kind supports anchors.
    pub fn anchored_ancestor_or_self(&self, key: NodeKey) -> Option<NodeKey> {
        let node = self.node(key)?;
        if node.kind.supports_anchor() {
            return Some(key);
        }
        self.ancestors(key)
            .find(|&ancestor| self.node(ancestor).is_some_and(|n| n.kind.supports_anchor()))
    }

    pub(crate) fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Drop the selection if it points at nodes that no longer exist.
    pub(crate) fn sanitize_selection(&mut self) {
        if let Some(selection) = self.selection
            && (!self.contains(selection.anchor.key) || !self.contains(selection.focus.key))
        {
            log::debug!("clearing selection that referenced removed nodes");
            self.selection = None;
        }
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node, EditorError> {
        self.arena.get_mut(key).ok_or(EditorError::NodeNotFound(key))
    }

    /// Create a node under `parent` at `index` (`None` appends).
    pub(crate) fn insert_child(
        &mut self,
        parent: NodeKey,
        index: Option<usize>,
        kind: NodeKind,
        text: String,
        format: TextFormat,
    ) -> Result<NodeKey, EditorError> {
        let parent_node = self.node(parent).ok_or(EditorError::NodeNotFound(parent))?;
        if !parent_node.kind.is_container() {
            return Err(EditorError::NotAContainer(parent));
        }
        let len = parent_node.children.len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(EditorError::IndexOutOfBounds { parent, index, len });
        }

        let key = NodeKey(self.next_key);
        self.next_key += 1;

        let mut node = Node::new(key, kind, Some(parent));
        node.text = text;
        node.format = format;
        self.arena.insert(node);
        self.node_mut(parent)?.children.insert(index, key);
        Ok(key)
    }

    /// Remove `key` and its whole subtree. Returns the former parent.
    pub(crate) fn remove_subtree(&mut self, key: NodeKey) -> Result<NodeKey, EditorError> {
        let node = self.node(key).ok_or(EditorError::NodeNotFound(key))?;
        let parent = node.parent.ok_or(EditorError::RootImmutable)?;

        self.node_mut(parent)?.children.retain(|&child| child != key);

        let mut pending = vec![key];
        while let Some(current) = pending.pop() {
            if let Some(removed) = self.arena.remove(current) {
                pending.extend(removed.children.iter().copied());
            }
        }
        Ok(parent)
    }

    /// Re-parent `key` under `new_parent` at `index`. Returns the old parent.
    pub(crate) fn move_node(
        &mut self,
        key: NodeKey,
        new_parent: NodeKey,
        index: Option<usize>,
    ) -> Result<NodeKey, EditorError> {
        let node = self.node(key).ok_or(EditorError::NodeNotFound(key))?;
        let old_parent = node.parent.ok_or(EditorError::RootImmutable)?;
        let target = self
            .node(new_parent)
            .ok_or(EditorError::NodeNotFound(new_parent))?;
        if !target.kind.is_container() {
            return Err(EditorError::NotAContainer(new_parent));
        }
        if new_parent == key || self.ancestors(new_parent).any(|a| a == key) {
            return Err(EditorError::CyclicMove { node: key });
        }

        // Length of the target child list once `key` has been taken out of it.
        let len = target.children.len() - usize::from(old_parent == new_parent);
        let index = index.unwrap_or(len);
        if index > len {
            return Err(EditorError::IndexOutOfBounds {
                parent: new_parent,
                index,
                len,
            });
        }

        self.node_mut(old_parent)?.children.retain(|&child| child != key);
        self.node_mut(new_parent)?.children.insert(index, key);
        self.node_mut(key)?.parent = Some(new_parent);
        Ok(old_parent)
    }
}

/// Iterator returned by [`Snapshot::document_order`].
pub struct DocumentOrder<'a> {
    snapshot: &'a Snapshot,
    stack: Vec<NodeKey>,
}

impl<'a> Iterator for DocumentOrder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        let key = self.stack.pop()?;
        let node = self.snapshot.node(key)?;
        self.stack.extend(node.children.iter().rev().copied());
        Some(node)
    }
}

/// Iterator returned by [`Snapshot::ancestors`].
pub struct Ancestors<'a> {
    snapshot: &'a Snapshot,
    next: Option<NodeKey>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        let key = self.next?;
        self.next = self.snapshot.node(key).and_then(|node| node.parent);
        Some(key)
    }
}

/// Convenience for assembling documents outside a transaction (initial
/// loads, importers, tests).
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::empty(),
        }
    }

    pub fn root(&self) -> NodeKey {
        self.snapshot.root()
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.snapshot.node(key)
    }

    pub fn append(&mut self, parent: NodeKey, kind: NodeKind) -> Result<NodeKey, EditorError> {
        self.snapshot
            .insert_child(parent, None, kind, String::new(), TextFormat::default())
    }

    /// Append a text node, merging into a trailing sibling with the same format.
    pub fn append_text(
        &mut self,
        parent: NodeKey,
        text: &str,
        format: TextFormat,
    ) -> Result<NodeKey, EditorError> {
        let last = self
            .snapshot
            .node(parent)
            .ok_or(EditorError::NodeNotFound(parent))?
            .children
            .last()
            .copied();
        if let Some(last) = last
            && let Some(node) = self.snapshot.node(last)
            && node.kind == NodeKind::Text
            && node.format == format
        {
            self.snapshot.node_mut(last)?.text.push_str(text);
            return Ok(last);
        }
        self.snapshot
            .insert_child(parent, None, NodeKind::Text, text.to_string(), format)
    }

    /// Append a paragraph under the root, with a text child when `text` is non-empty.
    pub fn paragraph(&mut self, text: &str) -> Result<NodeKey, EditorError> {
        let root = self.root();
        let paragraph = self.append(root, NodeKind::Paragraph)?;
        if !text.is_empty() {
            self.append_text(paragraph, text, TextFormat::default())?;
        }
        Ok(paragraph)
    }

    pub fn select(&mut self, selection: Selection) {
        self.snapshot.set_selection(Some(selection));
    }

    pub fn build(mut self) -> Snapshot {
        self.snapshot.sanitize_selection();
        self.snapshot
    }
}
