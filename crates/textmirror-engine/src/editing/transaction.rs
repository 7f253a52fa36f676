use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::dirty::{DirtyCause, DirtyKind, DirtySet, DirtyTracker};
use crate::error::EditorError;
use crate::model::{Node, NodeKey, NodeKind, Selection, Snapshot, TextFormat};

/// An open write against an [`Editor`](super::Editor).
///
/// Mutations go to a draft copy of the current snapshot and are recorded in
/// the dirty tracker. Nothing reaches the buffer until the editor commits the
/// transaction; dropping it (or calling `abort`) discards everything and
/// frees the editor for the next write.
#[derive(Debug)]
pub struct Transaction {
    pub(crate) id: u64,
    pub(crate) session: u64,
    /// The editor's open-write slot, holding `id` while this transaction is live.
    open: Arc<AtomicU64>,
    depth: usize,
    draft: Snapshot,
    dirty: DirtyTracker,
}

impl Transaction {
    pub(crate) fn new(id: u64, session: u64, open: Arc<AtomicU64>, base: &Snapshot) -> Self {
        Self {
            id,
            session,
            open,
            depth: 0,
            draft: base.clone(),
            dirty: DirtyTracker::new(),
        }
    }

    pub(crate) fn into_parts(mut self) -> (Snapshot, DirtySet) {
        let draft = std::mem::replace(&mut self.draft, Snapshot::empty());
        let dirty = std::mem::take(&mut self.dirty);
        (draft, dirty.freeze())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Nesting depth of [`nested`](Self::nested) calls currently running.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.draft
    }

    pub fn root(&self) -> NodeKey {
        self.draft.root()
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.draft.node(key)
    }

    /// Number of nodes marked dirty so far.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Run `f` as part of this transaction. Nested writes coalesce into the
    /// outer commit.
    pub fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Transaction) -> Result<T, EditorError>,
    ) -> Result<T, EditorError> {
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub fn mark_dirty(&mut self, key: NodeKey, cause: DirtyCause) {
        self.dirty.mark_dirty(key, cause);
    }

    fn mark_structural(&mut self, key: NodeKey, parent: NodeKey) {
        self.dirty
            .mark(key, DirtyCause::UserEdit, DirtyKind::Structural);
        self.dirty
            .mark(parent, DirtyCause::SystemDerived, DirtyKind::Structural);
    }

    fn mark_content(&mut self, key: NodeKey) {
        self.dirty.mark(key, DirtyCause::UserEdit, DirtyKind::Content);
        if let Some(parent) = self.draft.node(key).and_then(|node| node.parent) {
            self.dirty
                .mark(parent, DirtyCause::SystemDerived, DirtyKind::Content);
        }
    }

    pub fn append_node(&mut self, parent: NodeKey, kind: NodeKind) -> Result<NodeKey, EditorError> {
        self.insert_node(parent, None, kind)
    }

    /// Insert an empty node under `parent` at `index` (`None` appends).
    pub fn insert_node(
        &mut self,
        parent: NodeKey,
        index: Option<usize>,
        kind: NodeKind,
    ) -> Result<NodeKey, EditorError> {
        let key = self
            .draft
            .insert_child(parent, index, kind, String::new(), TextFormat::default())?;
        self.mark_structural(key, parent);
        Ok(key)
    }

    /// Append a text node holding `text`.
    pub fn append_text(
        &mut self,
        parent: NodeKey,
        text: &str,
        format: TextFormat,
    ) -> Result<NodeKey, EditorError> {
        let key = self
            .draft
            .insert_child(parent, None, NodeKind::Text, text.to_string(), format)?;
        self.mark_structural(key, parent);
        Ok(key)
    }

    /// Append a paragraph to the root, with a text child when `text` is not empty.
    pub fn append_paragraph(&mut self, text: &str) -> Result<NodeKey, EditorError> {
        let paragraph = self.append_node(self.root(), NodeKind::Paragraph)?;
        if !text.is_empty() {
            self.append_text(paragraph, text, TextFormat::default())?;
        }
        Ok(paragraph)
    }

    /// Remove `key` and its subtree.
    pub fn remove_node(&mut self, key: NodeKey) -> Result<(), EditorError> {
        let parent = self.draft.remove_subtree(key)?;
        self.mark_structural(key, parent);
        Ok(())
    }

    pub fn move_node(
        &mut self,
        key: NodeKey,
        new_parent: NodeKey,
        index: Option<usize>,
    ) -> Result<(), EditorError> {
        let old_parent = self.draft.move_node(key, new_parent, index)?;
        self.mark_structural(key, old_parent);
        self.dirty
            .mark(new_parent, DirtyCause::SystemDerived, DirtyKind::Structural);
        Ok(())
    }

    fn text_node_mut(&mut self, key: NodeKey) -> Result<&mut Node, EditorError> {
        let node = self.draft.node_mut(key)?;
        if node.kind != NodeKind::Text {
            return Err(EditorError::NotText(key));
        }
        Ok(node)
    }

    pub fn set_text(&mut self, key: NodeKey, text: &str) -> Result<(), EditorError> {
        let node = self.text_node_mut(key)?;
        if node.text == text {
            return Ok(());
        }
        node.text = text.to_string();
        self.mark_content(key);
        Ok(())
    }

    /// Insert `text` at byte `offset` of a text node.
    pub fn insert_text(&mut self, key: NodeKey, offset: usize, text: &str) -> Result<(), EditorError> {
        let node = self.text_node_mut(key)?;
        check_range(key, &node.text, offset..offset)?;
        if text.is_empty() {
            return Ok(());
        }
        node.text.insert_str(offset, text);
        self.mark_content(key);
        Ok(())
    }

    /// Delete a byte range from a text node.
    pub fn delete_text(&mut self, key: NodeKey, range: Range<usize>) -> Result<(), EditorError> {
        let node = self.text_node_mut(key)?;
        check_range(key, &node.text, range.clone())?;
        if range.is_empty() {
            return Ok(());
        }
        node.text.replace_range(range, "");
        self.mark_content(key);
        Ok(())
    }

    /// Change a node's kind in place. Leaving `Text` drops the payload.
    pub fn replace_kind(&mut self, key: NodeKey, kind: NodeKind) -> Result<(), EditorError> {
        let node = self.draft.node(key).ok_or(EditorError::NodeNotFound(key))?;
        let parent = node.parent.ok_or(EditorError::RootImmutable)?;
        if !kind.is_container() && !node.children.is_empty() {
            return Err(EditorError::NotAContainer(key));
        }
        if node.kind == kind {
            return Ok(());
        }
        let node = self.draft.node_mut(key)?;
        if kind != NodeKind::Text {
            node.text.clear();
        }
        node.kind = kind;
        self.mark_structural(key, parent);
        Ok(())
    }

    /// Formatting never changes buffer text, so only the node is marked.
    pub fn set_format(&mut self, key: NodeKey, format: TextFormat) -> Result<(), EditorError> {
        let node = self.draft.node_mut(key)?;
        if node.format != format {
            node.format = format;
            self.dirty
                .mark(key, DirtyCause::UserEdit, DirtyKind::Content);
        }
        Ok(())
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.draft.set_selection(selection);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // Only release the slot if no later transaction has claimed it.
        let _ = self
            .open
            .compare_exchange(self.id, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}

fn check_range(key: NodeKey, text: &str, range: Range<usize>) -> Result<(), EditorError> {
    if range.start > range.end
        || range.end > text.len()
        || !text.is_char_boundary(range.start)
        || !text.is_char_boundary(range.end)
    {
        return Err(EditorError::InvalidTextRange {
            key,
            start: range.start,
            end: range.end,
            len: text.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn transaction() -> (Transaction, NodeKey, NodeKey) {
        let mut builder = Snapshot::builder();
        let paragraph = builder.paragraph("hello").unwrap();
        let snapshot = builder.build();
        let text = snapshot.node(paragraph).unwrap().children[0];
        (
            Transaction::new(1, 1, Arc::new(AtomicU64::new(1)), &snapshot),
            paragraph,
            text,
        )
    }

    #[test]
    fn test_text_edit_marks_node_and_parent_only() {
        let (mut tx, paragraph, text) = transaction();
        tx.insert_text(text, 5, " world").unwrap();
        let (draft, dirty) = tx.into_parts();

        assert_eq!(draft.node(text).unwrap().text, "hello world");
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty.get(text).unwrap().cause, DirtyCause::UserEdit);
        let parent = dirty.get(paragraph).unwrap();
        assert_eq!(parent.cause, DirtyCause::SystemDerived);
        assert_eq!(parent.kind, DirtyKind::Content);
        assert!(!dirty.contains(NodeKey::ROOT));
    }

    #[test]
    fn test_append_marks_structural() {
        let (mut tx, _, _) = transaction();
        let paragraph = tx.append_paragraph("next").unwrap();
        let (_, dirty) = tx.into_parts();
        assert_eq!(dirty.get(paragraph).unwrap().kind, DirtyKind::Structural);
        assert_eq!(
            dirty.get(NodeKey::ROOT).unwrap().cause,
            DirtyCause::SystemDerived
        );
        assert_eq!(dirty.len(), 3);
    }

    #[test]
    fn test_delete_text_checks_range() {
        let (mut tx, paragraph, text) = transaction();
        assert_eq!(
            tx.delete_text(text, 3..9),
            Err(EditorError::InvalidTextRange {
                key: text,
                start: 3,
                end: 9,
                len: 5
            })
        );
        assert_eq!(
            tx.insert_text(paragraph, 0, "x"),
            Err(EditorError::NotText(paragraph))
        );
        tx.delete_text(text, 1..3).unwrap();
        assert_eq!(tx.node(text).unwrap().text, "hlo");
    }

    #[test]
    fn test_noop_edits_leave_nothing_dirty() {
        let (mut tx, _, text) = transaction();
        tx.set_text(text, "hello").unwrap();
        tx.insert_text(text, 2, "").unwrap();
        tx.delete_text(text, 2..2).unwrap();
        assert_eq!(tx.dirty_len(), 0);
    }

    #[test]
    fn test_replace_kind_rejects_leaf_with_children() {
        let (mut tx, paragraph, _) = transaction();
        assert_eq!(
            tx.replace_kind(paragraph, NodeKind::LineBreak),
            Err(EditorError::NotAContainer(paragraph))
        );
        tx.replace_kind(paragraph, NodeKind::Heading { level: 2 })
            .unwrap();
        assert_eq!(
            tx.node(paragraph).unwrap().kind,
            NodeKind::Heading { level: 2 }
        );
    }

    #[test]
    fn test_nested_writes_share_the_draft() {
        let (mut tx, _, text) = transaction();
        tx.nested(|inner| {
            assert_eq!(inner.depth(), 1);
            inner.set_text(text, "inner")
        })
        .unwrap();
        assert_eq!(tx.depth(), 0);
        assert_eq!(tx.node(text).unwrap().text, "inner");
    }
}
