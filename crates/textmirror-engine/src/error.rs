use crate::model::NodeKey;

/// Errors surfaced by the editing API.
///
/// Reconciliation problems (stale cache entries, damaged anchors) are not
/// errors: they are recovered internally by a full reconcile and only show up
/// as a [`FallbackReason`](crate::reconcile::FallbackReason) on the metric.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditorError {
    #[error("a write transaction is already in progress")]
    WriteInProgress,
    #[error("transaction {0} was not opened by this editor")]
    ForeignTransaction(u64),
    #[error("node {0} not found")]
    NodeNotFound(NodeKey),
    #[error("node {0} cannot hold children")]
    NotAContainer(NodeKey),
    #[error("node {0} is not a text node")]
    NotText(NodeKey),
    #[error("the root node cannot be removed or moved")]
    RootImmutable,
    #[error("cannot move node {node} into its own subtree")]
    CyclicMove { node: NodeKey },
    #[error("child index {index} out of bounds for node {parent} with {len} children")]
    IndexOutOfBounds {
        parent: NodeKey,
        index: usize,
        len: usize,
    },
    #[error("text range {start}..{end} is invalid for node {key} (length {len})")]
    InvalidTextRange {
        key: NodeKey,
        start: usize,
        end: usize,
        len: usize,
    },
}
