//! Immutable document model.
//!
//! Nodes are stored in a copy-on-write arena keyed by [`NodeKey`], so a new
//! [`Snapshot`] shares every subtree a transaction did not touch with the
//! snapshot it was derived from.

pub(crate) mod arena;
pub mod import;
pub mod node;
pub mod snapshot;

pub use import::snapshot_from_markdown;
pub use node::{Node, NodeKey, NodeKind, OBJECT_REPLACEMENT, TextFormat};
pub use snapshot::{Ancestors, DocumentOrder, Point, Selection, Snapshot, SnapshotBuilder};
