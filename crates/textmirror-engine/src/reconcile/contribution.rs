//! What each node contributes to the flat buffer.
//!
//! A node's contribution is `leading + own text + children + trailing`. With
//! anchors enabled a block's leading part is its start marker and its trailing
//! part is its end marker followed by the block's `"\n"` terminator; without
//! anchors only the terminator remains.

use super::anchors::{MarkerKind, write_marker};
use crate::model::{NodeKey, Snapshot};

/// Byte lengths of the four parts of a node's contribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeLengths {
    pub leading: usize,
    pub text: usize,
    pub children: usize,
    pub trailing: usize,
}

impl NodeLengths {
    pub fn total(&self) -> usize {
        self.leading + self.text + self.children + self.trailing
    }

    /// Offset of the end of the node's content (before its trailing part),
    /// relative to the node's location.
    pub fn content_end(&self) -> usize {
        self.leading + self.text + self.children
    }
}

/// One node of a rendered subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedNode {
    pub key: NodeKey,
    /// Offset from the start of the rendered text.
    pub offset: usize,
    pub lengths: NodeLengths,
}

/// Text of one or more subtrees plus the span of every node in it, in
/// document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedSubtree {
    pub text: String,
    pub nodes: Vec<RenderedNode>,
}

/// Render `key` and everything below it.
pub fn render_subtree(snapshot: &Snapshot, key: NodeKey, anchors: bool) -> RenderedSubtree {
    render_forest(snapshot, &[key], anchors)
}

/// Render several sibling subtrees back to back.
pub fn render_forest(snapshot: &Snapshot, keys: &[NodeKey], anchors: bool) -> RenderedSubtree {
    let mut out = RenderedSubtree::default();
    for &key in keys {
        render_into(snapshot, key, anchors, &mut out);
    }
    out
}

fn render_into(snapshot: &Snapshot, key: NodeKey, anchors: bool, out: &mut RenderedSubtree) -> usize {
    let Some(node) = snapshot.node(key) else {
        log::warn!("render skipped dangling child {key}");
        return 0;
    };
    let start = out.text.len();
    let slot = out.nodes.len();
    out.nodes.push(RenderedNode {
        key,
        offset: start,
        lengths: NodeLengths::default(),
    });

    let anchored = anchors && node.kind.supports_anchor();
    if anchored {
        write_marker(&mut out.text, MarkerKind::Start, key);
    }
    let leading = out.text.len() - start;

    let own = node.own_text();
    out.text.push_str(own);

    let mut children = 0;
    for &child in &node.children {
        children += render_into(snapshot, child, anchors, out);
    }

    let trailing_start = out.text.len();
    if anchored {
        write_marker(&mut out.text, MarkerKind::End, key);
    }
    if node.kind.is_block() {
        out.text.push('\n');
    }

    let lengths = NodeLengths {
        leading,
        text: own.len(),
        children,
        trailing: out.text.len() - trailing_start,
    };
    out.nodes[slot].lengths = lengths;
    lengths.total()
}
