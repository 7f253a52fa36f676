use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder character a decorator contributes to the buffer.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Opaque identifier for a node, stable across snapshots.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(pub u32);

impl NodeKey {
    /// Every snapshot's root node.
    pub const ROOT: NodeKey = NodeKey(0);

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The type tag of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Paragraph,
    Heading { level: u8 },
    Quote,
    CodeBlock { language: Option<String> },
    List { ordered: bool },
    ListItem,
    Text,
    LineBreak,
    /// Embedded content (images, rules, mentions) rendered by the host.
    Decorator { tag: String },
}

impl NodeKind {
    /// Blocks hold inline children and end with a newline.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph
                | NodeKind::Heading { .. }
                | NodeKind::Quote
                | NodeKind::CodeBlock { .. }
                | NodeKind::ListItem
        )
    }

    /// Whether the node may have children.
    pub fn is_container(&self) -> bool {
        self.is_block() || matches!(self, NodeKind::Root | NodeKind::List { .. })
    }

    pub fn is_decorator(&self) -> bool {
        matches!(self, NodeKind::Decorator { .. })
    }

    /// Kinds that get wrapped in anchor markers when anchors are enabled.
    pub fn supports_anchor(&self) -> bool {
        self.is_block()
    }

    /// Same variant, ignoring payload such as heading level or code language.
    pub fn same_type(&self, other: &NodeKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading { .. } => "heading",
            NodeKind::Quote => "quote",
            NodeKind::CodeBlock { .. } => "code",
            NodeKind::List { .. } => "list",
            NodeKind::ListItem => "listitem",
            NodeKind::Text => "text",
            NodeKind::LineBreak => "linebreak",
            NodeKind::Decorator { .. } => "decorator",
        }
    }
}

/// Inline formatting bits carried by text nodes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextFormat(u8);

impl TextFormat {
    pub const BOLD: TextFormat = TextFormat(1);
    pub const ITALIC: TextFormat = TextFormat(1 << 1);
    pub const CODE: TextFormat = TextFormat(1 << 2);
    pub const STRIKETHROUGH: TextFormat = TextFormat(1 << 3);
    pub const UNDERLINE: TextFormat = TextFormat(1 << 4);

    pub fn contains(self, other: TextFormat) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TextFormat) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: TextFormat) {
        self.0 &= !other.0;
    }

    pub fn is_plain(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for TextFormat {
    type Output = TextFormat;

    fn bitor(self, rhs: TextFormat) -> TextFormat {
        TextFormat(self.0 | rhs.0)
    }
}

/// An immutable document node. New versions are produced by copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: NodeKey,
    pub kind: NodeKind,
    pub parent: Option<NodeKey>,
    pub children: Vec<NodeKey>,
    /// Payload of `Text` nodes, empty for everything else.
    pub text: String,
    pub format: TextFormat,
}

impl Node {
    pub(crate) fn new(key: NodeKey, kind: NodeKind, parent: Option<NodeKey>) -> Self {
        Self {
            key,
            kind,
            parent,
            children: Vec::new(),
            text: String::new(),
            format: TextFormat::default(),
        }
    }

    /// The text this node itself contributes, excluding children and markers.
    pub fn own_text(&self) -> &str {
        match self.kind {
            NodeKind::Text => &self.text,
            NodeKind::LineBreak => "\n",
            NodeKind::Decorator { .. } => "\u{FFFC}",
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NodeKind::Paragraph, true, true)]
    #[case(NodeKind::Heading { level: 2 }, true, true)]
    #[case(NodeKind::ListItem, true, true)]
    #[case(NodeKind::List { ordered: false }, false, true)]
    #[case(NodeKind::Root, false, true)]
    #[case(NodeKind::Text, false, false)]
    #[case(NodeKind::Decorator { tag: "image".into() }, false, false)]
    fn test_kind_classification(
        #[case] kind: NodeKind,
        #[case] block: bool,
        #[case] container: bool,
    ) {
        assert_eq!(kind.is_block(), block);
        assert_eq!(kind.supports_anchor(), block);
        assert_eq!(kind.is_container(), container);
    }

    #[test]
    fn test_same_type_ignores_payload() {
        let h1 = NodeKind::Heading { level: 1 };
        let h3 = NodeKind::Heading { level: 3 };
        assert!(h1.same_type(&h3));
        assert!(!h1.same_type(&NodeKind::Paragraph));
    }

    #[test]
    fn test_own_text_per_kind() {
        let mut text = Node::new(NodeKey(1), NodeKind::Text, None);
        text.text = "hello".into();
        assert_eq!(text.own_text(), "hello");

        let br = Node::new(NodeKey(2), NodeKind::LineBreak, None);
        assert_eq!(br.own_text(), "\n");

        let image = Node::new(
            NodeKey(3),
            NodeKind::Decorator {
                tag: "image".into(),
            },
            None,
        );
        assert_eq!(image.own_text(), OBJECT_REPLACEMENT.to_string());

        let para = Node::new(NodeKey(4), NodeKind::Paragraph, None);
        assert_eq!(para.own_text(), "");
    }

    #[test]
    fn test_format_bits() {
        let mut format = TextFormat::BOLD | TextFormat::ITALIC;
        assert!(format.contains(TextFormat::BOLD));
        assert!(!format.contains(TextFormat::CODE));
        format.remove(TextFormat::BOLD);
        assert!(!format.contains(TextFormat::BOLD));
        format.remove(TextFormat::ITALIC);
        assert!(format.is_plain());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(NodeKey(42).to_string(), "#42");
    }
}
