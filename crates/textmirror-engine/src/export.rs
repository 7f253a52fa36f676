//! Outward views of a snapshot for copy/paste and accessibility.
//!
//! These render from the document tree, never from the buffer, so anchor
//! markers cannot appear in anything produced here.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::model::{Node, NodeKey, NodeKind, Snapshot, TextFormat};
use crate::reconcile::render_subtree;

/// A stretch of text with uniform formatting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRun {
    /// Node the run came from, if any.
    pub key: Option<NodeKey>,
    pub text: String,
    pub format: TextFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichText {
    pub runs: Vec<TextRun>,
}

impl RichText {
    pub fn plain(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }
}

/// The document text as the buffer would hold it without anchors.
pub fn plain_text(snapshot: &Snapshot) -> String {
    render_subtree(snapshot, snapshot.root(), false).text
}

/// One run per leaf, plus a `"\n"` run closing each block.
pub fn rich_text(snapshot: &Snapshot) -> RichText {
    let mut runs = Vec::new();
    collect_runs(snapshot, snapshot.root(), &mut runs);
    RichText { runs }
}

fn collect_runs(snapshot: &Snapshot, key: NodeKey, runs: &mut Vec<TextRun>) {
    let Some(node) = snapshot.node(key) else {
        return;
    };
    let own = node.own_text();
    if !own.is_empty() {
        runs.push(TextRun {
            key: Some(key),
            text: own.to_string(),
            format: node.format,
        });
    }
    for &child in &node.children {
        collect_runs(snapshot, child, runs);
    }
    if node.kind.is_block() {
        runs.push(TextRun {
            key: Some(key),
            text: "\n".to_string(),
            format: TextFormat::default(),
        });
    }
}

/// An HTML fragment for the clipboard.
pub fn html(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    if let Some(root) = snapshot.node(snapshot.root()) {
        for &child in &root.children {
            write_html(snapshot, child, &mut out);
        }
    }
    out
}

fn write_html(snapshot: &Snapshot, key: NodeKey, out: &mut String) {
    let Some(node) = snapshot.node(key) else {
        return;
    };
    match &node.kind {
        NodeKind::Text => write_formatted(node, out),
        NodeKind::LineBreak => out.push_str("<br>"),
        NodeKind::Decorator { tag } if tag == "horizontal-rule" => out.push_str("<hr>"),
        NodeKind::Decorator { tag } => {
            out.push_str("<span data-decorator=\"");
            out.push_str(&encode_double_quoted_attribute(tag));
            out.push_str("\"></span>");
        }
        NodeKind::CodeBlock { language } => {
            out.push_str("<pre><code");
            if let Some(language) = language {
                out.push_str(" class=\"language-");
                out.push_str(&encode_double_quoted_attribute(language));
                out.push('"');
            }
            out.push('>');
            write_children(snapshot, node, out);
            out.push_str("</code></pre>\n");
        }
        kind => {
            let tag = block_tag(kind);
            out.push('<');
            out.push_str(&tag);
            out.push('>');
            if matches!(kind, NodeKind::List { .. }) {
                out.push('\n');
            }
            write_children(snapshot, node, out);
            out.push_str("</");
            out.push_str(&tag);
            out.push_str(">\n");
        }
    }
}

fn write_children(snapshot: &Snapshot, node: &Node, out: &mut String) {
    for &child in &node.children {
        write_html(snapshot, child, out);
    }
}

fn block_tag(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Heading { level } => format!("h{}", (*level).clamp(1, 6)),
        NodeKind::Quote => "blockquote".to_string(),
        NodeKind::List { ordered: true } => "ol".to_string(),
        NodeKind::List { ordered: false } => "ul".to_string(),
        NodeKind::ListItem => "li".to_string(),
        _ => "p".to_string(),
    }
}

const FORMAT_TAGS: [(TextFormat, &str); 5] = [
    (TextFormat::BOLD, "strong"),
    (TextFormat::ITALIC, "em"),
    (TextFormat::CODE, "code"),
    (TextFormat::STRIKETHROUGH, "del"),
    (TextFormat::UNDERLINE, "u"),
];

fn write_formatted(node: &Node, out: &mut String) {
    let tags: Vec<&str> = FORMAT_TAGS
        .iter()
        .filter(|(format, _)| node.format.contains(*format))
        .map(|(_, tag)| *tag)
        .collect();
    for tag in &tags {
        out.push('<');
        out.push_str(tag);
        out.push('>');
    }
    out.push_str(&encode_text(&node.text));
    for tag in tags.iter().rev() {
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

/// Text a screen reader should announce for `key`: its content with
/// decorators described by their tag and surrounding whitespace trimmed.
pub fn accessibility_text(snapshot: &Snapshot, key: NodeKey) -> Option<String> {
    snapshot.node(key)?;
    let mut out = String::new();
    describe(snapshot, key, &mut out);
    Some(out.trim().to_string())
}

fn describe(snapshot: &Snapshot, key: NodeKey, out: &mut String) {
    let Some(node) = snapshot.node(key) else {
        return;
    };
    match &node.kind {
        NodeKind::Decorator { tag } => {
            out.push('[');
            out.push_str(&tag.replace('-', " "));
            out.push(']');
        }
        _ => out.push_str(node.own_text()),
    }
    for &child in &node.children {
        describe(snapshot, child, out);
    }
    if node.kind.is_block() {
        out.push('\n');
    }
}
