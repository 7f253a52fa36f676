use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use super::node::{NodeKey, NodeKind, TextFormat};
use super::snapshot::{Snapshot, SnapshotBuilder};
use crate::error::EditorError;

/// Build a snapshot from Markdown source.
///
/// This is a loader, not a round-trip format: the document model keeps no
/// Markdown syntax, so markers, indentation and link targets are dropped.
/// Quotes and list items hold their inline content directly; nested lists
/// become children of the enclosing list.
pub fn snapshot_from_markdown(markdown: &str) -> Result<Snapshot, EditorError> {
    let mut importer = Importer::new();
    for event in Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH) {
        importer.event(event)?;
    }
    Ok(importer.builder.build())
}

struct Importer {
    builder: SnapshotBuilder,
    /// Open `Root`/`List` containers, innermost last.
    containers: Vec<NodeKey>,
    /// Open list items, innermost last.
    items: Vec<NodeKey>,
    /// Block currently receiving inline content.
    block: Option<NodeKey>,
    quote_depth: usize,
    image_depth: usize,
    format: TextFormat,
    /// Fenced/indented code content, flushed when the block closes.
    code: Option<String>,
}

impl Importer {
    fn new() -> Self {
        let builder = SnapshotBuilder::new();
        let root = builder.root();
        Self {
            builder,
            containers: vec![root],
            items: Vec::new(),
            block: None,
            quote_depth: 0,
            image_depth: 0,
            format: TextFormat::default(),
            code: None,
        }
    }

    fn container(&self) -> NodeKey {
        self.containers
            .last()
            .copied()
            .unwrap_or_else(|| self.builder.root())
    }

    fn open_block(&mut self, kind: NodeKind) -> Result<NodeKey, EditorError> {
        let block = self.builder.append(self.container(), kind)?;
        self.block = Some(block);
        Ok(block)
    }

    /// The block inline content goes into, opening a paragraph if needed.
    fn inline_target(&mut self) -> Result<NodeKey, EditorError> {
        if let Some(block) = self.block {
            return Ok(block);
        }
        if let Some(&item) = self.items.last() {
            self.block = Some(item);
            return Ok(item);
        }
        let kind = if self.quote_depth > 0 {
            NodeKind::Quote
        } else {
            NodeKind::Paragraph
        };
        self.open_block(kind)
    }

    fn has_children(&self, key: NodeKey) -> bool {
        self.builder
            .node(key)
            .is_some_and(|node| !node.children.is_empty())
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), EditorError> {
        match event {
            Event::Start(tag) => self.start(tag)?,
            Event::End(tag) => self.end(tag)?,
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => {
                if self.image_depth > 0 {
                    return Ok(());
                }
                if let Some(code) = self.code.as_mut() {
                    code.push_str(&text);
                    return Ok(());
                }
                let target = self.inline_target()?;
                self.builder.append_text(target, &text, self.format)?;
            }
            Event::Code(text) => {
                let target = self.inline_target()?;
                self.builder
                    .append_text(target, &text, self.format | TextFormat::CODE)?;
            }
            Event::SoftBreak => {
                let target = self.inline_target()?;
                self.builder.append_text(target, " ", self.format)?;
            }
            Event::HardBreak => {
                let target = self.inline_target()?;
                self.builder.append(target, NodeKind::LineBreak)?;
            }
            Event::Rule => {
                let paragraph = self.open_block(NodeKind::Paragraph)?;
                self.builder.append(
                    paragraph,
                    NodeKind::Decorator {
                        tag: "horizontal-rule".to_string(),
                    },
                )?;
                self.block = None;
            }
            _ => {}
        }
        Ok(())
    }

    fn start(&mut self, tag: Tag<'_>) -> Result<(), EditorError> {
        match tag {
            Tag::Paragraph => match self.block.or_else(|| self.items.last().copied()) {
                // Loose list items wrap their text in paragraphs; keep it in the item.
                Some(block) => {
                    if self.has_children(block) {
                        self.builder.append(block, NodeKind::LineBreak)?;
                    }
                    self.block = Some(block);
                }
                None => {
                    self.inline_target()?;
                }
            },
            Tag::Heading { level, .. } => {
                self.open_block(NodeKind::Heading { level: level as u8 })?;
            }
            Tag::BlockQuote(_) => self.quote_depth += 1,
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) if !info.is_empty() => Some(info.to_string()),
                    _ => None,
                };
                self.open_block(NodeKind::CodeBlock { language })?;
                self.code = Some(String::new());
            }
            Tag::List(start) => {
                let list = self.builder.append(
                    self.container(),
                    NodeKind::List {
                        ordered: start.is_some(),
                    },
                )?;
                self.containers.push(list);
                self.block = None;
            }
            Tag::Item => {
                let item = self.builder.append(self.container(), NodeKind::ListItem)?;
                self.items.push(item);
                self.block = Some(item);
            }
            Tag::Emphasis => self.format.insert(TextFormat::ITALIC),
            Tag::Strong => self.format.insert(TextFormat::BOLD),
            Tag::Strikethrough => self.format.insert(TextFormat::STRIKETHROUGH),
            Tag::Image { .. } => {
                let target = self.inline_target()?;
                self.builder.append(
                    target,
                    NodeKind::Decorator {
                        tag: "image".to_string(),
                    },
                )?;
                self.image_depth += 1;
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, tag: TagEnd) -> Result<(), EditorError> {
        match tag {
            TagEnd::Paragraph => {
                if self.block != self.items.last().copied() {
                    self.block = None;
                }
            }
            TagEnd::Heading(_) => self.block = None,
            TagEnd::BlockQuote(_) => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.block = None;
            }
            TagEnd::CodeBlock => {
                if let (Some(code), Some(block)) = (self.code.take(), self.block) {
                    let code = code.strip_suffix('\n').unwrap_or(&code);
                    if !code.is_empty() {
                        self.builder.append_text(block, code, TextFormat::default())?;
                    }
                }
                self.block = None;
            }
            TagEnd::List(_) => {
                if self.containers.len() > 1 {
                    self.containers.pop();
                }
                self.block = None;
            }
            TagEnd::Item => {
                self.items.pop();
                self.block = None;
            }
            TagEnd::Emphasis => self.format.remove(TextFormat::ITALIC),
            TagEnd::Strong => self.format.remove(TextFormat::BOLD),
            TagEnd::Strikethrough => self.format.remove(TextFormat::STRIKETHROUGH),
            TagEnd::Image => self.image_depth = self.image_depth.saturating_sub(1),
            _ => {}
        }
        Ok(())
    }
}
