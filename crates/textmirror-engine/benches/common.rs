// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
use textmirror_engine::editing::Editor;
use textmirror_engine::model::{NodeKey, Snapshot};
use textmirror_engine::reconcile::NullMetricsSink;
use textmirror_engine::FeatureFlags;

#[allow(dead_code)]
pub fn generate_markdown_content(size: usize) -> String {
    let base = "# Title\n\nParagraph with **some** content.\n\n- Bullet point\n- Another item\n\n```rust\nfn example() {}\n```\n\n";
    base.repeat(size)
}

/// An editor over `paragraphs` plain paragraphs, with metrics discarded.
#[allow(dead_code)]
pub fn paragraph_editor(paragraphs: usize, flags: FeatureFlags) -> (Editor, Vec<NodeKey>) {
    let mut builder = Snapshot::builder();
    let keys = (0..paragraphs)
        .map(|i| {
            builder
                .paragraph(&format!("Paragraph {i} with some text in it."))
                .unwrap()
        })
        .collect();
    let mut editor = Editor::from_snapshot(builder.build(), flags);
    editor.set_metrics_sink(NullMetricsSink);
    (editor, keys)
}

/// Text child of a paragraph built by [`paragraph_editor`].
#[allow(dead_code)]
pub fn text_of(editor: &Editor, paragraph: NodeKey) -> NodeKey {
    editor.snapshot().node(paragraph).unwrap().children[0]
}
