//! The flat text buffer handed to the host layout engine.
//!
//! The reconciler only needs three things from a buffer: its length, ranged
//! replacement, and begin/end framing so a transaction's edits reach the
//! layout engine as one batch. [`RopeBuffer`] is the in-process implementation
//! backed by `xi_rope`.

use std::borrow::Cow;
use std::ops::Range;

use xi_rope::Rope;
use xi_rope::delta::Builder;

/// A text storage the reconciler writes into.
///
/// All offsets are UTF-8 byte offsets.
pub trait TextBuffer {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace `range` with `text`. Offsets refer to the buffer's current state.
    fn replace(&mut self, range: Range<usize>, text: &str);

    /// The text in `range`, or `None` when the range is out of bounds or does
    /// not fall on character boundaries.
    fn slice(&self, range: Range<usize>) -> Option<Cow<'_, str>>;

    /// The whole buffer as a string.
    fn text(&self) -> String;

    /// Open an editing batch. Batches nest; only the outermost one counts.
    fn begin_editing(&mut self);

    /// Close an editing batch.
    fn end_editing(&mut self);
}

/// One replacement as seen by the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEdit {
    /// Replaced range, in buffer coordinates at the time of the edit.
    pub range: Range<usize>,
    pub inserted_len: usize,
}

impl BufferEdit {
    pub fn is_insert(&self) -> bool {
        self.range.is_empty() && self.inserted_len > 0
    }
}

/// `xi_rope`-backed buffer that records the edits of each batch.
#[derive(Clone)]
pub struct RopeBuffer {
    rope: Rope,
    depth: usize,
    pending: Vec<BufferEdit>,
    last_batch: Vec<BufferEdit>,
    batches: u64,
}

impl Default for RopeBuffer {
    fn default() -> Self {
        Self::from_text("")
    }
}

impl std::fmt::Debug for RopeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RopeBuffer")
            .field("len", &self.rope.len())
            .field("depth", &self.depth)
            .field("batches", &self.batches)
            .finish()
    }
}

impl RopeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from(text),
            depth: 0,
            pending: Vec::new(),
            last_batch: Vec::new(),
            batches: 0,
        }
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    /// Edits of the most recently closed batch.
    pub fn last_batch(&self) -> &[BufferEdit] {
        &self.last_batch
    }

    /// Number of batches closed so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    fn is_boundary(&self, offset: usize) -> bool {
        offset <= self.rope.len() && self.rope.is_codepoint_boundary(offset)
    }
}

impl TextBuffer for RopeBuffer {
    fn len(&self) -> usize {
        self.rope.len()
    }

    fn replace(&mut self, range: Range<usize>, text: &str) {
        debug_assert!(
            range.start <= range.end && self.is_boundary(range.start) && self.is_boundary(range.end),
            "replace range {range:?} is invalid for buffer of length {}",
            self.rope.len()
        );
        let mut builder = Builder::new(self.rope.len());
        builder.replace(range.clone(), Rope::from(text));
        self.rope = builder.build().apply(&self.rope);

        let edit = BufferEdit {
            range,
            inserted_len: text.len(),
        };
        log::trace!("buffer edit {edit:?}");
        if self.depth > 0 {
            self.pending.push(edit);
        } else {
            // Unframed edits form a batch of their own.
            self.last_batch = vec![edit];
            self.batches += 1;
        }
    }

    fn slice(&self, range: Range<usize>) -> Option<Cow<'_, str>> {
        if range.start > range.end || !self.is_boundary(range.start) || !self.is_boundary(range.end)
        {
            return None;
        }
        Some(self.rope.slice_to_cow(range))
    }

    fn text(&self) -> String {
        self.rope.to_string()
    }

    fn begin_editing(&mut self) {
        self.depth += 1;
    }

    fn end_editing(&mut self) {
        if self.depth == 0 {
            log::warn!("end_editing called without a matching begin_editing");
            return;
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.last_batch = std::mem::take(&mut self.pending);
            self.batches += 1;
        }
    }
}
