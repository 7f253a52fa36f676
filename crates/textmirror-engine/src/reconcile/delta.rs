//! Fast path: patch only the spans of dirty nodes.
//!
//! Every edit is planned against the previous buffer first (locate, validate,
//! diff). Only when the whole plan holds up is anything written, so a failure
//! leaves buffer and cache untouched for the full reconcile to take over.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use super::anchors::{end_marker, marker_len, start_marker};
use super::contribution::{RenderedSubtree, render_forest};
use super::diff::{common_prefix_len, common_suffix_len};
use super::fallback::FallbackReason;
use super::metrics::RunStats;
use super::range_cache::RangeCache;
use crate::buffer::TextBuffer;
use crate::editing::{DirtyCause, DirtyKind, DirtySet};
use crate::flags::FeatureFlags;
use crate::model::{NodeKey, Snapshot};

#[derive(Debug)]
enum PlannedEdit {
    /// Replace the differing middle of a node's own text.
    Text {
        key: NodeKey,
        slot: usize,
        at: usize,
        deleted: String,
        inserted: String,
    },
    /// Insert newly appended children at the end of `parent`'s content.
    Append {
        parent: NodeKey,
        /// Slot of the last node of `parent`'s old subtree.
        after_slot: usize,
        depth: usize,
        at: usize,
        rendered: RenderedSubtree,
    },
}

impl PlannedEdit {
    /// Edits are applied in descending order of this key: buffer position,
    /// then document order, then outermost first for appends that share a
    /// position and a last descendant.
    fn order(&self) -> (usize, usize, Reverse<usize>) {
        match self {
            PlannedEdit::Text { slot, at, .. } => (*at, 2 * slot, Reverse(0)),
            PlannedEdit::Append {
                after_slot,
                depth,
                at,
                ..
            } => (*at, 2 * after_slot + 1, Reverse(*depth)),
        }
    }
}

pub(crate) fn apply<B: TextBuffer>(
    prev: &Snapshot,
    next: &Snapshot,
    dirty: &DirtySet,
    cache: &mut RangeCache,
    buffer: &mut B,
    flags: &FeatureFlags,
) -> Result<RunStats, FallbackReason> {
    if !cache.anchors() {
        return Err(FallbackReason::AnchorsToggled);
    }
    if buffer.len() != cache.total_len() {
        log::warn!(
            "buffer holds {} bytes but the range cache describes {}",
            buffer.len(),
            cache.total_len()
        );
        return Err(FallbackReason::AnchorIntegrity);
    }

    let mut stats = RunStats::default();
    let mut plans = Vec::new();
    let mut blocks = BTreeSet::new();

    for (key, mark) in dirty.iter() {
        // Parents marked for a child's text change: their lengths are patched
        // while walking the child's ancestors below.
        if mark.kind == DirtyKind::Content && mark.cause == DirtyCause::SystemDerived {
            continue;
        }
        // Nodes new in `next` are rendered with the append that introduced them.
        let (Some(before), Some(after)) = (prev.node(key), next.node(key)) else {
            continue;
        };
        stats.nodes_visited += 1;

        let (old, new) = (before.own_text(), after.own_text());
        if old != new {
            let entry = cache.entry_of(key).ok_or(FallbackReason::CacheMiss)?;
            let slot = cache.slot_of(key).ok_or(FallbackReason::CacheMiss)?;
            if entry.lengths.text != old.len() {
                log::warn!("cached text length of {key} is stale");
                return Err(FallbackReason::CacheMiss);
            }
            let (prefix, suffix) = if flags.optimizations.prefix_suffix_trimming {
                let prefix = common_prefix_len(old, new);
                let max = old.len().min(new.len()) - prefix;
                (prefix, common_suffix_len(&old[prefix..], &new[prefix..], max))
            } else {
                (0, 0)
            };
            let at = entry.location + entry.lengths.leading + prefix;
            let deleted = &old[prefix..old.len() - suffix];
            if buffer.slice(at..at + deleted.len()).as_deref() != Some(deleted) {
                log::warn!("buffer text of {key} does not match the previous snapshot");
                return Err(FallbackReason::AnchorIntegrity);
            }
            plans.push(PlannedEdit::Text {
                key,
                slot,
                at,
                deleted: deleted.to_string(),
                inserted: new[prefix..new.len() - suffix].to_string(),
            });
            blocks.extend(prev.anchored_ancestor_or_self(key));
        }

        if mark.kind == DirtyKind::Structural && before.children != after.children {
            if !after.children.starts_with(&before.children) {
                return Err(FallbackReason::StructuralChange);
            }
            let appended = &after.children[before.children.len()..];
            let entry = cache.entry_of(key).ok_or(FallbackReason::CacheMiss)?;
            let after_slot = cache
                .slot_of(prev.last_descendant(key))
                .ok_or(FallbackReason::CacheMiss)?;
            let rendered = render_forest(next, appended, true);
            stats.nodes_visited += rendered.nodes.len();
            plans.push(PlannedEdit::Append {
                parent: key,
                after_slot,
                depth: prev.depth(key),
                at: entry.content_end(),
                rendered,
            });
            blocks.extend(prev.anchored_ancestor_or_self(key));
        }
    }

    for &block in &blocks {
        validate_anchor(cache, buffer, block)?;
        stats.nodes_visited += 1;
    }

    if plans.is_empty() {
        return Ok(stats);
    }
    plans.sort_by_key(|plan| Reverse(plan.order()));

    let batch = flags.optimizations.batch_edits;
    if batch {
        buffer.begin_editing();
    }
    for plan in &plans {
        match plan {
            PlannedEdit::Text {
                at,
                deleted,
                inserted,
                ..
            } => {
                buffer.replace(*at..*at + deleted.len(), inserted);
                stats.record_edit(deleted, inserted);
            }
            PlannedEdit::Append { at, rendered, .. } => {
                buffer.replace(*at..*at, &rendered.text);
                stats.record_edit("", &rendered.text);
            }
        }
    }
    if batch {
        buffer.end_editing();
    }

    for plan in plans {
        match plan {
            PlannedEdit::Text {
                key,
                slot,
                deleted,
                inserted,
                ..
            } => {
                let delta = inserted.len() as i64 - deleted.len() as i64;
                if delta == 0 {
                    continue;
                }
                cache.adjust_text(key, delta);
                for ancestor in next.ancestors(key) {
                    cache.adjust_children(ancestor, delta);
                    stats.nodes_visited += 1;
                }
                cache.apply_delta(slot + 1, delta);
            }
            PlannedEdit::Append {
                parent,
                after_slot,
                at,
                rendered,
                ..
            } => {
                let delta = rendered.text.len() as i64;
                cache.apply_delta(after_slot + 1, delta);
                cache.adjust_children(parent, delta);
                for ancestor in next.ancestors(parent) {
                    cache.adjust_children(ancestor, delta);
                    stats.nodes_visited += 1;
                }
                cache.insert_rendered(after_slot, at, &rendered);
                stats.ranges_added += rendered.nodes.len();
            }
        }
    }
    Ok(stats)
}

/// Check that `block`'s start and end markers sit where the cache says.
fn validate_anchor<B: TextBuffer>(
    cache: &RangeCache,
    buffer: &B,
    block: NodeKey,
) -> Result<(), FallbackReason> {
    let entry = cache.entry_of(block).ok_or(FallbackReason::CacheMiss)?;
    let len = marker_len(block);
    let start = buffer.slice(entry.location..entry.location + len);
    let end_at = entry.content_end();
    let end = buffer.slice(end_at..end_at + len);
    if entry.lengths.leading != len
        || start.as_deref() != Some(start_marker(block).as_str())
        || end.as_deref() != Some(end_marker(block).as_str())
    {
        log::warn!(
            "anchor for {block} is missing or damaged at {}..{end_at}",
            entry.location
        );
        return Err(FallbackReason::AnchorIntegrity);
    }
    Ok(())
}
