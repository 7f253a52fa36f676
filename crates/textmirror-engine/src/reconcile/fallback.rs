//! Decides whether a transaction can be reconciled locally.
//!
//! The checks run in a fixed order and err on the side of a full reconcile:
//! a wrong "structural" verdict only costs time, a wrong "local" verdict
//! would corrupt the buffer.

use std::fmt;

use crate::editing::{DirtyKind, DirtySet};
use crate::flags::FeatureFlags;
use crate::model::{NodeKey, Snapshot};

/// Why a run took the full path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FallbackReason {
    InitialLoad,
    AnchorsDisabled,
    AnchorsToggled,
    FastPathDisabled,
    StructuralChange,
    DecoratorChange,
    TypeChange,
    CacheMiss,
    AnchorIntegrity,
    StrictModeViolation,
    ShadowDivergence,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::InitialLoad => "initialLoad",
            FallbackReason::AnchorsDisabled => "anchorsDisabled",
            FallbackReason::AnchorsToggled => "anchorsToggled",
            FallbackReason::FastPathDisabled => "fastPathDisabled",
            FallbackReason::StructuralChange => "structuralChange",
            FallbackReason::DecoratorChange => "decoratorChange",
            FallbackReason::TypeChange => "typeChange",
            FallbackReason::CacheMiss => "cacheMiss",
            FallbackReason::AnchorIntegrity => "anchorIntegrity",
            FallbackReason::StrictModeViolation => "strictModeViolation",
            FallbackReason::ShadowDivergence => "shadowDivergence",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Local,
    Structural(FallbackReason),
}

impl Classification {
    pub fn is_local(&self) -> bool {
        matches!(self, Classification::Local)
    }
}

/// Classify the change from `prev` to `next` described by `dirty`.
pub fn classify(
    prev: &Snapshot,
    next: &Snapshot,
    dirty: &DirtySet,
    flags: &FeatureFlags,
) -> Classification {
    if !flags.anchors_enabled {
        return Classification::Structural(FallbackReason::AnchorsDisabled);
    }
    if prev.root() != next.root() {
        return Classification::Structural(FallbackReason::StructuralChange);
    }

    let mut decorator = false;
    let mut type_change = false;
    for (key, entry) in dirty.iter() {
        let Some(after) = next.node(key) else {
            log::trace!("{key} was removed");
            return Classification::Structural(FallbackReason::StructuralChange);
        };
        let Some(before) = prev.node(key) else {
            if !is_covered_insertion(prev, next, dirty, key) {
                log::trace!("{key} was inserted outside a trailing append");
                return Classification::Structural(FallbackReason::StructuralChange);
            }
            decorator |= after.kind.is_decorator();
            continue;
        };
        // Content marks promise the same parent, children and kind.
        if entry.kind == DirtyKind::Content {
            continue;
        }

        if before.parent != after.parent {
            log::trace!("{key} moved");
            return Classification::Structural(FallbackReason::StructuralChange);
        }
        if before.children != after.children
            && (!flags.optimizations.trailing_append
                || !is_trailing_append(prev, &before.children, &after.children))
        {
            log::trace!("children of {key} changed beyond a trailing append");
            return Classification::Structural(FallbackReason::StructuralChange);
        }
        if before.kind.is_decorator() != after.kind.is_decorator() {
            decorator = true;
        } else if !before.kind.same_type(&after.kind) {
            type_change = true;
        }
    }

    if decorator {
        Classification::Structural(FallbackReason::DecoratorChange)
    } else if type_change {
        Classification::Structural(FallbackReason::TypeChange)
    } else {
        Classification::Local
    }
}

/// The new child list keeps the old one as a prefix and only adds fresh nodes.
fn is_trailing_append(prev: &Snapshot, before: &[NodeKey], after: &[NodeKey]) -> bool {
    after.len() > before.len()
        && after.starts_with(before)
        && after[before.len()..].iter().all(|&key| !prev.contains(key))
}

/// A new node is safe when it hangs off another new node, or off an existing
/// dirty parent whose child list is a trailing append.
fn is_covered_insertion(prev: &Snapshot, next: &Snapshot, dirty: &DirtySet, key: NodeKey) -> bool {
    let Some(parent) = next.node(key).and_then(|node| node.parent) else {
        return false;
    };
    if !prev.contains(parent) {
        return next.contains(parent);
    }
    dirty.contains(parent)
        && match (prev.node(parent), next.node(parent)) {
            (Some(before), Some(after)) => is_trailing_append(prev, &before.children, &after.children),
            _ => false,
        }
}
