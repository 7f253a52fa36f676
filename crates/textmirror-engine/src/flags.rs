use serde::{Deserialize, Serialize};

/// Runtime switches for the reconciler.
///
/// Every field has a default so partial TOML tables deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Wrap block nodes in start/end anchor markers. The fast path requires it.
    pub anchors_enabled: bool,
    /// Verify range cache invariants after every fast-path run.
    pub strict_mode: bool,
    /// Run the legacy reconciler alongside the fast path and compare results.
    pub shadow_compare: bool,
    /// Initial state of the fast-path toggle.
    pub fast_path: bool,
    pub optimizations: OptimizationToggles,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            anchors_enabled: true,
            strict_mode: false,
            shadow_compare: false,
            fast_path: true,
            optimizations: OptimizationToggles::default(),
        }
    }
}

impl FeatureFlags {
    /// Flags for a session that never takes the fast path.
    pub fn legacy_only() -> Self {
        Self {
            anchors_enabled: false,
            fast_path: false,
            ..Self::default()
        }
    }
}

/// Individual fast-path optimizations, each of which can be switched off to
/// bisect a misbehaving session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationToggles {
    /// Replace only the differing middle of a changed node's text.
    pub prefix_suffix_trimming: bool,
    /// Treat child appends at the end of a parent as local edits.
    pub trailing_append: bool,
    /// Group all buffer edits of a transaction into one editing batch.
    pub batch_edits: bool,
    /// Diff the legacy rebuild against the old buffer instead of rewriting it.
    pub legacy_diff_trimming: bool,
}

impl Default for OptimizationToggles {
    fn default() -> Self {
        Self {
            prefix_suffix_trimming: true,
            trailing_append: true,
            batch_edits: true,
            legacy_diff_trimming: true,
        }
    }
}
