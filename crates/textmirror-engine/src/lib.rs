pub mod buffer;
pub mod editing;
pub mod error;
pub mod export;
pub mod flags;
pub mod model;
pub mod reconcile;

// Re-export key types for easier usage
pub use buffer::{BufferEdit, RopeBuffer, TextBuffer};
pub use editing::{DirtyCause, DirtySet, Editor, Transaction};
pub use error::EditorError;
pub use export::{RichText, TextRun};
pub use flags::{FeatureFlags, OptimizationToggles};
pub use model::{Node, NodeKey, NodeKind, Selection, Snapshot, TextFormat, snapshot_from_markdown};
pub use reconcile::{
    FallbackReason, MetricsLog, MetricsSink, RangeCacheEntry, ReconcilePath, Reconciler,
    ReconcilerMetric, strip_markers, strip_markers_rich,
};
