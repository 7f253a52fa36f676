use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::dirty::DirtySet;
use super::transaction::Transaction;
use crate::buffer::{RopeBuffer, TextBuffer};
use crate::error::EditorError;
use crate::flags::FeatureFlags;
use crate::model::{NodeKey, Snapshot};
use crate::reconcile::{
    MetricsSink, RangeCacheEntry, Reconciler, ReconcilerMetric, strip_markers,
};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Owns the current snapshot, the text buffer and the reconciler.
///
/// All writes go through a [`Transaction`]; only one may be open at a time.
/// The editor is single threaded: hosts that share it must confine it to one
/// thread or actor.
pub struct Editor<B: TextBuffer + Clone = RopeBuffer> {
    session: u64,
    snapshot: Snapshot,
    buffer: B,
    reconciler: Reconciler,
    /// Id of the open transaction, `0` when none. Shared with the transaction
    /// so dropping it releases the write.
    open: Arc<AtomicU64>,
    next_transaction: u64,
}

impl<B: TextBuffer + Clone + std::fmt::Debug> std::fmt::Debug for Editor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("session", &self.session)
            .field("version", &self.snapshot.version())
            .field("buffer", &self.buffer)
            .field("reconciler", &self.reconciler)
            .field("open", &self.open_transaction())
            .finish()
    }
}

impl Editor<RopeBuffer> {
    /// An editor over an empty document.
    pub fn new(flags: FeatureFlags) -> Self {
        Self::from_snapshot(Snapshot::empty(), flags)
    }

    pub fn from_snapshot(snapshot: Snapshot, flags: FeatureFlags) -> Self {
        Self::with_buffer(snapshot, RopeBuffer::new(), flags)
    }
}

impl<B: TextBuffer + Clone> Editor<B> {
    /// Load `snapshot` into `buffer` with a full reconcile.
    pub fn with_buffer(snapshot: Snapshot, buffer: B, flags: FeatureFlags) -> Self {
        let mut editor = Self {
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            snapshot,
            buffer,
            reconciler: Reconciler::new(flags),
            open: Arc::new(AtomicU64::new(0)),
            next_transaction: 1,
        };
        editor.reconciler.reconcile(
            None,
            &editor.snapshot,
            &DirtySet::empty(),
            &mut editor.buffer,
        );
        editor
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Direct access for the host's own buffer edits. Changes made here are
    /// not reflected in the document; the next commit detects or repairs them.
    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    fn open_transaction(&self) -> Option<u64> {
        match self.open.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn begin_transaction(&mut self) -> Result<Transaction, EditorError> {
        if self.open_transaction().is_some() {
            return Err(EditorError::WriteInProgress);
        }
        let id = self.next_transaction;
        self.next_transaction += 1;
        self.open.store(id, Ordering::Release);
        log::trace!("begin transaction {id}");
        Ok(Transaction::new(
            id,
            self.session,
            Arc::clone(&self.open),
            &self.snapshot,
        ))
    }

    fn check_owner(&self, transaction: &Transaction) -> Result<(), EditorError> {
        if transaction.session != self.session || self.open_transaction() != Some(transaction.id) {
            return Err(EditorError::ForeignTransaction(transaction.id));
        }
        Ok(())
    }

    /// Publish the transaction's draft and reconcile the buffer.
    pub fn commit(&mut self, transaction: Transaction) -> Result<ReconcilerMetric, EditorError> {
        self.check_owner(&transaction)?;

        // Consuming the transaction releases the open slot.
        let (mut next, dirty) = transaction.into_parts();
        next.sanitize_selection();
        next.bump_version();

        let metric = self
            .reconciler
            .reconcile(Some(&self.snapshot), &next, &dirty, &mut self.buffer);
        self.snapshot = next;
        Ok(metric)
    }

    /// Discard the transaction.
    pub fn abort(&mut self, transaction: Transaction) -> Result<(), EditorError> {
        self.check_owner(&transaction)?;
        log::trace!("abort transaction {}", transaction.id);
        drop(transaction);
        Ok(())
    }

    /// Run `f` in a fresh transaction and commit it. On error nothing is applied.
    pub fn update<T>(
        &mut self,
        f: impl FnOnce(&mut Transaction) -> Result<T, EditorError>,
    ) -> Result<T, EditorError> {
        let mut transaction = self.begin_transaction()?;
        match f(&mut transaction) {
            Ok(value) => {
                self.commit(transaction)?;
                Ok(value)
            }
            Err(err) => {
                self.abort(transaction)?;
                Err(err)
            }
        }
    }

    /// Read the current snapshot. Fails while a write is open.
    pub fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> Result<T, EditorError> {
        if self.open_transaction().is_some() {
            return Err(EditorError::WriteInProgress);
        }
        Ok(f(&self.snapshot))
    }

    /// Raw buffer text, anchor markers included.
    pub fn text(&self) -> String {
        self.buffer.text()
    }

    /// Buffer text with anchor markers removed.
    pub fn plain_text(&self) -> String {
        strip_markers(&self.buffer.text()).into_owned()
    }

    pub fn debug_range_cache_entries(&self) -> Vec<RangeCacheEntry> {
        self.reconciler.range_cache().entries()
    }

    pub fn location_of(&self, key: NodeKey) -> Option<usize> {
        self.reconciler.range_cache().location_of(key)
    }

    pub fn flags(&self) -> &FeatureFlags {
        self.reconciler.flags()
    }

    pub fn set_flags(&mut self, flags: FeatureFlags) {
        self.reconciler.set_flags(flags);
    }

    pub fn set_fast_path_enabled(&mut self, enabled: bool) {
        self.reconciler.set_fast_path_enabled(enabled);
    }

    pub fn fast_path_enabled(&self) -> bool {
        self.reconciler.fast_path_enabled()
    }

    pub fn set_anchors_enabled(&mut self, enabled: bool) {
        self.reconciler.set_anchors_enabled(enabled);
    }

    pub fn set_metrics_sink(&mut self, sink: impl MetricsSink + 'static) {
        self.reconciler.set_metrics_sink(Box::new(sink));
    }

    pub fn last_metric(&self) -> Option<&ReconcilerMetric> {
        self.reconciler.last_metric()
    }
}
