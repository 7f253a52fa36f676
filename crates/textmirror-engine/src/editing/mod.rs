/*!
 * # Editing
 *
 * The write side of the engine. An [`Editor`] owns the current
 * [`Snapshot`](crate::model::Snapshot), the flat buffer and the
 * [`Reconciler`](crate::reconcile::Reconciler).
 *
 * ## Flow
 *
 * 1. `begin_transaction` hands out a [`Transaction`] holding a draft copy of
 *    the snapshot. Only one may be open; reads fail until it is closed.
 * 2. Mutations change the draft and record each touched node in a
 *    [`DirtyTracker`] with its cause and kind.
 * 3. `commit` freezes the tracker into a [`DirtySet`], bumps the version and
 *    reconciles the buffer against the previous snapshot.
 *
 * Aborting (or an error inside [`Editor::update`]) drops the draft, so the
 * buffer never sees a partial transaction.
 */

pub mod dirty;
pub mod editor;
pub mod transaction;

pub use dirty::{DirtyCause, DirtyEntry, DirtyKind, DirtySet, DirtyTracker};
pub use editor::Editor;
pub use transaction::Transaction;
