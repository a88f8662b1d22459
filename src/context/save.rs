//! Cascading save.
//!
//! A save commits a context's pending changes into its parent. For a child
//! context the changes become pending changes of the parent; nothing is
//! durable yet. For a root context they are written to the physical store as
//! one atomic transaction. Durability therefore requires saving every
//! ancestor up to a root; that walk is deliberately the caller's
//! responsibility, so bulk background work never forces disk I/O onto the
//! interactive context's save cadence.

use super::Context;
use crate::error::{SaveError, StoreError};
use tracing::{debug, trace};

impl Context {
    /// Commit this context's pending changes into its parent.
    ///
    /// The sequence is validate → commit → clear, atomic from the caller's
    /// point of view: on any failure the pending change set is left exactly
    /// as it was, so fixing the cause and calling `save` again retries the
    /// identical commit. A save with no pending changes succeeds immediately
    /// without touching the store.
    pub fn save(&self) -> Result<(), SaveError> {
        self.assert_confined();
        let mut changes = self.changes.lock();

        if changes.is_empty() {
            trace!("save skipped: no pending changes");
            return Ok(());
        }

        let model = self.coordinator().model();
        for snapshot in changes.snapshots() {
            model.validate(snapshot)?;
        }

        match &self.parent {
            Some(parent) => {
                let pending = changes.len();
                parent.merge_from_child(changes.take());
                debug!(pending, "child save merged into parent context");
            }
            None => {
                if self.is_stale() {
                    return Err(SaveError::Commit(StoreError::StaleContext));
                }
                let batch = changes.to_batch();
                let revision = self.coordinator().commit(&batch)?;
                changes.clear();
                debug!(revision, "root save committed to store");
            }
        }

        Ok(())
    }
}
