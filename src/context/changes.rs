//! Pending change tracking for contexts.
//!
//! A change set records what a context intends to persist: inserts, updates,
//! and deletes keyed by object id. The same transition table drives local
//! recording and the child-to-parent merge performed by a save, which is what
//! makes "save into parent, then parent saves" equivalent to recording the
//! changes on the parent directly.

use crate::object::ObjectSnapshot;
use crate::store::ChangeBatch;
use crate::types::ObjectId;
use serde::Serialize;
use std::collections::BTreeMap;

/// One pending change to a managed object.
#[derive(Debug, Clone, Serialize)]
pub enum PendingChange {
    /// Object created in this context tree; not yet in the durable store.
    Insert(ObjectSnapshot),
    /// New snapshot for an object assumed to exist beneath this context.
    Update(ObjectSnapshot),
    /// Object marked deleted; entity retained for the store key.
    Delete { entity: String },
}

/// Ordered set of pending changes. BTreeMap keeps merge and overlay
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entries: BTreeMap<ObjectId, PendingChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn take(&mut self) -> ChangeSet {
        std::mem::take(self)
    }

    pub fn get(&self, id: ObjectId) -> Option<&PendingChange> {
        self.entries.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &PendingChange)> {
        self.entries.iter().map(|(id, change)| (*id, change))
    }

    /// Snapshots carried by pending inserts and updates, for validation.
    pub fn snapshots(&self) -> impl Iterator<Item = &ObjectSnapshot> {
        self.entries.values().filter_map(|change| match change {
            PendingChange::Insert(s) | PendingChange::Update(s) => Some(s),
            PendingChange::Delete { .. } => None,
        })
    }

    pub fn record_insert(&mut self, snapshot: ObjectSnapshot) {
        self.apply(snapshot.id(), PendingChange::Insert(snapshot));
    }

    pub fn record_update(&mut self, snapshot: ObjectSnapshot) {
        self.apply(snapshot.id(), PendingChange::Update(snapshot));
    }

    pub fn record_delete(&mut self, id: ObjectId, entity: &str) {
        self.apply(
            id,
            PendingChange::Delete {
                entity: entity.to_string(),
            },
        );
    }

    /// Fold another change set (a child's, at save time) into this one.
    pub fn merge(&mut self, other: ChangeSet) {
        for (id, change) in other.entries {
            self.apply(id, change);
        }
    }

    /// Transition table for stacking a new change onto an existing entry.
    fn apply(&mut self, id: ObjectId, incoming: PendingChange) {
        use PendingChange::{Delete, Insert, Update};

        let next = match (self.entries.remove(&id), incoming) {
            (None, change) => Some(change),
            // The object was born here; it stays an insert whatever happens
            // to it, and deleting it cancels it entirely.
            (Some(Insert(_)), Insert(s) | Update(s)) => Some(Insert(s)),
            (Some(Insert(_)), Delete { .. }) => None,
            (Some(Update(_)), Insert(s) | Update(s)) => Some(Update(s)),
            (Some(Update(_)), Delete { entity }) => Some(Delete { entity }),
            // Resurrection after a pending delete nets out to an update of
            // whatever the store still holds.
            (Some(Delete { .. }), Insert(s) | Update(s)) => Some(Update(s)),
            (Some(Delete { entity }), Delete { .. }) => Some(Delete { entity }),
        };
        if let Some(change) = next {
            self.entries.insert(id, change);
        }
    }

    /// Build the atomic write transaction for a root commit. Upserts are
    /// marked durable on the way out.
    pub fn to_batch(&self) -> ChangeBatch {
        let mut batch = ChangeBatch::default();
        for change in self.entries.values() {
            match change {
                PendingChange::Insert(s) | PendingChange::Update(s) => {
                    let mut snapshot = s.clone();
                    snapshot.mark_durable();
                    batch.upserts.push(snapshot);
                }
                PendingChange::Delete { .. } => {}
            }
        }
        for (id, change) in &self.entries {
            if let PendingChange::Delete { entity } = change {
                batch.deletes.push((entity.clone(), *id));
            }
        }
        batch
    }

    /// Overlay this set's changes for one entity onto base rows: deletes
    /// hide, updates replace, inserts appear. Result stays in id order.
    pub fn overlay(&self, entity: &str, base: Vec<ObjectSnapshot>) -> Vec<ObjectSnapshot> {
        let mut rows: BTreeMap<ObjectId, ObjectSnapshot> =
            base.into_iter().map(|s| (s.id(), s)).collect();

        for (id, change) in &self.entries {
            match change {
                PendingChange::Insert(s) | PendingChange::Update(s) => {
                    if s.entity() == entity {
                        rows.insert(*id, s.clone());
                    }
                }
                PendingChange::Delete { entity: deleted } => {
                    if deleted == entity {
                        rows.remove(id);
                    }
                }
            }
        }

        rows.into_values().collect()
    }
}
