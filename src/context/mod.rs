//! Contexts: thread-confined units of work over the object graph.
//!
//! A context is either root (bound directly to the store coordinator) or a
//! child of another context. It tracks pending inserts, updates, and deletes
//! until saved; a save commits them into the parent (see [`save`]). Contexts
//! form a tree: children hold the only strong reference upward, parents never
//! enumerate children.

pub mod changes;
mod save;

pub use changes::{ChangeSet, PendingChange};

use crate::error::{FetchError, StoreError};
use crate::object::ObjectSnapshot;
use crate::store::StoreCoordinator;
use crate::types::{ObjectId, StoreGeneration};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// A unit of work over the object graph.
///
/// Confinement, not mutual exclusion, is the discipline: every public
/// operation must run on the thread that created the context and panics
/// otherwise (a programming error, not a recoverable condition). The change
/// set sits behind a mutex solely for the synchronous child-to-parent
/// hand-off a save performs.
pub struct Context {
    coordinator: Arc<StoreCoordinator>,
    /// `None` for root contexts; child contexts exclusively reference their
    /// parent and may outlive the thread that spawned them, but not the
    /// parent itself.
    parent: Option<Arc<Context>>,
    owner: ThreadId,
    /// Store generation at creation time. A reset bumps the coordinator's
    /// generation and strands this context.
    generation: StoreGeneration,
    changes: Mutex<ChangeSet>,
}

impl Context {
    pub(crate) fn root(coordinator: Arc<StoreCoordinator>) -> Arc<Self> {
        let generation = coordinator.generation();
        Arc::new(Self {
            coordinator,
            parent: None,
            owner: thread::current().id(),
            generation,
            changes: Mutex::new(ChangeSet::new()),
        })
    }

    /// Create a child context whose parent is the receiver, confined to the
    /// calling thread. Call this on the worker that will own the child; the
    /// parent may belong to a different thread.
    pub fn new_child_context(self: &Arc<Self>) -> Arc<Context> {
        Arc::new(Self {
            coordinator: Arc::clone(&self.coordinator),
            parent: Some(Arc::clone(self)),
            owner: thread::current().id(),
            generation: self.generation,
            changes: Mutex::new(ChangeSet::new()),
        })
    }

    /// Whether this context commits directly into the store coordinator.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn coordinator(&self) -> &Arc<StoreCoordinator> {
        &self.coordinator
    }

    /// Create a new object of the given entity and register it as a pending
    /// insert. The returned snapshot carries a temporary identity; set its
    /// attributes and record them with [`Context::update`].
    pub fn insert(&self, entity: &str) -> ObjectSnapshot {
        self.assert_confined();
        let snapshot = ObjectSnapshot::new(self.coordinator.allocate_id(), entity);
        self.changes.lock().record_insert(snapshot.clone());
        snapshot
    }

    /// Record the snapshot's current state as a pending change.
    pub fn update(&self, snapshot: &ObjectSnapshot) {
        self.assert_confined();
        self.changes.lock().record_update(snapshot.clone());
    }

    /// Mark an object deleted. Deleting a pending insert cancels it.
    pub fn delete(&self, snapshot: &ObjectSnapshot) {
        self.assert_confined();
        self.changes
            .lock()
            .record_delete(snapshot.id(), snapshot.entity());
    }

    /// Pure query used to short-circuit unnecessary saves.
    pub fn has_changes(&self) -> bool {
        self.assert_confined();
        !self.changes.lock().is_empty()
    }

    /// State of one object's pending change, if any, in this context alone.
    pub fn pending_change(&self, id: ObjectId) -> Option<PendingChange> {
        self.assert_confined();
        self.changes.lock().get(id).cloned()
    }

    /// Resolve one object by id through this context's view: a pending
    /// insert or update wins, a pending delete hides the object, and
    /// otherwise the parent chain (ending at the durable store) answers.
    pub fn get(&self, id: ObjectId) -> Result<Option<ObjectSnapshot>, FetchError> {
        self.assert_confined();
        Ok(self.resolve(id)?)
    }

    fn resolve(&self, id: ObjectId) -> Result<Option<ObjectSnapshot>, StoreError> {
        {
            let changes = self.changes.lock();
            match changes.get(id) {
                Some(PendingChange::Insert(s) | PendingChange::Update(s)) => {
                    return Ok(Some(s.clone()));
                }
                Some(PendingChange::Delete { .. }) => return Ok(None),
                None => {}
            }
        }
        match &self.parent {
            Some(parent) => parent.resolve(id),
            None => {
                if self.generation != self.coordinator.generation() {
                    return Err(StoreError::StaleContext);
                }
                self.coordinator.get_object(id)
            }
        }
    }

    /// Synchronous hand-off target for a child's save. Runs on the child's
    /// thread by design; the parent's change-set mutex is the serialization
    /// point.
    pub(crate) fn merge_from_child(&self, set: ChangeSet) {
        self.changes.lock().merge(set);
    }

    /// This context's current view of one entity: the parent chain's view
    /// (ending at the durable store) overlaid by the context's own
    /// uncommitted changes.
    pub(crate) fn view(&self, entity: &str) -> Result<Vec<ObjectSnapshot>, StoreError> {
        let base = match &self.parent {
            Some(parent) => parent.view(entity)?,
            None => {
                if self.generation != self.coordinator.generation() {
                    return Err(StoreError::StaleContext);
                }
                self.coordinator.scan_entity(entity)?
            }
        };
        Ok(self.changes.lock().overlay(entity, base))
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.generation != self.coordinator.generation()
    }

    pub(crate) fn assert_confined(&self) {
        let current = thread::current().id();
        if current != self.owner {
            panic!(
                "context confined to {:?} was accessed from {:?}; \
                 marshal the call onto the owning thread instead",
                self.owner, current
            );
        }
    }
}
