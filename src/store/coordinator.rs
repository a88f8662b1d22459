//! Store Coordinator: the single owner of the durable store.
//!
//! Exactly one coordinator writes to a given physical location at a time. It
//! mediates every physical read and write, serializes commits through an
//! internal lock, allocates object identities, and owns the store-error
//! notification hub for its location.

use crate::context::Context;
use crate::error::StoreError;
use crate::model::Model;
use crate::notify::{
    self, NotificationHub, StoreErrorKind, StoreErrorNotification,
};
use crate::object::ObjectSnapshot;
use crate::store::{ChangeBatch, ObjectStore, SledObjectStore, StoreLocation};
use crate::types::{ObjectId, Revision, StoreGeneration};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

enum StoreState {
    Ready(Arc<dyn ObjectStore>),
    Degraded { kind: StoreErrorKind, cause: String },
}

/// Owner of one durable store bound to one model.
///
/// Construction never fails synchronously: when the physical store cannot be
/// opened the coordinator retains a degraded state and broadcasts the failure
/// the first time any operation touches it, so callers already holding a
/// reference are not torn down mid-construction.
pub struct StoreCoordinator {
    model: Arc<Model>,
    location: StoreLocation,
    topic: String,
    hub: Arc<NotificationHub>,
    state: RwLock<StoreState>,
    /// Serializes write transactions; one commit at a time per store.
    commit_lock: Mutex<()>,
    next_id: AtomicU64,
    generation: AtomicU64,
    open_failure_announced: AtomicBool,
}

impl StoreCoordinator {
    /// Build a coordinator for a model and location.
    pub fn new(model: Arc<Model>, location: StoreLocation) -> Arc<Self> {
        let topic = notify::store_error_topic(&location.describe());
        let hub = notify::register_hub(&topic);

        let (state, next_id) = match SledObjectStore::open(&location, &model) {
            Ok(store) => match store.last_object_id() {
                Ok(last) => {
                    info!(location = %location.describe(), "store opened");
                    (
                        StoreState::Ready(Arc::new(store) as Arc<dyn ObjectStore>),
                        last + 1,
                    )
                }
                Err(e) => {
                    warn!(location = %location.describe(), error = %e, "store unreadable after open");
                    (
                        StoreState::Degraded {
                            kind: StoreErrorKind::OpenFailed,
                            cause: e.to_string(),
                        },
                        1,
                    )
                }
            },
            Err(e) => {
                let kind = match e {
                    StoreError::SchemaMismatch { .. } => StoreErrorKind::MigrationFailed,
                    _ => StoreErrorKind::OpenFailed,
                };
                warn!(location = %location.describe(), error = %e, "store open failed; coordinator degraded");
                (
                    StoreState::Degraded {
                        kind,
                        cause: e.to_string(),
                    },
                    1,
                )
            }
        };

        Arc::new(Self {
            model,
            location,
            topic,
            hub,
            state: RwLock::new(state),
            commit_lock: Mutex::new(()),
            next_id: AtomicU64::new(next_id),
            generation: AtomicU64::new(0),
            open_failure_announced: AtomicBool::new(false),
        })
    }

    /// Build a coordinator over an already-open store. Seam for tests that
    /// inject failing store doubles.
    pub fn with_store(
        model: Arc<Model>,
        location: StoreLocation,
        store: Arc<dyn ObjectStore>,
    ) -> Arc<Self> {
        let topic = notify::store_error_topic(&location.describe());
        let hub = notify::register_hub(&topic);
        let next_id = store.last_object_id().unwrap_or(0) + 1;

        Arc::new(Self {
            model,
            location,
            topic,
            hub,
            state: RwLock::new(StoreState::Ready(store)),
            commit_lock: Mutex::new(()),
            next_id: AtomicU64::new(next_id),
            generation: AtomicU64::new(0),
            open_failure_announced: AtomicBool::new(false),
        })
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Well-known topic this coordinator broadcasts store errors under.
    pub fn store_error_topic(&self) -> &str {
        &self.topic
    }

    /// Subscribe to store-error notifications from this coordinator.
    pub fn subscribe_errors(&self) -> std::sync::mpsc::Receiver<StoreErrorNotification> {
        self.hub.subscribe()
    }

    /// Current store generation; bumped by every reset.
    pub fn generation(&self) -> StoreGeneration {
        self.generation.load(Ordering::Acquire)
    }

    /// Create a context bound directly to this coordinator, confined to the
    /// calling thread. Used once for the main context and on demand for
    /// independent background roots.
    pub fn create_root_context(self: &Arc<Self>) -> Arc<Context> {
        Context::root(Arc::clone(self))
    }

    /// Destroy the physical store and recreate an empty one under the same
    /// model. Invalidates all outstanding object identities: contexts created
    /// before the reset become stale and must be discarded.
    ///
    /// Failures are broadcast on the notification channel, not returned, to
    /// keep the signature uniform with other store-level failures.
    pub fn reset_store(&self) {
        let _serialized = self.commit_lock.lock();
        let mut state = self.state.write();

        // Release the current handle first so sled drops its file lock.
        *state = StoreState::Degraded {
            kind: StoreErrorKind::ResetFailed,
            cause: "reset in progress".to_string(),
        };

        let reopened = SledObjectStore::destroy(&self.location)
            .and_then(|()| SledObjectStore::open(&self.location, &self.model));
        match reopened {
            Ok(store) => {
                *state = StoreState::Ready(Arc::new(store));
                self.generation.fetch_add(1, Ordering::AcqRel);
                self.open_failure_announced.store(false, Ordering::Release);
                info!(location = %self.location.describe(), "store reset");
            }
            Err(e) => {
                let cause = e.to_string();
                *state = StoreState::Degraded {
                    kind: StoreErrorKind::ResetFailed,
                    cause: cause.clone(),
                };
                warn!(location = %self.location.describe(), error = %cause, "store reset failed");
                self.hub
                    .broadcast(&StoreErrorNotification::now(StoreErrorKind::ResetFailed, cause));
                // Already announced; ready_store must not repeat it.
                self.open_failure_announced.store(true, Ordering::Release);
            }
        }
    }

    /// Allocate a fresh object identity.
    pub(crate) fn allocate_id(&self) -> ObjectId {
        ObjectId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Commit a batch as one atomic transaction. Writers are serialized; a
    /// failed commit does not block subsequent commits.
    pub(crate) fn commit(&self, batch: &ChangeBatch) -> Result<Revision, StoreError> {
        let _serialized = self.commit_lock.lock();
        let store = self.ready_store()?;
        let revision = store.apply(batch)?;
        debug!(
            revision,
            upserts = batch.upserts.len(),
            deletes = batch.deletes.len(),
            "committed batch"
        );
        Ok(revision)
    }

    pub(crate) fn scan_entity(&self, entity: &str) -> Result<Vec<ObjectSnapshot>, StoreError> {
        self.ready_store()?.scan_entity(entity)
    }

    pub(crate) fn get_object(&self, id: ObjectId) -> Result<Option<ObjectSnapshot>, StoreError> {
        self.ready_store()?.get(id)
    }

    /// Current committed store revision.
    pub fn revision(&self) -> Result<Revision, StoreError> {
        self.ready_store()?.revision()
    }

    /// Resolve the live store handle, announcing a retained open failure on
    /// the first operation attempted against a degraded coordinator.
    fn ready_store(&self) -> Result<Arc<dyn ObjectStore>, StoreError> {
        let state = self.state.read();
        match &*state {
            StoreState::Ready(store) => Ok(Arc::clone(store)),
            StoreState::Degraded { kind, cause } => {
                if !self.open_failure_announced.swap(true, Ordering::AcqRel) {
                    self.hub
                        .broadcast(&StoreErrorNotification::now(*kind, cause.clone()));
                }
                Err(StoreError::Unavailable(cause.clone()))
            }
        }
    }
}

impl Drop for StoreCoordinator {
    fn drop(&mut self) {
        notify::deregister_hub(&self.topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityDescriptor;
    use tempfile::TempDir;

    fn test_model() -> Arc<Model> {
        Model::builder("Notes")
            .entity(EntityDescriptor::new("Note").required_attribute("title"))
            .build()
    }

    fn note(coordinator: &StoreCoordinator, title: &str) -> ObjectSnapshot {
        let mut snap = ObjectSnapshot::new(coordinator.allocate_id(), "Note");
        snap.set_attribute("title", title);
        snap
    }

    #[test]
    fn commit_bumps_revision_and_scan_sees_rows() {
        let coordinator = StoreCoordinator::new(test_model(), StoreLocation::Ephemeral);
        assert_eq!(coordinator.revision().unwrap(), 0);

        let batch = ChangeBatch {
            upserts: vec![note(&coordinator, "hello")],
            deletes: vec![],
        };
        assert_eq!(coordinator.commit(&batch).unwrap(), 1);
        assert_eq!(coordinator.scan_entity("Note").unwrap().len(), 1);
    }

    #[test]
    fn degraded_coordinator_announces_open_failure_once() {
        // A regular file where sled expects a directory makes open fail.
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"not a store").unwrap();

        let coordinator = StoreCoordinator::new(test_model(), StoreLocation::Path(blocker));
        let errors = coordinator.subscribe_errors();

        assert!(matches!(
            coordinator.revision(),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            coordinator.revision(),
            Err(StoreError::Unavailable(_))
        ));

        let first = errors.try_recv().unwrap();
        assert_eq!(first.kind, StoreErrorKind::OpenFailed);
        // Announced once, not per operation.
        assert!(errors.try_recv().is_err());
    }

    #[test]
    fn schema_mismatch_degrades_as_migration_failure() {
        let dir = TempDir::new().unwrap();
        let location = StoreLocation::Path(dir.path().join("notes.store"));
        drop(StoreCoordinator::new(test_model(), location.clone()));

        let other = Model::builder("Notes")
            .entity(EntityDescriptor::new("Note").required_attribute("headline"))
            .build();
        let coordinator = StoreCoordinator::new(other, location);
        let errors = coordinator.subscribe_errors();

        assert!(coordinator.revision().is_err());
        assert_eq!(errors.try_recv().unwrap().kind, StoreErrorKind::MigrationFailed);
    }

    #[test]
    fn reset_clears_rows_and_bumps_generation() {
        let coordinator = StoreCoordinator::new(test_model(), StoreLocation::Ephemeral);
        coordinator
            .commit(&ChangeBatch {
                upserts: vec![note(&coordinator, "doomed")],
                deletes: vec![],
            })
            .unwrap();

        let before = coordinator.generation();
        coordinator.reset_store();
        assert_eq!(coordinator.generation(), before + 1);
        assert!(coordinator.scan_entity("Note").unwrap().is_empty());
        assert_eq!(coordinator.revision().unwrap(), 0);
    }

    #[test]
    fn failed_reset_degrades_and_broadcasts() {
        // A regular file at the store location makes the destroy step fail.
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"not a store").unwrap();

        let model = test_model();
        let store = SledObjectStore::open(&StoreLocation::Ephemeral, &model).unwrap();
        let coordinator = StoreCoordinator::with_store(
            model,
            StoreLocation::Path(blocker),
            Arc::new(store),
        );
        let errors = coordinator.subscribe_errors();
        let generation = coordinator.generation();

        coordinator.reset_store();

        assert_eq!(errors.try_recv().unwrap().kind, StoreErrorKind::ResetFailed);
        assert_eq!(coordinator.generation(), generation);
        assert!(matches!(
            coordinator.revision(),
            Err(StoreError::Unavailable(_))
        ));
        // The reset itself announced the failure; operations do not repeat it.
        assert!(errors.try_recv().is_err());
    }

    #[test]
    fn id_allocation_resumes_past_persisted_high_water_mark() {
        let dir = TempDir::new().unwrap();
        let location = StoreLocation::Path(dir.path().join("notes.store"));
        let model = test_model();

        let highest = {
            let coordinator = StoreCoordinator::new(Arc::clone(&model), location.clone());
            let snap = note(&coordinator, "persisted");
            let id = snap.id();
            coordinator
                .commit(&ChangeBatch {
                    upserts: vec![snap],
                    deletes: vec![],
                })
                .unwrap();
            id
        };

        let reopened = StoreCoordinator::new(model, location);
        assert!(reopened.allocate_id() > highest);
    }
}
