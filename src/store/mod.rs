//! Durable object store: location resolution, the store seam, and the
//! coordinator that owns the physical store.

pub mod coordinator;
pub mod persistence;

pub use coordinator::StoreCoordinator;
pub use persistence::SledObjectStore;

use crate::error::StoreError;
use crate::object::ObjectSnapshot;
use crate::types::{ObjectId, Revision};
use std::path::PathBuf;

/// Where the physical store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Explicit path to the store directory.
    Path(PathBuf),
    /// Default location derived from a database name: `<data dir>/<name>.store`.
    Named(String),
    /// Explicit file name placed verbatim under the default data directory.
    NamedFile(String),
    /// In-memory, discarded on drop. For tests and scratch work.
    Ephemeral,
}

impl StoreLocation {
    /// Resolve to a filesystem path; `None` means ephemeral.
    pub fn resolve(&self) -> Result<Option<PathBuf>, StoreError> {
        match self {
            StoreLocation::Path(path) => Ok(Some(path.clone())),
            StoreLocation::Named(name) => {
                let dir = default_dir(name)?;
                Ok(Some(dir.join(format!("{name}.store"))))
            }
            StoreLocation::NamedFile(file_name) => {
                let dir = default_dir(file_name)?;
                Ok(Some(dir.join(file_name)))
            }
            StoreLocation::Ephemeral => Ok(None),
        }
    }

    /// Stable human-readable description, also used to derive the store-error
    /// notification topic.
    pub fn describe(&self) -> String {
        match self {
            StoreLocation::Path(path) => path.display().to_string(),
            StoreLocation::Named(name) => format!("named:{name}"),
            StoreLocation::NamedFile(file_name) => format!("file:{file_name}"),
            StoreLocation::Ephemeral => "ephemeral".to_string(),
        }
    }
}

fn default_dir(hint: &str) -> Result<std::path::PathBuf, StoreError> {
    crate::config::default_store_dir().ok_or_else(|| StoreError::OpenFailed {
        path: hint.to_string(),
        cause: "no platform data directory available".to_string(),
    })
}

/// One atomic write transaction against the store.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    /// Inserted or updated snapshots, already marked durable.
    pub upserts: Vec<ObjectSnapshot>,
    /// Deleted objects as (entity, id) pairs.
    pub deletes: Vec<(String, ObjectId)>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    /// Largest object id touched by the batch, used to advance the persisted
    /// id high-water mark in the same transaction.
    pub fn max_object_id(&self) -> Option<u64> {
        self.upserts
            .iter()
            .map(|s| s.id().as_u64())
            .chain(self.deletes.iter().map(|(_, id)| id.as_u64()))
            .max()
    }
}

/// The storage seam the coordinator writes through.
///
/// `SledObjectStore` is the production implementation; tests inject doubles
/// here to exercise commit-failure paths.
pub trait ObjectStore: Send + Sync {
    /// Apply a batch as a single atomic transaction and return the new
    /// revision. A failed apply must leave the store unchanged.
    fn apply(&self, batch: &ChangeBatch) -> Result<Revision, StoreError>;

    /// All durable snapshots of one entity, in id order.
    fn scan_entity(&self, entity: &str) -> Result<Vec<ObjectSnapshot>, StoreError>;

    /// One durable snapshot by id, or `None` if no entity holds it.
    fn get(&self, id: ObjectId) -> Result<Option<ObjectSnapshot>, StoreError>;

    /// Current committed revision.
    fn revision(&self) -> Result<Revision, StoreError>;

    /// Highest object id ever committed, for seeding the id allocator.
    fn last_object_id(&self) -> Result<u64, StoreError>;

    /// Block until pending writes are on disk.
    fn flush(&self) -> Result<(), StoreError>;
}
