//! Sled-backed implementation of the object store.
//!
//! Layout: snapshots live under `obj/<entity>/<id>` with bincode-encoded
//! values; `meta/revision`, `meta/last_id`, and `meta/schema` track the
//! commit counter, the id high-water mark, and the model fingerprint. Every
//! commit is staged into one `sled::Batch` so the revision bump and the data
//! land atomically.

use crate::error::StoreError;
use crate::model::Model;
use crate::object::ObjectSnapshot;
use crate::store::{ChangeBatch, ObjectStore, StoreLocation};
use crate::types::{ObjectId, Revision};

const META_REVISION: &[u8] = b"meta/revision";
const META_LAST_ID: &[u8] = b"meta/last_id";
const META_SCHEMA: &[u8] = b"meta/schema";

/// Sled-based [`ObjectStore`].
#[derive(Debug)]
pub struct SledObjectStore {
    db: sled::Db,
}

fn object_key(entity: &str, id: ObjectId) -> Vec<u8> {
    // Zero-padded ids keep sled's lexicographic prefix scan in id order.
    format!("obj/{entity}/{:020}", id.as_u64()).into_bytes()
}

fn entity_prefix(entity: &str) -> Vec<u8> {
    format!("obj/{entity}/").into_bytes()
}

fn decode_u64(value: Option<sled::IVec>) -> u64 {
    value
        .as_deref()
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0)
}

impl SledObjectStore {
    /// Open (or create) the store for a location and verify that its on-disk
    /// schema matches the model.
    ///
    /// A fresh store records the model fingerprint; an existing store with a
    /// different fingerprint fails with [`StoreError::SchemaMismatch`], the
    /// "incompatible on-disk schema" open failure.
    pub fn open(location: &StoreLocation, model: &Model) -> Result<Self, StoreError> {
        let db = match location.resolve()? {
            Some(path) => sled::open(&path).map_err(|e| StoreError::OpenFailed {
                path: path.display().to_string(),
                cause: e.to_string(),
            })?,
            None => sled::Config::new()
                .temporary(true)
                .open()
                .map_err(|e| StoreError::OpenFailed {
                    path: location.describe(),
                    cause: e.to_string(),
                })?,
        };

        let store = Self { db };
        store.check_schema(model)?;
        Ok(store)
    }

    /// Remove the physical store files. The store handle must already be
    /// dropped so sled releases its file lock.
    pub fn destroy(location: &StoreLocation) -> Result<(), StoreError> {
        if let Some(path) = location.resolve()? {
            if path.exists() {
                std::fs::remove_dir_all(&path)?;
            }
        }
        Ok(())
    }

    fn check_schema(&self, model: &Model) -> Result<(), StoreError> {
        let fingerprint = model.fingerprint()?;
        match self.db.get(META_SCHEMA)? {
            Some(existing) if existing.as_ref() != fingerprint.as_slice() => {
                Err(StoreError::SchemaMismatch {
                    model: model.name().to_string(),
                })
            }
            Some(_) => Ok(()),
            None => {
                self.db.insert(META_SCHEMA, fingerprint)?;
                Ok(())
            }
        }
    }
}

impl ObjectStore for SledObjectStore {
    fn apply(&self, batch: &ChangeBatch) -> Result<Revision, StoreError> {
        let revision = self.revision()? + 1;
        let last_id = self
            .last_object_id()?
            .max(batch.max_object_id().unwrap_or(0));

        let mut staged = sled::Batch::default();
        for snapshot in &batch.upserts {
            let value = bincode::serialize(snapshot).map_err(|e| StoreError::Corrupt {
                entity: snapshot.entity().to_string(),
                cause: e.to_string(),
            })?;
            staged.insert(object_key(snapshot.entity(), snapshot.id()), value);
        }
        for (entity, id) in &batch.deletes {
            staged.remove(object_key(entity, *id));
        }
        staged.insert(META_REVISION, &revision.to_be_bytes()[..]);
        staged.insert(META_LAST_ID, &last_id.to_be_bytes()[..]);

        self.db.apply_batch(staged)?;
        self.flush()?;
        Ok(revision)
    }

    fn scan_entity(&self, entity: &str) -> Result<Vec<ObjectSnapshot>, StoreError> {
        let mut snapshots = Vec::new();
        for item in self.db.scan_prefix(entity_prefix(entity)) {
            let (_, value) = item?;
            let snapshot: ObjectSnapshot =
                bincode::deserialize(&value).map_err(|e| StoreError::Corrupt {
                    entity: entity.to_string(),
                    cause: e.to_string(),
                })?;
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    fn get(&self, id: ObjectId) -> Result<Option<ObjectSnapshot>, StoreError> {
        // Ids are globally unique, so the first key carrying this id suffix
        // is the object regardless of entity.
        let suffix = format!("/{:020}", id.as_u64()).into_bytes();
        for item in self.db.scan_prefix(b"obj/") {
            let (key, value) = item?;
            if !key.ends_with(&suffix) {
                continue;
            }
            let snapshot: ObjectSnapshot =
                bincode::deserialize(&value).map_err(|e| StoreError::Corrupt {
                    entity: String::from_utf8_lossy(&key).into_owned(),
                    cause: e.to_string(),
                })?;
            return Ok(Some(snapshot));
        }
        Ok(None)
    }

    fn revision(&self) -> Result<Revision, StoreError> {
        Ok(decode_u64(self.db.get(META_REVISION)?))
    }

    fn last_object_id(&self) -> Result<u64, StoreError> {
        Ok(decode_u64(self.db.get(META_LAST_ID)?))
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
