//! Error types for the strata persistence stack.
//!
//! Store-wide failures (open, migrate, reset) are broadcast through the
//! notification channel in [`crate::notify`]; everything here travels
//! synchronously back to the immediate caller as a `Result`.

use thiserror::Error;

/// Storage-level errors: opening, reading, and writing the physical store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store at {path}: {cause}")]
    OpenFailed { path: String, cause: String },

    #[error("on-disk schema does not match model '{model}'")]
    SchemaMismatch { model: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("corrupt record in entity '{entity}': {cause}")]
    Corrupt { entity: String, cause: String },

    #[error("store is unavailable: {0}")]
    Unavailable(String),

    #[error("context is stale: the store was reset after it was created")]
    StaleContext,

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => StoreError::Io(io),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Schema violations detected when validating pending changes at save time.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("entity '{entity}' has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("required attribute '{attribute}' of entity '{entity}' is missing or null")]
    MissingRequiredAttribute { entity: String, attribute: String },

    #[error("entity '{entity}' has no relationship '{relationship}'")]
    UnknownRelationship { entity: String, relationship: String },

    #[error("required relationship '{relationship}' of entity '{entity}' has no targets")]
    MissingRequiredRelationship { entity: String, relationship: String },

    #[error("to-one relationship '{relationship}' of entity '{entity}' has multiple targets")]
    CardinalityViolation { entity: String, relationship: String },
}

/// Errors returned by [`crate::context::Context::save`].
///
/// Both variants leave the context's pending change set intact so the caller
/// can correct the cause and retry the exact same save.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("commit failed: {0}")]
    Commit(#[from] StoreError),
}

/// Errors returned by [`crate::context::Context::fetch`].
///
/// A failed fetch never returns partial rows.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Store(#[from] StoreError),
}
