//! The persistence stack façade.
//!
//! One `PersistenceStack` wires a model, a store coordinator, and the
//! singleton main context together. The main context is confined to the
//! thread that constructs the stack (conventionally the interactive thread);
//! background work goes through private contexts or children of them.

use crate::config::StackConfig;
use crate::context::Context;
use crate::error::{FetchError, SaveError};
use crate::fetch::FetchSpec;
use crate::model::Model;
use crate::notify::StoreErrorNotification;
use crate::object::ObjectSnapshot;
use crate::store::{StoreCoordinator, StoreLocation};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::info;

/// Façade over coordinator + main context.
pub struct PersistenceStack {
    coordinator: Arc<StoreCoordinator>,
    /// Swappable so [`PersistenceStack::zap_all_data`] can discard and
    /// recreate the main context.
    main: RwLock<Arc<Context>>,
}

impl PersistenceStack {
    /// General constructor: model plus explicit store location. The three
    /// convenience constructors below all funnel through here.
    pub fn new(model: Arc<Model>, location: StoreLocation) -> Self {
        let coordinator = StoreCoordinator::new(model, location);
        let main = coordinator.create_root_context();
        Self {
            coordinator,
            main: RwLock::new(main),
        }
    }

    /// Stack with the default store location derived from the model name.
    pub fn with_model(model: Arc<Model>) -> Self {
        let name = model.name().to_string();
        Self::new(model, StoreLocation::Named(name))
    }

    /// Stack with an explicit store path.
    pub fn with_model_at(model: Arc<Model>, path: impl Into<PathBuf>) -> Self {
        Self::new(model, StoreLocation::Path(path.into()))
    }

    /// Stack with an explicit store file name under the default directory.
    pub fn with_model_file(model: Arc<Model>, file_name: impl Into<String>) -> Self {
        Self::new(model, StoreLocation::NamedFile(file_name.into()))
    }

    /// Stack configured from a [`StackConfig`], honouring its store
    /// directory override.
    pub fn with_config(model: Arc<Model>, config: &StackConfig) -> Self {
        let location = match &config.store_dir {
            Some(dir) => StoreLocation::Path(dir.join(format!("{}.store", model.name()))),
            None => StoreLocation::Named(model.name().to_string()),
        };
        Self::new(model, location)
    }

    pub fn coordinator(&self) -> &Arc<StoreCoordinator> {
        &self.coordinator
    }

    /// The singleton main context, confined to the thread that built the
    /// stack.
    pub fn main_context(&self) -> Arc<Context> {
        Arc::clone(&self.main.read())
    }

    /// A new independent root context for background work, confined to the
    /// calling thread. For isolation nested under an existing context, use
    /// [`Context::new_child_context`] instead.
    pub fn new_private_context(&self) -> Arc<Context> {
        self.coordinator.create_root_context()
    }

    /// Save the main context. Must run on the stack's constructing thread;
    /// this may block on disk I/O, so interactive callers that cannot
    /// tolerate that should cascade through a private context instead.
    pub fn save_main(&self) -> Result<(), SaveError> {
        self.main_context().save()
    }

    /// Run a fetch against the main context's view.
    pub fn fetch_in_main<S: FetchSpec + ?Sized>(
        &self,
        spec: &S,
    ) -> Result<Vec<ObjectSnapshot>, FetchError> {
        self.main_context().fetch(spec)
    }

    /// Well-known topic under which this stack's store errors are broadcast.
    pub fn store_error_topic(&self) -> &str {
        self.coordinator.store_error_topic()
    }

    /// Subscribe to store-error notifications.
    pub fn subscribe_store_errors(&self) -> Receiver<StoreErrorNotification> {
        self.coordinator.subscribe_errors()
    }

    /// Destroy all persisted data and recreate an empty store, then discard
    /// and recreate the main context. Destructive and unrecoverable: every
    /// object reference and context obtained before the call is invalid
    /// afterwards and must be refetched. Intended for test fixtures and
    /// wipe-and-start-fresh flows.
    pub fn zap_all_data(&self) {
        self.coordinator.reset_store();
        let fresh = self.coordinator.create_root_context();
        *self.main.write() = fresh;
        info!("all data zapped; main context recreated");
    }
}
