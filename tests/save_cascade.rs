//! Save-cascade semantics: merge visibility, no-op saves, and commit-failure
//! retry through a failing store double injected at the `ObjectStore` seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata::error::{SaveError, StoreError};
use strata::fetch::FetchRequest;
use strata::model::{EntityDescriptor, Model};
use strata::object::ObjectSnapshot;
use strata::store::{
    ChangeBatch, ObjectStore, SledObjectStore, StoreCoordinator, StoreLocation,
};
use strata::types::{ObjectId, Revision};

fn notes_model() -> Arc<Model> {
    Model::builder("Notes")
        .entity(EntityDescriptor::new("Note").required_attribute("title"))
        .build()
}

/// Store double that fails every `apply` while its switch is on, leaving the
/// wrapped store untouched.
struct FailingStore {
    inner: SledObjectStore,
    failing: AtomicBool,
}

impl FailingStore {
    fn new(model: &Model) -> Arc<Self> {
        Arc::new(Self {
            inner: SledObjectStore::open(&StoreLocation::Ephemeral, model).unwrap(),
            failing: AtomicBool::new(false),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ObjectStore for FailingStore {
    fn apply(&self, batch: &ChangeBatch) -> Result<Revision, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated disk failure".to_string()));
        }
        self.inner.apply(batch)
    }

    fn scan_entity(&self, entity: &str) -> Result<Vec<ObjectSnapshot>, StoreError> {
        self.inner.scan_entity(entity)
    }

    fn get(&self, id: ObjectId) -> Result<Option<ObjectSnapshot>, StoreError> {
        self.inner.get(id)
    }

    fn revision(&self) -> Result<Revision, StoreError> {
        self.inner.revision()
    }

    fn last_object_id(&self) -> Result<u64, StoreError> {
        self.inner.last_object_id()
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.inner.flush()
    }
}

fn add_note(context: &strata::context::Context, title: &str) {
    let mut note = context.insert("Note");
    note.set_attribute("title", title);
    context.update(&note);
}

/// A commit failure leaves the pending set unchanged; once the cause clears,
/// the identical save succeeds and the store ends up as if the failure never
/// happened.
#[test]
fn commit_failure_allows_idempotent_retry() {
    let model = notes_model();
    let store = FailingStore::new(&model);
    let coordinator = StoreCoordinator::with_store(
        Arc::clone(&model),
        StoreLocation::Ephemeral,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
    );
    let context = coordinator.create_root_context();

    add_note(&context, "survivor");
    store.set_failing(true);

    assert!(matches!(context.save(), Err(SaveError::Commit(_))));
    assert!(context.has_changes());
    assert_eq!(coordinator.revision().unwrap(), 0);

    store.set_failing(false);
    context.save().unwrap();
    assert!(!context.has_changes());

    let rows = context.fetch(&FetchRequest::new("Note")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(coordinator.revision().unwrap(), 1);
}

/// A failed commit from one root does not block a subsequent commit from
/// another root over the same coordinator.
#[test]
fn failed_commit_does_not_block_other_contexts() {
    let model = notes_model();
    let store = FailingStore::new(&model);
    let coordinator = StoreCoordinator::with_store(
        Arc::clone(&model),
        StoreLocation::Ephemeral,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
    );

    let unlucky = coordinator.create_root_context();
    add_note(&unlucky, "unlucky");
    store.set_failing(true);
    assert!(unlucky.save().is_err());
    store.set_failing(false);

    let lucky = coordinator.create_root_context();
    add_note(&lucky, "lucky");
    lucky.save().unwrap();
    assert_eq!(coordinator.revision().unwrap(), 1);
}

/// Inserts, updates, and deletes saved on a child are reflected exactly in
/// the parent's subsequent fetch, without a parent save.
#[test]
fn child_save_merges_into_parent_view() {
    let coordinator = StoreCoordinator::new(notes_model(), StoreLocation::Ephemeral);
    let parent = coordinator.create_root_context();

    // Durable baseline: two notes.
    add_note(&parent, "keep");
    add_note(&parent, "doomed");
    parent.save().unwrap();
    let baseline = parent.fetch(&FetchRequest::new("Note")).unwrap();
    let doomed = baseline
        .iter()
        .find(|n| n.attribute("title") == Some(&"doomed".into()))
        .unwrap()
        .clone();
    let kept = baseline
        .iter()
        .find(|n| n.attribute("title") == Some(&"keep".into()))
        .unwrap()
        .clone();

    let child = parent.new_child_context();
    child.delete(&doomed);
    let mut renamed = kept.clone();
    renamed.set_attribute("title", "kept and renamed");
    child.update(&renamed);
    add_note(&child, "brand new");
    child.save().unwrap();

    let rows = parent.fetch(&FetchRequest::new("Note")).unwrap();
    let titles: Vec<_> = rows
        .iter()
        .filter_map(|n| match n.attribute("title") {
            Some(strata::types::AttributeValue::Text(t)) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(titles, vec!["kept and renamed", "brand new"]);
}

/// A no-op save does not invoke the store at all.
#[test]
fn saving_without_changes_leaves_revision_alone() {
    let coordinator = StoreCoordinator::new(notes_model(), StoreLocation::Ephemeral);
    let context = coordinator.create_root_context();

    add_note(&context, "once");
    context.save().unwrap();
    assert_eq!(coordinator.revision().unwrap(), 1);

    context.save().unwrap();
    context.save().unwrap();
    assert_eq!(coordinator.revision().unwrap(), 1);
}

/// Grandchild saves hop exactly one level per save.
#[test]
fn cascade_moves_one_level_per_save() {
    let coordinator = StoreCoordinator::new(notes_model(), StoreLocation::Ephemeral);
    let root = coordinator.create_root_context();
    let child = root.new_child_context();
    let grandchild = child.new_child_context();

    add_note(&grandchild, "deep");
    grandchild.save().unwrap();
    assert!(child.has_changes());
    assert!(!root.has_changes());

    child.save().unwrap();
    assert!(root.has_changes());
    assert_eq!(coordinator.revision().unwrap(), 0);

    root.save().unwrap();
    assert_eq!(coordinator.revision().unwrap(), 1);
    assert_eq!(root.fetch(&FetchRequest::new("Note")).unwrap().len(), 1);
}
