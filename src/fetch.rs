//! Fetch execution against a context's view.
//!
//! The fetch specification is an external descriptor consumed through the
//! narrow [`FetchSpec`] trait: entity, predicate, ordering, limit. The
//! executor evaluates it against the context's current view, the durable
//! store's contents as overlaid by the context's own uncommitted changes,
//! so unsaved work is visible to the context that did it and invisible to
//! siblings and parents.

use crate::context::Context;
use crate::error::FetchError;
use crate::object::ObjectSnapshot;
use std::cmp::Ordering;

/// Opaque query descriptor satisfied by the external query layer.
///
/// Defaults make the minimal implementation "everything of one entity, in id
/// order, unlimited".
pub trait FetchSpec {
    /// Entity the fetch targets.
    fn entity(&self) -> &str;

    /// Predicate applied to each candidate row.
    fn matches(&self, _object: &ObjectSnapshot) -> bool {
        true
    }

    /// Ordering of the result sequence.
    fn compare(&self, a: &ObjectSnapshot, b: &ObjectSnapshot) -> Ordering {
        a.id().cmp(&b.id())
    }

    /// Maximum number of rows to return.
    fn limit(&self) -> Option<usize> {
        None
    }
}

/// Concrete [`FetchSpec`] with a fluent builder surface.
///
/// # Example
/// ```rust
/// use strata::fetch::FetchRequest;
///
/// let spec = FetchRequest::new("Note")
///     .filtered(|note| note.attribute("title").is_some())
///     .sorted_by("title")
///     .limited(20);
/// ```
pub struct FetchRequest {
    entity: String,
    predicate: Option<Box<dyn Fn(&ObjectSnapshot) -> bool + Send + Sync>>,
    sort_by: Option<String>,
    descending: bool,
    limit: Option<usize>,
}

impl FetchRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: None,
            sort_by: None,
            descending: false,
            limit: None,
        }
    }

    /// Keep only rows the predicate accepts.
    pub fn filtered(
        mut self,
        predicate: impl Fn(&ObjectSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Sort by an attribute, ascending. Rows missing the attribute sort
    /// first.
    pub fn sorted_by(mut self, attribute: impl Into<String>) -> Self {
        self.sort_by = Some(attribute.into());
        self
    }

    /// Reverse the sort direction.
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Cap the result count.
    pub fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl FetchSpec for FetchRequest {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn matches(&self, object: &ObjectSnapshot) -> bool {
        self.predicate.as_ref().map(|p| p(object)).unwrap_or(true)
    }

    fn compare(&self, a: &ObjectSnapshot, b: &ObjectSnapshot) -> Ordering {
        let ordering = match &self.sort_by {
            Some(attribute) => {
                use crate::types::AttributeValue;
                let null = AttributeValue::Null;
                let left = a.attribute(attribute).unwrap_or(&null);
                let right = b.attribute(attribute).unwrap_or(&null);
                left.order(right).then_with(|| a.id().cmp(&b.id()))
            }
            None => a.id().cmp(&b.id()),
        };
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }

    fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl Context {
    /// Run a fetch specification against this context's current view and
    /// return the matching objects in the specification's order.
    ///
    /// On underlying store failure the error is returned and no rows are:
    /// partial results would silently break the consistent-view guarantee.
    pub fn fetch<S: FetchSpec + ?Sized>(
        &self,
        spec: &S,
    ) -> Result<Vec<ObjectSnapshot>, FetchError> {
        self.assert_confined();
        let mut rows = self.view(spec.entity())?;
        rows.retain(|object| spec.matches(object));
        rows.sort_by(|a, b| spec.compare(a, b));
        if let Some(limit) = spec.limit() {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}
