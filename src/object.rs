//! Persistent object snapshots.

use crate::types::{AttributeValue, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A managed entity instance as seen by one context.
///
/// Snapshots are plain values: mutating one changes nothing until it is
/// recorded in a context with [`crate::context::Context::update`] and later
/// saved. A snapshot is associated with the context that produced it and must
/// only be used from that context's owning thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    id: ObjectId,
    entity: String,
    /// Attribute values keyed by attribute name. BTreeMap keeps encoding and
    /// comparison deterministic.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Relationship targets keyed by relationship name.
    pub relations: BTreeMap<String, Vec<ObjectId>>,
    durable: bool,
}

impl ObjectSnapshot {
    pub(crate) fn new(id: ObjectId, entity: &str) -> Self {
        Self {
            id,
            entity: entity.to_string(),
            attributes: BTreeMap::new(),
            relations: BTreeMap::new(),
            durable: false,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Whether this snapshot has reached the durable store. False for objects
    /// inserted but not yet committed through a root context.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub(crate) fn mark_durable(&mut self) {
        self.durable = true;
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Set an attribute value, replacing any previous value.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) -> &mut Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn relation(&self, name: &str) -> &[ObjectId] {
        self.relations.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the target set of a relationship.
    pub fn set_relation(&mut self, name: &str, targets: Vec<ObjectId>) -> &mut Self {
        self.relations.insert(name.to_string(), targets);
        self
    }
}
