//! Model Handle: the immutable schema description shared by all contexts.
//!
//! The model is an external collaborator with a narrow surface: this crate
//! only requires that it be built once, shared behind an `Arc`, and safe for
//! concurrent read. The fluent builder stands in for whatever schema provider
//! a host application uses.

use crate::error::{StoreError, ValidationError};
use crate::object::ObjectSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Attribute schema: name plus whether a saved object must carry a non-null
/// value for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub required: bool,
}

/// Relationship schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub name: String,
    /// Entity name on the far side.
    pub destination: String,
    /// To-many relationships accept any number of targets; to-one accepts at
    /// most one.
    pub to_many: bool,
    pub required: bool,
}

/// Schema for one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDescriptor {
    name: String,
    attributes: BTreeMap<String, AttributeDescriptor>,
    relationships: BTreeMap<String, RelationshipDescriptor>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an attribute that saved objects must carry.
    pub fn required_attribute(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.attributes.insert(
            name.clone(),
            AttributeDescriptor { name, required: true },
        );
        self
    }

    /// Add an attribute that may be absent or null.
    pub fn optional_attribute(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.attributes.insert(
            name.clone(),
            AttributeDescriptor { name, required: false },
        );
        self
    }

    /// Add a to-one relationship.
    pub fn to_one(
        mut self,
        name: impl Into<String>,
        destination: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.relationships.insert(
            name.clone(),
            RelationshipDescriptor {
                name,
                destination: destination.into(),
                to_many: false,
                required,
            },
        );
        self
    }

    /// Add a to-many relationship.
    pub fn to_many(
        mut self,
        name: impl Into<String>,
        destination: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.relationships.insert(
            name.clone(),
            RelationshipDescriptor {
                name,
                destination: destination.into(),
                to_many: true,
                required,
            },
        );
        self
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipDescriptor> {
        self.relationships.values()
    }
}

/// The immutable Model Handle. Loaded once at stack construction and shared
/// by every coordinator and context; never mutated after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    name: String,
    entities: BTreeMap<String, EntityDescriptor>,
}

impl Model {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            entities: Vec::new(),
        }
    }

    /// The model name; also used to derive the default store location.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(name)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Stable fingerprint of the schema, recorded in the store on first open
    /// and compared on every subsequent open. A mismatch is the
    /// "incompatible on-disk schema" open failure.
    ///
    /// An encode failure is an error, never an empty fingerprint: two broken
    /// fingerprints must not pass the compatibility check against each other.
    pub fn fingerprint(&self) -> Result<Vec<u8>, StoreError> {
        // BTreeMap ordering makes the encoding canonical.
        bincode::serialize(self).map_err(|e| {
            StoreError::Backend(format!("model '{}' fingerprint encoding: {e}", self.name))
        })
    }

    /// Validate one pending snapshot against the schema.
    pub fn validate(&self, snapshot: &ObjectSnapshot) -> Result<(), ValidationError> {
        let entity = self
            .entities
            .get(snapshot.entity())
            .ok_or_else(|| ValidationError::UnknownEntity(snapshot.entity().to_string()))?;

        for name in snapshot.attributes.keys() {
            if !entity.attributes.contains_key(name) {
                return Err(ValidationError::UnknownAttribute {
                    entity: entity.name.clone(),
                    attribute: name.clone(),
                });
            }
        }
        for descriptor in entity.attributes.values() {
            if descriptor.required {
                let present = snapshot
                    .attribute(&descriptor.name)
                    .map(|v| !v.is_null())
                    .unwrap_or(false);
                if !present {
                    return Err(ValidationError::MissingRequiredAttribute {
                        entity: entity.name.clone(),
                        attribute: descriptor.name.clone(),
                    });
                }
            }
        }

        for name in snapshot.relations.keys() {
            if !entity.relationships.contains_key(name) {
                return Err(ValidationError::UnknownRelationship {
                    entity: entity.name.clone(),
                    relationship: name.clone(),
                });
            }
        }
        for descriptor in entity.relationships.values() {
            let targets = snapshot.relation(&descriptor.name);
            if descriptor.required && targets.is_empty() {
                return Err(ValidationError::MissingRequiredRelationship {
                    entity: entity.name.clone(),
                    relationship: descriptor.name.clone(),
                });
            }
            if !descriptor.to_many && targets.len() > 1 {
                return Err(ValidationError::CardinalityViolation {
                    entity: entity.name.clone(),
                    relationship: descriptor.name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Builder for constructing a [`Model`] with a fluent API.
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    entities: Vec<EntityDescriptor>,
}

impl ModelBuilder {
    pub fn entity(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities.push(descriptor);
        self
    }

    pub fn build(self) -> Arc<Model> {
        Arc::new(Model {
            name: self.name,
            entities: self
                .entities
                .into_iter()
                .map(|e| (e.name.clone(), e))
                .collect(),
        })
    }
}
