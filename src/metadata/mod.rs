// ============================================================================
// Store Metadata
// ============================================================================
//
// Describes which object types a store manages, which of their properties are
// associations (and therefore may carry session state), and how identifiers
// are read. The detach core only consumes the `MetadataProvider` trait.
//
// ============================================================================

pub mod catalog;

pub use catalog::Catalog;

use crate::core::{DetachError, Identifier, ObjectRef, Result};
use crate::detach::collection_kind::CollectionKind;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// Plain value state; carries no session affinity.
    Scalar,
    /// Single-valued association to another entity type.
    Reference { target: String },
    /// Collection association holding `element` entities.
    Collection { kind: CollectionKind, element: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMetadata {
    pub name: String,
    pub kind: PropertyKind,
}

impl PropertyMetadata {
    pub fn is_association(&self) -> bool {
        !matches!(self.kind, PropertyKind::Scalar)
    }
}

/// Mapping of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    pub type_name: String,
    pub identifier: Option<String>,
    pub parent: Option<String>,
    pub properties: Vec<PropertyMetadata>,
    /// A sealed type cannot be stood in for by a placeholder.
    pub sealed: bool,
}

impl EntityMetadata {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            identifier: None,
            parent: None,
            properties: Vec::new(),
            sealed: false,
        }
    }

    pub fn identifier(mut self, name: impl Into<String>) -> Self {
        self.identifier = Some(name.into());
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.properties.push(PropertyMetadata {
            name: name.into(),
            kind: PropertyKind::Scalar,
        });
        self
    }

    pub fn reference(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.properties.push(PropertyMetadata {
            name: name.into(),
            kind: PropertyKind::Reference {
                target: target.into(),
            },
        });
        self
    }

    pub fn collection(
        mut self,
        name: impl Into<String>,
        kind: CollectionKind,
        element: impl Into<String>,
    ) -> Self {
        self.properties.push(PropertyMetadata {
            name: name.into(),
            kind: PropertyKind::Collection {
                kind,
                element: element.into(),
            },
        });
        self
    }

    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }

    pub fn own_property(&self, name: &str) -> Option<&PropertyMetadata> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Read access to store metadata.
///
/// Implementors supply `entity`; inheritance-aware lookups are derived from it.
pub trait MetadataProvider: Send + Sync {
    fn entity(&self, type_name: &str) -> Option<&EntityMetadata>;

    fn has_managed_type(&self, type_name: &str) -> bool {
        self.entity(type_name).is_some()
    }

    /// The type followed by its ancestors, nearest first.
    fn lineage(&self, type_name: &str) -> Vec<&EntityMetadata> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.entity(type_name);
        while let Some(metadata) = current {
            if !seen.insert(metadata.type_name.as_str()) {
                break;
            }
            chain.push(metadata);
            current = metadata.parent.as_deref().and_then(|p| self.entity(p));
        }
        chain
    }

    fn property(&self, type_name: &str, property: &str) -> Option<&PropertyMetadata> {
        self.lineage(type_name)
            .into_iter()
            .find_map(|metadata| metadata.own_property(property))
    }

    /// All property names, inherited ones first.
    fn property_names(&self, type_name: &str) -> Vec<String> {
        self.lineage(type_name)
            .into_iter()
            .rev()
            .flat_map(|metadata| metadata.properties.iter().map(|p| p.name.clone()))
            .collect()
    }

    fn property_is_association(&self, type_name: &str, property: &str) -> bool {
        self.property(type_name, property)
            .is_some_and(PropertyMetadata::is_association)
    }

    /// The type in the lineage that declares `property`.
    fn declaring_type(&self, type_name: &str, property: &str) -> Option<String> {
        self.lineage(type_name)
            .into_iter()
            .find(|metadata| metadata.own_property(property).is_some())
            .map(|metadata| metadata.type_name.clone())
    }

    fn identifier_property(&self, type_name: &str) -> Option<String> {
        self.lineage(type_name)
            .into_iter()
            .find_map(|metadata| metadata.identifier.clone())
    }

    fn is_sealed(&self, type_name: &str) -> bool {
        self.entity(type_name).is_some_and(|metadata| metadata.sealed)
    }

    /// Reads the identifier of a managed object.
    ///
    /// A managed type without an identifier property (or an object lacking
    /// that field) is a mapping error; an empty identifier means the object
    /// was never persisted.
    fn identifier_of(&self, object: &ObjectRef) -> Result<Identifier> {
        let type_name = object.type_name();
        let property = self
            .identifier_property(&type_name)
            .ok_or_else(|| DetachError::MissingIdentifier(type_name.clone()))?;
        let value = object
            .field(&property)
            .ok_or_else(|| DetachError::MissingIdentifier(type_name.clone()))?;
        Identifier::from_value(&value).ok_or(DetachError::TransientEntity(type_name))
    }
}
