// ============================================================================
// Placeholders
// ============================================================================
//
// A placeholder is the transport-safe stand-in for a deferred value. It
// carries its descriptor, never a session, and is resolved explicitly through
// the accessors below:
//
//   ObjectRef::resolve_property   deferred property of an object
//   CollectionRef::resolve_elements   deferred elements of a plain container
//   Value::entity   entity behind an already resolved placeholder
//
// The first successful resolution writes the live value back into the owner
// (when the owner still holds this placeholder) and is cached, so later
// accesses through a stale copy of the placeholder return the same value.
//
// ============================================================================

use super::attacher::Attacher;
use super::descriptor::PropertyDescriptor;
use crate::core::{CollectionRef, ContainerShape, DetachError, ObjectRef, Result, Value};
use crate::metadata::MetadataProvider;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// The type a placeholder presents in place of the deferred value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApparentType {
    Entity(String),
    Container(ContainerShape),
}

impl fmt::Display for ApparentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(type_name) => write!(f, "{}", type_name),
            Self::Container(shape) => write!(f, "{}", shape),
        }
    }
}

struct PlaceholderState {
    descriptor: PropertyDescriptor,
    apparent_type: ApparentType,
    resolved: RwLock<Option<Value>>,
}

#[derive(Clone)]
pub struct Placeholder(Arc<PlaceholderState>);

impl Placeholder {
    /// Builds a placeholder for `descriptor`.
    ///
    /// Fails with `SealedType` when the declared type of a single-valued
    /// property is sealed against placeholders.
    pub fn build(descriptor: PropertyDescriptor, metadata: &dyn MetadataProvider) -> Result<Self> {
        let declared = match &descriptor {
            PropertyDescriptor::Reference(d) => Some((d.declared_type.as_str(), d.property.as_str())),
            PropertyDescriptor::Element(d) => Some((d.target.type_name.as_str(), "")),
            PropertyDescriptor::Collection(_) => None,
        };

        if let Some((declared, property)) = declared {
            if metadata.is_sealed(declared) {
                let owner = match &descriptor {
                    PropertyDescriptor::Reference(d) => d
                        .owner
                        .upgrade()
                        .map(|o| o.type_name())
                        .unwrap_or_default(),
                    _ => "container".to_string(),
                };
                return Err(DetachError::SealedType {
                    owner,
                    property: property.to_string(),
                    declared: declared.to_string(),
                });
            }
        }

        Ok(Self::read_resolve(descriptor))
    }

    /// Serialization hook: the descriptor this placeholder is rebuilt from.
    /// Never triggers resolution.
    pub fn write_replace(&self) -> PropertyDescriptor {
        self.0.descriptor.clone()
    }

    /// Deserialization hook: rebuilds an unresolved placeholder.
    pub fn read_resolve(descriptor: PropertyDescriptor) -> Self {
        let apparent_type = match &descriptor {
            PropertyDescriptor::Reference(d) => ApparentType::Entity(d.declared_type.clone()),
            PropertyDescriptor::Element(d) => ApparentType::Entity(d.target.type_name.clone()),
            PropertyDescriptor::Collection(d) => ApparentType::Container(d.kind.shape()),
        };
        Self(Arc::new(PlaceholderState {
            descriptor,
            apparent_type,
            resolved: RwLock::new(None),
        }))
    }

    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.0.descriptor
    }

    pub fn apparent_type(&self) -> &ApparentType {
        &self.0.apparent_type
    }

    pub fn resolved(&self) -> Option<Value> {
        self.0.resolved.read().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.0.resolved.read().is_some()
    }

    /// Same placeholder, held by a different owner object.
    pub fn rebind(&self, owner: &ObjectRef) -> Self {
        Self::read_resolve(self.0.descriptor.with_owner(owner))
    }

    /// Resolves the placeholder to a live value.
    ///
    /// `Ok(None)` means no store handle is available right now; the
    /// placeholder stays in place and can be resolved later.
    pub fn resolve(&self, attacher: &Attacher<'_>) -> Result<Option<Value>> {
        if let Some(value) = self.resolved() {
            return Ok(Some(value));
        }

        let Some(value) = attacher.reattach(&self.0.descriptor)? else {
            debug!("placeholder resolution deferred: target='{}'", self.0.descriptor);
            return Ok(None);
        };

        self.heal(&value);
        let mut resolved = self.0.resolved.write();
        Ok(Some(resolved.get_or_insert(value).clone()))
    }

    // Writes the resolved value over this placeholder wherever its owner
    // still holds it.
    fn heal(&self, value: &Value) {
        match &self.0.descriptor {
            PropertyDescriptor::Reference(d) => heal_property(self, &d.owner.upgrade(), &d.property, value),
            PropertyDescriptor::Collection(d) => heal_property(self, &d.owner.upgrade(), &d.property, value),
            PropertyDescriptor::Element(d) => match d.container.upgrade() {
                Some(container) => {
                    container.write().map_in_place(|element| match element {
                        Value::Placeholder(p) if p.ptr_eq(self) => Some(value.clone()),
                        _ => None,
                    });
                }
                None => warn!("placeholder container dropped: target='{}'", d.target),
            },
        }
    }

    pub fn ptr_eq(&self, other: &Placeholder) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn heal_property(placeholder: &Placeholder, owner: &Option<ObjectRef>, property: &str, value: &Value) {
    let Some(owner) = owner else {
        warn!(
            "placeholder owner dropped: descriptor='{}'",
            placeholder.descriptor()
        );
        return;
    };
    match owner.field(property) {
        Some(Value::Placeholder(current)) if current.ptr_eq(placeholder) => {
            owner.set_property(property, value.clone());
        }
        _ => debug!(
            "owner property no longer holds placeholder: type='{}' property='{}'",
            owner.type_name(),
            property
        ),
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_resolved() { "resolved" } else { "pending" };
        write!(f, "Placeholder<{}>({}, {})", self.0.apparent_type, self.0.descriptor, state)
    }
}

impl ObjectRef {
    /// Reads `name`, resolving a placeholder found there.
    ///
    /// Without a store handle the placeholder itself is returned.
    pub fn resolve_property(&self, name: &str, attacher: &Attacher<'_>) -> Result<Value> {
        let value = self.property(name);
        if let Value::Placeholder(placeholder) = value.clone() {
            if let Some(resolved) = placeholder.resolve(attacher)? {
                return Ok(resolved);
            }
        }
        Ok(value)
    }
}

impl CollectionRef {
    /// Element values with every placeholder resolved where possible.
    pub fn resolve_elements(&self, attacher: &Attacher<'_>) -> Result<Vec<Value>> {
        let placeholders: Vec<Placeholder> = self
            .values()
            .into_iter()
            .filter_map(|value| match value {
                Value::Placeholder(placeholder) => Some(placeholder),
                _ => None,
            })
            .collect();

        for placeholder in placeholders {
            placeholder.resolve(attacher)?;
        }
        Ok(self.values())
    }
}
