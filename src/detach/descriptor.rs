use crate::core::{ObjectRef, WeakCollectionRef, WeakObjectRef};
use crate::detach::collection_kind::CollectionKind;
use crate::store::{CollectionKey, EntityReference};
use std::fmt;

/// A deferred single-valued property: `owner.property` held `target`.
#[derive(Debug, Clone)]
pub struct ReferenceDescriptor {
    pub owner: WeakObjectRef,
    pub property: String,
    pub target: EntityReference,
    /// Type the property is declared with; may be a supertype of the target.
    pub declared_type: String,
}

/// A deferred collection property. Carries identity only, never elements.
#[derive(Debug, Clone)]
pub struct CollectionDescriptor {
    pub owner: WeakObjectRef,
    pub property: String,
    pub kind: CollectionKind,
    pub key: CollectionKey,
}

/// A deferred reference stored as an element of a plain container.
#[derive(Debug, Clone)]
pub struct ElementDescriptor {
    pub container: WeakCollectionRef,
    pub target: EntityReference,
}

/// Records what a placeholder stands for and where it lives.
///
/// Owners are held weakly: the graph reaches its placeholders, never the
/// other way round.
#[derive(Debug, Clone)]
pub enum PropertyDescriptor {
    Reference(ReferenceDescriptor),
    Collection(CollectionDescriptor),
    Element(ElementDescriptor),
}

impl PropertyDescriptor {
    pub fn reference(
        owner: &ObjectRef,
        property: impl Into<String>,
        target: EntityReference,
        declared_type: impl Into<String>,
    ) -> Self {
        Self::Reference(ReferenceDescriptor {
            owner: owner.downgrade(),
            property: property.into(),
            target,
            declared_type: declared_type.into(),
        })
    }

    pub fn collection(
        owner: &ObjectRef,
        property: impl Into<String>,
        kind: CollectionKind,
        key: CollectionKey,
    ) -> Self {
        Self::Collection(CollectionDescriptor {
            owner: owner.downgrade(),
            property: property.into(),
            kind,
            key,
        })
    }

    pub fn element(container: WeakCollectionRef, target: EntityReference) -> Self {
        Self::Element(ElementDescriptor { container, target })
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    /// Property name, `None` for container elements.
    pub fn property(&self) -> Option<&str> {
        match self {
            Self::Reference(d) => Some(&d.property),
            Self::Collection(d) => Some(&d.property),
            Self::Element(_) => None,
        }
    }

    /// Target of a single-valued descriptor.
    pub fn target(&self) -> Option<&EntityReference> {
        match self {
            Self::Reference(d) => Some(&d.target),
            Self::Element(d) => Some(&d.target),
            Self::Collection(_) => None,
        }
    }

    /// Whether whatever holds the placeholder is still alive.
    pub fn owner_alive(&self) -> bool {
        match self {
            Self::Reference(d) => d.owner.is_alive(),
            Self::Collection(d) => d.owner.is_alive(),
            Self::Element(d) => d.container.upgrade().is_some(),
        }
    }

    /// Same descriptor, held by a different owner object.
    pub fn with_owner(&self, owner: &ObjectRef) -> Self {
        let mut moved = self.clone();
        match &mut moved {
            Self::Reference(d) => d.owner = owner.downgrade(),
            Self::Collection(d) => d.owner = owner.downgrade(),
            Self::Element(_) => {}
        }
        moved
    }
}

impl fmt::Display for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(d) => write!(f, "{:?}.{} -> {}", d.owner, d.property, d.target),
            Self::Collection(d) => {
                write!(f, "{:?}.{} -> {} {}", d.owner, d.property, d.kind, d.key)
            }
            Self::Element(d) => write!(f, "{:?}[..] -> {}", d.container, d.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Object;

    #[test]
    fn test_reference_descriptor() {
        let owner = ObjectRef::new(Object::new("A").with("id", 1));
        let descriptor =
            PropertyDescriptor::reference(&owner, "b", EntityReference::new("B", 2), "B");

        assert_eq!(descriptor.property(), Some("b"));
        assert_eq!(descriptor.target(), Some(&EntityReference::new("B", 2)));
        assert!(!descriptor.is_collection());
        assert!(descriptor.owner_alive());

        drop(owner);
        assert!(!descriptor.owner_alive());
    }

    #[test]
    fn test_with_owner() {
        let first = ObjectRef::new(Object::new("Company").with("id", 1));
        let second = ObjectRef::new(Object::new("Company").with("id", 1));
        let descriptor = PropertyDescriptor::collection(
            &first,
            "persons",
            CollectionKind::Set,
            CollectionKey::new("Company.persons", 1),
        );

        let moved = descriptor.with_owner(&second);
        let PropertyDescriptor::Collection(moved) = moved else {
            panic!("expected a collection descriptor");
        };
        assert!(moved.owner.upgrade().is_some_and(|o| o.ptr_eq(&second)));
    }
}
