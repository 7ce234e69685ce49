use super::{detach_property, VisitContext, VisitorStrategy};
use crate::core::{DetachError, Identifier, ObjectRef, Result, Value};
use crate::detach::descriptor::PropertyDescriptor;
use crate::detach::seen::Node;
use crate::metadata::PropertyKind;
use crate::store::EntityReference;
use tracing::{debug, trace, warn};

/// Visitor for objects whose type the store manages.
///
/// Association properties get the full treatment: deferral of uninitialized
/// values, deproxying of loaded references and materialization of loaded
/// collections. Other fields are copied only when they hold nested objects.
pub struct ManagedEntityVisitor;

impl VisitorStrategy for ManagedEntityVisitor {
    fn name(&self) -> &'static str {
        "managed-entity"
    }

    fn can_visit(&self, node: &Node, cx: &VisitContext<'_>) -> bool {
        match node {
            Node::Object(object) => cx.metadata.has_managed_type(&object.type_name()),
            Node::Collection(_) => false,
        }
    }

    fn visit(&self, node: &Node, cx: &mut VisitContext<'_>) -> Result<Vec<Value>> {
        let Node::Object(object) = node else {
            return Ok(Vec::new());
        };
        let type_name = object.type_name();
        if cx.metadata.identifier_property(&type_name).is_none() {
            return Err(DetachError::MissingIdentifier(type_name));
        }

        // Snapshot the fields so no lock is held while visiting values.
        let fields: Vec<(String, Value)> = object
            .read()
            .fields()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut children = Vec::new();
        for (name, value) in fields {
            let replacement = if cx.is_stop_property(&type_name, &name) {
                stop(cx, object, &type_name, &name, &value)?
            } else if cx.metadata.property_is_association(&type_name, &name) {
                let declared = declared_type(cx, &type_name, &name);
                detach_property(cx, object, &name, &value, declared.as_deref(), &mut children)?
            } else if value.is_scalar() {
                None
            } else {
                trace!(
                    "detaching unmapped field: type='{}' property='{}'",
                    type_name,
                    name
                );
                detach_property(cx, object, &name, &value, None, &mut children)?
            };

            if let Some(replacement) = replacement {
                object.set_property(&name, replacement);
            }
        }
        Ok(children)
    }
}

fn declared_type(cx: &VisitContext<'_>, type_name: &str, property: &str) -> Option<String> {
    match cx.metadata.property(type_name, property).map(|p| &p.kind) {
        Some(PropertyKind::Reference { target }) => Some(target.clone()),
        _ => None,
    }
}

/// Defers a stop property by identity, whatever its load state. Values that
/// have no store identity are cleared.
fn stop(
    cx: &mut VisitContext<'_>,
    owner: &ObjectRef,
    type_name: &str,
    property: &str,
    value: &Value,
) -> Result<Option<Value>> {
    let declared = declared_type(cx, type_name, property);
    let reference = |target: EntityReference| {
        let declared = declared.clone().unwrap_or_else(|| target.type_name.clone());
        PropertyDescriptor::reference(owner, property, target, declared)
    };

    let replacement = match value {
        Value::Null => return Ok(None),
        Value::Placeholder(placeholder) => match placeholder.resolved() {
            Some(resolved) => return stop(cx, owner, type_name, property, &resolved),
            None => cx.keep_placeholder(owner, placeholder),
        },
        Value::Proxy(proxy) => cx.defer(reference(proxy.reference().clone()))?,
        Value::PersistentCollection(collection) => cx.defer(PropertyDescriptor::collection(
            owner,
            property,
            cx.registry.kind_of(collection),
            collection.key().clone(),
        ))?,
        Value::Object(target) if cx.metadata.has_managed_type(&target.type_name()) => {
            match cx.metadata.identifier_of(target) {
                Ok(id) => cx.defer(reference(entity_reference(target, id)))?,
                Err(DetachError::TransientEntity(_)) => {
                    warn!(
                        "clearing transient stop property: type='{}' property='{}'",
                        type_name, property
                    );
                    Value::Null
                }
                Err(err) => return Err(err),
            }
        }
        Value::Object(_) | Value::Collection(_) => {
            warn!(
                "clearing stop property without store identity: type='{}' property='{}'",
                type_name, property
            );
            Value::Null
        }
        _ => return Ok(None),
    };

    debug!(
        "stopped traversal: type='{}' property='{}'",
        type_name, property
    );
    Ok(Some(replacement))
}

fn entity_reference(target: &ObjectRef, id: Identifier) -> EntityReference {
    EntityReference::new(target.type_name(), id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CollectionRef, Container, Object};
    use crate::detach::collection_kind::{CollectionKind, CollectionKindRegistry};
    use crate::detach::config::DetachConfig;
    use crate::metadata::{Catalog, EntityMetadata};
    use crate::store::{CollectionKey, EntityProxy, LazyLoader, MemorySession, PersistentCollection};
    use std::sync::Weak;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                EntityMetadata::new("A")
                    .identifier("id")
                    .scalar("id")
                    .scalar("label")
                    .reference("b", "B")
                    .collection("items", CollectionKind::Bag, "B"),
            )
            .unwrap()
            .with_entity(EntityMetadata::new("B").identifier("id").scalar("id"))
            .unwrap()
            .with_entity(EntityMetadata::new("Broken").scalar("name"))
            .unwrap()
    }

    fn lazy_b(id: i64) -> Value {
        let loader: Weak<dyn LazyLoader> = Weak::<MemorySession>::new();
        Value::Proxy(EntityProxy::uninitialized(EntityReference::new("B", id), loader))
    }

    #[test]
    fn test_uninitialized_reference_becomes_placeholder() {
        let catalog = catalog();
        let config = DetachConfig::default();
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);

        let a = ObjectRef::new(Object::new("A").with("id", 1).with("label", "x").with("b", lazy_b(2)));
        let children = ManagedEntityVisitor.visit(&Node::Object(a.clone()), &mut cx).unwrap();

        assert!(children.is_empty());
        assert_eq!(cx.placeholders.len(), 1);
        let value = a.property("b");
        let placeholder = value.as_placeholder().unwrap();
        assert_eq!(placeholder.descriptor().target(), Some(&EntityReference::new("B", 2)));
        assert_eq!(a.property("label"), Value::from("x"));
    }

    #[test]
    fn test_loaded_collection_is_materialized() {
        let catalog = catalog();
        let config = DetachConfig::default();
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);

        let b = ObjectRef::new(Object::new("B").with("id", 2));
        let items = PersistentCollection::initialized(
            CollectionKind::Bag,
            CollectionKey::new("A.items", 1),
            Container::List(vec![Value::Object(b.clone()), lazy_b(3)]),
        );
        let a = ObjectRef::new(Object::new("A").with("id", 1).with("items", items));

        let children = ManagedEntityVisitor.visit(&Node::Object(a.clone()), &mut cx).unwrap();

        let value = a.property("items");
        let container: &CollectionRef = value.as_collection().unwrap();
        let elements = container.values();
        assert_eq!(elements.len(), 2);
        assert!(elements[0].as_object().is_some_and(|copy| !copy.ptr_eq(&b)));
        assert!(elements[1].is_placeholder());
        assert_eq!(children.len(), 1);
        assert_eq!(cx.stats.collections_materialized, 1);
        assert_eq!(cx.stats.placeholders_built, 1);
    }

    #[test]
    fn test_stop_property_defers_loaded_entity() {
        let catalog = catalog();
        let config = DetachConfig::new().stop_at("A", "b");
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);

        let b = ObjectRef::new(Object::new("B").with("id", 2));
        let a = ObjectRef::new(Object::new("A").with("id", 1).with("b", b));

        let children = ManagedEntityVisitor.visit(&Node::Object(a.clone()), &mut cx).unwrap();

        assert!(children.is_empty());
        let value = a.property("b");
        assert_eq!(
            value.as_placeholder().unwrap().descriptor().target(),
            Some(&EntityReference::new("B", 2))
        );
    }

    #[test]
    fn test_stop_property_clears_transient_entity() {
        let catalog = catalog();
        let config = DetachConfig::new().stop_at("A", "b");
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);

        let b = ObjectRef::new(Object::new("B").with("id", Value::Null));
        let a = ObjectRef::new(Object::new("A").with("id", 1).with("b", b));
        ManagedEntityVisitor.visit(&Node::Object(a.clone()), &mut cx).unwrap();

        assert!(a.property("b").is_null());
        assert!(cx.placeholders.is_empty());
    }

    #[test]
    fn test_stop_property_clears_plain_container() {
        let catalog = catalog();
        let config = DetachConfig::new().stop_at("A", "tags");
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);

        let tags = CollectionRef::list(vec![Value::from("x")]);
        let a = ObjectRef::new(Object::new("A").with("id", 1).with("tags", tags.clone()));
        let children = ManagedEntityVisitor.visit(&Node::Object(a.clone()), &mut cx).unwrap();

        assert!(children.is_empty());
        assert!(a.property("tags").is_null());
        assert!(cx.placeholders.is_empty());
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_managed_type_without_identifier_fails() {
        let catalog = catalog();
        let config = DetachConfig::default();
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);

        let broken = ObjectRef::new(Object::new("Broken").with("name", "x"));
        let err = ManagedEntityVisitor
            .visit(&Node::Object(broken), &mut cx)
            .unwrap_err();
        assert_eq!(err, DetachError::MissingIdentifier("Broken".into()));
    }
}
