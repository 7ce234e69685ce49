// ============================================================================
// Visitor Strategies
// ============================================================================
//
// Each strategy inspects one node of the copied graph, rewrites it in place
// (placeholders for deferred values, plain containers for loaded store
// collections, copies for everything walked further) and returns the child
// values still to be traversed.
//
// Strategies are tried in registration order; the first whose `can_visit`
// accepts the node handles it.
//
// ============================================================================

pub mod collection;
pub mod entity;
pub mod map;
pub mod plain;

pub use collection::CollectionVisitor;
pub use entity::ManagedEntityVisitor;
pub use map::MapVisitor;
pub use plain::PlainObjectVisitor;

use super::collection_kind::CollectionKindRegistry;
use super::config::DetachConfig;
use super::copier::GraphCopier;
use super::descriptor::PropertyDescriptor;
use super::placeholder::Placeholder;
use super::seen::Node;
use crate::core::{CollectionRef, ObjectRef, Result, Value, WeakCollectionRef};
use crate::metadata::MetadataProvider;
use crate::store::{EntityReference, PersistentCollection};
use tracing::{trace, warn};

/// Counters collected during one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub nodes_visited: usize,
    pub nodes_skipped: usize,
    pub placeholders_built: usize,
    pub collections_materialized: usize,
}

/// State shared by all strategies during one walk.
pub struct VisitContext<'a> {
    pub metadata: &'a dyn MetadataProvider,
    pub config: &'a DetachConfig,
    pub registry: &'a CollectionKindRegistry,
    pub copier: GraphCopier,
    /// Every placeholder left in the copied graph.
    pub placeholders: Vec<Placeholder>,
    pub stats: WalkStats,
}

impl<'a> VisitContext<'a> {
    pub fn new(
        metadata: &'a dyn MetadataProvider,
        config: &'a DetachConfig,
        registry: &'a CollectionKindRegistry,
    ) -> Self {
        Self {
            metadata,
            config,
            registry,
            copier: GraphCopier::new(),
            placeholders: Vec::new(),
            stats: WalkStats::default(),
        }
    }

    /// Builds a placeholder and records it.
    pub fn defer(&mut self, descriptor: PropertyDescriptor) -> Result<Value> {
        let placeholder = Placeholder::build(descriptor, self.metadata)?;
        trace!("deferred value: descriptor='{}'", placeholder.descriptor());
        self.placeholders.push(placeholder.clone());
        self.stats.placeholders_built += 1;
        Ok(Value::Placeholder(placeholder))
    }

    /// Carries an unresolved placeholder found in `owner` over to the copy,
    /// rebound to it and recorded.
    pub fn keep_placeholder(&mut self, owner: &ObjectRef, placeholder: &Placeholder) -> Value {
        let rebound = placeholder.rebind(owner);
        self.placeholders.push(rebound.clone());
        Value::Placeholder(rebound)
    }

    /// Whether `type_name.property` (or the same property of an ancestor) is
    /// configured as a stop property.
    pub fn is_stop_property(&self, type_name: &str, property: &str) -> bool {
        if self.config.stop_properties.is_empty() {
            return false;
        }
        let lineage = self.metadata.lineage(type_name);
        if lineage.is_empty() {
            return self.config.is_stop_property(type_name, property);
        }
        lineage
            .iter()
            .any(|metadata| self.config.is_stop_property(&metadata.type_name, property))
    }
}

pub trait VisitorStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_visit(&self, node: &Node, cx: &VisitContext<'_>) -> bool;

    /// Rewrites `node` and returns the children still to walk.
    fn visit(&self, node: &Node, cx: &mut VisitContext<'_>) -> Result<Vec<Value>>;
}

pub struct VisitorRegistry {
    visitors: Vec<Box<dyn VisitorStrategy>>,
}

impl VisitorRegistry {
    pub fn new() -> Self {
        Self {
            visitors: Vec::new(),
        }
    }

    pub fn register(&mut self, visitor: Box<dyn VisitorStrategy>) {
        self.visitors.push(visitor);
    }

    /// Managed entities, maps, other containers, then anything else.
    pub fn with_default_visitors() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ManagedEntityVisitor));
        registry.register(Box::new(MapVisitor));
        registry.register(Box::new(CollectionVisitor));
        registry.register(Box::new(PlainObjectVisitor));
        registry
    }

    pub fn select(&self, node: &Node, cx: &VisitContext<'_>) -> Option<&dyn VisitorStrategy> {
        self.visitors
            .iter()
            .find(|visitor| visitor.can_visit(node, cx))
            .map(|visitor| visitor.as_ref())
    }

    pub fn list_visitors(&self) -> Vec<&str> {
        self.visitors.iter().map(|v| v.name()).collect()
    }
}

impl Default for VisitorRegistry {
    fn default() -> Self {
        Self::with_default_visitors()
    }
}

// ============================================================================
// Shared property and element handling
// ============================================================================

/// Detaches the value of `owner.property`.
///
/// `declared_type` is the type the property is mapped with, when the owner
/// is a managed entity. Returns the replacement to write back (if any) and
/// pushes traversable children onto `children`.
pub(crate) fn detach_property(
    cx: &mut VisitContext<'_>,
    owner: &ObjectRef,
    property: &str,
    value: &Value,
    declared_type: Option<&str>,
    children: &mut Vec<Value>,
) -> Result<Option<Value>> {
    match value {
        Value::Placeholder(placeholder) => match placeholder.resolved() {
            // Detached again as the value it resolved to.
            Some(resolved) => {
                let replacement =
                    detach_property(cx, owner, property, &resolved, declared_type, children)?;
                Ok(Some(replacement.unwrap_or(resolved)))
            }
            None => Ok(Some(cx.keep_placeholder(owner, placeholder))),
        },
        Value::Proxy(proxy) if !proxy.is_initialized() => {
            let target = proxy.reference().clone();
            let declared = declared_type.unwrap_or(target.type_name.as_str()).to_string();
            let descriptor = PropertyDescriptor::reference(owner, property, target, declared);
            Ok(Some(cx.defer(descriptor)?))
        }
        Value::PersistentCollection(collection) if !collection.was_initialized() => {
            let descriptor = PropertyDescriptor::collection(
                owner,
                property,
                cx.registry.kind_of(collection),
                collection.key().clone(),
            );
            Ok(Some(cx.defer(descriptor)?))
        }
        Value::PersistentCollection(collection) => {
            let container = materialize(cx, collection, children)?;
            Ok(Some(Value::Collection(container)))
        }
        Value::Object(_) | Value::Collection(_) | Value::Proxy(_) => {
            let copy = cx.copier.copy_value(value);
            children.push(copy.clone());
            Ok(Some(copy))
        }
        _ => Ok(None),
    }
}

/// Converts a loaded store collection into a plain container. Elements are
/// deproxied and become children; the container itself is not walked.
pub(crate) fn materialize(
    cx: &mut VisitContext<'_>,
    collection: &PersistentCollection,
    children: &mut Vec<Value>,
) -> Result<CollectionRef> {
    let kind = cx.registry.kind_of(collection);
    let target = CollectionRef::new(cx.registry.create_plain_container(kind));
    let weak = target.downgrade();
    cx.copier.adopt(&Node::Collection(target.clone()));

    let registry = cx.registry;
    registry.materialize(collection, &target, |element| {
        deproxy_element(cx, &weak, element, children)
    })?;

    cx.stats.collections_materialized += 1;
    trace!(
        "materialized collection: key='{}' kind='{}' size={}",
        collection.key(),
        kind,
        target.len()
    );
    Ok(target)
}

/// Element of a plain container, made transport safe.
pub(crate) fn deproxy_element(
    cx: &mut VisitContext<'_>,
    container: &WeakCollectionRef,
    element: &Value,
    children: &mut Vec<Value>,
) -> Result<Value> {
    match element {
        Value::Proxy(proxy) if !proxy.is_initialized() => {
            let target: EntityReference = proxy.reference().clone();
            cx.defer(PropertyDescriptor::element(container.clone(), target))
        }
        Value::Placeholder(placeholder) => match placeholder.resolved() {
            Some(resolved) => deproxy_element(cx, container, &resolved, children),
            None => match placeholder.descriptor().target() {
                Some(target) => {
                    cx.defer(PropertyDescriptor::element(container.clone(), target.clone()))
                }
                None => {
                    warn!(
                        "dropping collection placeholder held as an element: descriptor='{}'",
                        placeholder.descriptor()
                    );
                    Ok(Value::Null)
                }
            },
        },
        Value::PersistentCollection(collection) if collection.was_initialized() => {
            Ok(Value::Collection(materialize(cx, collection, children)?))
        }
        Value::PersistentCollection(collection) => {
            warn!(
                "dropping uninitialized nested collection: key='{}'",
                collection.key()
            );
            Ok(Value::Null)
        }
        Value::Object(_) | Value::Collection(_) | Value::Proxy(_) => {
            let copy = cx.copier.copy_value(element);
            children.push(copy.clone());
            Ok(copy)
        }
        _ => Ok(element.clone()),
    }
}

/// Rewrites every element of a plain container node.
pub(crate) fn visit_container(
    cx: &mut VisitContext<'_>,
    container: &CollectionRef,
) -> Result<Vec<Value>> {
    let mut contents = container.read().clone();
    let weak = container.downgrade();
    let mut children = Vec::new();
    let mut failure = None;

    contents.map_in_place(|element| {
        if failure.is_some() {
            return None;
        }
        match deproxy_element(cx, &weak, element, &mut children) {
            Ok(replacement) => Some(replacement),
            Err(err) => {
                failure = Some(err);
                None
            }
        }
    });
    if let Some(err) = failure {
        return Err(err);
    }

    *container.write() = contents;
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Object;
    use crate::detach::attacher::Attacher;
    use crate::detach::collection_kind::CollectionKind;
    use crate::metadata::{Catalog, EntityMetadata};
    use crate::store::{CollectionKey, MemoryDatabase, SessionHolder, Stored};
    use std::sync::Arc;

    fn holder() -> SessionHolder {
        let catalog = Catalog::new()
            .with_entity(EntityMetadata::new("Person").identifier("id").scalar("name"))
            .unwrap();
        let db = MemoryDatabase::new(catalog);
        db.insert("Person", 2, [("name", Stored::value("Bob"))]).unwrap();
        SessionHolder::new(Arc::new(db))
    }

    // A placeholder already resolved through `holder`, whose owner is gone.
    fn resolved(holder: &SessionHolder, descriptor: PropertyDescriptor) -> Placeholder {
        let placeholder = Placeholder::read_resolve(descriptor);
        let registry = CollectionKindRegistry::default();
        let attacher = Attacher::new(holder, &registry);
        assert!(placeholder.resolve(&attacher).unwrap().is_some());
        placeholder
    }

    #[test]
    fn test_default_visitor_order() {
        let registry = VisitorRegistry::default();
        assert_eq!(
            registry.list_visitors(),
            vec!["managed-entity", "map", "collection", "plain-object"]
        );
    }

    #[test]
    fn test_plain_object_falls_through() {
        let catalog = Catalog::new();
        let config = DetachConfig::default();
        let kinds = CollectionKindRegistry::default();
        let cx = VisitContext::new(&catalog, &config, &kinds);
        let registry = VisitorRegistry::default();

        let node = Node::Object(ObjectRef::new(Object::new("Dto")));
        assert_eq!(registry.select(&node, &cx).unwrap().name(), "plain-object");

        let node = Node::Collection(CollectionRef::map(vec![]));
        assert_eq!(registry.select(&node, &cx).unwrap().name(), "map");

        let node = Node::Collection(CollectionRef::set(vec![]));
        assert_eq!(registry.select(&node, &cx).unwrap().name(), "collection");
    }

    #[test]
    fn test_resolved_property_placeholder_is_deferred_again() {
        let holder = holder();
        let _session = holder.open();
        let stale = ObjectRef::new(Object::new("PersonView").with("person", Value::Null));
        let placeholder = resolved(
            &holder,
            PropertyDescriptor::reference(&stale, "person", EntityReference::new("Person", 2), "Person"),
        );

        let catalog = Catalog::new();
        let config = DetachConfig::default();
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);
        let view = ObjectRef::new(Object::new("PersonView").with("person", placeholder.clone()));
        PlainObjectVisitor.visit(&Node::Object(view.clone()), &mut cx).unwrap();

        let value = view.property("person");
        let deferred = value.as_placeholder().unwrap();
        assert!(!deferred.ptr_eq(&placeholder));
        assert!(!deferred.is_resolved());
        assert_eq!(deferred.descriptor().target(), Some(&EntityReference::new("Person", 2)));
        assert_eq!(cx.placeholders.len(), 1);
        assert!(cx.placeholders[0].ptr_eq(deferred));
    }

    #[test]
    fn test_resolved_element_placeholder_is_deferred_again() {
        let holder = holder();
        let _session = holder.open();
        let stale = CollectionRef::list(vec![]);
        let placeholder = resolved(
            &holder,
            PropertyDescriptor::element(stale.downgrade(), EntityReference::new("Person", 2)),
        );

        let catalog = Catalog::new();
        let config = DetachConfig::default();
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);
        let list = CollectionRef::list(vec![Value::Placeholder(placeholder.clone())]);
        CollectionVisitor.visit(&Node::Collection(list.clone()), &mut cx).unwrap();

        let values = list.values();
        let deferred = values[0].as_placeholder().unwrap();
        assert!(!deferred.ptr_eq(&placeholder));
        assert!(!deferred.is_resolved());
        assert_eq!(cx.placeholders.len(), 1);
        assert!(cx.placeholders[0].ptr_eq(deferred));
    }

    #[test]
    fn test_collection_placeholder_element_is_dropped() {
        let owner = ObjectRef::new(Object::new("Company").with("id", 1));
        let placeholder = Placeholder::read_resolve(PropertyDescriptor::collection(
            &owner,
            "persons",
            CollectionKind::Set,
            CollectionKey::new("Company.persons", 1),
        ));

        let catalog = Catalog::new();
        let config = DetachConfig::default();
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);
        let list = CollectionRef::list(vec![Value::Placeholder(placeholder), Value::from(1)]);
        CollectionVisitor.visit(&Node::Collection(list.clone()), &mut cx).unwrap();

        assert_eq!(list.values(), vec![Value::Null, Value::from(1)]);
        assert!(cx.placeholders.is_empty());
    }
}
