use super::{visit_container, VisitContext, VisitorStrategy};
use crate::core::{Result, Value};
use crate::detach::seen::Node;

/// Visitor for plain lists, sets and sorted sets. Every element is made
/// transport safe; handles among them are walked next.
pub struct CollectionVisitor;

impl VisitorStrategy for CollectionVisitor {
    fn name(&self) -> &'static str {
        "collection"
    }

    fn can_visit(&self, node: &Node, _cx: &VisitContext<'_>) -> bool {
        match node {
            Node::Collection(collection) => !collection.read().is_map(),
            Node::Object(_) => false,
        }
    }

    fn visit(&self, node: &Node, cx: &mut VisitContext<'_>) -> Result<Vec<Value>> {
        match node {
            Node::Collection(collection) => visit_container(cx, collection),
            Node::Object(_) => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CollectionRef, Object, ObjectRef};
    use crate::detach::collection_kind::CollectionKindRegistry;
    use crate::detach::config::DetachConfig;
    use crate::metadata::Catalog;
    use crate::store::{EntityProxy, EntityReference, LazyLoader, MemorySession};
    use std::sync::Weak;

    #[test]
    fn test_elements_are_deproxied() {
        let catalog = Catalog::new();
        let config = DetachConfig::default();
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);

        let loaded = ObjectRef::new(Object::new("Person").with("id", 1));
        let proxy = EntityProxy::initialized(EntityReference::new("Person", 1), loaded.clone());
        let loader: Weak<dyn LazyLoader> = Weak::<MemorySession>::new();
        let lazy = EntityProxy::uninitialized(EntityReference::new("Person", 2), loader);
        let list = CollectionRef::list(vec![Value::Proxy(proxy), Value::Proxy(lazy), Value::from(3)]);

        let children = CollectionVisitor.visit(&Node::Collection(list.clone()), &mut cx).unwrap();

        let values = list.values();
        assert!(values[0].as_object().is_some_and(|copy| !copy.ptr_eq(&loaded)));
        assert!(values[1].is_placeholder());
        assert_eq!(values[2], Value::from(3));
        assert_eq!(children.len(), 1);
        assert_eq!(cx.placeholders.len(), 1);
    }
}
