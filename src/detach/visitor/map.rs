use super::{visit_container, VisitContext, VisitorStrategy};
use crate::core::{Result, Value};
use crate::detach::seen::Node;

/// Visitor for plain maps. Keys and values are treated alike.
pub struct MapVisitor;

impl VisitorStrategy for MapVisitor {
    fn name(&self) -> &'static str {
        "map"
    }

    fn can_visit(&self, node: &Node, _cx: &VisitContext<'_>) -> bool {
        match node {
            Node::Collection(collection) => collection.read().is_map(),
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

    #[test]
    fn test_keys_and_values_are_copied() {
        let catalog = Catalog::new();
        let config = DetachConfig::default();
        let kinds = CollectionKindRegistry::default();
        let mut cx = VisitContext::new(&catalog, &config, &kinds);

        let key = ObjectRef::new(Object::new("Role").with("name", "admin"));
        let value = ObjectRef::new(Object::new("Person").with("name", "Alice"));
        let map = CollectionRef::map(vec![(Value::Object(key.clone()), Value::Object(value.clone()))]);

        let children = MapVisitor.visit(&Node::Collection(map.clone()), &mut cx).unwrap();

        assert_eq!(children.len(), 2);
        let entries = map.values();
        assert!(entries[0].as_object().is_some_and(|k| !k.ptr_eq(&key)));
        assert!(entries[1].as_object().is_some_and(|v| !v.ptr_eq(&value)));
        assert_eq!(entries[1].as_object().unwrap().property("name"), Value::from("Alice"));
    }
}
