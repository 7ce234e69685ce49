use super::collection_kind::CollectionKindRegistry;
use super::config::DetachConfig;
use super::descriptor::PropertyDescriptor;
use super::placeholder::Placeholder;
use super::seen::{Node, SeenSet};
use super::visitor::{materialize, VisitContext, VisitorRegistry, WalkStats};
use crate::core::{DetachError, Result, Value};
use crate::metadata::MetadataProvider;
use tracing::{debug, debug_span, trace};

/// Result of one walk.
#[derive(Debug)]
pub struct WalkOutcome {
    /// Detached copy of the root.
    pub root: Value,
    /// Every placeholder left in the copy.
    pub placeholders: Vec<Placeholder>,
    /// Objects and containers created for the copy.
    pub nodes: Vec<Node>,
    pub stats: WalkStats,
}

impl WalkOutcome {
    pub fn descriptors(&self) -> Vec<PropertyDescriptor> {
        self.placeholders.iter().map(Placeholder::write_replace).collect()
    }
}

/// Depth-first graph walker.
///
/// Works on an identity-preserving copy of the graph; the source graph is
/// read, never written. Each node is visited at most once.
pub struct GraphWalker<'a> {
    metadata: &'a dyn MetadataProvider,
    config: &'a DetachConfig,
    registry: &'a CollectionKindRegistry,
    visitors: VisitorRegistry,
}

impl<'a> GraphWalker<'a> {
    pub fn new(
        metadata: &'a dyn MetadataProvider,
        config: &'a DetachConfig,
        registry: &'a CollectionKindRegistry,
    ) -> Self {
        Self {
            metadata,
            config,
            registry,
            visitors: VisitorRegistry::with_default_visitors(),
        }
    }

    pub fn walk(&self, root: &Value) -> Result<WalkOutcome> {
        let span = debug_span!("detach_walk", root = root.type_name());
        let _guard = span.enter();

        let mut cx = VisitContext::new(self.metadata, self.config, self.registry);
        let mut seen = SeenSet::new();
        let mut stack = Vec::new();

        let root = self.prepare_root(root, &mut cx, &mut stack)?;
        if let Some(node) = Node::from_value(&root) {
            stack.push(node);
        }

        while let Some(node) = stack.pop() {
            if !seen.add(&node) {
                cx.stats.nodes_skipped += 1;
                continue;
            }
            cx.stats.nodes_visited += 1;

            let visitor = self.visitors.select(&node, &cx).ok_or_else(|| {
                DetachError::TypeMismatch(format!("no visitor accepts node {:?}", node))
            })?;
            trace!("visiting node: node='{:?}' visitor='{}'", node, visitor.name());

            let children = visitor.visit(&node, &mut cx)?;
            self.push_children(children, &seen, &mut stack);
        }

        debug!(
            "detach walk finished: visited={} skipped={} placeholders={} collections={}",
            cx.stats.nodes_visited,
            cx.stats.nodes_skipped,
            cx.stats.placeholders_built,
            cx.stats.collections_materialized
        );

        Ok(WalkOutcome {
            root,
            placeholders: cx.placeholders,
            nodes: cx.copier.into_nodes(),
            stats: cx.stats,
        })
    }

    // Strips a store wrapper from the root and returns the copy to walk.
    fn prepare_root(
        &self,
        root: &Value,
        cx: &mut VisitContext<'_>,
        stack: &mut Vec<Node>,
    ) -> Result<Value> {
        match root {
            Value::Proxy(proxy) => {
                let target = proxy.get()?;
                Ok(cx.copier.copy_value(&Value::Object(target)))
            }
            Value::PersistentCollection(collection) => {
                let mut children = Vec::new();
                let container = materialize(cx, collection, &mut children)?;
                self.push_children(children, &SeenSet::new(), stack);
                Ok(Value::Collection(container))
            }
            _ => Ok(cx.copier.copy_value(root)),
        }
    }

    fn push_children(&self, children: Vec<Value>, seen: &SeenSet, stack: &mut Vec<Node>) {
        // Reversed so the first child is visited first.
        for child in children.into_iter().rev() {
            if child.is_placeholder() {
                continue;
            }
            if let Some(node) = Node::from_value(&child) {
                if !seen.contains(&node) {
                    stack.push(node);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CollectionRef, Object, ObjectRef};
    use crate::detach::owned::OwnedGraph;
    use crate::metadata::{Catalog, EntityMetadata};

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                EntityMetadata::new("Node")
                    .identifier("id")
                    .scalar("id")
                    .reference("next", "Node"),
            )
            .unwrap()
    }

    #[test]
    fn test_cycle_terminates_with_one_visit_per_node() {
        let nodes: Vec<ObjectRef> = (0..5)
            .map(|i| ObjectRef::new(Object::new("Node").with("id", i).with("next", Value::Null)))
            .collect();
        for (i, node) in nodes.iter().enumerate() {
            node.set_property("next", nodes[(i + 1) % nodes.len()].clone());
        }

        let catalog = catalog();
        let config = DetachConfig::default();
        let registry = CollectionKindRegistry::default();
        let mut outcome = GraphWalker::new(&catalog, &config, &registry)
            .walk(&Value::Object(nodes[0].clone()))
            .unwrap();

        assert_eq!(outcome.stats.nodes_visited, 5);
        assert!(outcome.descriptors().is_empty());
        assert_eq!(outcome.nodes.len(), 5);

        // The copy closes the same cycle.
        let root = outcome.root.as_object().unwrap().clone();
        assert!(!root.ptr_eq(&nodes[0]));
        let mut current = root.clone();
        for _ in 0..5 {
            current = current.property("next").as_object().unwrap().clone();
        }
        assert!(current.ptr_eq(&root));

        let weak = root.downgrade();
        let mut copies = OwnedGraph::new(std::mem::take(&mut outcome.nodes));
        drop((outcome, root, current));
        assert_eq!(copies.release(), 5);
        assert!(!weak.is_alive());

        for node in &nodes {
            node.set_property("next", Value::Null);
        }
    }

    #[test]
    fn test_diamond_is_visited_once() {
        let shared = ObjectRef::new(Object::new("Leaf").with("v", 1));
        let left = ObjectRef::new(Object::new("Branch").with("leaf", shared.clone()));
        let right = ObjectRef::new(Object::new("Branch").with("leaf", shared.clone()));
        let root = ObjectRef::new(Object::new("Root").with("left", left).with("right", right));

        let catalog = Catalog::new();
        let config = DetachConfig::default();
        let registry = CollectionKindRegistry::default();
        let outcome = GraphWalker::new(&catalog, &config, &registry)
            .walk(&Value::Object(root))
            .unwrap();

        assert_eq!(outcome.stats.nodes_visited, 4);
        let copy = outcome.root.as_object().unwrap().clone();
        let left_leaf = copy.property("left").as_object().unwrap().property("leaf");
        let right_leaf = copy.property("right").as_object().unwrap().property("leaf");
        assert!(left_leaf.same(&right_leaf));
        assert!(!left_leaf.same(&Value::Object(shared)));
    }

    #[test]
    fn test_scalar_root() {
        let catalog = Catalog::new();
        let config = DetachConfig::default();
        let registry = CollectionKindRegistry::default();
        let outcome = GraphWalker::new(&catalog, &config, &registry)
            .walk(&Value::from(42))
            .unwrap();

        assert_eq!(outcome.root, Value::from(42));
        assert_eq!(outcome.stats.nodes_visited, 0);
    }

    #[test]
    fn test_container_root() {
        let element = ObjectRef::new(Object::new("Item"));
        let list = CollectionRef::list(vec![Value::Object(element.clone())]);

        let catalog = Catalog::new();
        let config = DetachConfig::default();
        let registry = CollectionKindRegistry::default();
        let outcome = GraphWalker::new(&catalog, &config, &registry)
            .walk(&Value::Collection(list.clone()))
            .unwrap();

        let copy = outcome.root.as_collection().unwrap().clone();
        assert!(!copy.ptr_eq(&list));
        assert!(copy.values()[0].as_object().is_some_and(|e| !e.ptr_eq(&element)));
        assert!(list.values()[0].as_object().is_some_and(|e| e.ptr_eq(&element)));
    }
}
