use super::seen::Node;
use crate::core::{CollectionRef, NodeId, ObjectRef, Value};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Identity-preserving structural copier.
///
/// Copies are shallow and made on demand: a copied node's fields still point
/// into the source graph until the walker visits it and rewrites each field
/// through the copier. A source node reached twice maps to one copy, so
/// shared substructure and cycles survive the copy.
#[derive(Default)]
pub struct GraphCopier {
    // source id -> (source, copy); the source handle pins its address
    copies: HashMap<NodeId, (Node, Node)>,
    produced: HashSet<NodeId>,
    adopted: Vec<Node>,
}

impl GraphCopier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of `value`. Initialized proxies are stripped to a copy of their
    /// target; everything else without node identity is returned as is.
    pub fn copy_value(&mut self, value: &Value) -> Value {
        match value {
            Value::Object(object) => Value::Object(self.copy_object(object)),
            Value::Collection(collection) => Value::Collection(self.copy_collection(collection)),
            Value::Proxy(proxy) => match proxy.implementation() {
                Some(target) => Value::Object(self.copy_object(&target)),
                None => value.clone(),
            },
            _ => value.clone(),
        }
    }

    pub fn copy_object(&mut self, source: &ObjectRef) -> ObjectRef {
        let id = source.node_id();
        if self.produced.contains(&id) {
            return source.clone();
        }
        if let Some((_, Node::Object(copy))) = self.copies.get(&id) {
            return copy.clone();
        }

        let copy = ObjectRef::new(source.read().clone());
        trace!("copied object: type='{}'", copy.type_name());
        self.remember(Node::Object(source.clone()), Node::Object(copy.clone()));
        copy
    }

    pub fn copy_collection(&mut self, source: &CollectionRef) -> CollectionRef {
        let id = source.node_id();
        if self.produced.contains(&id) {
            return source.clone();
        }
        if let Some((_, Node::Collection(copy))) = self.copies.get(&id) {
            return copy.clone();
        }

        let copy = CollectionRef::new(source.read().clone());
        self.remember(Node::Collection(source.clone()), Node::Collection(copy.clone()));
        copy
    }

    /// Registers a node built outside the copier as already belonging to the
    /// copied graph.
    pub fn adopt(&mut self, node: &Node) {
        if self.produced.insert(node.id()) {
            self.adopted.push(node.clone());
        }
    }

    /// Every node of the copied graph, releasing the source handles.
    pub fn into_nodes(self) -> Vec<Node> {
        self.copies
            .into_values()
            .map(|(_, copy)| copy)
            .chain(self.adopted)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.copies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    fn remember(&mut self, source: Node, copy: Node) {
        self.produced.insert(copy.id());
        self.copies.insert(source.id(), (source, copy));
    }
}
