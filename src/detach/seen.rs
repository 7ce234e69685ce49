use crate::core::{CollectionRef, NodeId, ObjectRef, Value};
use std::collections::HashMap;
use std::fmt;

/// A walkable node of the graph: an object or a plain container.
#[derive(Clone)]
pub enum Node {
    Object(ObjectRef),
    Collection(CollectionRef),
}

impl Node {
    /// The node behind `value`, if it has identity.
    pub fn from_value(value: &Value) -> Option<Node> {
        match value {
            Value::Object(object) => Some(Node::Object(object.clone())),
            Value::Collection(collection) => Some(Node::Collection(collection.clone())),
            _ => None,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Self::Object(object) => object.node_id(),
            Self::Collection(collection) => collection.node_id(),
        }
    }

    pub(crate) fn strong_count(&self) -> usize {
        match self {
            Self::Object(object) => object.strong_count(),
            Self::Collection(collection) => collection.strong_count(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Object(object) => Value::Object(object.clone()),
            Self::Collection(collection) => Value::Collection(collection.clone()),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(object) => write!(f, "{:?}", object),
            Self::Collection(collection) => write!(f, "{:?}", collection),
        }
    }
}

/// Identity-keyed set of nodes visited during one walk.
///
/// Keeps a handle to every entry so an address cannot be reused by a new
/// allocation while the set is alive.
#[derive(Default)]
pub struct SeenSet {
    nodes: HashMap<NodeId, Node>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `node` as seen; false if it already was.
    pub fn add(&mut self, node: &Node) -> bool {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.nodes.insert(id, node.clone());
        true
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.nodes.contains_key(&node.id())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Object;

    #[test]
    fn test_identity_semantics() {
        let a = ObjectRef::new(Object::new("Person").with("id", 1));
        let twin = ObjectRef::new(Object::new("Person").with("id", 1));
        let mut seen = SeenSet::new();

        assert!(seen.add(&Node::Object(a.clone())));
        assert!(!seen.add(&Node::Object(a.clone())));
        assert!(seen.contains(&Node::Object(a)));
        assert!(!seen.contains(&Node::Object(twin)));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_scalars_are_not_nodes() {
        assert!(Node::from_value(&Value::from(1)).is_none());
        assert!(Node::from_value(&Value::Null).is_none());
        assert!(Node::from_value(&Value::Collection(CollectionRef::list(vec![]))).is_some());
    }
}
