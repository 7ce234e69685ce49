use super::seen::Node;
use crate::core::{Container, NodeId, Value};
use std::collections::HashMap;
use tracing::{debug, trace};

/// The objects and containers a detach or a restore created.
///
/// Detached graphs keep their back references as strong handles, so a
/// parent/child pair never frees itself. `release` severs every node nothing
/// outside the graph can still reach; nodes reachable from a handle held
/// elsewhere (a root the caller kept, a session identity map) are left
/// untouched.
#[derive(Default)]
pub struct OwnedGraph {
    nodes: Vec<Node>,
}

impl OwnedGraph {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Gives up the nodes, severing the unreachable ones. Returns how many
    /// were severed.
    pub fn release(&mut self) -> usize {
        let nodes = std::mem::take(&mut self.nodes);
        if nodes.is_empty() {
            return 0;
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            index.entry(node.id()).or_insert(position);
        }

        // Handles held by other nodes of the graph, plus one per entry of
        // `nodes` itself.
        let mut internal = vec![0usize; nodes.len()];
        for (position, node) in nodes.iter().enumerate() {
            if index.get(&node.id()) != Some(&position) {
                internal[index[&node.id()]] += 1;
                continue;
            }
            internal[position] += 1;
            for child in children(node) {
                if let Some(&target) = index.get(&child) {
                    internal[target] += 1;
                }
            }
        }

        let mut reachable: Vec<bool> = nodes
            .iter()
            .zip(&internal)
            .map(|(node, held)| node.strong_count() > *held)
            .collect();
        let mut stack: Vec<usize> = (0..nodes.len()).filter(|&i| reachable[i]).collect();
        while let Some(position) = stack.pop() {
            for child in children(&nodes[position]) {
                if let Some(&target) = index.get(&child) {
                    if !reachable[target] {
                        reachable[target] = true;
                        stack.push(target);
                    }
                }
            }
        }

        let mut severed = 0;
        for (position, node) in nodes.iter().enumerate() {
            if reachable[position] || index.get(&node.id()) != Some(&position) {
                continue;
            }
            sever(node);
            severed += 1;
        }

        if severed > 0 {
            debug!(
                "released detached graph: nodes={} severed={}",
                nodes.len(),
                severed
            );
        } else {
            trace!("detached graph still in use: nodes={}", nodes.len());
        }
        severed
    }
}

fn node_id(value: &Value) -> Option<NodeId> {
    match value {
        Value::Object(object) => Some(object.node_id()),
        Value::Collection(collection) => Some(collection.node_id()),
        _ => None,
    }
}

fn children(node: &Node) -> Vec<NodeId> {
    match node {
        Node::Object(object) => object
            .read()
            .fields()
            .filter_map(|(_, value)| node_id(value))
            .collect(),
        Node::Collection(collection) => collection.read().iter().filter_map(node_id).collect(),
    }
}

// Drops the node's outgoing handles once the lock is released.
fn sever(node: &Node) {
    match node {
        Node::Object(object) => {
            let previous = object.write().clear_values();
            drop(previous);
        }
        Node::Collection(collection) => {
            let previous = {
                let mut container = collection.write();
                let shape = container.shape();
                std::mem::replace(&mut *container, Container::empty(shape))
            };
            drop(previous);
        }
    }
}
