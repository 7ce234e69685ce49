// ============================================================================
// Graph Snapshots
// ============================================================================
//
// Flat, serde-friendly encoding of a detached graph. Objects and containers
// are numbered on first sight and referenced by index, so shared nodes and
// cycles survive the round trip. Placeholders are written as their
// descriptors, with the owner implied by the record that holds them.
//
// Store-bound values have no encoding: a graph must be detached first.
//
// ============================================================================

use crate::core::{
    CollectionRef, Container, ContainerShape, DetachError, NodeId, Object, ObjectRef, Result, Value,
};
use crate::detach::{CollectionKind, Node, Placeholder, PropertyDescriptor};
use crate::store::{CollectionKey, EntityReference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Object(usize),
    Container(usize),
    Placeholder(DescriptorRecord),
}

/// A placeholder's descriptor without its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DescriptorRecord {
    Reference {
        property: String,
        target: EntityReference,
        declared_type: String,
    },
    Collection {
        property: String,
        kind: CollectionKind,
        key: CollectionKey,
    },
    Element {
        target: EntityReference,
    },
}

impl From<&PropertyDescriptor> for DescriptorRecord {
    fn from(descriptor: &PropertyDescriptor) -> Self {
        match descriptor {
            PropertyDescriptor::Reference(d) => Self::Reference {
                property: d.property.clone(),
                target: d.target.clone(),
                declared_type: d.declared_type.clone(),
            },
            PropertyDescriptor::Collection(d) => Self::Collection {
                property: d.property.clone(),
                kind: d.kind,
                key: d.key.clone(),
            },
            PropertyDescriptor::Element(d) => Self::Element {
                target: d.target.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub type_name: String,
    pub fields: Vec<(String, SnapshotValue)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContainerRecord {
    List(Vec<SnapshotValue>),
    Set(Vec<SnapshotValue>),
    SortedSet(Vec<SnapshotValue>),
    Map(Vec<(SnapshotValue, SnapshotValue)>),
}

impl ContainerRecord {
    fn empty(shape: ContainerShape) -> Self {
        match shape {
            ContainerShape::Sequence => Self::List(Vec::new()),
            ContainerShape::SetOf => Self::Set(Vec::new()),
            ContainerShape::SortedSetOf => Self::SortedSet(Vec::new()),
            ContainerShape::MapOf => Self::Map(Vec::new()),
        }
    }

    fn shape(&self) -> ContainerShape {
        match self {
            Self::List(_) => ContainerShape::Sequence,
            Self::Set(_) => ContainerShape::SetOf,
            Self::SortedSet(_) => ContainerShape::SortedSetOf,
            Self::Map(_) => ContainerShape::MapOf,
        }
    }
}

/// A graph rebuilt from a snapshot, with every placeholder found in it.
#[derive(Debug)]
pub struct RestoredGraph {
    pub root: Value,
    pub placeholders: Vec<Placeholder>,
    /// Every object and container rebuilt.
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub root: SnapshotValue,
    pub objects: Vec<ObjectRecord>,
    pub containers: Vec<ContainerRecord>,
}

impl GraphSnapshot {
    /// Encodes the graph reachable from `root`.
    ///
    /// Fails with `SessionBound` on any proxy or persistent collection.
    pub fn capture(root: &Value) -> Result<Self> {
        let mut capture = Capture::default();
        let root = capture.encode(root)?;

        while let Some(pending) = capture.pending.pop() {
            match pending {
                Pending::Object(object, index) => {
                    let fields: Vec<(String, Value)> = object
                        .read()
                        .fields()
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    let mut encoded = Vec::with_capacity(fields.len());
                    for (name, value) in fields {
                        encoded.push((name, capture.encode(&value)?));
                    }
                    capture.objects[index].fields = encoded;
                }
                Pending::Container(collection, index) => {
                    let container = collection.read().clone();
                    capture.containers[index] = capture.encode_container(&container)?;
                }
            }
        }

        debug!(
            "graph captured: objects={} containers={}",
            capture.objects.len(),
            capture.containers.len()
        );

        Ok(Self {
            root,
            objects: capture.objects,
            containers: capture.containers,
        })
    }

    /// Rebuilds the graph. Every placeholder comes back unresolved and bound
    /// to its rebuilt owner.
    pub fn restore(&self) -> Result<RestoredGraph> {
        let objects: Vec<ObjectRef> = self
            .objects
            .iter()
            .map(|record| ObjectRef::new(Object::new(record.type_name.clone())))
            .collect();
        let containers: Vec<CollectionRef> = self
            .containers
            .iter()
            .map(|record| CollectionRef::new(Container::empty(record.shape())))
            .collect();

        let mut restore = Restore {
            objects: &objects,
            containers: &containers,
            placeholders: Vec::new(),
        };

        for (record, object) in self.objects.iter().zip(&objects) {
            for (name, value) in &record.fields {
                let value = restore.decode(value, Holder::Object(object))?;
                object.write().insert(name.clone(), value);
            }
        }

        for (record, collection) in self.containers.iter().zip(&containers) {
            let holder = Holder::Container(collection);
            let container = match record {
                ContainerRecord::List(items) => Container::List(restore.decode_all(items, holder)?),
                ContainerRecord::Set(items) => Container::Set(restore.decode_all(items, holder)?),
                ContainerRecord::SortedSet(items) => {
                    Container::SortedSet(restore.decode_all(items, holder)?)
                }
                ContainerRecord::Map(entries) => {
                    let mut decoded = Vec::with_capacity(entries.len());
                    for (key, value) in entries {
                        decoded.push((restore.decode(key, holder)?, restore.decode(value, holder)?));
                    }
                    Container::Map(decoded)
                }
            };
            *collection.write() = container;
        }

        let root = restore.decode(&self.root, Holder::Root)?;
        let placeholders = restore.placeholders;
        let nodes = objects
            .into_iter()
            .map(Node::Object)
            .chain(containers.into_iter().map(Node::Collection))
            .collect();
        Ok(RestoredGraph {
            root,
            placeholders,
            nodes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the snapshot to `path` through a temporary file, so a crash
    /// never leaves a truncated snapshot behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, self.to_bytes()?)?;
        fs::rename(&tmp_path, path)?;

        debug!("snapshot saved: path='{}'", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }
}

// ============================================================================
// Capture
// ============================================================================

enum Pending {
    Object(ObjectRef, usize),
    Container(CollectionRef, usize),
}

#[derive(Default)]
struct Capture {
    objects: Vec<ObjectRecord>,
    containers: Vec<ContainerRecord>,
    object_index: HashMap<NodeId, usize>,
    container_index: HashMap<NodeId, usize>,
    pending: Vec<Pending>,
}

impl Capture {
    fn encode(&mut self, value: &Value) -> Result<SnapshotValue> {
        Ok(match value {
            Value::Null => SnapshotValue::Null,
            Value::Boolean(b) => SnapshotValue::Boolean(*b),
            Value::Integer(i) => SnapshotValue::Integer(*i),
            Value::Float(f) => SnapshotValue::Float(*f),
            Value::Text(s) => SnapshotValue::Text(s.clone()),
            Value::Uuid(u) => SnapshotValue::Uuid(*u),
            Value::Timestamp(t) => SnapshotValue::Timestamp(*t),
            Value::Object(object) => SnapshotValue::Object(self.object_index(object)),
            Value::Collection(collection) => {
                SnapshotValue::Container(self.container_index(collection))
            }
            Value::Placeholder(placeholder) => {
                SnapshotValue::Placeholder(DescriptorRecord::from(placeholder.descriptor()))
            }
            Value::Proxy(_) | Value::PersistentCollection(_) => {
                return Err(DetachError::SessionBound(value.type_name().to_string()));
            }
        })
    }

    fn encode_all(&mut self, items: &[Value]) -> Result<Vec<SnapshotValue>> {
        items.iter().map(|item| self.encode(item)).collect()
    }

    fn encode_container(&mut self, container: &Container) -> Result<ContainerRecord> {
        Ok(match container {
            Container::List(items) => ContainerRecord::List(self.encode_all(items)?),
            Container::Set(items) => ContainerRecord::Set(self.encode_all(items)?),
            Container::SortedSet(items) => ContainerRecord::SortedSet(self.encode_all(items)?),
            Container::Map(entries) => {
                let mut encoded = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    encoded.push((self.encode(key)?, self.encode(value)?));
                }
                ContainerRecord::Map(encoded)
            }
        })
    }

    fn object_index(&mut self, object: &ObjectRef) -> usize {
        if let Some(index) = self.object_index.get(&object.node_id()) {
            return *index;
        }
        let index = self.objects.len();
        self.objects.push(ObjectRecord {
            type_name: object.type_name(),
            fields: Vec::new(),
        });
        self.object_index.insert(object.node_id(), index);
        self.pending.push(Pending::Object(object.clone(), index));
        index
    }

    fn container_index(&mut self, collection: &CollectionRef) -> usize {
        if let Some(index) = self.container_index.get(&collection.node_id()) {
            return *index;
        }
        let index = self.containers.len();
        self.containers.push(ContainerRecord::empty(collection.shape()));
        self.container_index.insert(collection.node_id(), index);
        self.pending.push(Pending::Container(collection.clone(), index));
        index
    }
}

// ============================================================================
// Restore
// ============================================================================

#[derive(Clone, Copy)]
enum Holder<'a> {
    Root,
    Object(&'a ObjectRef),
    Container(&'a CollectionRef),
}

struct Restore<'a> {
    objects: &'a [ObjectRef],
    containers: &'a [CollectionRef],
    placeholders: Vec<Placeholder>,
}

impl Restore<'_> {
    fn decode_all(&mut self, items: &[SnapshotValue], holder: Holder<'_>) -> Result<Vec<Value>> {
        items.iter().map(|item| self.decode(item, holder)).collect()
    }

    fn decode(&mut self, value: &SnapshotValue, holder: Holder<'_>) -> Result<Value> {
        Ok(match value {
            SnapshotValue::Null => Value::Null,
            SnapshotValue::Boolean(b) => Value::Boolean(*b),
            SnapshotValue::Integer(i) => Value::Integer(*i),
            SnapshotValue::Float(f) => Value::Float(*f),
            SnapshotValue::Text(s) => Value::Text(s.clone()),
            SnapshotValue::Uuid(u) => Value::Uuid(*u),
            SnapshotValue::Timestamp(t) => Value::Timestamp(*t),
            SnapshotValue::Object(index) => self
                .objects
                .get(*index)
                .map(|object| Value::Object(object.clone()))
                .ok_or_else(|| dangling("object", *index))?,
            SnapshotValue::Container(index) => self
                .containers
                .get(*index)
                .map(|collection| Value::Collection(collection.clone()))
                .ok_or_else(|| dangling("container", *index))?,
            SnapshotValue::Placeholder(record) => {
                let placeholder = Placeholder::read_resolve(descriptor(record, holder)?);
                self.placeholders.push(placeholder.clone());
                Value::Placeholder(placeholder)
            }
        })
    }
}

fn descriptor(record: &DescriptorRecord, holder: Holder<'_>) -> Result<PropertyDescriptor> {
    match (record, holder) {
        (
            DescriptorRecord::Reference {
                property,
                target,
                declared_type,
            },
            Holder::Object(owner),
        ) => Ok(PropertyDescriptor::reference(
            owner,
            property.clone(),
            target.clone(),
            declared_type.clone(),
        )),
        (DescriptorRecord::Collection { property, kind, key }, Holder::Object(owner)) => Ok(
            PropertyDescriptor::collection(owner, property.clone(), *kind, key.clone()),
        ),
        (DescriptorRecord::Element { target }, Holder::Container(container)) => Ok(
            PropertyDescriptor::element(container.downgrade(), target.clone()),
        ),
        (record, _) => Err(DetachError::Serialization(format!(
            "placeholder {:?} is held by the wrong kind of node",
            record
        ))),
    }
}

fn dangling(kind: &str, index: usize) -> DetachError {
    DetachError::Serialization(format!("dangling {} index {}", kind, index))
}
