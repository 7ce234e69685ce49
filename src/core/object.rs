use super::Value;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

/// Address-based identity of a graph node, stable while the node is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn of<T>(arc: &Arc<T>) -> Self {
        NodeId(Arc::as_ptr(arc) as *const () as usize)
    }
}

/// A dynamically typed object: a type name plus its named fields.
///
/// The field table is the object's "visitable fields" capability: every
/// property the walker may inspect must be declared here.
#[derive(Debug, Clone, Default)]
pub struct Object {
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl Object {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field declaration.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Declares or overwrites a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Resets every field to `Null`, keeping the declarations. Returns the
    /// previous values so the caller can drop them outside the lock.
    pub fn clear_values(&mut self) -> Vec<Value> {
        self.fields
            .values_mut()
            .map(|value| std::mem::replace(value, Value::Null))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Shared handle to an [`Object`]. Cloning the handle never copies the object.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Object>>);

impl ObjectRef {
    pub fn new(object: Object) -> Self {
        Self(Arc::new(RwLock::new(object)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Object> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Object> {
        self.0.write()
    }

    pub fn type_name(&self) -> String {
        self.0.read().type_name().to_string()
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::of(&self.0)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Arc::downgrade(&self.0))
    }

    /// Raw field read, `None` when the object does not declare the field.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.0.read().get(name).cloned()
    }

    /// Property read that tolerates unexpected object shapes: a missing
    /// field is logged and read as `Null`.
    pub fn property(&self, name: &str) -> Value {
        let object = self.0.read();
        match object.get(name) {
            Some(value) => value.clone(),
            None => {
                warn!(
                    "cannot read property: type='{}' property='{}'",
                    object.type_name(),
                    name
                );
                Value::Null
            }
        }
    }

    /// Property write for declared fields only. Writing an undeclared field
    /// is logged and ignored; the return value tells whether it was applied.
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> bool {
        let mut object = self.0.write();
        if !object.has_field(name) {
            warn!(
                "cannot write property: type='{}' property='{}'",
                object.type_name(),
                name
            );
            return false;
        }
        object.insert(name, value);
        true
    }
}

impl fmt::Debug for ObjectRef {
    // Shallow: graphs may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(object) => write!(f, "{}@{:x}", object.type_name(), self.node_id().0),
            None => write!(f, "<locked>@{:x}", self.node_id().0),
        }
    }
}

/// Non-owning handle to an object, used where a strong handle would close a
/// reference cycle (a placeholder pointing back at its owner).
#[derive(Clone, Default)]
pub struct WeakObjectRef(Weak<RwLock<Object>>);

impl WeakObjectRef {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(object) => write!(f, "{:?}", object),
            None => write!(f, "<dropped>"),
        }
    }
}
