use super::{CollectionRef, DetachError, ObjectRef, Result};
use crate::detach::placeholder::Placeholder;
use crate::store::{EntityProxy, PersistentCollection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Identifier of a store-managed entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identifier {
    Integer(i64),
    Text(String),
    Uuid(Uuid),
}

impl Identifier {
    /// Reads an identifier out of a scalar value. `Null` and non-key scalars yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(Self::Integer(*i)),
            Value::Text(s) => Some(Self::Text(s.clone())),
            Value::Uuid(u) => Some(Self::Uuid(*u)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(i) => Value::Integer(*i),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Uuid(u) => Value::Uuid(*u),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "{}", s),
            Self::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl From<i64> for Identifier {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Identifier {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Uuid> for Identifier {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

/// A node or leaf of an object graph.
///
/// Scalars are plain data. `Object` and `Collection` are shared handles with
/// identity. `Proxy` and `PersistentCollection` are store-native values that
/// carry session affinity; `Placeholder` is their transport-safe stand-in.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Object(ObjectRef),
    Collection(CollectionRef),
    Proxy(EntityProxy),
    PersistentCollection(PersistentCollection),
    Placeholder(Placeholder),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Boolean(_) => "BOOLEAN",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Uuid(_) => "UUID",
            Self::Timestamp(_) => "TIMESTAMP",
            Self::Object(_) => "OBJECT",
            Self::Collection(_) => "COLLECTION",
            Self::Proxy(_) => "PROXY",
            Self::PersistentCollection(_) => "PERSISTENT_COLLECTION",
            Self::Placeholder(_) => "PLACEHOLDER",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Null
                | Self::Boolean(_)
                | Self::Integer(_)
                | Self::Float(_)
                | Self::Text(_)
                | Self::Uuid(_)
                | Self::Timestamp(_)
        )
    }

    /// True for values that still reference a store session.
    pub fn is_store_bound(&self) -> bool {
        matches!(self, Self::Proxy(_) | Self::PersistentCollection(_))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    /// Whether the value's data is available without touching the store.
    pub fn is_initialized(&self) -> bool {
        match self {
            Self::Proxy(proxy) => proxy.is_initialized(),
            Self::PersistentCollection(collection) => collection.was_initialized(),
            Self::Placeholder(_) => false,
            _ => true,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Self::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&EntityProxy> {
        match self {
            Self::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn as_persistent_collection(&self) -> Option<&PersistentCollection> {
        match self {
            Self::PersistentCollection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_placeholder(&self) -> Option<&Placeholder> {
        match self {
            Self::Placeholder(placeholder) => Some(placeholder),
            _ => None,
        }
    }

    /// Returns the entity behind this value, initializing a proxy if needed.
    ///
    /// A placeholder only answers once it has been resolved; use
    /// `ObjectRef::resolve_property` to resolve it against a store.
    pub fn entity(&self) -> Result<ObjectRef> {
        match self {
            Self::Object(object) => Ok(object.clone()),
            Self::Proxy(proxy) => proxy.get(),
            Self::Placeholder(placeholder) => match placeholder.resolved() {
                Some(value) => value.entity(),
                None => Err(DetachError::Unresolved(placeholder.descriptor().to_string())),
            },
            other => Err(DetachError::TypeMismatch(format!(
                "expected an entity, got {}",
                other.type_name()
            ))),
        }
    }

    /// Identity comparison for handles, value comparison for scalars.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Collection(a), Self::Collection(b)) => a.ptr_eq(b),
            (Self::Proxy(a), Self::Proxy(b)) => a.ptr_eq(b),
            (Self::PersistentCollection(a), Self::PersistentCollection(b)) => a.ptr_eq(b),
            (Self::Placeholder(a), Self::Placeholder(b)) => a.ptr_eq(b),
            _ => self == other,
        }
    }

    /// Ordering used by sorted containers. Only scalars of compatible kinds compare.
    pub fn sort_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) => Some(Ordering::Less),
            (_, Self::Null) => Some(Ordering::Greater),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Integer(i), Self::Float(f)) => (*i as f64).partial_cmp(f),
            (Self::Float(f), Self::Integer(i)) => f.partial_cmp(&(*i as f64)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    return true;
                }
                (a - b).abs() < f64::EPSILON
            }
            (Self::Integer(i), Self::Float(f)) | (Self::Float(f), Self::Integer(i)) => {
                (*i as f64 - f).abs() < f64::EPSILON
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Collection(a), Self::Collection(b)) => a.ptr_eq(b),
            // Two proxies are equal when they stand for the same entity.
            (Self::Proxy(a), Self::Proxy(b)) => a.reference() == b.reference(),
            (Self::PersistentCollection(a), Self::PersistentCollection(b)) => a.ptr_eq(b),
            (Self::Placeholder(a), Self::Placeholder(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Text(s) => write!(f, "{}", s),
            Self::Uuid(u) => write!(f, "{}", u),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Object(object) => write!(f, "{:?}", object),
            Self::Collection(collection) => write!(f, "{:?}", collection),
            Self::Proxy(proxy) => write!(f, "{:?}", proxy),
            Self::PersistentCollection(collection) => write!(f, "{:?}", collection),
            Self::Placeholder(placeholder) => write!(f, "{:?}", placeholder),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Self::Object(object)
    }
}

impl From<CollectionRef> for Value {
    fn from(collection: CollectionRef) -> Self {
        Self::Collection(collection)
    }
}

impl From<EntityProxy> for Value {
    fn from(proxy: EntityProxy) -> Self {
        Self::Proxy(proxy)
    }
}

impl From<PersistentCollection> for Value {
    fn from(collection: PersistentCollection) -> Self {
        Self::PersistentCollection(collection)
    }
}

impl From<Placeholder> for Value {
    fn from(placeholder: Placeholder) -> Self {
        Self::Placeholder(placeholder)
    }
}

impl From<Identifier> for Value {
    fn from(id: Identifier) -> Self {
        id.to_value()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
