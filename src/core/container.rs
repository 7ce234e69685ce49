use super::object::NodeId;
use super::Value;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Weak};

/// Abstract shape a plain container presents to its users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerShape {
    Sequence,
    SetOf,
    SortedSetOf,
    MapOf,
}

impl fmt::Display for ContainerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::SetOf => write!(f, "set"),
            Self::SortedSetOf => write!(f, "sorted-set"),
            Self::MapOf => write!(f, "map"),
        }
    }
}

/// Transport-safe in-memory container with no store affinity.
#[derive(Debug, Clone)]
pub enum Container {
    List(Vec<Value>),
    Set(Vec<Value>),
    SortedSet(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Container {
    pub fn empty(shape: ContainerShape) -> Self {
        match shape {
            ContainerShape::Sequence => Self::List(Vec::new()),
            ContainerShape::SetOf => Self::Set(Vec::new()),
            ContainerShape::SortedSetOf => Self::SortedSet(Vec::new()),
            ContainerShape::MapOf => Self::Map(Vec::new()),
        }
    }

    pub fn shape(&self) -> ContainerShape {
        match self {
            Self::List(_) => ContainerShape::Sequence,
            Self::Set(_) => ContainerShape::SetOf,
            Self::SortedSet(_) => ContainerShape::SortedSetOf,
            Self::Map(_) => ContainerShape::MapOf,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Self::List(items) | Self::Set(items) | Self::SortedSet(items) => items.len(),
            Self::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds an element. Sets ignore duplicates, sorted sets keep scalar order
    /// and append elements that have no defined ordering. Maps reject this.
    pub fn insert(&mut self, value: Value) -> bool {
        match self {
            Self::List(items) => {
                items.push(value);
                true
            }
            Self::Set(items) => {
                if items.contains(&value) {
                    return false;
                }
                items.push(value);
                true
            }
            Self::SortedSet(items) => {
                if items.contains(&value) {
                    return false;
                }
                let position = items
                    .iter()
                    .position(|existing| value.sort_cmp(existing) == Some(Ordering::Less))
                    .unwrap_or(items.len());
                items.insert(position, value);
                true
            }
            Self::Map(_) => false,
        }
    }

    /// Inserts or replaces a map entry. Non-map containers reject this.
    pub fn put(&mut self, key: Value, value: Value) -> Option<Value> {
        let Self::Map(entries) = self else {
            return None;
        };
        if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut entry.1, value));
        }
        entries.push((key, value));
        None
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Borrowing iteration over the elements; for maps, every key followed
    /// by its value.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Self::List(items) | Self::Set(items) | Self::SortedSet(items) => Box::new(items.iter()),
            Self::Map(entries) => Box::new(entries.iter().flat_map(|(k, v)| [k, v])),
        }
    }

    /// Element values; for maps, every key followed by its value.
    pub fn values(&self) -> Vec<Value> {
        match self {
            Self::List(items) | Self::Set(items) | Self::SortedSet(items) => items.clone(),
            Self::Map(entries) => entries
                .iter()
                .flat_map(|(k, v)| [k.clone(), v.clone()])
                .collect(),
        }
    }

    /// Rewrites every element (keys and values for maps) in place.
    pub fn map_in_place<F>(&mut self, mut f: F)
    where
        F: FnMut(&Value) -> Option<Value>,
    {
        match self {
            Self::List(items) | Self::Set(items) | Self::SortedSet(items) => {
                for item in items.iter_mut() {
                    if let Some(replacement) = f(item) {
                        *item = replacement;
                    }
                }
            }
            Self::Map(entries) => {
                for (key, value) in entries.iter_mut() {
                    if let Some(replacement) = f(key) {
                        *key = replacement;
                    }
                    if let Some(replacement) = f(value) {
                        *value = replacement;
                    }
                }
            }
        }
    }
}

/// Shared, identity-bearing handle to a [`Container`].
#[derive(Clone)]
pub struct CollectionRef(Arc<RwLock<Container>>);

impl CollectionRef {
    pub fn new(container: Container) -> Self {
        Self(Arc::new(RwLock::new(container)))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::new(Container::List(items.into_iter().collect()))
    }

    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut container = Container::Set(Vec::new());
        for item in items {
            container.insert(item);
        }
        Self::new(container)
    }

    pub fn sorted_set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut container = Container::SortedSet(Vec::new());
        for item in items {
            container.insert(item);
        }
        Self::new(container)
    }

    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut container = Container::Map(Vec::new());
        for (key, value) in entries {
            container.put(key, value);
        }
        Self::new(container)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Container> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Container> {
        self.0.write()
    }

    pub fn shape(&self) -> ContainerShape {
        self.0.read().shape()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn values(&self) -> Vec<Value> {
        self.0.read().values()
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::of(&self.0)
    }

    pub fn ptr_eq(&self, other: &CollectionRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn downgrade(&self) -> WeakCollectionRef {
        WeakCollectionRef(Arc::downgrade(&self.0))
    }
}

/// Non-owning handle to a container.
#[derive(Clone, Default)]
pub struct WeakCollectionRef(Weak<RwLock<Container>>);

impl WeakCollectionRef {
    pub fn upgrade(&self) -> Option<CollectionRef> {
        self.0.upgrade().map(CollectionRef)
    }
}

impl fmt::Debug for WeakCollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(collection) => write!(f, "{:?}", collection),
            None => write!(f, "<dropped>"),
        }
    }
}

impl fmt::Debug for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(container) => write!(f, "{}[{}]", container.shape(), container.len()),
            None => write!(f, "<locked>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_ignores_duplicates() {
        let set = CollectionRef::set(vec![Value::from(1), Value::from(1), Value::from(2)]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_sorted_set_orders_scalars() {
        let set = CollectionRef::sorted_set(vec![Value::from("c"), Value::from("a"), Value::from("b")]);
        assert_eq!(
            set.values(),
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );
    }

    #[test]
    fn test_map_put_replaces() {
        let map = CollectionRef::map(vec![(Value::from("k"), Value::from(1))]);
        let previous = map.write().put(Value::from("k"), Value::from(2));

        assert_eq!(previous, Some(Value::from(1)));
        assert_eq!(map.read().get(&Value::from("k")), Some(&Value::from(2)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_map_values_include_keys() {
        let map = CollectionRef::map(vec![(Value::from("k"), Value::from("v"))]);
        assert_eq!(map.values(), vec![Value::from("k"), Value::from("v")]);
        assert!(!map.write().insert(Value::from("x")));
    }
}
