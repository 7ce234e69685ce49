use crate::core::{CollectionRef, Container, ContainerShape, Result, Value};
use crate::store::{CollectionKey, PersistentCollection, StoreHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Kind of a store-native collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    /// Unordered list allowing duplicates.
    Bag,
    Set,
    SortedSet,
    Map,
}

impl CollectionKind {
    /// The plain container shape standing in for this kind.
    pub fn shape(self) -> ContainerShape {
        match self {
            Self::Bag => ContainerShape::Sequence,
            Self::Set => ContainerShape::SetOf,
            Self::SortedSet => ContainerShape::SortedSetOf,
            Self::Map => ContainerShape::MapOf,
        }
    }

    pub fn is_map(self) -> bool {
        matches!(self, Self::Map)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bag => write!(f, "bag"),
            Self::Set => write!(f, "set"),
            Self::SortedSet => write!(f, "sorted-set"),
            Self::Map => write!(f, "map"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct KindEntry {
    kind: CollectionKind,
    shape: ContainerShape,
}

/// Maps collection kinds to their uninitialized constructors and plain
/// container equivalents.
///
/// Entries are ordered most specific first; lookups by shape take the first
/// match.
#[derive(Debug, Clone)]
pub struct CollectionKindRegistry {
    entries: Vec<KindEntry>,
}

impl CollectionKindRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, kind: CollectionKind, shape: ContainerShape) {
        self.entries.retain(|entry| entry.kind != kind);
        self.entries.push(KindEntry { kind, shape });
    }

    /// Registry with the four standard kinds.
    pub fn with_default_kinds() -> Self {
        let mut registry = Self::new();
        for kind in [
            CollectionKind::SortedSet,
            CollectionKind::Set,
            CollectionKind::Map,
            CollectionKind::Bag,
        ] {
            registry.register(kind, kind.shape());
        }
        registry
    }

    pub fn kind_of(&self, collection: &PersistentCollection) -> CollectionKind {
        collection.kind()
    }

    pub fn create_uninitialized_shell(
        &self,
        kind: CollectionKind,
        handle: &dyn StoreHandle,
        key: &CollectionKey,
    ) -> PersistentCollection {
        trace!("creating collection shell: kind='{}' key='{}'", kind, key);
        handle.construct_uninitialized_collection_shell(kind, key)
    }

    pub fn create_plain_container(&self, kind: CollectionKind) -> Container {
        Container::empty(self.plain_interface_of(kind))
    }

    pub fn plain_interface_of(&self, kind: CollectionKind) -> ContainerShape {
        self.entries
            .iter()
            .find(|entry| entry.kind == kind)
            .map(|entry| entry.shape)
            .unwrap_or_else(|| kind.shape())
    }

    /// Copies the loaded elements of `collection` into `target`, a fresh
    /// plain container, passing every element (keys and values for maps)
    /// through `deproxy`.
    pub fn materialize<F>(
        &self,
        collection: &PersistentCollection,
        target: &CollectionRef,
        mut deproxy: F,
    ) -> Result<()>
    where
        F: FnMut(&Value) -> Result<Value>,
    {
        let source = collection.items()?;
        let mut container = self.create_plain_container(self.kind_of(collection));

        match &source {
            Container::Map(entries) => {
                for (key, value) in entries {
                    container.put(deproxy(key)?, deproxy(value)?);
                }
            }
            _ => {
                for item in source.values() {
                    container.insert(deproxy(&item)?);
                }
            }
        }

        *target.write() = container;
        Ok(())
    }
}

impl Default for CollectionKindRegistry {
    fn default() -> Self {
        Self::with_default_kinds()
    }
}
