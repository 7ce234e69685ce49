use super::{CollectionKey, LazyLoader};
use crate::core::{Container, DetachError, ObjectRef, Result, WeakObjectRef};
use crate::detach::collection_kind::CollectionKind;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

struct CollectionState {
    kind: CollectionKind,
    key: CollectionKey,
    owner: RwLock<WeakObjectRef>,
    contents: RwLock<Option<Container>>,
    loader: Option<Weak<dyn LazyLoader>>,
}

/// Store-native lazily loaded collection, registered in a session under
/// `(role, owner id)`.
#[derive(Clone)]
pub struct PersistentCollection(Arc<CollectionState>);

impl PersistentCollection {
    pub fn uninitialized(
        kind: CollectionKind,
        key: CollectionKey,
        loader: Weak<dyn LazyLoader>,
    ) -> Self {
        Self(Arc::new(CollectionState {
            kind,
            key,
            owner: RwLock::new(WeakObjectRef::default()),
            contents: RwLock::new(None),
            loader: Some(loader),
        }))
    }

    /// A collection whose elements are already present.
    pub fn initialized(kind: CollectionKind, key: CollectionKey, contents: Container) -> Self {
        Self(Arc::new(CollectionState {
            kind,
            key,
            owner: RwLock::new(WeakObjectRef::default()),
            contents: RwLock::new(Some(contents)),
            loader: None,
        }))
    }

    pub fn kind(&self) -> CollectionKind {
        self.0.kind
    }

    pub fn key(&self) -> &CollectionKey {
        &self.0.key
    }

    pub fn set_owner(&self, owner: &ObjectRef) {
        *self.0.owner.write() = owner.downgrade();
    }

    pub fn owner(&self) -> Option<ObjectRef> {
        self.0.owner.read().upgrade()
    }

    pub fn was_initialized(&self) -> bool {
        self.0.contents.read().is_some()
    }

    /// Snapshot of the loaded elements, `None` when not initialized.
    pub fn contents(&self) -> Option<Container> {
        self.0.contents.read().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.0
            .loader
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|loader| loader.is_open())
    }

    /// Loads the elements through the owning session if not done yet.
    pub fn initialize(&self) -> Result<()> {
        if self.was_initialized() {
            return Ok(());
        }

        let loader = self
            .0
            .loader
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| DetachError::SessionClosed(self.0.key.to_string()))?;

        trace!("initializing collection: key='{}'", self.0.key);
        let loaded = loader.load_collection(self)?;

        let mut contents = self.0.contents.write();
        if contents.is_none() {
            *contents = Some(loaded);
        }
        Ok(())
    }

    /// Elements of the collection, loading them on first access.
    pub fn items(&self) -> Result<Container> {
        self.initialize()?;
        self.contents()
            .ok_or_else(|| DetachError::StaleCollection(self.0.key.to_string()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn ptr_eq(&self, other: &PersistentCollection) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for PersistentCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.0.contents.try_read() {
            Some(contents) if contents.is_some() => "initialized",
            Some(_) => "uninitialized",
            None => "<locked>",
        };
        write!(f, "PersistentCollection({} {}, {})", self.0.kind, self.0.key, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Object, Value};

    #[test]
    fn test_initialized_collection_reads_without_loader() {
        let contents = Container::Set(vec![Value::from(1), Value::from(2)]);
        let collection = PersistentCollection::initialized(
            CollectionKind::Set,
            CollectionKey::new("Company.persons", 1),
            contents,
        );

        assert!(collection.was_initialized());
        assert_eq!(collection.len().unwrap(), 2);
    }

    #[test]
    fn test_owner_is_weak() {
        let collection = PersistentCollection::initialized(
            CollectionKind::Bag,
            CollectionKey::new("Tree.children", 1),
            Container::List(Vec::new()),
        );
        let owner = ObjectRef::new(Object::new("Tree"));
        collection.set_owner(&owner);
        assert!(collection.owner().is_some_and(|o| o.ptr_eq(&owner)));

        drop(owner);
        assert!(collection.owner().is_none());
    }

    #[test]
    fn test_uninitialized_without_session() {
        let loader: Weak<dyn LazyLoader> = Weak::<crate::store::MemorySession>::new();
        let collection = PersistentCollection::uninitialized(
            CollectionKind::Set,
            CollectionKey::new("Company.persons", 1),
            loader,
        );

        assert!(!collection.was_initialized());
        assert!(matches!(
            collection.items(),
            Err(DetachError::SessionClosed(_))
        ));
    }
}
