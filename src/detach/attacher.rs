use super::collection_kind::CollectionKindRegistry;
use super::descriptor::{CollectionDescriptor, PropertyDescriptor};
use crate::core::{ObjectRef, Result, Value};
use crate::store::{
    EntityReference, IdentityKey, PersistentCollection, StoreHandle, StoreHandleProvider,
};
use tracing::{debug, warn};

/// Outcome of re-validating a reattached collection against its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidation {
    /// The store still tracks the same wrapper.
    Unchanged,
    /// The store had lost the wrapper; it was registered again.
    Registered,
    /// The store holds a different wrapper, now written into the owner.
    Replaced,
    /// Nothing to check: no handle, no owner, or the property holds no
    /// store collection yet.
    Skipped,
}

/// Reattachment engine.
///
/// Turns descriptors back into lazily loadable store values inside the
/// session that is current for the target type. Never fetches.
pub struct Attacher<'a> {
    stores: &'a dyn StoreHandleProvider,
    registry: &'a CollectionKindRegistry,
}

impl<'a> Attacher<'a> {
    pub fn new(stores: &'a dyn StoreHandleProvider, registry: &'a CollectionKindRegistry) -> Self {
        Self { stores, registry }
    }

    /// Live value for `descriptor`, or `None` when no store handle is
    /// available or the owner is gone.
    pub fn reattach(&self, descriptor: &PropertyDescriptor) -> Result<Option<Value>> {
        match descriptor {
            PropertyDescriptor::Reference(d) => Ok(self.reattach_reference(&d.target)),
            PropertyDescriptor::Element(d) => Ok(self.reattach_reference(&d.target)),
            PropertyDescriptor::Collection(d) => Ok(self
                .reattach_collection(d)
                .map(Value::PersistentCollection)),
        }
    }

    pub fn reattach_reference(&self, target: &EntityReference) -> Option<Value> {
        let Some(handle) = self.stores.current_handle(&target.type_name) else {
            debug!("no store handle: reference='{}'", target);
            return None;
        };
        Some(reference_in(handle.as_ref(), target))
    }

    pub fn reattach_collection(&self, descriptor: &CollectionDescriptor) -> Option<PersistentCollection> {
        let Some(owner) = descriptor.owner.upgrade() else {
            warn!(
                "collection owner dropped: property='{}' key='{}'",
                descriptor.property, descriptor.key
            );
            return None;
        };
        let Some(handle) = self.stores.current_handle(&owner.type_name()) else {
            debug!("no store handle: collection='{}'", descriptor.key);
            return None;
        };
        Some(self.collection_in(handle.as_ref(), descriptor, &owner))
    }

    /// Checks the store collection currently held by the descriptor's owner
    /// against the store, tolerating wrappers replaced by a flush.
    pub fn revalidate(&self, descriptor: &CollectionDescriptor) -> Revalidation {
        let Some(owner) = descriptor.owner.upgrade() else {
            return Revalidation::Skipped;
        };
        let Some(Value::PersistentCollection(current)) = owner.field(&descriptor.property) else {
            return Revalidation::Skipped;
        };
        let Some(handle) = self.stores.current_handle(&owner.type_name()) else {
            return Revalidation::Skipped;
        };

        let key = IdentityKey::Collection(descriptor.key.clone());
        match handle.identity_map_lookup(&key) {
            Some(Value::PersistentCollection(registered)) if registered.ptr_eq(&current) => {
                Revalidation::Unchanged
            }
            Some(Value::PersistentCollection(registered)) => {
                debug!("adopting store collection: key='{}'", descriptor.key);
                owner.set_property(&descriptor.property, registered);
                Revalidation::Replaced
            }
            _ if current.is_attached() => {
                debug!("re-registering collection: key='{}'", descriptor.key);
                current.set_owner(&owner);
                handle.identity_map_insert(key, Value::PersistentCollection(current));
                register_owner(handle.as_ref(), descriptor, &owner);
                Revalidation::Registered
            }
            _ => {
                debug!("replacing detached collection: key='{}'", descriptor.key);
                let fresh = self.collection_in(handle.as_ref(), descriptor, &owner);
                owner.set_property(&descriptor.property, fresh);
                Revalidation::Registered
            }
        }
    }

    fn collection_in(
        &self,
        handle: &dyn StoreHandle,
        descriptor: &CollectionDescriptor,
        owner: &ObjectRef,
    ) -> PersistentCollection {
        let key = IdentityKey::Collection(descriptor.key.clone());
        if let Some(Value::PersistentCollection(existing)) = handle.identity_map_lookup(&key) {
            return existing;
        }

        let shell = self
            .registry
            .create_uninitialized_shell(descriptor.kind, handle, &descriptor.key);
        shell.set_owner(owner);
        handle.identity_map_insert(key, Value::PersistentCollection(shell.clone()));
        register_owner(handle, descriptor, owner);
        shell
    }
}

/// Identity-mapped live value for `target`: the managed instance, an
/// existing proxy, or a new proxy queued for batch loading.
pub fn reference_in(handle: &dyn StoreHandle, target: &EntityReference) -> Value {
    let key = IdentityKey::Entity(target.clone());
    match handle.identity_map_lookup(&key) {
        Some(value @ (Value::Object(_) | Value::Proxy(_))) => return value,
        Some(other) => warn!(
            "unexpected identity map entry: reference='{}' type='{}'",
            target,
            other.type_name()
        ),
        None => {}
    }

    let proxy = handle.construct_uninitialized_reference(target);
    handle.schedule_batch_load(target);
    handle.identity_map_insert(key, Value::Proxy(proxy.clone()));
    Value::Proxy(proxy)
}

fn register_owner(handle: &dyn StoreHandle, descriptor: &CollectionDescriptor, owner: &ObjectRef) {
    let owner_key = IdentityKey::Entity(EntityReference::new(
        owner.type_name(),
        descriptor.key.owner_id.clone(),
    ));
    if handle.identity_map_lookup(&owner_key).is_none() {
        handle.identity_map_insert(owner_key, Value::Object(owner.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Object;
    use crate::detach::collection_kind::CollectionKind;
    use crate::metadata::{Catalog, EntityMetadata};
    use crate::store::{CollectionKey, MemoryDatabase, SessionHolder, Stored};
    use std::sync::Arc;

    fn holder() -> SessionHolder {
        let catalog = Catalog::new()
            .with_entity(
                EntityMetadata::new("Company")
                    .identifier("id")
                    .collection("persons", CollectionKind::Set, "Person"),
            )
            .unwrap()
            .with_entity(EntityMetadata::new("Person").identifier("id").scalar("name"))
            .unwrap();
        let db = MemoryDatabase::new(catalog);
        db.insert("Person", 2, [("name", Stored::value("Bob"))]).unwrap();
        SessionHolder::new(Arc::new(db))
    }

    #[test]
    fn test_reference_uses_managed_instance() {
        let holder = holder();
        let session = holder.open();
        let managed = session.get("Person", 2).unwrap();
        let registry = CollectionKindRegistry::default();
        let attacher = Attacher::new(&holder, &registry);

        let value = attacher
            .reattach_reference(&EntityReference::new("Person", 2))
            .unwrap();
        assert!(value.as_object().is_some_and(|o| o.ptr_eq(&managed)));
    }

    #[test]
    fn test_reference_creates_batched_proxy_without_fetch() {
        let holder = holder();
        let session = holder.open();
        let registry = CollectionKindRegistry::default();
        let attacher = Attacher::new(&holder, &registry);
        let target = EntityReference::new("Person", 2);

        let first = attacher.reattach_reference(&target).unwrap();
        let second = attacher.reattach_reference(&target).unwrap();

        let first = first.as_proxy().unwrap();
        assert!(!first.is_initialized());
        assert!(second.as_proxy().is_some_and(|p| p.ptr_eq(first)));
        assert_eq!(session.pending_batch(), vec![target]);
        assert_eq!(session.database().fetch_stats().entities, 0);
    }

    #[test]
    fn test_collection_shell_registers_owner() {
        let holder = holder();
        let session = holder.open();
        let registry = CollectionKindRegistry::default();
        let attacher = Attacher::new(&holder, &registry);

        let owner = ObjectRef::new(Object::new("Company").with("id", 1).with("persons", Value::Null));
        let descriptor = CollectionDescriptor {
            owner: owner.downgrade(),
            property: "persons".into(),
            kind: CollectionKind::Set,
            key: CollectionKey::new("Company.persons", 1),
        };

        let shell = attacher.reattach_collection(&descriptor).unwrap();
        assert!(!shell.was_initialized());
        assert!(shell.owner().is_some_and(|o| o.ptr_eq(&owner)));
        assert!(session
            .collection(&descriptor.key)
            .is_some_and(|c| c.ptr_eq(&shell)));
        assert!(session.contains_entity(&EntityReference::new("Company", 1)));
        assert_eq!(session.database().fetch_stats().collections, 0);
    }

    #[test]
    fn test_missing_handle_is_not_an_error() {
        let holder = holder();
        let registry = CollectionKindRegistry::default();
        let attacher = Attacher::new(&holder, &registry);

        let descriptor = PropertyDescriptor::reference(
            &ObjectRef::new(Object::new("Company")),
            "boss",
            EntityReference::new("Person", 2),
            "Person",
        );
        assert!(attacher.reattach(&descriptor).unwrap().is_none());
    }
}
