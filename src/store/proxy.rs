use super::{EntityReference, LazyLoader};
use crate::core::{DetachError, ObjectRef, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

struct ProxyState {
    reference: EntityReference,
    target: RwLock<Option<ObjectRef>>,
    loader: Option<Weak<dyn LazyLoader>>,
}

/// Store-native single-valued reference.
///
/// An uninitialized proxy knows only its `(type, id)` and loads the target
/// through its session on first `get()`. The session is held weakly: once it
/// is gone, loading fails with `SessionClosed`.
#[derive(Clone)]
pub struct EntityProxy(Arc<ProxyState>);

impl EntityProxy {
    pub fn uninitialized(reference: EntityReference, loader: Weak<dyn LazyLoader>) -> Self {
        Self(Arc::new(ProxyState {
            reference,
            target: RwLock::new(None),
            loader: Some(loader),
        }))
    }

    /// A proxy wrapping an already loaded object.
    pub fn initialized(reference: EntityReference, target: ObjectRef) -> Self {
        Self(Arc::new(ProxyState {
            reference,
            target: RwLock::new(Some(target)),
            loader: None,
        }))
    }

    pub fn reference(&self) -> &EntityReference {
        &self.0.reference
    }

    pub fn is_initialized(&self) -> bool {
        self.0.target.read().is_some()
    }

    /// The wrapped object, without loading.
    pub fn implementation(&self) -> Option<ObjectRef> {
        self.0.target.read().clone()
    }

    /// Whether the owning session can still serve a load.
    pub fn is_attached(&self) -> bool {
        self.0
            .loader
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|loader| loader.is_open())
    }

    /// Returns the target, loading it through the session when needed.
    pub fn get(&self) -> Result<ObjectRef> {
        if let Some(target) = self.implementation() {
            return Ok(target);
        }

        let loader = self
            .0
            .loader
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| DetachError::SessionClosed(self.0.reference.to_string()))?;

        trace!("initializing proxy: reference='{}'", self.0.reference);
        let target = loader.load_entity(&self.0.reference)?;

        let mut slot = self.0.target.write();
        Ok(slot.get_or_insert(target).clone())
    }

    pub fn ptr_eq(&self, other: &EntityProxy) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EntityProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_initialized() {
            "initialized"
        } else {
            "uninitialized"
        };
        write!(f, "Proxy({}, {})", self.0.reference, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Object;

    #[test]
    fn test_initialized_proxy() {
        let target = ObjectRef::new(Object::new("B").with("id", 2));
        let proxy = EntityProxy::initialized(EntityReference::new("B", 2), target.clone());

        assert!(proxy.is_initialized());
        assert!(proxy.get().unwrap().ptr_eq(&target));
    }

    #[test]
    fn test_loader_gone_is_session_closed() {
        let loader: Weak<dyn LazyLoader> = Weak::<crate::store::MemorySession>::new();
        let proxy = EntityProxy::uninitialized(EntityReference::new("B", 2), loader);

        assert!(!proxy.is_initialized());
        assert!(!proxy.is_attached());
        assert_eq!(
            proxy.get().unwrap_err(),
            DetachError::SessionClosed("B#2".into())
        );
    }
}
