// ============================================================================
// Store Interfaces
// ============================================================================
//
// The detach core never talks to a concrete persistence layer. It consumes the
// capabilities below: a handle provider to find the current session for a
// type, and a handle exposing the session's identity map plus construction
// primitives for lazy references and collection shells.
//
// `memory` is a small reference store implementing all of them.
//
// ============================================================================

pub mod collection;
pub mod memory;
pub mod proxy;

pub use collection::PersistentCollection;
pub use memory::{CollectionRow, FetchStats, MemoryDatabase, MemorySession, SessionHolder, Stored};
pub use proxy::EntityProxy;

use crate::core::{Container, Identifier, ObjectRef, Result, Value};
use crate::detach::collection_kind::CollectionKind;
use crate::metadata::MetadataProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// `(type, identifier)` pair naming one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityReference {
    pub type_name: String,
    pub id: Identifier,
}

impl EntityReference {
    pub fn new(type_name: impl Into<String>, id: impl Into<Identifier>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}

/// `(role, owner identifier)` pair naming one collection of one owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionKey {
    pub role: String,
    pub owner_id: Identifier,
}

impl CollectionKey {
    pub fn new(role: impl Into<String>, owner_id: impl Into<Identifier>) -> Self {
        Self {
            role: role.into(),
            owner_id: owner_id.into(),
        }
    }

    /// Builds the key of `property` on an owner of `owner_type`. The role is
    /// named after the type that declares the property, so subtypes share it.
    pub fn for_property(
        metadata: &dyn MetadataProvider,
        owner_type: &str,
        property: &str,
        owner_id: Identifier,
    ) -> Self {
        let declaring = metadata
            .declaring_type(owner_type, property)
            .unwrap_or_else(|| owner_type.to_string());
        Self::new(format!("{}.{}", declaring, property), owner_id)
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.role, self.owner_id)
    }
}

/// Key into a session's identity map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Entity(EntityReference),
    Collection(CollectionKey),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(reference) => write!(f, "{}", reference),
            Self::Collection(key) => write!(f, "{}", key),
        }
    }
}

/// Fetch side of a session, used by proxies and collection shells when they
/// are first accessed.
pub trait LazyLoader: Send + Sync {
    fn load_entity(&self, reference: &EntityReference) -> Result<ObjectRef>;

    fn load_collection(&self, collection: &PersistentCollection) -> Result<Container>;

    fn is_open(&self) -> bool {
        true
    }
}

/// A live session as seen by the reattachment engine.
pub trait StoreHandle: Send + Sync {
    fn identity_map_lookup(&self, key: &IdentityKey) -> Option<Value>;

    fn identity_map_insert(&self, key: IdentityKey, value: Value);

    fn construct_uninitialized_reference(&self, reference: &EntityReference) -> EntityProxy;

    fn construct_uninitialized_collection_shell(
        &self,
        kind: CollectionKind,
        key: &CollectionKey,
    ) -> PersistentCollection;

    /// Hint that `reference` may be fetched together with other pending ones.
    fn schedule_batch_load(&self, _reference: &EntityReference) {}
}

pub trait StoreHandleProvider: Send + Sync {
    /// The handle responsible for `for_type`, if a session is currently active.
    fn current_handle(&self, for_type: &str) -> Option<Arc<dyn StoreHandle>>;
}

/// Provider with no active session. Every reattachment is deferred.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStore;

impl StoreHandleProvider for NoStore {
    fn current_handle(&self, _for_type: &str) -> Option<Arc<dyn StoreHandle>> {
        None
    }
}
