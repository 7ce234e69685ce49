//! In-memory reference store.
//!
//! `MemoryDatabase` holds rows; a `MemorySession` is the stateful unit of
//! work on top of it, with an identity map, lazy proxies and lazy collection
//! shells. Entity rows load single-valued associations as uninitialized
//! proxies; collection rows load their element entities in full.

use super::{
    CollectionKey, EntityProxy, EntityReference, IdentityKey, LazyLoader, PersistentCollection,
    StoreHandle, StoreHandleProvider,
};
use crate::core::{Container, DetachError, Identifier, Object, ObjectRef, Result, Value};
use crate::detach::collection_kind::CollectionKind;
use crate::metadata::{Catalog, MetadataProvider, PropertyKind};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// A stored field: plain value or foreign key.
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    Value(Value),
    Reference(EntityReference),
    Null,
}

impl Stored {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn reference(type_name: impl Into<String>, id: impl Into<Identifier>) -> Self {
        Self::Reference(EntityReference::new(type_name, id))
    }
}

impl From<EntityReference> for Stored {
    fn from(reference: EntityReference) -> Self {
        Self::Reference(reference)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionRow {
    Elements(Vec<Stored>),
    Entries(Vec<(Stored, Stored)>),
}

/// Number of row fetches served by a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchStats {
    pub entities: u64,
    pub collections: u64,
}

pub struct MemoryDatabase {
    catalog: Catalog,
    rows: RwLock<HashMap<EntityReference, BTreeMap<String, Stored>>>,
    collections: RwLock<HashMap<CollectionKey, CollectionRow>>,
    entity_fetches: AtomicU64,
    collection_fetches: AtomicU64,
}

impl MemoryDatabase {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            rows: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
            entity_fetches: AtomicU64::new(0),
            collection_fetches: AtomicU64::new(0),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Stores an entity row, replacing any previous row with the same key.
    pub fn insert<'a>(
        &self,
        type_name: &str,
        id: impl Into<Identifier>,
        fields: impl IntoIterator<Item = (&'a str, Stored)>,
    ) -> Result<()> {
        self.catalog.get(type_name)?;
        let reference = EntityReference::new(type_name, id);
        let row = fields
            .into_iter()
            .map(|(name, stored)| (name.to_string(), stored))
            .collect();
        self.rows.write().insert(reference, row);
        Ok(())
    }

    /// Stores the rows of collection `property` of one owner.
    pub fn insert_collection(
        &self,
        owner_type: &str,
        owner_id: impl Into<Identifier>,
        property: &str,
        row: CollectionRow,
    ) -> Result<()> {
        match self.catalog.property(owner_type, property).map(|p| &p.kind) {
            Some(PropertyKind::Collection { .. }) => {}
            _ => {
                return Err(DetachError::TypeMismatch(format!(
                    "{}.{} is not a collection property",
                    owner_type, property
                )))
            }
        }
        let key = CollectionKey::for_property(&self.catalog, owner_type, property, owner_id.into());
        self.collections.write().insert(key, row);
        Ok(())
    }

    fn fetch_row(&self, reference: &EntityReference) -> Option<BTreeMap<String, Stored>> {
        self.entity_fetches.fetch_add(1, Ordering::Relaxed);
        self.rows.read().get(reference).cloned()
    }

    fn fetch_collection(&self, key: &CollectionKey) -> Option<CollectionRow> {
        self.collection_fetches.fetch_add(1, Ordering::Relaxed);
        self.collections.read().get(key).cloned()
    }

    pub fn fetch_stats(&self) -> FetchStats {
        FetchStats {
            entities: self.entity_fetches.load(Ordering::Relaxed),
            collections: self.collection_fetches.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.entity_fetches.store(0, Ordering::Relaxed);
        self.collection_fetches.store(0, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct PersistenceContext {
    entities: HashMap<EntityReference, ObjectRef>,
    proxies: HashMap<EntityReference, EntityProxy>,
    collections: HashMap<CollectionKey, PersistentCollection>,
    batch: Vec<EntityReference>,
}

/// A unit of work over a [`MemoryDatabase`].
pub struct MemorySession {
    id: Uuid,
    database: Arc<MemoryDatabase>,
    context: Mutex<PersistenceContext>,
    closed: AtomicBool,
    me: Weak<MemorySession>,
}

impl MemorySession {
    pub fn open(database: Arc<MemoryDatabase>) -> Arc<Self> {
        let session = Arc::new_cyclic(|me| Self {
            id: Uuid::new_v4(),
            database,
            context: Mutex::new(PersistenceContext::default()),
            closed: AtomicBool::new(false),
            me: me.clone(),
        });
        debug!("session opened: session='{}'", session.id);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }

    fn loader(&self) -> Weak<dyn LazyLoader> {
        self.me.clone()
    }

    fn ensure_open(&self, target: &dyn std::fmt::Display) -> Result<()> {
        if self.is_closed() {
            return Err(DetachError::SessionClosed(target.to_string()));
        }
        Ok(())
    }

    /// Fetches an entity eagerly.
    pub fn get(&self, type_name: &str, id: impl Into<Identifier>) -> Result<ObjectRef> {
        self.load_entity(&EntityReference::new(type_name, id))
    }

    /// Returns the managed instance if present, otherwise a lazy proxy.
    /// Never fetches.
    pub fn load(&self, type_name: &str, id: impl Into<Identifier>) -> Result<Value> {
        let reference = EntityReference::new(type_name, id);
        self.ensure_open(&reference)?;
        let mut cx = self.context.lock();
        Ok(self.reference_value(&mut cx, &reference))
    }

    /// Synchronizes the session. Uninitialized collection wrappers are
    /// replaced by fresh ones, so wrappers handed out earlier become stale.
    pub fn flush(&self) {
        let mut cx = self.context.lock();
        let stale: Vec<CollectionKey> = cx
            .collections
            .iter()
            .filter(|(_, collection)| !collection.was_initialized())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            let Some(old) = cx.collections.get(key) else {
                continue;
            };
            let fresh = PersistentCollection::uninitialized(old.kind(), key.clone(), self.loader());
            if let Some(owner) = old.owner() {
                fresh.set_owner(&owner);
            }
            cx.collections.insert(key.clone(), fresh);
        }
        debug!(
            "session flushed: session='{}' replaced_collections={}",
            self.id,
            stale.len()
        );
    }

    /// Forgets every managed instance.
    pub fn clear(&self) {
        *self.context.lock() = PersistenceContext::default();
        debug!("session cleared: session='{}'", self.id);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.clear();
        debug!("session closed: session='{}'", self.id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// References queued for batch loading.
    pub fn pending_batch(&self) -> Vec<EntityReference> {
        self.context.lock().batch.clone()
    }

    pub fn contains_entity(&self, reference: &EntityReference) -> bool {
        self.context.lock().entities.contains_key(reference)
    }

    pub fn collection(&self, key: &CollectionKey) -> Option<PersistentCollection> {
        self.context.lock().collections.get(key).cloned()
    }

    fn reference_value(&self, cx: &mut PersistenceContext, reference: &EntityReference) -> Value {
        if let Some(object) = cx.entities.get(reference) {
            return Value::Object(object.clone());
        }
        let proxy = cx
            .proxies
            .entry(reference.clone())
            .or_insert_with(|| EntityProxy::uninitialized(reference.clone(), self.loader()))
            .clone();
        Value::Proxy(proxy)
    }

    fn field_value(&self, cx: &mut PersistenceContext, stored: &Stored) -> Value {
        match stored {
            Stored::Value(value) => value.clone(),
            Stored::Reference(reference) => self.reference_value(cx, reference),
            Stored::Null => Value::Null,
        }
    }

    fn element_value(&self, stored: &Stored) -> Result<Value> {
        match stored {
            Stored::Value(value) => Ok(value.clone()),
            Stored::Reference(reference) => Ok(Value::Object(self.load_entity(reference)?)),
            Stored::Null => Ok(Value::Null),
        }
    }
}

impl LazyLoader for MemorySession {
    fn load_entity(&self, reference: &EntityReference) -> Result<ObjectRef> {
        self.ensure_open(reference)?;
        if let Some(object) = self.context.lock().entities.get(reference) {
            return Ok(object.clone());
        }

        let row = self
            .database
            .fetch_row(reference)
            .ok_or_else(|| DetachError::EntityNotFound(reference.to_string()))?;

        let catalog = self.database.catalog();
        let type_name = reference.type_name.as_str();
        let mut cx = self.context.lock();
        if let Some(object) = cx.entities.get(reference) {
            return Ok(object.clone());
        }

        let mut object = Object::new(type_name);
        if let Some(property) = catalog.identifier_property(type_name) {
            object.insert(property, reference.id.to_value());
        }
        for (name, stored) in &row {
            object.insert(name.clone(), self.field_value(&mut cx, stored));
        }
        let object = ObjectRef::new(object);

        for name in catalog.property_names(type_name) {
            let Some(PropertyKind::Collection { kind, .. }) =
                catalog.property(type_name, &name).map(|p| &p.kind)
            else {
                continue;
            };
            let key = CollectionKey::for_property(catalog, type_name, &name, reference.id.clone());
            let shell = PersistentCollection::uninitialized(*kind, key.clone(), self.loader());
            shell.set_owner(&object);
            cx.collections.insert(key, shell.clone());
            object.write().insert(name, shell);
        }

        cx.entities.insert(reference.clone(), object.clone());
        debug!(
            "entity loaded: session='{}' reference='{}'",
            self.id, reference
        );
        Ok(object)
    }

    fn load_collection(&self, collection: &PersistentCollection) -> Result<Container> {
        let key = collection.key();
        self.ensure_open(key)?;
        let registered = self
            .context
            .lock()
            .collections
            .get(key)
            .is_some_and(|current| current.ptr_eq(collection));
        if !registered {
            return Err(DetachError::StaleCollection(key.to_string()));
        }

        let mut container = Container::empty(collection.kind().shape());
        match self.database.fetch_collection(key) {
            None => {}
            Some(CollectionRow::Elements(items)) => {
                for item in &items {
                    container.insert(self.element_value(item)?);
                }
            }
            Some(CollectionRow::Entries(entries)) => {
                for (k, v) in &entries {
                    container.put(self.element_value(k)?, self.element_value(v)?);
                }
            }
        }
        debug!(
            "collection loaded: session='{}' key='{}' size={}",
            self.id,
            key,
            container.len()
        );
        Ok(container)
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

impl StoreHandle for MemorySession {
    fn identity_map_lookup(&self, key: &IdentityKey) -> Option<Value> {
        let cx = self.context.lock();
        match key {
            IdentityKey::Entity(reference) => cx
                .entities
                .get(reference)
                .map(|object| Value::Object(object.clone()))
                .or_else(|| cx.proxies.get(reference).map(|p| Value::Proxy(p.clone()))),
            IdentityKey::Collection(key) => cx
                .collections
                .get(key)
                .map(|c| Value::PersistentCollection(c.clone())),
        }
    }

    fn identity_map_insert(&self, key: IdentityKey, value: Value) {
        let mut cx = self.context.lock();
        match (key, value) {
            (IdentityKey::Entity(reference), Value::Object(object)) => {
                cx.entities.insert(reference, object);
            }
            (IdentityKey::Entity(reference), Value::Proxy(proxy)) => {
                cx.proxies.insert(reference, proxy);
            }
            (IdentityKey::Collection(key), Value::PersistentCollection(collection)) => {
                cx.collections.insert(key, collection);
            }
            (key, value) => {
                warn!(
                    "identity map rejected value: key='{}' type='{}'",
                    key,
                    value.type_name()
                );
            }
        }
    }

    fn construct_uninitialized_reference(&self, reference: &EntityReference) -> EntityProxy {
        EntityProxy::uninitialized(reference.clone(), self.loader())
    }

    fn construct_uninitialized_collection_shell(
        &self,
        kind: CollectionKind,
        key: &CollectionKey,
    ) -> PersistentCollection {
        PersistentCollection::uninitialized(kind, key.clone(), self.loader())
    }

    fn schedule_batch_load(&self, reference: &EntityReference) {
        let mut cx = self.context.lock();
        if !cx.batch.contains(reference) {
            cx.batch.push(reference.clone());
        }
    }
}

/// Holds the session of the current request, if any.
pub struct SessionHolder {
    database: Arc<MemoryDatabase>,
    current: RwLock<Option<Arc<MemorySession>>>,
}

impl SessionHolder {
    pub fn new(database: Arc<MemoryDatabase>) -> Self {
        Self {
            database,
            current: RwLock::new(None),
        }
    }

    /// Opens a new current session, closing the previous one.
    pub fn open(&self) -> Arc<MemorySession> {
        let session = MemorySession::open(self.database.clone());
        if let Some(previous) = self.current.write().replace(session.clone()) {
            previous.close();
        }
        session
    }

    pub fn current(&self) -> Option<Arc<MemorySession>> {
        self.current.read().clone()
    }

    pub fn close_current(&self) {
        if let Some(session) = self.current.write().take() {
            session.close();
        }
    }
}

impl StoreHandleProvider for SessionHolder {
    fn current_handle(&self, for_type: &str) -> Option<Arc<dyn StoreHandle>> {
        if !self.database.catalog().has_managed_type(for_type) {
            return None;
        }
        let session = self.current.read().clone()?;
        if session.is_closed() {
            return None;
        }
        Some(session as Arc<dyn StoreHandle>)
    }
}
