// ============================================================================
// Detachable Model
// ============================================================================
//
// The externally visible holder of one object graph. `detach` turns the live
// graph into a session-free copy with placeholders; `get_object` hands the
// graph back, reattaching what it can to the store that is current at that
// moment.
//
//   Live --detach--> Detached --get_object--> Live
//   any  --set_object--> Live (pending placeholders dropped)
//
// ============================================================================

pub mod lifecycle;
pub mod list;

pub use lifecycle::UnitOfWork;
pub use list::DetachableListModel;

use crate::core::{DetachError, Result, Value};
use crate::detach::{
    Attacher, CollectionKindRegistry, DetachConfig, GraphWalker, OwnedGraph, Placeholder,
    PropertyDescriptor, Revalidation,
};
use crate::metadata::MetadataProvider;
use crate::snapshot::GraphSnapshot;
use crate::store::StoreHandleProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelState {
    Live,
    Detached,
}

/// Collaborators a model needs for one call. Nothing here is retained.
#[derive(Clone, Copy)]
pub struct ModelContext<'a> {
    pub metadata: &'a dyn MetadataProvider,
    pub stores: &'a dyn StoreHandleProvider,
    pub unit_of_work: Option<&'a UnitOfWork>,
}

impl<'a> ModelContext<'a> {
    pub fn new(metadata: &'a dyn MetadataProvider, stores: &'a dyn StoreHandleProvider) -> Self {
        Self {
            metadata,
            stores,
            unit_of_work: None,
        }
    }

    pub fn with_unit_of_work(mut self, unit_of_work: &'a UnitOfWork) -> Self {
        self.unit_of_work = Some(unit_of_work);
        self
    }

    fn is_final(&self) -> bool {
        self.unit_of_work.map_or(true, UnitOfWork::is_ending)
    }
}

#[derive(Serialize, Deserialize)]
struct ModelRecord {
    state: ModelState,
    config: DetachConfig,
    root: Option<GraphSnapshot>,
}

/// Holds a root object that can be detached from its session and
/// reattached later.
///
/// The model owns the copies its detach (or deserialization) created. When
/// it lets go of them, through `set_object`, a detach replacing the root or
/// drop, the reference cycles among copies nobody else still reaches are
/// severed. Keep the graph with `into_object` or by holding the root.
pub struct DetachableModel {
    root: Option<Value>,
    state: ModelState,
    owned: OwnedGraph,
    // single-valued placeholders awaiting resolution
    pending: Vec<Placeholder>,
    // collection placeholders, kept for re-validation until the next detach
    collections: Vec<Placeholder>,
    config: DetachConfig,
    registry: CollectionKindRegistry,
}

impl DetachableModel {
    pub fn new() -> Self {
        Self::with_config(DetachConfig::default())
    }

    pub fn with_config(config: DetachConfig) -> Self {
        Self {
            root: None,
            state: ModelState::Live,
            owned: OwnedGraph::default(),
            pending: Vec::new(),
            collections: Vec::new(),
            config,
            registry: CollectionKindRegistry::default(),
        }
    }

    pub fn from_object(root: impl Into<Value>) -> Self {
        let mut model = Self::new();
        model.set_object(root);
        model
    }

    pub fn config(&self) -> &DetachConfig {
        &self.config
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn is_detached(&self) -> bool {
        self.state == ModelState::Detached
    }

    /// The root as currently held, without any resolution.
    pub fn peek(&self) -> Option<&Value> {
        self.root.as_ref()
    }

    pub fn into_object(mut self) -> Option<Value> {
        self.root.take()
    }

    /// Descriptors of every placeholder the model still tracks.
    pub fn pending_descriptors(&self) -> Vec<PropertyDescriptor> {
        self.pending
            .iter()
            .chain(&self.collections)
            .map(Placeholder::write_replace)
            .collect()
    }

    /// Number of single-valued placeholders not yet resolved.
    pub fn unresolved_count(&self) -> usize {
        self.pending.len()
    }

    /// Reattachment engine bound to `stores`, for resolving placeholders on
    /// access (`ObjectRef::resolve_property`).
    pub fn attacher<'a>(&'a self, stores: &'a dyn StoreHandleProvider) -> Attacher<'a> {
        Attacher::new(stores, &self.registry)
    }

    /// Replaces the root. Pending placeholders are abandoned.
    pub fn set_object(&mut self, root: impl Into<Value>) {
        let root = root.into();
        self.root = if root.is_null() { None } else { Some(root) };
        self.state = ModelState::Live;
        self.pending.clear();
        self.collections.clear();
        self.owned.release();
    }

    /// Detaches the root from its session.
    ///
    /// No-op when already detached, when there is no root, or when the unit
    /// of work is not ending. Returns whether a walk took place.
    pub fn detach(&mut self, cx: &ModelContext<'_>) -> Result<bool> {
        if self.state == ModelState::Detached {
            trace!("detach skipped: model already detached");
            return Ok(false);
        }
        let Some(root) = self.root.as_ref() else {
            return Ok(false);
        };
        if !cx.is_final() {
            trace!("detach skipped: unit of work not ending");
            return Ok(false);
        }

        let outcome = GraphWalker::new(cx.metadata, &self.config, &self.registry).walk(root)?;
        self.root = Some(outcome.root);
        self.state = ModelState::Detached;
        self.track(outcome.placeholders);
        let mut previous = std::mem::replace(&mut self.owned, OwnedGraph::new(outcome.nodes));
        previous.release();

        debug!(
            "model detached: pending_references={} pending_collections={} visited={}",
            self.pending.len(),
            self.collections.len(),
            outcome.stats.nodes_visited
        );
        Ok(true)
    }

    /// Returns the root, reattaching it if it was detached.
    ///
    /// Pending single-valued placeholders are resolved when a store handle is
    /// available; the rest stay pending for the next call. Collection
    /// placeholders become uninitialized store shells, never fetched, and
    /// are re-validated against the store on every call so a flush between
    /// two calls cannot leave a stale wrapper behind.
    pub fn get_object(&mut self, cx: &ModelContext<'_>) -> Result<Option<Value>> {
        if self.state == ModelState::Detached {
            self.state = ModelState::Live;
            debug!("model reattaching: pending={}", self.pending.len());
        }

        let attacher = Attacher::new(cx.stores, &self.registry);
        if self.config.resolve_references_on_get {
            let (remaining, failure) = resolve_pending(std::mem::take(&mut self.pending), &attacher);
            self.pending = remaining;
            if let Some(err) = failure {
                return Err(err);
            }
        }
        attach_collections(&mut self.collections, &attacher)?;

        Ok(self.root.clone())
    }

    fn track(&mut self, placeholders: Vec<Placeholder>) {
        let (collections, pending) = placeholders
            .into_iter()
            .partition(|placeholder| placeholder.descriptor().is_collection());
        self.pending = pending;
        self.collections = collections;
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    fn record(&self) -> Result<ModelRecord> {
        let root = match &self.root {
            Some(root) => Some(GraphSnapshot::capture(root)?),
            None => None,
        };
        Ok(ModelRecord {
            state: self.state,
            config: self.config.clone(),
            root,
        })
    }

    fn from_record(record: ModelRecord) -> Result<Self> {
        let mut model = Self::with_config(record.config);
        model.state = record.state;
        if let Some(snapshot) = record.root {
            let restored = snapshot.restore()?;
            model.root = Some(restored.root);
            model.track(restored.placeholders);
            model.owned = OwnedGraph::new(restored.nodes);
        }
        Ok(model)
    }

    /// MessagePack encoding of the model. Fails with `SessionBound` while
    /// the graph still holds store values.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(&self.record()?)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_record(rmp_serde::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.record()?)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_record(serde_json::from_str(json)?)
    }
}

impl Default for DetachableModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DetachableModel {
    fn drop(&mut self) {
        self.root = None;
        self.pending.clear();
        self.collections.clear();
        self.owned.release();
    }
}

// Placeholders still unresolved, and the first failure. Everything after a
// failure is kept untouched.
fn resolve_pending(
    pending: Vec<Placeholder>,
    attacher: &Attacher<'_>,
) -> (Vec<Placeholder>, Option<DetachError>) {
    let mut remaining = Vec::new();
    let mut failure = None;

    for placeholder in pending {
        if failure.is_some() {
            remaining.push(placeholder);
            continue;
        }
        if !placeholder.descriptor().owner_alive() {
            warn!(
                "discarding placeholder with dropped owner: descriptor='{}'",
                placeholder.descriptor()
            );
            continue;
        }
        match placeholder.resolve(attacher) {
            Ok(Some(_)) => {}
            Ok(None) => remaining.push(placeholder),
            Err(err) => {
                remaining.push(placeholder);
                failure = Some(err);
            }
        }
    }

    (remaining, failure)
}

fn attach_collections(collections: &mut Vec<Placeholder>, attacher: &Attacher<'_>) -> Result<()> {
    let mut failure = None;
    collections.retain(|placeholder| {
        let PropertyDescriptor::Collection(descriptor) = placeholder.descriptor() else {
            return false;
        };
        if !descriptor.owner.is_alive() {
            warn!(
                "discarding collection placeholder with dropped owner: key='{}'",
                descriptor.key
            );
            return false;
        }
        if failure.is_none() && !placeholder.is_resolved() {
            if let Err(err) = placeholder.resolve(attacher) {
                failure = Some(err);
                return true;
            }
        }

        let outcome = attacher.revalidate(descriptor);
        if outcome != Revalidation::Skipped {
            trace!(
                "collection revalidated: key='{}' outcome={:?}",
                descriptor.key,
                outcome
            );
        }
        true
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Object, ObjectRef};
    use crate::metadata::{Catalog, EntityMetadata};
    use crate::store::{EntityReference, NoStore};

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(EntityMetadata::new("Person").identifier("id").scalar("name"))
            .unwrap()
    }

    #[test]
    fn test_state_machine() {
        let catalog = catalog();
        let cx = ModelContext::new(&catalog, &NoStore);
        let person = ObjectRef::new(Object::new("Person").with("id", 1).with("name", "Alice"));
        let mut model = DetachableModel::from_object(person.clone());

        assert_eq!(model.state(), ModelState::Live);
        assert!(model.detach(&cx).unwrap());
        assert_eq!(model.state(), ModelState::Detached);
        assert!(!model.detach(&cx).unwrap());

        let root = model.get_object(&cx).unwrap().unwrap();
        assert_eq!(model.state(), ModelState::Live);
        assert!(!root.as_object().unwrap().ptr_eq(&person));
        assert_eq!(root.as_object().unwrap().property("name"), Value::from("Alice"));
    }

    #[test]
    fn test_detach_without_root_is_noop() {
        let catalog = catalog();
        let cx = ModelContext::new(&catalog, &NoStore);
        let mut model = DetachableModel::new();

        assert!(!model.detach(&cx).unwrap());
        assert_eq!(model.state(), ModelState::Live);
        assert!(model.get_object(&cx).unwrap().is_none());
    }

    #[test]
    fn test_intermediate_detach_is_noop() {
        let catalog = catalog();
        let unit = UnitOfWork::new();
        let cx = ModelContext::new(&catalog, &NoStore).with_unit_of_work(&unit);
        let mut model = DetachableModel::from_object(ObjectRef::new(Object::new("Person").with("id", 1)));

        assert!(!model.detach(&cx).unwrap());
        assert_eq!(model.state(), ModelState::Live);

        unit.end();
        assert!(model.detach(&cx).unwrap());
        assert!(model.is_detached());
    }

    #[test]
    fn test_set_object_returns_to_live() {
        let catalog = catalog();
        let cx = ModelContext::new(&catalog, &NoStore);
        let mut model = DetachableModel::from_object(ObjectRef::new(Object::new("Person").with("id", 1)));
        model.detach(&cx).unwrap();

        let other = ObjectRef::new(Object::new("Person").with("id", 2));
        model.set_object(other.clone());

        assert_eq!(model.state(), ModelState::Live);
        assert!(model.pending_descriptors().is_empty());
        assert!(model.peek().and_then(Value::as_object).is_some_and(|o| o.ptr_eq(&other)));
    }

    #[test]
    fn test_json_round_trip_of_plain_model() {
        let catalog = catalog();
        let cx = ModelContext::new(&catalog, &NoStore);
        let mut model = DetachableModel::from_object(
            ObjectRef::new(Object::new("Person").with("id", 1).with("name", "Alice")),
        );
        model.detach(&cx).unwrap();

        let json = model.to_json().unwrap();
        let mut restored = DetachableModel::from_json(&json).unwrap();

        assert!(restored.is_detached());
        let root = restored.get_object(&cx).unwrap().unwrap();
        assert_eq!(root.as_object().unwrap().property("name"), Value::from("Alice"));
    }

    #[test]
    fn test_resolve_pending_keeps_deferred_placeholders() {
        let owner = ObjectRef::new(Object::new("A").with("id", 1));
        let gone = ObjectRef::new(Object::new("A").with("id", 2));
        let pending = vec![
            Placeholder::read_resolve(PropertyDescriptor::reference(
                &owner,
                "b",
                EntityReference::new("B", 3),
                "B",
            )),
            Placeholder::read_resolve(PropertyDescriptor::reference(
                &gone,
                "b",
                EntityReference::new("B", 4),
                "B",
            )),
        ];
        drop(gone);

        let registry = CollectionKindRegistry::default();
        let (remaining, failure) = resolve_pending(pending, &Attacher::new(&NoStore, &registry));

        assert!(failure.is_none());
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].descriptor().target(), Some(&EntityReference::new("B", 3)));
    }
}
