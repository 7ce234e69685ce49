// ============================================================================
// Graph Detach Library
// ============================================================================
//
// Detaches session-bound object graphs from their store and reattaches them
// later, preserving laziness and identity:
//
//   core       dynamic object graph (values, objects, containers)
//   metadata   entity catalog the walker consults
//   store      store seams plus an in-memory reference store
//   detach     graph walker, visitors, placeholders, reattachment engine
//   model      detachable model wrappers
//   snapshot   transport encoding of detached graphs
//
// ============================================================================

//! Detach object graphs from their store session and reattach them later.
//!
//! # Examples
//!
//! ```
//! use graph_detach::{
//!     Catalog, DetachableModel, EntityMetadata, ModelContext, NoStore, Object, ObjectRef, Value,
//! };
//!
//! # fn main() -> graph_detach::Result<()> {
//! let catalog = Catalog::new()
//!     .with_entity(EntityMetadata::new("Person").identifier("id").scalar("name"))?;
//! let cx = ModelContext::new(&catalog, &NoStore);
//!
//! let person = ObjectRef::new(Object::new("Person").with("id", 1).with("name", "Ada"));
//! let mut model = DetachableModel::from_object(person);
//! model.detach(&cx)?;
//!
//! let bytes = model.to_bytes()?;
//! let mut restored = DetachableModel::from_bytes(&bytes)?;
//! let root = restored.get_object(&cx)?;
//!
//! assert_eq!(
//!     root.as_ref().and_then(Value::as_object).map(|p| p.property("name")),
//!     Some(Value::from("Ada"))
//! );
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod detach;
pub mod metadata;
pub mod model;
pub mod prelude;
pub mod snapshot;
pub mod store;

// Re-export main types for convenience
pub use crate::core::{
    CollectionRef, Container, ContainerShape, DetachError, Identifier, Object, ObjectRef, Result,
    Value,
};
pub use crate::detach::{
    Attacher, CollectionKind, CollectionKindRegistry, DetachConfig, GraphWalker, Placeholder,
    PropertyDescriptor, StopProperty,
};
pub use crate::metadata::{Catalog, EntityMetadata, MetadataProvider, PropertyKind};
pub use crate::model::{DetachableListModel, DetachableModel, ModelContext, ModelState, UnitOfWork};
pub use crate::snapshot::GraphSnapshot;
pub use crate::store::{
    CollectionKey, EntityProxy, EntityReference, MemoryDatabase, MemorySession, NoStore,
    PersistentCollection, SessionHolder, StoreHandle, StoreHandleProvider, Stored,
};
