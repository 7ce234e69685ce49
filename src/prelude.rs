//! Recommended imports grouped by abstraction level.
//!
//! `model` covers applications that only hand graphs across a session
//! boundary. `advanced` exposes the walker and the store seams for hosts
//! that plug in their own store.

pub mod model {
    //! Stable surface for application code.
    pub use crate::{
        Catalog, DetachConfig, DetachError, DetachableListModel, DetachableModel, EntityMetadata,
        ModelContext, ModelState, Object, ObjectRef, Result, UnitOfWork, Value,
    };
}

pub mod advanced {
    //! Escape hatch for store integrations and custom traversal.
    pub use crate::detach::{
        Attacher, CollectionKindRegistry, GraphWalker, Placeholder, PropertyDescriptor,
        VisitorRegistry, VisitorStrategy,
    };
    pub use crate::store::{LazyLoader, StoreHandle, StoreHandleProvider};
}
