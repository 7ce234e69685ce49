pub mod container;
pub mod error;
pub mod object;
pub mod value;

pub use container::{CollectionRef, Container, ContainerShape, WeakCollectionRef};
pub use error::{DetachError, Result};
pub use object::{NodeId, Object, ObjectRef, WeakObjectRef};
pub use value::{Identifier, Value};
