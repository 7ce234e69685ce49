pub mod attacher;
pub mod collection_kind;
pub mod config;
pub mod copier;
pub mod descriptor;
pub mod owned;
pub mod placeholder;
pub mod seen;
pub mod visitor;
pub mod walker;

pub use attacher::{reference_in, Attacher, Revalidation};
pub use collection_kind::{CollectionKind, CollectionKindRegistry};
pub use config::{DetachConfig, StopProperty};
pub use copier::GraphCopier;
pub use descriptor::{CollectionDescriptor, ElementDescriptor, PropertyDescriptor, ReferenceDescriptor};
pub use owned::OwnedGraph;
pub use placeholder::{ApparentType, Placeholder};
pub use seen::{Node, SeenSet};
pub use visitor::{VisitContext, VisitorRegistry, VisitorStrategy, WalkStats};
pub use walker::{GraphWalker, WalkOutcome};
