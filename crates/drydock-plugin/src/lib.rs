//! drydock-plugin: Plugin contracts consumed by the engine
//!
//! Resource handlers, artifact suppliers and constraint evaluators are
//! implemented outside the core. The engine only ever calls them through the
//! traits in this crate, selected via the registries.

pub mod diff;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use diff::{DiffEntry, DiffKind, ResourceDiff};
pub use error::PluginError;
pub use registry::{HandlerRegistry, SupplierRegistry};
pub use traits::{ArtifactSupplier, ConstraintEvaluator, ResourceHandler};
pub use types::{ArtifactVersionRef, SupportedArtifact};
