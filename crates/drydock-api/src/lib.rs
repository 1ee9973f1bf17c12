//! drydock-api: Shared model, event types and schemas
//!
//! Contains the delivery config model (artifacts, environments, resources,
//! constraints), the submitted-config document, inbound artifact events and
//! the outbound event stream used across the engine, plugins and daemon.

pub mod artifact;
pub mod constraint;
pub mod delivery;
pub mod events;
pub mod requests;
pub mod resource;

pub use artifact::{
    ArtifactStatus, BuildMetadata, DeliveryArtifact, GitMetadata, PublishedArtifact,
    VersioningStrategy,
};
pub use constraint::{ConstraintState, ConstraintStatus};
pub use delivery::{Constraint, DeliveryConfig, Environment, EnvironmentArtifactVeto, PinnedEnvironment};
pub use events::{DeliveryEvent, SkipReason};
pub use requests::{
    ArtifactPublishedEvent, ArtifactRegisteredEvent, SubmittedDeliveryConfig, SubmittedEnvironment,
    SubmittedResource,
};
pub use resource::{Resource, ResourceKind, Task};
