//! Outbound event types
//!
//! Published by the engine for notification and telemetry consumers. Resource
//! events are also appended to each resource's history.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::resource::Task;

/// Why a resource check ended without diffing or actuating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SkipReason {
    ActuationPaused,
    ActuationInProgress,
    ActuationVetoed,
    DeltaUnchanged,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ActuationPaused => "ActuationPaused",
            Self::ActuationInProgress => "ActuationInProgress",
            Self::ActuationVetoed => "ActuationVetoed",
            Self::DeltaUnchanged => "DeltaUnchanged",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum DeliveryEvent {
    ResourceCreated {
        resource: String,
        application: String,
    },
    ResourceUpdated {
        resource: String,
        application: String,
    },
    ResourceDeleted {
        resource: String,
        application: String,
    },
    ResourceMissing {
        resource: String,
        application: String,
    },
    ResourceValid {
        resource: String,
        application: String,
    },
    ResourceDeltaDetected {
        resource: String,
        application: String,
        #[schema(value_type = Object)]
        delta: Value,
    },
    ResourceDeltaResolved {
        resource: String,
        application: String,
    },
    ResourceActuationLaunched {
        resource: String,
        application: String,
        plugin: String,
        tasks: Vec<Task>,
    },
    /// A task launched by an actuation finished
    ResourceTaskCompleted {
        resource: String,
        application: String,
        task: Task,
        succeeded: bool,
    },
    ResourceActuationVetoed {
        resource: String,
        application: String,
        veto: String,
        reason: String,
    },
    ResourceCheckError {
        resource: String,
        application: String,
        error: String,
    },
    ResourceCheckUnresolvable {
        resource: String,
        application: String,
        reason: String,
    },
    ResourceCheckSkipped {
        resource: String,
        reason: SkipReason,
    },
    ArtifactVersionUpdated {
        name: String,
        kind: String,
    },
    ArtifactLifecycle {
        name: String,
        kind: String,
        version: String,
        /// Restart any in-flight build monitoring for the version
        monitor: bool,
    },
    ArtifactVersionApproved {
        application: String,
        delivery_config: String,
        environment: String,
        artifact: String,
        kind: String,
        version: String,
    },
    ArtifactVersionVetoed {
        application: String,
        environment: String,
        artifact: String,
        version: String,
    },
}

impl DeliveryEvent {
    /// Resource the event is about, for resource events
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::ResourceCreated { resource, .. }
            | Self::ResourceUpdated { resource, .. }
            | Self::ResourceDeleted { resource, .. }
            | Self::ResourceMissing { resource, .. }
            | Self::ResourceValid { resource, .. }
            | Self::ResourceDeltaDetected { resource, .. }
            | Self::ResourceDeltaResolved { resource, .. }
            | Self::ResourceActuationLaunched { resource, .. }
            | Self::ResourceTaskCompleted { resource, .. }
            | Self::ResourceActuationVetoed { resource, .. }
            | Self::ResourceCheckError { resource, .. }
            | Self::ResourceCheckUnresolvable { resource, .. }
            | Self::ResourceCheckSkipped { resource, .. } => Some(resource),
            _ => None,
        }
    }

    /// Event name as used in logs and metrics
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResourceCreated { .. } => "ResourceCreated",
            Self::ResourceUpdated { .. } => "ResourceUpdated",
            Self::ResourceDeleted { .. } => "ResourceDeleted",
            Self::ResourceMissing { .. } => "ResourceMissing",
            Self::ResourceValid { .. } => "ResourceValid",
            Self::ResourceDeltaDetected { .. } => "ResourceDeltaDetected",
            Self::ResourceDeltaResolved { .. } => "ResourceDeltaResolved",
            Self::ResourceActuationLaunched { .. } => "ResourceActuationLaunched",
            Self::ResourceTaskCompleted { .. } => "ResourceTaskCompleted",
            Self::ResourceActuationVetoed { .. } => "ResourceActuationVetoed",
            Self::ResourceCheckError { .. } => "ResourceCheckError",
            Self::ResourceCheckUnresolvable { .. } => "ResourceCheckUnresolvable",
            Self::ResourceCheckSkipped { .. } => "ResourceCheckSkipped",
            Self::ArtifactVersionUpdated { .. } => "ArtifactVersionUpdated",
            Self::ArtifactLifecycle { .. } => "ArtifactLifecycle",
            Self::ArtifactVersionApproved { .. } => "ArtifactVersionApproved",
            Self::ArtifactVersionVetoed { .. } => "ArtifactVersionVetoed",
        }
    }
}
