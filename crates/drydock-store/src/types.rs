//! Keys and records shared by the repositories

use std::fmt;

use chrono::{DateTime, Utc};
use drydock_api::{DeliveryArtifact, DeliveryConfig, DeliveryEvent, Resource};
use serde::{Deserialize, Serialize};

/// Identifies one artifact within one environment of one delivery config
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvironmentKey {
    pub delivery_config_name: String,
    pub environment: String,
    pub artifact_reference: String,
}

impl EnvironmentKey {
    pub fn new(
        delivery_config_name: impl Into<String>,
        environment: impl Into<String>,
        artifact_reference: impl Into<String>,
    ) -> Self {
        Self {
            delivery_config_name: delivery_config_name.into(),
            environment: environment.into(),
            artifact_reference: artifact_reference.into(),
        }
    }
}

impl fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.delivery_config_name, self.environment, self.artifact_reference
        )
    }
}

/// Queues feeding the promotion checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalQueue {
    /// Versions selected by the constraint runner
    ConstraintRunner,
    /// Versions whose stateful constraints were all judged passing
    StatefulResolved,
}

/// One entry in a resource's event history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceHistoryEntry {
    pub event: DeliveryEvent,
    pub at: DateTime<Utc>,
}

/// Whether a resource is new or replaces a different definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceChange {
    Created,
    Updated,
}

/// Everything one config upsert writes, applied as a unit
#[derive(Debug, Clone)]
pub struct ConfigChangeSet {
    /// The normalized config to store
    pub config: DeliveryConfig,
    /// Resources to create or replace; unchanged resources are left out
    pub resources: Vec<(Resource, ResourceChange)>,
    /// Artifacts to register (idempotent)
    pub artifacts: Vec<DeliveryArtifact>,
    /// Resource ids dropped from the config
    pub removed_resources: Vec<String>,
    /// Artifact references dropped from the config
    pub removed_artifacts: Vec<String>,
    /// Environment names dropped from the config
    pub removed_environments: Vec<String>,
}

impl ConfigChangeSet {
    /// A change set that only stores the config
    #[must_use]
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            resources: Vec::new(),
            artifacts: Vec::new(),
            removed_resources: Vec::new(),
            removed_artifacts: Vec::new(),
            removed_environments: Vec::new(),
        }
    }
}
