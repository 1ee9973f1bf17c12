//! Repository traits

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drydock_api::{
    ConstraintState, DeliveryArtifact, DeliveryConfig, DeliveryEvent, EnvironmentArtifactVeto,
    PinnedEnvironment, PublishedArtifact, Resource, VersioningStrategy,
};

use crate::error::StoreError;
use crate::types::{ApprovalQueue, ConfigChangeSet, EnvironmentKey, ResourceHistoryEntry};

/// Known artifacts, their versions, and per-environment approvals, pins and vetoes
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Start tracking an artifact; registering twice is a no-op
    async fn register_artifact(&self, artifact: &DeliveryArtifact) -> Result<(), StoreError>;

    async fn is_registered(&self, name: &str, kind: &str) -> Result<bool, StoreError>;

    async fn get_artifact(
        &self,
        delivery_config_name: &str,
        reference: &str,
    ) -> Result<DeliveryArtifact, StoreError>;

    /// Every registration of a published (name, kind)
    async fn artifacts_named(
        &self,
        name: &str,
        kind: &str,
    ) -> Result<Vec<DeliveryArtifact>, StoreError>;

    async fn all_artifacts(&self) -> Result<Vec<DeliveryArtifact>, StoreError>;

    /// Store a version; `false` when it was already known
    async fn store_artifact_version(&self, version: &PublishedArtifact)
    -> Result<bool, StoreError>;

    async fn get_artifact_version(
        &self,
        name: &str,
        kind: &str,
        version: &str,
    ) -> Result<Option<PublishedArtifact>, StoreError>;

    /// Known versions passing the artifact's status filter, newest first
    async fn artifact_versions(
        &self,
        artifact: &DeliveryArtifact,
    ) -> Result<Vec<String>, StoreError>;

    /// Approve a version; `true` when it differs from the current approval
    async fn approve_version_for(
        &self,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<bool, StoreError>;

    async fn is_approved_for(&self, key: &EnvironmentKey, version: &str)
    -> Result<bool, StoreError>;

    /// The pin if any, else the newest approved version that is not vetoed
    async fn latest_approved_version(
        &self,
        key: &EnvironmentKey,
        versioning: VersioningStrategy,
    ) -> Result<Option<String>, StoreError>;

    async fn pin_environment(&self, pin: &PinnedEnvironment) -> Result<(), StoreError>;

    async fn delete_pin(&self, key: &EnvironmentKey) -> Result<(), StoreError>;

    async fn pinned_environments(
        &self,
        delivery_config_name: &str,
    ) -> Result<Vec<PinnedEnvironment>, StoreError>;

    /// Record a veto; `false` when the version was already vetoed
    async fn mark_as_vetoed(&self, veto: &EnvironmentArtifactVeto) -> Result<bool, StoreError>;

    async fn delete_veto(&self, key: &EnvironmentKey, version: &str) -> Result<(), StoreError>;

    async fn vetoed_versions(&self, key: &EnvironmentKey) -> Result<Vec<String>, StoreError>;
}

/// Delivery configs plus the constraint and approval-queue state scoped to them
#[async_trait]
pub trait DeliveryConfigRepository: Send + Sync {
    async fn get_delivery_config(&self, name: &str) -> Result<DeliveryConfig, StoreError>;

    async fn delivery_configs_for_application(
        &self,
        application: &str,
    ) -> Result<Vec<DeliveryConfig>, StoreError>;

    async fn delivery_config_for_resource(
        &self,
        resource_id: &str,
    ) -> Result<DeliveryConfig, StoreError>;

    async fn all_delivery_configs(&self) -> Result<Vec<DeliveryConfig>, StoreError>;

    /// Apply a whole upsert; nothing is written if any part is rejected
    async fn apply_change_set(&self, changes: &ConfigChangeSet) -> Result<(), StoreError>;

    /// Delete a config with its resources and environment state, returning what was removed
    async fn delete_delivery_config(&self, name: &str) -> Result<DeliveryConfig, StoreError>;

    /// Configs not checked within `min_age`, oldest first; marks them checked
    async fn delivery_configs_due_for_check(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<DeliveryConfig>, StoreError>;

    async fn get_constraint_state(
        &self,
        key: &EnvironmentKey,
        version: &str,
        constraint_kind: &str,
    ) -> Result<Option<ConstraintState>, StoreError>;

    async fn store_constraint_state(&self, state: &ConstraintState) -> Result<(), StoreError>;

    async fn constraint_states_for(
        &self,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<Vec<ConstraintState>, StoreError>;

    /// Versions with at least one pending stateful constraint
    async fn pending_constraint_versions(
        &self,
        key: &EnvironmentKey,
    ) -> Result<Vec<String>, StoreError>;

    async fn queue_for_approval(
        &self,
        queue: ApprovalQueue,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<(), StoreError>;

    async fn queued_for_approval(
        &self,
        queue: ApprovalQueue,
        key: &EnvironmentKey,
    ) -> Result<Vec<String>, StoreError>;

    async fn remove_from_queue(
        &self,
        queue: ApprovalQueue,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<(), StoreError>;
}

/// Stored resources, check scheduling and event history
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn get_resource(&self, id: &str) -> Result<Resource, StoreError>;

    async fn has_resource(&self, id: &str) -> Result<bool, StoreError>;

    /// Resources not checked within `min_age`, oldest first; marks them checked
    async fn resources_due_for_check(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Make resources due on the next cycle
    async fn trigger_recheck(&self, ids: &[String]) -> Result<(), StoreError>;

    async fn append_resource_history(
        &self,
        id: &str,
        event: &DeliveryEvent,
    ) -> Result<(), StoreError>;

    /// History entries, newest first
    async fn resource_history(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<ResourceHistoryEntry>, StoreError>;

    async fn last_resource_event(&self, id: &str) -> Result<Option<DeliveryEvent>, StoreError>;
}

/// Fingerprints of detected deltas, one per resource
#[async_trait]
pub trait DiffFingerprintRepository: Send + Sync {
    /// Record a fingerprint; `true` when new or different from the stored one
    async fn store_fingerprint(&self, id: &str, fingerprint: &str) -> Result<bool, StoreError>;

    async fn mark_action_taken(&self, id: &str) -> Result<(), StoreError>;

    /// Actions taken against the current fingerprint
    async fn action_taken_count(&self, id: &str) -> Result<u32, StoreError>;

    async fn last_action_at(&self, id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Drop the fingerprint; `true` when one existed
    async fn clear_fingerprint(&self, id: &str) -> Result<bool, StoreError>;
}

/// Paused applications and resources
#[async_trait]
pub trait PausedRepository: Send + Sync {
    async fn pause_application(&self, application: &str) -> Result<(), StoreError>;
    async fn resume_application(&self, application: &str) -> Result<(), StoreError>;
    async fn is_application_paused(&self, application: &str) -> Result<bool, StoreError>;
    async fn pause_resource(&self, id: &str) -> Result<(), StoreError>;
    async fn resume_resource(&self, id: &str) -> Result<(), StoreError>;
    async fn is_resource_paused(&self, id: &str) -> Result<bool, StoreError>;
    async fn paused_applications(&self) -> Result<Vec<String>, StoreError>;
}

/// Named, time-bounded mutual exclusion across workers
#[async_trait]
pub trait AgentLockRepository: Send + Sync {
    /// Take the lock unless someone else holds an unexpired one
    async fn try_acquire_lock(&self, name: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn release_lock(&self, name: &str) -> Result<(), StoreError>;
}

/// Everything the engine needs from persistence
pub trait Store:
    ArtifactRepository
    + DeliveryConfigRepository
    + ResourceRepository
    + DiffFingerprintRepository
    + PausedRepository
    + AgentLockRepository
{
}

impl<T> Store for T where
    T: ArtifactRepository
        + DeliveryConfigRepository
        + ResourceRepository
        + DiffFingerprintRepository
        + PausedRepository
        + AgentLockRepository
{
}
