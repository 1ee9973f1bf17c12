//! Commits approved artifact versions per environment

use std::collections::HashSet;
use std::sync::Arc;

use drydock_api::{DeliveryArtifact, DeliveryConfig, DeliveryEvent, Environment};
use drydock_store::{ApprovalQueue, EnvironmentKey, Store};
use tracing::{debug, info, instrument};

use crate::constraints::EnvironmentConstraintRunner;
use crate::error::CoreError;
use crate::publisher::EventPublisher;

/// A version newly approved for an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedVersion {
    pub environment: String,
    pub artifact_reference: String,
    pub version: String,
}

/// Drives the constraint runner across a delivery config and commits approvals
pub struct EnvironmentPromotionChecker {
    store: Arc<dyn Store>,
    runner: Arc<EnvironmentConstraintRunner>,
    publisher: Arc<dyn EventPublisher>,
}

impl EnvironmentPromotionChecker {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        runner: Arc<EnvironmentConstraintRunner>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            runner,
            publisher,
        }
    }

    /// Check every (artifact, environment) pair of the config
    ///
    /// A pin is approved as-is and blocks every other approval for its pair.
    /// Otherwise queued versions are approved once their stateless
    /// constraints pass.
    ///
    /// # Errors
    /// Returns `CoreError::Store` on persistence failures
    #[instrument(skip_all, fields(config = %config.name))]
    pub async fn check_environments(
        &self,
        config: &DeliveryConfig,
    ) -> Result<Vec<ApprovedVersion>, CoreError> {
        let pins = self.store.pinned_environments(&config.name).await?;
        let mut approved = Vec::new();

        for artifact in &config.artifacts {
            let versions = self.store.artifact_versions(artifact).await?;
            if versions.is_empty() {
                debug!(artifact = %artifact.effective_reference(), "no versions known yet");
                continue;
            }

            for environment in &config.environments {
                if !environment.uses_artifact(artifact) {
                    continue;
                }

                let key = EnvironmentKey::new(
                    &config.name,
                    &environment.name,
                    artifact.effective_reference(),
                );
                let vetoed: HashSet<String> =
                    self.store.vetoed_versions(&key).await?.into_iter().collect();

                let selection = self
                    .runner
                    .check_environment(config, environment, artifact, &versions, &vetoed)
                    .await?;

                if let Some(pin) = pins
                    .iter()
                    .find(|p| p.environment == environment.name && p.artifact_reference == key.artifact_reference)
                {
                    debug!(environment = %environment.name, version = %pin.version, "environment is pinned");
                    if self
                        .approve(config, environment, artifact, &key, &pin.version)
                        .await?
                    {
                        approved.push(approval(&key, &pin.version));
                    }
                    continue;
                }

                let newly = self
                    .drain_queues(config, environment, artifact, &key, &vetoed)
                    .await?;

                if newly.is_empty() && selection.selected.is_none() && selection.pending.is_empty() {
                    debug!(
                        environment = %environment.name,
                        artifact = %key.artifact_reference,
                        "no version is eligible for promotion yet"
                    );
                }
                approved.extend(newly.iter().map(|v| approval(&key, v)));
            }
        }

        Ok(approved)
    }

    /// Approve queued versions, oldest first, so the newest ends up current
    async fn drain_queues(
        &self,
        config: &DeliveryConfig,
        environment: &Environment,
        artifact: &DeliveryArtifact,
        key: &EnvironmentKey,
        vetoed: &HashSet<String>,
    ) -> Result<Vec<String>, CoreError> {
        let mut newly = Vec::new();

        for queue in [ApprovalQueue::ConstraintRunner, ApprovalQueue::StatefulResolved] {
            let mut queued = self.store.queued_for_approval(queue, key).await?;
            queued.sort_by(|a, b| artifact.versioning.compare(a, b));

            for version in queued {
                if vetoed.contains(&version) {
                    debug!(version = %version, "dropping vetoed version from approval queue");
                    self.store.remove_from_queue(queue, key, &version).await?;
                    continue;
                }
                if !self
                    .runner
                    .check_stateless_constraints(artifact, &version, config, environment)
                    .await
                {
                    continue;
                }
                if self
                    .approve(config, environment, artifact, key, &version)
                    .await?
                {
                    newly.push(version.clone());
                }
                self.store.remove_from_queue(queue, key, &version).await?;
            }
        }

        Ok(newly)
    }

    /// Commit an approval; announces it and rechecks resources only when new
    async fn approve(
        &self,
        config: &DeliveryConfig,
        environment: &Environment,
        artifact: &DeliveryArtifact,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<bool, CoreError> {
        if !self.store.approve_version_for(key, version).await? {
            return Ok(false);
        }

        info!(
            environment = %environment.name,
            artifact = %key.artifact_reference,
            version = %version,
            "approved version for environment"
        );
        self.publisher.publish(DeliveryEvent::ArtifactVersionApproved {
            application: config.application.clone(),
            delivery_config: config.name.clone(),
            environment: environment.name.clone(),
            artifact: key.artifact_reference.clone(),
            kind: artifact.kind.clone(),
            version: version.to_string(),
        });

        let affected: Vec<String> = environment
            .resources
            .iter()
            .filter(|r| r.artifact_reference() == Some(key.artifact_reference.as_str()))
            .map(|r| r.id.clone())
            .collect();
        self.store.trigger_recheck(&affected).await?;

        Ok(true)
    }
}

fn approval(key: &EnvironmentKey, version: &str) -> ApprovedVersion {
    ApprovedVersion {
        environment: key.environment.clone(),
        artifact_reference: key.artifact_reference.clone(),
        version: version.to_string(),
    }
}
