//! Artifact version ingestion
//!
//! Published versions arrive from build systems as events, or are pulled from
//! the artifact suppliers by the full-sync agent. Both paths end in
//! [`ArtifactListener::store_artifact_version`], which is safe to call any
//! number of times for the same version.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use drydock_api::{
    ArtifactPublishedEvent, ArtifactRegisteredEvent, DeliveryArtifact, DeliveryEvent,
    PublishedArtifact,
};
use drydock_plugin::{ArtifactSupplier, SupplierRegistry};
use drydock_store::Store;
use tracing::{debug, info, instrument, warn};

use crate::actor::FleetAgent;
use crate::error::CoreError;
use crate::publisher::EventPublisher;

/// Lock held while the full sync runs
pub const ARTIFACT_SYNC_LOCK: &str = "artifact-sync";

/// What happened to one published version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No delivery config tracks the (name, kind)
    NotTracked,
    /// Tracked, but no registration accepts the release status
    StatusFiltered,
    /// Stored for the first time
    New,
    /// Already stored
    AlreadyKnown,
    /// Rejected or not stored, see the logs
    Failed,
}

/// Receives artifact events and keeps the version store current
pub struct ArtifactListener {
    store: Arc<dyn Store>,
    suppliers: Arc<SupplierRegistry>,
    publisher: Arc<dyn EventPublisher>,
}

impl ArtifactListener {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        suppliers: Arc<SupplierRegistry>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            suppliers,
            publisher,
        }
    }

    /// Handle a batch of versions published by a build system
    ///
    /// Each version is stored on its own; one that fails is logged and
    /// reported as [`IngestOutcome::Failed`] without stopping the rest.
    pub async fn on_artifact_published(&self, event: &ArtifactPublishedEvent) -> Vec<IngestOutcome> {
        let mut outcomes = Vec::with_capacity(event.artifacts.len());
        for artifact in &event.artifacts {
            let outcome = match self.store_artifact_version(artifact).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(artifact = %artifact.name, kind = %artifact.kind, version = %artifact.version, error = %e, "failed to store published version");
                    IngestOutcome::Failed
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Handle a newly tracked artifact by fetching its latest version
    ///
    /// # Errors
    /// Returns `CoreError::NoSupplier` if nothing supplies the artifact kind,
    /// or `CoreError::Store` if the store fails
    #[instrument(skip_all, fields(artifact = %event.artifact.name, kind = %event.artifact.kind))]
    pub async fn on_artifact_registered(
        &self,
        event: &ArtifactRegisteredEvent,
    ) -> Result<Option<IngestOutcome>, CoreError> {
        let artifact = &event.artifact;
        if self
            .store
            .is_registered(&artifact.name, &artifact.kind)
            .await?
        {
            debug!("artifact already registered");
            return Ok(None);
        }

        // nothing is registered for a kind no supplier can poll
        let supplier = self.supplier_for(artifact)?;
        self.store.register_artifact(artifact).await?;
        info!("registered artifact");

        let latest = self.latest_from_supplier(supplier.as_ref(), artifact).await?;
        match latest {
            Some(latest) => Ok(Some(self.store_artifact_version(&latest).await?)),
            None => {
                debug!("supplier has no versions yet");
                Ok(None)
            }
        }
    }

    /// Re-poll every registered artifact's supplier for its latest version
    ///
    /// Failures for one artifact are logged and do not stop the others.
    ///
    /// # Errors
    /// Returns `CoreError::Store` if the registered artifacts cannot be listed
    #[instrument(skip_all)]
    pub async fn sync_artifact_versions(&self) -> Result<usize, CoreError> {
        let artifacts = self.store.all_artifacts().await?;
        let mut stored = 0;

        for artifact in &artifacts {
            match self.sync_one(artifact).await {
                Ok(Some(IngestOutcome::New)) => stored += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(artifact = %artifact.name, kind = %artifact.kind, error = %e, "artifact sync failed");
                }
            }
        }

        info!(artifacts = artifacts.len(), stored, "artifact sync finished");
        Ok(stored)
    }

    async fn sync_one(
        &self,
        artifact: &DeliveryArtifact,
    ) -> Result<Option<IngestOutcome>, CoreError> {
        let supplier = self.supplier_for(artifact)?;
        let Some(latest) = self.latest_from_supplier(supplier.as_ref(), artifact).await? else {
            return Ok(None);
        };

        if self
            .store
            .get_artifact_version(&latest.name, &latest.kind, &latest.version)
            .await?
            .is_some()
        {
            debug!(artifact = %latest.name, version = %latest.version, "latest version already known");
            return Ok(Some(IngestOutcome::AlreadyKnown));
        }

        Ok(Some(self.store_artifact_version(&latest).await?))
    }

    /// Store one published version
    ///
    /// Every tracked version gets a lifecycle event; genuinely new ones also
    /// get a version-updated event.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidArtifactVersion` if the name, kind or
    /// version is blank, or `CoreError::Store` if the version store fails
    #[instrument(skip_all, fields(artifact = %published.name, kind = %published.kind, version = %published.version))]
    pub async fn store_artifact_version(
        &self,
        published: &PublishedArtifact,
    ) -> Result<IngestOutcome, CoreError> {
        if [&published.name, &published.kind, &published.version]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(CoreError::InvalidArtifactVersion(format!(
                "{}:{}:{}",
                published.kind, published.name, published.version
            )));
        }

        let registrations = self
            .store
            .artifacts_named(&published.name, &published.kind)
            .await?;
        if registrations.is_empty() {
            debug!("artifact is not tracked");
            return Ok(IngestOutcome::NotTracked);
        }
        if !registrations
            .iter()
            .any(|a| a.accepts_status(published.status))
        {
            debug!(status = ?published.status, "release status not tracked");
            return Ok(IngestOutcome::StatusFiltered);
        }

        let enriched = self.enrich(published, &registrations).await;
        let is_new = self.store.store_artifact_version(&enriched).await?;

        if is_new {
            info!("stored new artifact version");
            self.publisher.publish(DeliveryEvent::ArtifactVersionUpdated {
                name: enriched.name.clone(),
                kind: enriched.kind.clone(),
            });
        } else {
            debug!("artifact version already known");
        }
        self.publisher.publish(DeliveryEvent::ArtifactLifecycle {
            name: enriched.name.clone(),
            kind: enriched.kind.clone(),
            version: enriched.version.clone(),
            monitor: true,
        });

        Ok(if is_new {
            IngestOutcome::New
        } else {
            IngestOutcome::AlreadyKnown
        })
    }

    /// Attach git and build metadata from the supplier; failures leave the version as-is
    async fn enrich(
        &self,
        published: &PublishedArtifact,
        registrations: &[DeliveryArtifact],
    ) -> PublishedArtifact {
        let mut enriched = published.clone();
        let Some(supplier) = registrations
            .iter()
            .find_map(|a| self.suppliers.for_artifact(a))
        else {
            warn!("no supplier to enrich version with");
            return enriched;
        };

        match supplier.git_metadata(published).await {
            Ok(git) => enriched.git = git.or(enriched.git),
            Err(e) => warn!(error = %e, "failed to fetch git metadata"),
        }
        match supplier.build_metadata(published).await {
            Ok(build) => enriched.build = build.or(enriched.build),
            Err(e) => warn!(error = %e, "failed to fetch build metadata"),
        }

        if (enriched.git.is_none() || enriched.build.is_none())
            && let (Some(build_number), Some(commit_id)) =
                (published.build_number(), published.commit_id())
        {
            match supplier.artifact_metadata(&build_number, &commit_id).await {
                Ok(Some((git, build))) => {
                    enriched.git = enriched.git.or(git);
                    enriched.build = enriched.build.or(build);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "failed to fetch artifact metadata"),
            }
        }

        enriched
    }

    fn supplier_for(
        &self,
        artifact: &DeliveryArtifact,
    ) -> Result<Arc<dyn ArtifactSupplier>, CoreError> {
        self.suppliers
            .for_artifact(artifact)
            .ok_or_else(|| CoreError::NoSupplier(artifact.kind.clone()))
    }

    async fn latest_from_supplier(
        &self,
        supplier: &dyn ArtifactSupplier,
        artifact: &DeliveryArtifact,
    ) -> Result<Option<PublishedArtifact>, CoreError> {
        let config = match &artifact.delivery_config_name {
            Some(name) => match self.store.get_delivery_config(name).await {
                Ok(config) => Some(config),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };
        Ok(supplier.latest_artifact(artifact, config.as_ref()).await?)
    }
}

/// Periodic full artifact sync, run on one worker at a time
pub struct ArtifactSyncAgent {
    listener: Arc<ArtifactListener>,
    interval: Duration,
    lock_timeout: Duration,
}

impl ArtifactSyncAgent {
    #[must_use]
    pub fn new(listener: Arc<ArtifactListener>, interval: Duration, lock_timeout: Duration) -> Self {
        Self {
            listener,
            interval,
            lock_timeout,
        }
    }
}

#[async_trait]
impl FleetAgent for ArtifactSyncAgent {
    fn name(&self) -> &str {
        ARTIFACT_SYNC_LOCK
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    async fn invoke(&self) -> Result<(), CoreError> {
        self.listener.sync_artifact_versions().await.map(|_| ())
    }
}
