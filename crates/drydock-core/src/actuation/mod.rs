//! Per-resource diff and actuate
//!
//! One call to [`ResourceActuator::check_resource`] is one tick of the
//! resource state machine:
//!
//! paused → in progress → vetoed → resolve → missing | delta | valid
//!
//! Each tick ends with one terminal event, except a converged tick that is
//! still waiting on a launched actuation, which is silent. Failures are caught here and
//! published as `ResourceCheckError` so one bad resource never stops a batch.

pub mod pauser;
pub mod veto;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use drydock_api::{DeliveryEvent, EnvironmentArtifactVeto, Resource, SkipReason, Task};
use drydock_plugin::{HandlerRegistry, PluginError, ResourceDiff, ResourceHandler};
use drydock_store::Store;
use tracing::{debug, error, info, instrument, warn};

use crate::error::CoreError;
use crate::publisher::EventPublisher;

pub use pauser::ActuationPauser;
pub use veto::{BlackoutWindowVeto, Veto, VetoEnforcer, VetoResponse};

/// How one resource check ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Skipped(SkipReason),
    /// A dependency is not ready; retried next tick
    Unresolvable,
    Error,
    /// Resource did not exist and `create` was launched
    Missing,
    /// Resource differed and `update` was launched
    Delta,
    Valid,
    DeltaResolved,
    /// Converged, waiting on the outcome of a launched actuation
    Waiting,
}

impl CheckOutcome {
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped(_) | Self::Unresolvable)
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error)
    }
}

pub struct ResourceActuator {
    store: Arc<dyn Store>,
    handlers: Arc<HandlerRegistry>,
    vetoes: VetoEnforcer,
    pauser: ActuationPauser,
    publisher: Arc<dyn EventPublisher>,
    unchanged_delta_retry: Duration,
}

impl ResourceActuator {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        handlers: Arc<HandlerRegistry>,
        vetoes: VetoEnforcer,
        publisher: Arc<dyn EventPublisher>,
        unchanged_delta_retry: Duration,
    ) -> Self {
        Self {
            pauser: ActuationPauser::new(store.clone()),
            store,
            handlers,
            vetoes,
            publisher,
            unchanged_delta_retry,
        }
    }

    /// Run one check of one resource
    #[instrument(skip_all, fields(resource = %resource.id))]
    pub async fn check_resource(&self, resource: &Resource) -> CheckOutcome {
        let Some(handler) = self.handlers.supporting(&resource.resource_kind()) else {
            let e = CoreError::NoHandler(resource.resource_kind().to_string());
            return self.check_error(resource, &e).await;
        };

        match self.check(resource, handler.as_ref()).await {
            Ok(outcome) => outcome,
            Err(e) => self.check_error(resource, &e).await,
        }
    }

    async fn check(
        &self,
        resource: &Resource,
        handler: &dyn ResourceHandler,
    ) -> Result<CheckOutcome, CoreError> {
        let application = application_of(resource);

        if self.pauser.is_paused(resource).await? {
            debug!("actuation paused");
            return Ok(self.skip(resource, SkipReason::ActuationPaused).await);
        }

        if handler.actuation_in_progress(resource).await? {
            debug!("actuation already in progress");
            return Ok(self.skip(resource, SkipReason::ActuationInProgress).await);
        }

        let response = self.vetoes.can_check(resource).await;
        if !response.allowed {
            if response.veto_artifact {
                self.veto_desired_artifact(resource, handler, &response).await?;
            }
            self.emit(
                resource,
                DeliveryEvent::ResourceActuationVetoed {
                    resource: resource.id.clone(),
                    application,
                    veto: response.veto,
                    reason: response.message.unwrap_or_default(),
                },
            )
            .await;
            return Ok(CheckOutcome::Skipped(SkipReason::ActuationVetoed));
        }

        let (desired, current) = tokio::join!(handler.desired(resource), handler.current(resource));
        let desired = match desired {
            Ok(desired) => desired,
            Err(e) if e.is_unresolvable() => return Ok(self.unresolvable(resource, &e).await),
            Err(e) => {
                return Err(CoreError::CannotResolveDesiredState {
                    resource: resource.id.clone(),
                    reason: e.to_string(),
                });
            }
        };
        let current = match current {
            Ok(current) => current,
            Err(e) if e.is_unresolvable() => return Ok(self.unresolvable(resource, &e).await),
            Err(e) => {
                return Err(CoreError::CannotResolveCurrentState {
                    resource: resource.id.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let diff = ResourceDiff::compute(desired, current);
        if diff.has_changes() {
            self.actuate(resource, handler, &diff).await
        } else {
            self.converged(resource).await
        }
    }

    async fn actuate(
        &self,
        resource: &Resource,
        handler: &dyn ResourceHandler,
        diff: &ResourceDiff,
    ) -> Result<CheckOutcome, CoreError> {
        let application = application_of(resource);
        let changed = self
            .store
            .store_fingerprint(&resource.id, &diff.fingerprint())
            .await?;

        if !changed && self.recently_acted_on(&resource.id).await? {
            debug!("delta unchanged since last actuation");
            return Ok(self.skip(resource, SkipReason::DeltaUnchanged).await);
        }

        let (tasks, outcome) = if diff.is_missing() {
            warn!("resource is missing");
            self.emit(
                resource,
                DeliveryEvent::ResourceMissing {
                    resource: resource.id.clone(),
                    application: application.clone(),
                },
            )
            .await;
            (handler.create(resource, diff).await?, CheckOutcome::Missing)
        } else {
            warn!(paths = diff.entries().len(), "resource delta detected");
            self.emit(
                resource,
                DeliveryEvent::ResourceDeltaDetected {
                    resource: resource.id.clone(),
                    application: application.clone(),
                    delta: diff.to_delta(),
                },
            )
            .await;
            (handler.update(resource, diff).await?, CheckOutcome::Delta)
        };

        info!(plugin = handler.name(), tasks = tasks.len(), "actuation launched");
        self.store.mark_action_taken(&resource.id).await?;
        self.emit(
            resource,
            DeliveryEvent::ResourceActuationLaunched {
                resource: resource.id.clone(),
                application,
                plugin: handler.name().to_string(),
                tasks,
            },
        )
        .await;

        Ok(outcome)
    }

    async fn converged(&self, resource: &Resource) -> Result<CheckOutcome, CoreError> {
        let application = application_of(resource);
        let last = self.store.last_resource_event(&resource.id).await?;

        let resolved = match last {
            Some(DeliveryEvent::ResourceActuationLaunched { .. }) => {
                debug!("waiting on launched actuation");
                return Ok(CheckOutcome::Waiting);
            }
            Some(
                DeliveryEvent::ResourceDeltaDetected { .. }
                | DeliveryEvent::ResourceMissing { .. }
                | DeliveryEvent::ResourceTaskCompleted { .. },
            ) => true,
            _ => false,
        };
        self.store.clear_fingerprint(&resource.id).await?;

        if resolved {
            info!("resource delta resolved");
            self.emit(
                resource,
                DeliveryEvent::ResourceDeltaResolved {
                    resource: resource.id.clone(),
                    application,
                },
            )
            .await;
            Ok(CheckOutcome::DeltaResolved)
        } else {
            debug!("resource is valid");
            self.emit(
                resource,
                DeliveryEvent::ResourceValid {
                    resource: resource.id.clone(),
                    application,
                },
            )
            .await;
            Ok(CheckOutcome::Valid)
        }
    }

    /// Record the outcome of a task launched by an earlier actuation
    ///
    /// Ends the wait after `ResourceActuationLaunched`; the next converged
    /// check reports the delta as resolved.
    ///
    /// # Errors
    /// Returns `CoreError::Store` if the resource does not exist
    #[instrument(skip(self, task), fields(task = %task.id))]
    pub async fn record_task_outcome(
        &self,
        resource_id: &str,
        task: Task,
        succeeded: bool,
    ) -> Result<(), CoreError> {
        let resource = self.store.get_resource(resource_id).await?;
        if succeeded {
            info!("actuation task succeeded");
        } else {
            warn!("actuation task failed");
        }
        let event = DeliveryEvent::ResourceTaskCompleted {
            resource: resource.id.clone(),
            application: application_of(&resource),
            task,
            succeeded,
        };
        self.store.append_resource_history(&resource.id, &event).await?;
        self.publisher.publish(event);
        Ok(())
    }

    async fn recently_acted_on(&self, id: &str) -> Result<bool, CoreError> {
        if self.store.action_taken_count(id).await? == 0 {
            return Ok(false);
        }
        let Some(last) = self.store.last_action_at(id).await? else {
            return Ok(false);
        };
        Ok(chrono::Duration::from_std(self.unchanged_delta_retry)
            .map_or(true, |retry| Utc::now() - last < retry))
    }

    /// Record the version the resource would deploy as vetoed in its environment
    async fn veto_desired_artifact(
        &self,
        resource: &Resource,
        handler: &dyn ResourceHandler,
        response: &VetoResponse,
    ) -> Result<(), CoreError> {
        let desired = match handler.desired(resource).await {
            Ok(desired) => desired,
            Err(e) => {
                warn!(error = %e, "cannot resolve desired state to veto its artifact");
                return Ok(());
            }
        };
        let Some(artifact) = handler.desired_artifact(&desired) else {
            return Ok(());
        };

        let config = self.store.delivery_config_for_resource(&resource.id).await?;
        let Some(environment) = config.environment_for(&resource.id) else {
            return Ok(());
        };

        let veto = EnvironmentArtifactVeto {
            delivery_config_name: config.name.clone(),
            environment: environment.name.clone(),
            artifact_reference: artifact.reference.clone(),
            version: artifact.version.clone(),
            vetoed_by: Some(response.veto.clone()),
            comment: response.message.clone(),
        };
        if self.store.mark_as_vetoed(&veto).await? {
            warn!(
                environment = %environment.name,
                artifact = %artifact.reference,
                version = %artifact.version,
                "vetoed artifact version"
            );
            self.publisher.publish(DeliveryEvent::ArtifactVersionVetoed {
                application: config.application.clone(),
                environment: environment.name.clone(),
                artifact: artifact.reference,
                version: artifact.version,
            });
        }
        Ok(())
    }

    async fn skip(&self, resource: &Resource, reason: SkipReason) -> CheckOutcome {
        self.emit(
            resource,
            DeliveryEvent::ResourceCheckSkipped {
                resource: resource.id.clone(),
                reason,
            },
        )
        .await;
        CheckOutcome::Skipped(reason)
    }

    async fn unresolvable(&self, resource: &Resource, e: &PluginError) -> CheckOutcome {
        info!(reason = %e, "resource currently unresolvable");
        self.emit(
            resource,
            DeliveryEvent::ResourceCheckUnresolvable {
                resource: resource.id.clone(),
                application: application_of(resource),
                reason: e.to_string(),
            },
        )
        .await;
        CheckOutcome::Unresolvable
    }

    async fn check_error(&self, resource: &Resource, e: &CoreError) -> CheckOutcome {
        error!(error = %e, "resource check failed");
        self.emit(
            resource,
            DeliveryEvent::ResourceCheckError {
                resource: resource.id.clone(),
                application: application_of(resource),
                error: e.to_string(),
            },
        )
        .await;
        CheckOutcome::Error
    }

    /// Publish, recording resource events other than skips in the history
    async fn emit(&self, resource: &Resource, event: DeliveryEvent) {
        if !matches!(event, DeliveryEvent::ResourceCheckSkipped { .. })
            && let Err(e) = self
                .store
                .append_resource_history(&resource.id, &event)
                .await
        {
            warn!(error = %e, event = event.name(), "failed to record resource history");
        }
        self.publisher.publish(event);
    }
}

fn application_of(resource: &Resource) -> String {
    resource.application().unwrap_or_default().to_string()
}
