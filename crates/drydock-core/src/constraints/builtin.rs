//! Built-in constraint evaluators

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use drydock_api::{ConstraintState, ConstraintStatus, DeliveryArtifact, DeliveryConfig, Environment};
use drydock_plugin::{ConstraintEvaluator, PluginError};
use drydock_store::{EnvironmentKey, Store};
use tracing::{debug, info};

use super::window::TimeWindows;

pub const DEPENDS_ON: &str = "depends-on";
pub const ALLOWED_TIMES: &str = "allowed-times";
pub const MANUAL_JUDGEMENT: &str = "manual-judgement";

/// Judge recorded when a pending judgement times out
const TIMEOUT_JUDGE: &str = "drydock";

fn store_error(e: impl std::fmt::Display) -> PluginError {
    PluginError::Upstream(e.to_string())
}

/// Version must already be approved in another environment
///
/// Declared as `{"type": "depends-on", "environment": "test"}`.
pub struct DependsOnEvaluator {
    store: Arc<dyn Store>,
}

impl DependsOnEvaluator {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ConstraintEvaluator for DependsOnEvaluator {
    fn constraint_kind(&self) -> &str {
        DEPENDS_ON
    }

    async fn can_promote(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, PluginError> {
        let upstream = environment
            .constraint(DEPENDS_ON)
            .and_then(|c| c.attribute_str("environment"))
            .ok_or_else(|| {
                PluginError::InvalidSpec(format!(
                    "{DEPENDS_ON} on {} names no environment",
                    environment.name
                ))
            })?;

        let key = EnvironmentKey::new(&config.name, upstream, artifact.effective_reference());
        self.store
            .is_approved_for(&key, version)
            .await
            .map_err(store_error)
    }
}

/// Promotion only inside declared day/hour windows
pub struct AllowedTimesEvaluator;

#[async_trait]
impl ConstraintEvaluator for AllowedTimesEvaluator {
    fn constraint_kind(&self) -> &str {
        ALLOWED_TIMES
    }

    async fn can_promote(
        &self,
        _artifact: &DeliveryArtifact,
        _version: &str,
        _config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, PluginError> {
        let Some(constraint) = environment.constraint(ALLOWED_TIMES) else {
            return Ok(true);
        };
        Ok(TimeWindows::from_constraint(constraint)?.contains(Utc::now()))
    }
}

/// Promotion waits for a person to judge the version
///
/// The first sighting of a version records a PENDING state. Pending states
/// older than the configured timeout are failed.
pub struct ManualJudgementEvaluator {
    store: Arc<dyn Store>,
    timeout: Option<Duration>,
}

impl ManualJudgementEvaluator {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, timeout: Option<Duration>) -> Self {
        Self { store, timeout }
    }
}

#[async_trait]
impl ConstraintEvaluator for ManualJudgementEvaluator {
    fn constraint_kind(&self) -> &str {
        MANUAL_JUDGEMENT
    }

    fn is_stateful(&self) -> bool {
        true
    }

    async fn can_promote(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, PluginError> {
        let key = EnvironmentKey::new(&config.name, &environment.name, artifact.effective_reference());
        let state = self
            .store
            .get_constraint_state(&key, version, MANUAL_JUDGEMENT)
            .await
            .map_err(store_error)?;

        let Some(state) = state else {
            debug!(environment = %environment.name, version = %version, "awaiting manual judgement");
            let pending = ConstraintState::pending(
                &config.name,
                &environment.name,
                artifact.effective_reference(),
                version,
                MANUAL_JUDGEMENT,
            );
            self.store
                .store_constraint_state(&pending)
                .await
                .map_err(store_error)?;
            return Ok(false);
        };

        if state.status.is_complete() {
            return Ok(state.status.passes());
        }

        let expired = self.timeout.is_some_and(|timeout| {
            chrono::Duration::from_std(timeout)
                .is_ok_and(|timeout| Utc::now() - state.created_at > timeout)
        });
        if expired {
            info!(environment = %environment.name, version = %version, "manual judgement timed out");
            let failed = state.judged(
                ConstraintStatus::Fail,
                TIMEOUT_JUDGE,
                Some("timed out awaiting judgement".to_string()),
            );
            self.store
                .store_constraint_state(&failed)
                .await
                .map_err(store_error)?;
        }
        Ok(false)
    }
}
