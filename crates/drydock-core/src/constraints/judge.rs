//! Out-of-band judgement of stateful constraints

use std::sync::Arc;

use drydock_api::{ConstraintState, ConstraintStatus};
use drydock_store::{ApprovalQueue, EnvironmentKey, Store};
use tracing::{info, instrument};

use super::EnvironmentConstraintRunner;
use crate::error::CoreError;

/// Records judgements and queues versions once all their stateful constraints pass
pub struct ConstraintJudge {
    store: Arc<dyn Store>,
    runner: Arc<EnvironmentConstraintRunner>,
}

impl ConstraintJudge {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, runner: Arc<EnvironmentConstraintRunner>) -> Self {
        Self { store, runner }
    }

    /// Judge one stateful constraint for one version
    ///
    /// # Errors
    /// Returns `CoreError::Store` if the config or environment is unknown or
    /// the state cannot be written
    #[instrument(skip(self, key, comment), fields(key = %key))]
    pub async fn judge(
        &self,
        key: &EnvironmentKey,
        version: &str,
        constraint_kind: &str,
        status: ConstraintStatus,
        judged_by: &str,
        comment: Option<String>,
    ) -> Result<ConstraintState, CoreError> {
        let config = self
            .store
            .get_delivery_config(&key.delivery_config_name)
            .await?;
        let environment = config.environment(&key.environment).ok_or_else(|| {
            CoreError::InvalidDeliveryConfig(format!(
                "{} has no environment {}",
                config.name, key.environment
            ))
        })?;

        let current = self
            .store
            .get_constraint_state(key, version, constraint_kind)
            .await?
            .unwrap_or_else(|| {
                ConstraintState::pending(
                    &key.delivery_config_name,
                    &key.environment,
                    &key.artifact_reference,
                    version,
                    constraint_kind,
                )
            });
        let judged = current.judged(status, judged_by, comment);
        self.store.store_constraint_state(&judged).await?;
        info!(version = %version, constraint = %constraint_kind, status = %status, "constraint judged");

        if status.passes()
            && self
                .runner
                .stateful_constraints_passed(key, version, environment)
                .await?
        {
            self.store
                .queue_for_approval(ApprovalQueue::StatefulResolved, key, version)
                .await?;
        }

        Ok(judged)
    }
}
