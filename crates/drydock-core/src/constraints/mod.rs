//! Environment constraint evaluation
//!
//! [`EnvironmentConstraintRunner`] decides, for one artifact in one
//! environment, which version should be queued for approval. The promotion
//! checker drives it for every environment and commits the approvals.
//!
//! Candidate order matters: the forward scan is newest-first, and pending
//! versions left behind by the scan are re-checked oldest-first so stateful
//! evaluators can time them out in a stable order.

pub mod builtin;
pub mod judge;
pub mod window;

use std::collections::HashSet;
use std::sync::Arc;

use drydock_api::{DeliveryArtifact, DeliveryConfig, Environment};
use drydock_plugin::ConstraintEvaluator;
use drydock_store::{ApprovalQueue, EnvironmentKey, Store};
use tracing::{debug, info, instrument, warn};

use crate::error::CoreError;

pub use builtin::{AllowedTimesEvaluator, DependsOnEvaluator, ManualJudgementEvaluator};
pub use judge::ConstraintJudge;
pub use window::{TimeWindowSpec, TimeWindows};

/// Aggregate result of the stateful constraints for one version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOutcome {
    Pass,
    Pending,
    Fail,
}

/// What one environment check decided
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSelection {
    /// Newest version currently passing every constraint
    pub selected: Option<String>,
    /// Versions queued for approval by this check
    pub queued: Vec<String>,
    /// Versions still waiting on a stateful constraint
    pub pending: Vec<String>,
}

/// Runs stateless and stateful constraints for one (artifact, environment)
pub struct EnvironmentConstraintRunner {
    store: Arc<dyn Store>,
    evaluators: Vec<Arc<dyn ConstraintEvaluator>>,
}

impl EnvironmentConstraintRunner {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, evaluators: Vec<Arc<dyn ConstraintEvaluator>>) -> Self {
        Self { store, evaluators }
    }

    /// Constraint kinds this runner knows about
    pub fn constraint_kinds(&self) -> impl Iterator<Item = &str> {
        self.evaluators.iter().map(|e| e.constraint_kind())
    }

    fn applicable<'a>(
        &'a self,
        environment: &'a Environment,
        stateful: bool,
    ) -> impl Iterator<Item = &'a Arc<dyn ConstraintEvaluator>> + 'a {
        self.evaluators
            .iter()
            .filter(move |e| e.is_stateful() == stateful && e.applies_to(environment))
    }

    /// Select and queue the version to promote
    ///
    /// `versions` must be newest-first. Vetoed versions are never selected.
    ///
    /// # Errors
    /// Returns `CoreError::Store` if constraint state cannot be read or written
    #[instrument(skip_all, fields(config = %config.name, environment = %environment.name, artifact = %artifact.effective_reference()))]
    pub async fn check_environment(
        &self,
        config: &DeliveryConfig,
        environment: &Environment,
        artifact: &DeliveryArtifact,
        versions: &[String],
        vetoed: &HashSet<String>,
    ) -> Result<ConstraintSelection, CoreError> {
        let key = EnvironmentKey::new(
            &config.name,
            &environment.name,
            artifact.effective_reference(),
        );
        let mut pending_to_check = self.store.pending_constraint_versions(&key).await?;
        let mut selection = ConstraintSelection::default();
        let mut newer_pending = false;

        for version in versions {
            if vetoed.contains(version) {
                debug!(version = %version, "skipping vetoed version");
                continue;
            }
            // behind a pending version, pending versions are left to the
            // oldest-first pass and only already-judged ones qualify here
            if newer_pending && pending_to_check.contains(version) {
                continue;
            }
            pending_to_check.retain(|v| v != version);

            if !self
                .check_stateless_constraints(artifact, version, config, environment)
                .await
            {
                continue;
            }

            if newer_pending {
                if self
                    .stateful_constraints_passed(&key, version, environment)
                    .await?
                {
                    selection.selected = Some(version.clone());
                    break;
                }
                continue;
            }

            match self
                .check_stateful_constraints(artifact, version, config, environment)
                .await?
            {
                ConstraintOutcome::Pass => {
                    selection.selected = Some(version.clone());
                    break;
                }
                ConstraintOutcome::Pending => {
                    debug!(version = %version, "stateful constraints pending");
                    selection.pending.push(version.clone());
                    newer_pending = true;
                }
                ConstraintOutcome::Fail => {}
            }
        }

        if let Some(version) = &selection.selected {
            let latest = self
                .store
                .latest_approved_version(&key, artifact.versioning)
                .await?;
            if latest.as_deref() == Some(version.as_str()) {
                debug!(version = %version, "already the latest approved version");
            } else {
                info!(version = %version, "queueing version for approval");
                self.store
                    .queue_for_approval(ApprovalQueue::ConstraintRunner, &key, version)
                    .await?;
                selection.queued.push(version.clone());
            }
        }

        // older pending versions the scan never reached
        pending_to_check.sort_by(|a, b| artifact.versioning.compare(a, b));
        for version in pending_to_check {
            if vetoed.contains(&version)
                || !self
                    .check_stateless_constraints(artifact, &version, config, environment)
                    .await
            {
                continue;
            }
            match self
                .check_stateful_constraints(artifact, &version, config, environment)
                .await?
            {
                ConstraintOutcome::Pass => {
                    info!(version = %version, "pending version now passes, queueing for approval");
                    self.store
                        .queue_for_approval(ApprovalQueue::ConstraintRunner, &key, &version)
                        .await?;
                    selection.queued.push(version);
                }
                ConstraintOutcome::Pending => selection.pending.push(version),
                ConstraintOutcome::Fail => {
                    debug!(version = %version, "pending version resolved to failure");
                }
            }
        }

        Ok(selection)
    }

    /// Whether every applicable stateless constraint passes
    ///
    /// Evaluator errors count as a failure for this pass.
    pub async fn check_stateless_constraints(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        config: &DeliveryConfig,
        environment: &Environment,
    ) -> bool {
        for evaluator in self.applicable(environment, false) {
            match evaluator
                .can_promote(artifact, version, config, environment)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        version = %version,
                        constraint = evaluator.constraint_kind(),
                        "stateless constraint blocks promotion"
                    );
                    return false;
                }
                Err(e) => {
                    warn!(
                        version = %version,
                        constraint = evaluator.constraint_kind(),
                        error = %e,
                        "constraint evaluation failed"
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Evaluate every applicable stateful constraint
    ///
    /// An evaluator that refuses while its persisted state is still pending
    /// makes the version pending; any other refusal fails it.
    ///
    /// # Errors
    /// Returns `CoreError::Store` if constraint state cannot be read
    pub async fn check_stateful_constraints(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<ConstraintOutcome, CoreError> {
        let key = EnvironmentKey::new(
            &config.name,
            &environment.name,
            artifact.effective_reference(),
        );
        let mut outcome = ConstraintOutcome::Pass;

        for evaluator in self.applicable(environment, true) {
            let passed = match evaluator
                .can_promote(artifact, version, config, environment)
                .await
            {
                Ok(passed) => passed,
                Err(e) => {
                    warn!(
                        version = %version,
                        constraint = evaluator.constraint_kind(),
                        error = %e,
                        "constraint evaluation failed"
                    );
                    false
                }
            };
            if passed {
                continue;
            }

            let state = self
                .store
                .get_constraint_state(&key, version, evaluator.constraint_kind())
                .await?;
            let this = match state {
                Some(s) if !s.status.is_complete() => ConstraintOutcome::Pending,
                _ => ConstraintOutcome::Fail,
            };
            outcome = match (outcome, this) {
                (ConstraintOutcome::Fail, _) | (_, ConstraintOutcome::Fail) => {
                    ConstraintOutcome::Fail
                }
                _ => ConstraintOutcome::Pending,
            };
        }

        Ok(outcome)
    }

    /// Whether every applicable stateful constraint already has a passing state
    ///
    /// Evaluators are not called.
    ///
    /// # Errors
    /// Returns `CoreError::Store` if constraint state cannot be read
    pub async fn stateful_constraints_passed(
        &self,
        key: &EnvironmentKey,
        version: &str,
        environment: &Environment,
    ) -> Result<bool, CoreError> {
        for evaluator in self.applicable(environment, true) {
            let state = self
                .store
                .get_constraint_state(key, version, evaluator.constraint_kind())
                .await?;
            if !state.is_some_and(|s| s.status.passes()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
