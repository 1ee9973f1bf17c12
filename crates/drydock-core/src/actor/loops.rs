//! The three periodic loops: resources, environments, fleet agents

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use drydock_store::Store;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::check_loop::CheckLoop;
use crate::actuation::ResourceActuator;
use crate::error::CoreError;
use crate::message::CycleSummary;
use crate::promotion::EnvironmentPromotionChecker;

pub const RESOURCE_CHECK: &str = "resource-check";
pub const ENVIRONMENT_CHECK: &str = "environment-check";
pub const AGENTS: &str = "agents";

/// Checks every due resource, one task per resource
pub struct ResourceCheckLoop {
    store: Arc<dyn Store>,
    actuator: Arc<ResourceActuator>,
    min_age: Duration,
    batch_size: usize,
}

impl ResourceCheckLoop {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        actuator: Arc<ResourceActuator>,
        min_age: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            actuator,
            min_age,
            batch_size,
        }
    }
}

#[async_trait]
impl CheckLoop for ResourceCheckLoop {
    fn name(&self) -> &str {
        RESOURCE_CHECK
    }

    async fn run_once(&self) -> CycleSummary {
        let mut summary = CycleSummary::new(RESOURCE_CHECK);
        let resources = match self
            .store
            .resources_due_for_check(self.min_age, self.batch_size)
            .await
        {
            Ok(resources) => resources,
            Err(e) => {
                error!(error = %e, "failed to fetch resources due for check");
                summary.failed += 1;
                return summary;
            }
        };

        let mut handles = Vec::with_capacity(resources.len());
        for resource in resources {
            let actuator = self.actuator.clone();
            let id = resource.id.clone();
            let handle = tokio::spawn(async move { actuator.check_resource(&resource).await });
            handles.push((id, handle));
        }
        summary.dispatched = handles.len();

        for (id, handle) in handles {
            match handle.await {
                Ok(outcome) if outcome.is_failure() => summary.failed += 1,
                Ok(outcome) if outcome.is_skip() => summary.skipped += 1,
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(resource = %id, error = %e, "resource check task panicked");
                }
            }
        }

        if summary.dispatched > 0 {
            debug!(
                dispatched = summary.dispatched,
                failed = summary.failed,
                "resource check cycle finished"
            );
        }
        summary
    }
}

/// Runs the promotion checker on every due delivery config
pub struct EnvironmentCheckLoop {
    store: Arc<dyn Store>,
    checker: Arc<EnvironmentPromotionChecker>,
    min_age: Duration,
    batch_size: usize,
}

impl EnvironmentCheckLoop {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        checker: Arc<EnvironmentPromotionChecker>,
        min_age: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            checker,
            min_age,
            batch_size,
        }
    }
}

#[async_trait]
impl CheckLoop for EnvironmentCheckLoop {
    fn name(&self) -> &str {
        ENVIRONMENT_CHECK
    }

    async fn run_once(&self) -> CycleSummary {
        let mut summary = CycleSummary::new(ENVIRONMENT_CHECK);
        let configs = match self
            .store
            .delivery_configs_due_for_check(self.min_age, self.batch_size)
            .await
        {
            Ok(configs) => configs,
            Err(e) => {
                error!(error = %e, "failed to fetch delivery configs due for check");
                summary.failed += 1;
                return summary;
            }
        };

        let mut handles = Vec::with_capacity(configs.len());
        for config in configs {
            let checker = self.checker.clone();
            let name = config.name.clone();
            let handle = tokio::spawn(async move { checker.check_environments(&config).await });
            handles.push((name, handle));
        }
        summary.dispatched = handles.len();

        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(_)) => summary.succeeded += 1,
                Ok(Err(e)) => {
                    summary.failed += 1;
                    error!(config = %name, error = %e, "environment check failed");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(config = %name, error = %e, "environment check task panicked");
                }
            }
        }
        summary
    }
}

/// Fleet-wide job that at most one worker runs at a time
#[async_trait]
pub trait FleetAgent: Send + Sync {
    /// Also the name of the lock held while it runs
    fn name(&self) -> &str;

    /// Time between runs on this worker
    fn interval(&self) -> Duration;

    /// How long the lock is held if the worker dies mid-run
    fn lock_timeout(&self) -> Duration;

    async fn invoke(&self) -> Result<(), CoreError>;
}

/// Invokes due fleet agents under their named locks
///
/// Agents are due immediately after start.
pub struct AgentLoop {
    store: Arc<dyn Store>,
    agents: Vec<Arc<dyn FleetAgent>>,
    next_run: Mutex<HashMap<String, Instant>>,
}

impl AgentLoop {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, agents: Vec<Arc<dyn FleetAgent>>) -> Self {
        Self {
            store,
            agents,
            next_run: Mutex::new(HashMap::new()),
        }
    }

    async fn invoke_locked(&self, agent: &dyn FleetAgent) -> Result<bool, CoreError> {
        if !self
            .store
            .try_acquire_lock(agent.name(), agent.lock_timeout())
            .await?
        {
            debug!(agent = agent.name(), "agent lock held elsewhere");
            return Ok(false);
        }

        info!(agent = agent.name(), "invoking agent");
        let result = agent.invoke().await;
        if let Err(e) = self.store.release_lock(agent.name()).await {
            warn!(agent = agent.name(), error = %e, "failed to release agent lock");
        }
        result.map(|()| true)
    }
}

#[async_trait]
impl CheckLoop for AgentLoop {
    fn name(&self) -> &str {
        AGENTS
    }

    async fn run_once(&self) -> CycleSummary {
        let mut summary = CycleSummary::new(AGENTS);
        let now = Instant::now();

        let due: Vec<Arc<dyn FleetAgent>> = {
            let next_run = self.next_run.lock().await;
            self.agents
                .iter()
                .filter(|a| next_run.get(a.name()).is_none_or(|at| *at <= now))
                .cloned()
                .collect()
        };
        summary.dispatched = due.len();

        let results = join_all(due.iter().map(|agent| self.invoke_locked(agent.as_ref()))).await;

        let mut next_run = self.next_run.lock().await;
        for (agent, result) in due.iter().zip(results) {
            match result {
                Ok(true) => {
                    summary.succeeded += 1;
                    next_run.insert(agent.name().to_string(), now + agent.interval());
                }
                Ok(false) => {
                    summary.skipped += 1;
                    next_run.insert(agent.name().to_string(), now + agent.interval());
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(agent = agent.name(), error = %e, "agent failed");
                }
            }
        }
        summary
    }
}
