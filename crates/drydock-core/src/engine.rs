//! Wires the engine components onto one store and one publisher

use std::sync::Arc;
use std::time::Duration;

use drydock_plugin::{ConstraintEvaluator, HandlerRegistry, SupplierRegistry};
use drydock_store::Store;
use tracing::info;

use crate::actor::{AgentLoop, CheckLoop, EnvironmentCheckLoop, FleetAgent, ResourceCheckLoop, Scheduler};
use crate::actuation::{ActuationPauser, BlackoutWindowVeto, ResourceActuator, Veto, VetoEnforcer};
use crate::config::EngineConfig;
use crate::constraints::{
    AllowedTimesEvaluator, ConstraintJudge, DependsOnEvaluator, EnvironmentConstraintRunner,
    ManualJudgementEvaluator, TimeWindows,
};
use crate::error::CoreError;
use crate::ingestion::{ArtifactListener, ArtifactSyncAgent};
use crate::persister::ResourcePersister;
use crate::promotion::EnvironmentPromotionChecker;
use crate::publisher::EventPublisher;
use crate::state::Lifecycle;

/// Plugins supplied by the embedding process
#[derive(Default)]
pub struct EnginePlugins {
    pub handlers: HandlerRegistry,
    pub suppliers: SupplierRegistry,
    /// Added to the built-in evaluators; a plugin of the same kind replaces the built-in
    pub evaluators: Vec<Arc<dyn ConstraintEvaluator>>,
    pub vetoes: Vec<Arc<dyn Veto>>,
    /// Fleet agents run alongside the artifact sync
    pub agents: Vec<Arc<dyn FleetAgent>>,
}

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn Store>,
    lifecycle: Lifecycle,
    pub listener: Arc<ArtifactListener>,
    pub runner: Arc<EnvironmentConstraintRunner>,
    pub checker: Arc<EnvironmentPromotionChecker>,
    pub actuator: Arc<ResourceActuator>,
    pub persister: Arc<ResourcePersister>,
    pub judge: Arc<ConstraintJudge>,
    pub pauser: Arc<ActuationPauser>,
    agents: Vec<Arc<dyn FleetAgent>>,
}

impl Engine {
    /// Build every component
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the blackout windows are malformed
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Store>,
        publisher: Arc<dyn EventPublisher>,
        plugins: EnginePlugins,
    ) -> Result<Self, CoreError> {
        let EnginePlugins {
            handlers,
            suppliers,
            evaluators,
            vetoes,
            agents,
        } = plugins;

        let mut all_evaluators: Vec<Arc<dyn ConstraintEvaluator>> = vec![
            Arc::new(DependsOnEvaluator::new(store.clone())),
            Arc::new(AllowedTimesEvaluator),
            Arc::new(ManualJudgementEvaluator::new(
                store.clone(),
                config
                    .constraints
                    .manual_judgement_timeout_secs
                    .map(Duration::from_secs),
            )),
        ];
        all_evaluators.retain(|builtin| {
            !evaluators
                .iter()
                .any(|e| e.constraint_kind() == builtin.constraint_kind())
        });
        all_evaluators.extend(evaluators);

        let mut vetoes = vetoes;
        if !config.actuation.blackout_windows.is_empty() {
            let windows = TimeWindows::parse(
                &config.actuation.blackout_windows,
                config.actuation.blackout_utc_offset.as_deref(),
            )
            .map_err(|e| CoreError::Config(format!("blackout windows: {e}")))?;
            vetoes.push(Arc::new(BlackoutWindowVeto::new(windows)));
        }

        let runner = Arc::new(EnvironmentConstraintRunner::new(store.clone(), all_evaluators));
        let listener = Arc::new(ArtifactListener::new(
            store.clone(),
            Arc::new(suppliers),
            publisher.clone(),
        ));
        let checker = Arc::new(EnvironmentPromotionChecker::new(
            store.clone(),
            runner.clone(),
            publisher.clone(),
        ));
        let actuator = Arc::new(ResourceActuator::new(
            store.clone(),
            Arc::new(handlers),
            VetoEnforcer::new(vetoes),
            publisher.clone(),
            config.actuation.unchanged_delta_retry(),
        ));
        let persister = Arc::new(ResourcePersister::new(store.clone(), publisher));
        let judge = Arc::new(ConstraintJudge::new(store.clone(), runner.clone()));
        let pauser = Arc::new(ActuationPauser::new(store.clone()));

        let mut all_agents: Vec<Arc<dyn FleetAgent>> = vec![Arc::new(ArtifactSyncAgent::new(
            listener.clone(),
            Duration::from_secs(config.artifacts.sync_interval_secs),
            Duration::from_secs(config.artifacts.sync_lock_secs),
        ))];
        all_agents.extend(agents);

        Ok(Self {
            lifecycle: Lifecycle::new(config.scheduler.enabled),
            config,
            store,
            listener,
            runner,
            checker,
            actuator,
            persister,
            judge,
            pauser,
            agents: all_agents,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Spawn the resource, environment and agent loops
    #[must_use]
    pub fn start_scheduler(&self) -> Scheduler {
        let loops: Vec<(Arc<dyn CheckLoop>, Duration)> = vec![
            (
                Arc::new(ResourceCheckLoop::new(
                    self.store.clone(),
                    self.actuator.clone(),
                    self.config.resource_check.min_age(),
                    self.config.resource_check.batch_size,
                )),
                self.config.resource_check.delay(),
            ),
            (
                Arc::new(EnvironmentCheckLoop::new(
                    self.store.clone(),
                    self.checker.clone(),
                    self.config.environment_check.min_age(),
                    self.config.environment_check.batch_size,
                )),
                self.config.environment_check.delay(),
            ),
            (
                Arc::new(AgentLoop::new(self.store.clone(), self.agents.clone())),
                self.config.agents.delay(),
            ),
        ];

        info!(agents = self.agents.len(), "starting scheduler");
        Scheduler::start(self.lifecycle.clone(), loops)
    }
}
