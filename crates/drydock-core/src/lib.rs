//! drydock-core: Reconciliation and promotion engine
//!
//! Ingests artifact versions, promotes them through environments under
//! constraints, reconciles resources against their desired state, and drives
//! all of it from kameo check loop actors.

pub mod actor;
pub mod actuation;
pub mod config;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod message;
pub mod persister;
pub mod promotion;
pub mod publisher;
pub mod state;

pub use actor::{
    AgentLoop, CheckLoop, CheckLoopActor, CheckLoopActorArgs, EnvironmentCheckLoop, FleetAgent,
    ResourceCheckLoop, Scheduler,
};
pub use actuation::{
    ActuationPauser, BlackoutWindowVeto, CheckOutcome, ResourceActuator, Veto, VetoEnforcer,
    VetoResponse,
};
pub use config::EngineConfig;
pub use constraints::{
    ConstraintJudge, ConstraintOutcome, ConstraintSelection, EnvironmentConstraintRunner,
    TimeWindowSpec, TimeWindows,
};
pub use engine::{Engine, EnginePlugins};
pub use error::{CoreError, DuplicateResourceId};
pub use ingestion::{ArtifactListener, ArtifactSyncAgent, IngestOutcome};
pub use message::{CycleSummary, GetLoopStats, LoopStats, RunCycle};
pub use persister::ResourcePersister;
pub use promotion::{ApprovedVersion, EnvironmentPromotionChecker};
pub use publisher::{BroadcastPublisher, EventPublisher};
pub use state::Lifecycle;
