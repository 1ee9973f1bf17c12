//! Actor implementations

pub mod check_loop;
pub mod loops;
pub mod scheduler;

pub use check_loop::{CheckLoop, CheckLoopActor, CheckLoopActorArgs};
pub use loops::{
    AGENTS, AgentLoop, ENVIRONMENT_CHECK, EnvironmentCheckLoop, FleetAgent, RESOURCE_CHECK,
    ResourceCheckLoop,
};
pub use scheduler::Scheduler;
