//! Fixed-delay drivers for the check loop actors

use std::sync::Arc;
use std::time::Duration;

use kameo::actor::ActorRef;
use kameo::prelude::*;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::check_loop::{CheckLoop, CheckLoopActor, CheckLoopActorArgs};
use crate::error::CoreError;
use crate::message::{CycleSummary, GetLoopStats, LoopStats, RunCycle};
use crate::state::Lifecycle;

struct LoopHandle {
    name: String,
    actor: ActorRef<CheckLoopActor>,
    driver: JoinHandle<()>,
}

/// Owns the loop actors and the tasks that tick them
pub struct Scheduler {
    lifecycle: Lifecycle,
    loops: Vec<LoopHandle>,
}

impl Scheduler {
    /// Spawn one actor per loop, each ticked after `delay` from the end of its last cycle
    ///
    /// Drivers idle while the lifecycle is down.
    #[must_use]
    pub fn start(lifecycle: Lifecycle, loops: Vec<(Arc<dyn CheckLoop>, Duration)>) -> Self {
        let loops = loops
            .into_iter()
            .map(|(check, delay)| {
                let name = check.name().to_string();
                let actor = CheckLoopActor::spawn(CheckLoopActorArgs {
                    check,
                    lifecycle: lifecycle.clone(),
                });
                let driver = tokio::spawn(drive(actor.clone(), lifecycle.clone(), delay));
                info!(check = %name, delay_ms = delay.as_millis(), "started check loop");
                LoopHandle {
                    name,
                    actor,
                    driver,
                }
            })
            .collect();

        Self { lifecycle, loops }
    }

    /// Enable checks
    pub fn application_up(&self) {
        self.lifecycle.up();
    }

    /// Disable checks; cycles in flight finish
    pub fn application_down(&self) {
        self.lifecycle.down();
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn actor(&self, name: &str) -> Result<&ActorRef<CheckLoopActor>, CoreError> {
        self.loops
            .iter()
            .find(|l| l.name == name)
            .map(|l| &l.actor)
            .ok_or_else(|| CoreError::Config(format!("no check loop named {name}")))
    }

    /// Run one cycle of a loop now, queued behind any cycle in flight
    ///
    /// # Errors
    /// Returns `CoreError::Config` for an unknown loop or `CoreError::Actor`
    /// if the loop actor is gone
    pub async fn run_cycle(&self, name: &str) -> Result<CycleSummary, CoreError> {
        self.actor(name)?
            .ask(RunCycle)
            .await
            .map_err(|e| CoreError::Actor(e.to_string()))
    }

    /// # Errors
    /// Returns `CoreError::Config` for an unknown loop or `CoreError::Actor`
    /// if the loop actor is gone
    pub async fn stats(&self, name: &str) -> Result<LoopStats, CoreError> {
        self.actor(name)?
            .ask(GetLoopStats)
            .await
            .map_err(|e| CoreError::Actor(e.to_string()))
    }

    /// Stop every driver and loop actor
    pub async fn shutdown(self) {
        self.lifecycle.down();
        for handle in self.loops {
            handle.driver.abort();
            info!(check = %handle.name, "stopping check loop");
            handle.actor.stop_gracefully().await.ok();
        }
    }
}

async fn drive(actor: ActorRef<CheckLoopActor>, lifecycle: Lifecycle, delay: Duration) {
    let mut lifecycle_rx = lifecycle.subscribe();
    loop {
        if lifecycle_rx.wait_for(|enabled| *enabled).await.is_err() {
            break;
        }
        tokio::time::sleep(delay).await;
        if !actor.is_alive() {
            break;
        }
        if let Err(e) = actor.ask(RunCycle).await {
            warn!(error = %e, "check cycle failed");
        }
    }
}
