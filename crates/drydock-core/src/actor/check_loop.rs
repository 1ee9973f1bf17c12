//! `CheckLoopActor`: one periodic check loop
//!
//! The actor processes one `RunCycle` at a time, so a cycle never overlaps
//! the previous one of the same loop.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::message::{CycleSummary, GetLoopStats, LoopStats, RunCycle};
use crate::state::Lifecycle;

/// Work done by one loop per cycle
#[async_trait]
pub trait CheckLoop: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the due batch, dispatch it and wait for all of it
    async fn run_once(&self) -> CycleSummary;
}

/// Arguments for spawning a `CheckLoopActor`
pub struct CheckLoopActorArgs {
    pub check: Arc<dyn CheckLoop>,
    pub lifecycle: Lifecycle,
}

pub struct CheckLoopActor {
    check: Arc<dyn CheckLoop>,
    lifecycle: Lifecycle,
    cycles: u64,
    last: Option<(chrono::DateTime<Utc>, CycleSummary)>,
}

impl Actor for CheckLoopActor {
    type Args = CheckLoopActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), check = args.check.name(), "CheckLoopActor starting");

        Ok(Self {
            check: args.check,
            lifecycle: args.lifecycle,
            cycles: 0,
            last: None,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(check = self.check.name(), reason = ?reason, cycles = self.cycles, "CheckLoopActor stopping");
        Ok(())
    }
}

impl Message<RunCycle> for CheckLoopActor {
    type Reply = CycleSummary;

    async fn handle(
        &mut self,
        _msg: RunCycle,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let summary = if self.lifecycle.is_enabled() {
            self.check.run_once().await
        } else {
            debug!(check = self.check.name(), "checks disabled, skipping cycle");
            CycleSummary::disabled(self.check.name())
        };

        self.cycles += 1;
        self.last = Some((Utc::now(), summary.clone()));
        summary
    }
}

impl Message<GetLoopStats> for CheckLoopActor {
    type Reply = LoopStats;

    async fn handle(
        &mut self,
        _msg: GetLoopStats,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        LoopStats {
            name: self.check.name().to_string(),
            cycles: self.cycles,
            last_run: self.last.as_ref().map(|(at, _)| *at),
            last_summary: self.last.as_ref().map(|(_, s)| s.clone()),
        }
    }
}
