//! Message types for actor communication
//!
//! Message handlers are implemented in their respective actor modules.

use chrono::{DateTime, Utc};
use kameo_macros::Reply;

// ============================================================================
// CheckLoopActor Messages
// ============================================================================

/// Run one cycle of the loop now
#[derive(Debug)]
pub struct RunCycle;

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Reply)]
pub struct CycleSummary {
    /// Loop name
    pub name: String,
    /// Whether checks were enabled for this cycle
    pub enabled: bool,
    /// Units dispatched
    pub dispatched: usize,
    /// Units that finished with a normal outcome
    pub succeeded: usize,
    /// Units that ended in an expected skip
    pub skipped: usize,
    /// Units that failed or panicked
    pub failed: usize,
}

impl CycleSummary {
    /// An enabled cycle with nothing counted yet
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            ..Self::default()
        }
    }

    /// A cycle skipped because checks are disabled
    #[must_use]
    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Get counters for a loop
#[derive(Debug)]
pub struct GetLoopStats;

/// Loop counters
#[derive(Debug, Clone, Reply)]
pub struct LoopStats {
    /// Loop name
    pub name: String,
    /// Cycles run, including disabled ones
    pub cycles: u64,
    /// When the last cycle finished
    pub last_run: Option<DateTime<Utc>>,
    /// Summary of the last cycle
    pub last_summary: Option<CycleSummary>,
}
