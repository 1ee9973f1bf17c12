//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constraints::window::TimeWindowSpec;

/// Settings for every engine component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub resource_check: CheckConfig,
    #[serde(default = "default_environment_check")]
    pub environment_check: CheckConfig,
    pub agents: AgentsConfig,
    pub actuation: ActuationConfig,
    pub artifacts: ArtifactSyncConfig,
    pub constraints: ConstraintConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            resource_check: CheckConfig::default(),
            environment_check: default_environment_check(),
            agents: AgentsConfig::default(),
            actuation: ActuationConfig::default(),
            artifacts: ArtifactSyncConfig::default(),
            constraints: ConstraintConfig::default(),
        }
    }
}

/// Initial lifecycle state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Start with checks enabled instead of waiting for application-up
    pub enabled: bool,
}

/// One periodic check loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Units checked more recently than this are not due
    pub min_age_secs: u64,
    /// Most units dispatched per cycle
    pub batch_size: usize,
    /// Pause between the end of one cycle and the start of the next
    pub delay_secs: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            min_age_secs: 60,
            batch_size: 100,
            delay_secs: 1,
        }
    }
}

fn default_environment_check() -> CheckConfig {
    CheckConfig {
        min_age_secs: 30,
        batch_size: 20,
        delay_secs: 1,
    }
}

impl CheckConfig {
    #[must_use]
    pub fn min_age(&self) -> Duration {
        Duration::from_secs(self.min_age_secs)
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Fleet agent loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub delay_secs: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self { delay_secs: 30 }
    }
}

impl AgentsConfig {
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Resource actuation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationConfig {
    /// How long an unchanged delta that was already acted on is left alone
    pub unchanged_delta_retry_secs: u64,
    /// Windows during which no resource is actuated
    pub blackout_windows: Vec<TimeWindowSpec>,
    /// UTC offset the blackout windows are expressed in, e.g. `+02:00`
    pub blackout_utc_offset: Option<String>,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            unchanged_delta_retry_secs: 600,
            blackout_windows: Vec::new(),
            blackout_utc_offset: None,
        }
    }
}

impl ActuationConfig {
    #[must_use]
    pub fn unchanged_delta_retry(&self) -> Duration {
        Duration::from_secs(self.unchanged_delta_retry_secs)
    }
}

/// Artifact full-sync agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSyncConfig {
    pub sync_interval_secs: u64,
    pub sync_lock_secs: u64,
}

impl Default for ArtifactSyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 3600,
            sync_lock_secs: 300,
        }
    }
}

/// Built-in constraint evaluators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Pending manual judgements older than this fail
    pub manual_judgement_timeout_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.scheduler.enabled);
        assert_eq!(config.resource_check.min_age(), Duration::from_secs(60));
        assert_eq!(config.agents.delay(), Duration::from_secs(30));
        assert_eq!(config.actuation.unchanged_delta_retry_secs, 600);
        assert!(config.constraints.manual_judgement_timeout_secs.is_none());
    }

    #[test]
    fn test_environment_check_default_when_omitted() {
        let config: EngineConfig = serde_json::from_str(r#"{"resource_check": {"batch_size": 5}}"#)
            .unwrap();
        assert_eq!(config.resource_check.batch_size, 5);
        assert_eq!(config.resource_check.min_age_secs, 60);
        assert_eq!(config.environment_check.batch_size, 20);
        assert_eq!(config.environment_check.min_age_secs, 30);
    }
}
