//! Persisted state of stateful constraints

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Status of a stateful constraint for one version in one environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintStatus {
    Pending,
    Pass,
    Fail,
    OverridePass,
    OverrideFail,
}

impl ConstraintStatus {
    /// Resolved to a passing status
    #[must_use]
    pub fn passes(self) -> bool {
        matches!(self, Self::Pass | Self::OverridePass)
    }

    /// Resolved to a failing status
    #[must_use]
    pub fn failed(self) -> bool {
        matches!(self, Self::Fail | Self::OverrideFail)
    }

    /// No longer pending
    #[must_use]
    pub fn is_complete(self) -> bool {
        self != Self::Pending
    }
}

impl fmt::Display for ConstraintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::OverridePass => "OVERRIDE_PASS",
            Self::OverrideFail => "OVERRIDE_FAIL",
        };
        f.write_str(s)
    }
}

/// Persisted state keyed by (config, environment, artifact, version, constraint kind)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintState {
    pub delivery_config_name: String,
    pub environment_name: String,
    pub artifact_reference: String,
    pub artifact_version: String,
    #[serde(rename = "type")]
    pub constraint_kind: String,
    pub status: ConstraintStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ConstraintState {
    /// A fresh pending state
    pub fn pending(
        delivery_config_name: impl Into<String>,
        environment_name: impl Into<String>,
        artifact_reference: impl Into<String>,
        artifact_version: impl Into<String>,
        constraint_kind: impl Into<String>,
    ) -> Self {
        Self {
            delivery_config_name: delivery_config_name.into(),
            environment_name: environment_name.into(),
            artifact_reference: artifact_reference.into(),
            artifact_version: artifact_version.into(),
            constraint_kind: constraint_kind.into(),
            status: ConstraintStatus::Pending,
            created_at: Utc::now(),
            judged_at: None,
            judged_by: None,
            comment: None,
        }
    }

    /// Copy with a new status and judgement details
    #[must_use]
    pub fn judged(
        mut self,
        status: ConstraintStatus,
        judged_by: impl Into<String>,
        comment: Option<String>,
    ) -> Self {
        self.status = status;
        self.judged_at = Some(Utc::now());
        self.judged_by = Some(judged_by.into());
        self.comment = comment;
        self
    }
}
