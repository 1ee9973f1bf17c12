//! Inbound documents: submitted delivery configs and artifact events

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::artifact::{DeliveryArtifact, PublishedArtifact};
use crate::delivery::Constraint;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedResource {
    pub id: String,
    pub api_version: String,
    pub kind: String,
    #[schema(value_type = Object)]
    pub spec: Value,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmittedEnvironment {
    pub name: String,
    #[serde(default)]
    pub resources: Vec<SubmittedResource>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedDeliveryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub application: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<DeliveryArtifact>,
    #[serde(default)]
    pub environments: Vec<SubmittedEnvironment>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: BTreeMap<String, Value>,
}

impl SubmittedDeliveryConfig {
    /// Config name, defaulting to `<application>-manifest`
    #[must_use]
    pub fn safe_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-manifest", self.application))
    }
}

/// Batch of artifact versions published by a build system
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArtifactPublishedEvent {
    pub artifacts: Vec<PublishedArtifact>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: BTreeMap<String, Value>,
}

/// A delivery artifact that has just been registered for tracking
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArtifactRegisteredEvent {
    pub artifact: DeliveryArtifact,
}
