//! Delivery config, environment, constraint, pin and veto types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::artifact::DeliveryArtifact;
use crate::resource::Resource;

/// A constraint declared on an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Constraint {
    /// Constraint kind (`depends-on`, `allowed-times`, `manual-judgement`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific attributes
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub attributes: BTreeMap<String, Value>,
}

impl Constraint {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// String attribute lookup
    #[must_use]
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Named promotion target holding resources and constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a resource
    #[must_use]
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Add a constraint
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// First declared constraint of a kind
    #[must_use]
    pub fn constraint(&self, kind: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.kind == kind)
    }

    /// Whether a constraint of this kind is declared
    #[must_use]
    pub fn has_constraint(&self, kind: &str) -> bool {
        self.constraint(kind).is_some()
    }

    /// Whether any resource in this environment deploys the artifact
    #[must_use]
    pub fn uses_artifact(&self, artifact: &DeliveryArtifact) -> bool {
        self.resources
            .iter()
            .any(|r| r.artifact_reference() == Some(artifact.effective_reference()))
    }

    /// Whether the environment contains the resource
    #[must_use]
    pub fn contains_resource(&self, resource_id: &str) -> bool {
        self.resources.iter().any(|r| r.id == resource_id)
    }
}

/// Declarative unit binding one application's artifacts, environments and resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfig {
    pub name: String,
    pub application: String,
    pub service_account: String,
    #[serde(default)]
    pub artifacts: Vec<DeliveryArtifact>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: BTreeMap<String, Value>,
}

impl DeliveryConfig {
    pub fn new(
        name: impl Into<String>,
        application: impl Into<String>,
        service_account: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            application: application.into(),
            service_account: service_account.into(),
            artifacts: Vec::new(),
            environments: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add an artifact
    #[must_use]
    pub fn with_artifact(mut self, artifact: DeliveryArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Add an environment
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments.push(environment);
        self
    }

    /// All resources across all environments
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.environments.iter().flat_map(|e| e.resources.iter())
    }

    /// Environment holding the resource
    #[must_use]
    pub fn environment_for(&self, resource_id: &str) -> Option<&Environment> {
        self.environments
            .iter()
            .find(|e| e.contains_resource(resource_id))
    }

    /// Environment by name
    #[must_use]
    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Artifact by reference
    #[must_use]
    pub fn artifact_by_reference(&self, reference: &str) -> Option<&DeliveryArtifact> {
        self.artifacts
            .iter()
            .find(|a| a.effective_reference() == reference)
    }

    /// Artifact by published name and kind
    #[must_use]
    pub fn matching_artifact(&self, name: &str, kind: &str) -> Option<&DeliveryArtifact> {
        self.artifacts
            .iter()
            .find(|a| a.name == name && a.kind == kind)
    }
}

/// Forces one artifact version into one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PinnedEnvironment {
    pub delivery_config_name: String,
    pub environment: String,
    pub artifact_reference: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Excludes one artifact version from one environment until cleared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentArtifactVeto {
    pub delivery_config_name: String,
    pub environment: String,
    pub artifact_reference: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vetoed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}
