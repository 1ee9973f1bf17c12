//! Resource types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Metadata key holding the owning application
pub const APPLICATION_KEY: &str = "application";
/// Metadata key holding the execution identity
pub const SERVICE_ACCOUNT_KEY: &str = "serviceAccount";
/// Spec key a resource uses to point at a delivery artifact
pub const ARTIFACT_REFERENCE_KEY: &str = "artifactReference";

/// `(apiVersion, kind)` pair used to select a resource handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKind {
    pub api_version: String,
    pub kind: String,
}

impl ResourceKind {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// A typed, versioned resource spec with an installation-wide unique id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub api_version: String,
    pub kind: String,
    #[schema(value_type = Object)]
    pub spec: Value,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: BTreeMap<String, Value>,
}

impl Resource {
    pub fn new(
        id: impl Into<String>,
        api_version: impl Into<String>,
        kind: impl Into<String>,
        spec: Value,
    ) -> Self {
        Self {
            id: id.into(),
            api_version: api_version.into(),
            kind: kind.into(),
            spec,
            metadata: BTreeMap::new(),
        }
    }

    /// Handler selection key
    #[must_use]
    pub fn resource_kind(&self) -> ResourceKind {
        ResourceKind::new(&self.api_version, &self.kind)
    }

    /// Owning application, if recorded in metadata
    #[must_use]
    pub fn application(&self) -> Option<&str> {
        self.metadata.get(APPLICATION_KEY).and_then(Value::as_str)
    }

    /// Execution identity injected when the config was stored
    #[must_use]
    pub fn service_account(&self) -> Option<&str> {
        self.metadata.get(SERVICE_ACCOUNT_KEY).and_then(Value::as_str)
    }

    /// Delivery artifact reference this resource deploys, if any
    #[must_use]
    pub fn artifact_reference(&self) -> Option<&str> {
        self.spec.get(ARTIFACT_REFERENCE_KEY).and_then(Value::as_str)
    }

    /// Whether another resource carries the same definition
    ///
    /// Metadata is compared too so a service account change counts as an update.
    #[must_use]
    pub fn same_definition(&self, other: &Resource) -> bool {
        self.api_version == other.api_version
            && self.kind == other.kind
            && self.spec == other.spec
            && self.metadata == other.metadata
    }
}

/// A unit of work launched by a resource handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: String,
    pub name: String,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
