//! Small value types shared between plugins and the engine

use drydock_api::VersioningStrategy;
use serde::{Deserialize, Serialize};

/// The (kind, versioning strategy) pair an artifact supplier serves
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupportedArtifact {
    /// Artifact kind (`docker`, `deb`, ...)
    pub kind: String,
    /// Versioning strategy the supplier understands
    pub versioning: VersioningStrategy,
}

impl SupportedArtifact {
    pub fn new(kind: impl Into<String>, versioning: VersioningStrategy) -> Self {
        Self {
            kind: kind.into(),
            versioning,
        }
    }
}

/// An artifact version a resource's desired state deploys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVersionRef {
    /// Delivery artifact reference
    pub reference: String,
    /// Version string
    pub version: String,
}

impl ArtifactVersionRef {
    pub fn new(reference: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            version: version.into(),
        }
    }
}
