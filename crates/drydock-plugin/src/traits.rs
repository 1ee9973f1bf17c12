//! Plugin traits

use async_trait::async_trait;
use drydock_api::{
    BuildMetadata, DeliveryArtifact, DeliveryConfig, Environment, GitMetadata, PublishedArtifact,
    Resource, ResourceKind, Task,
};
use serde_json::Value;

use crate::diff::ResourceDiff;
use crate::error::PluginError;
use crate::types::{ArtifactVersionRef, SupportedArtifact};

/// Resolves and actuates one `(apiVersion, kind)` of resource
///
/// The engine never branches on concrete kinds. Everything it needs to know
/// about a resource comes back through these calls.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Name reported in actuation events
    fn name(&self) -> &str;

    /// Kind this handler is registered under
    fn supported_kind(&self) -> ResourceKind;

    /// Resolve the state the resource should be in
    async fn desired(&self, resource: &Resource) -> Result<Value, PluginError>;

    /// Resolve the live state, `None` when the resource does not exist
    async fn current(&self, resource: &Resource) -> Result<Option<Value>, PluginError>;

    /// Create a missing resource
    async fn create(
        &self,
        resource: &Resource,
        diff: &ResourceDiff,
    ) -> Result<Vec<Task>, PluginError>;

    /// Converge an existing resource onto its desired state
    async fn update(
        &self,
        resource: &Resource,
        diff: &ResourceDiff,
    ) -> Result<Vec<Task>, PluginError>;

    /// Whether a create or update launched earlier is still running
    async fn actuation_in_progress(&self, _resource: &Resource) -> Result<bool, PluginError> {
        Ok(false)
    }

    /// Artifact version the desired state deploys, if any
    fn desired_artifact(&self, _desired: &Value) -> Option<ArtifactVersionRef> {
        None
    }
}

/// Source of artifact versions and their metadata for one artifact kind
#[async_trait]
pub trait ArtifactSupplier: Send + Sync {
    fn supported_artifact(&self) -> SupportedArtifact;

    /// Latest version published for the artifact, if any
    async fn latest_artifact(
        &self,
        artifact: &DeliveryArtifact,
        config: Option<&DeliveryConfig>,
    ) -> Result<Option<PublishedArtifact>, PluginError>;

    /// Look up git and build metadata by build number and commit id
    async fn artifact_metadata(
        &self,
        _build_number: &str,
        _commit_id: &str,
    ) -> Result<Option<(Option<GitMetadata>, Option<BuildMetadata>)>, PluginError> {
        Ok(None)
    }

    async fn git_metadata(
        &self,
        artifact: &PublishedArtifact,
    ) -> Result<Option<GitMetadata>, PluginError> {
        Ok(artifact.git.clone())
    }

    async fn build_metadata(
        &self,
        artifact: &PublishedArtifact,
    ) -> Result<Option<BuildMetadata>, PluginError> {
        Ok(artifact.build.clone())
    }
}

/// Gate deciding whether a version may be promoted into an environment
#[async_trait]
pub trait ConstraintEvaluator: Send + Sync {
    /// Constraint kind as declared on environments
    fn constraint_kind(&self) -> &str;

    /// Implicit evaluators apply to every environment
    fn is_implicit(&self) -> bool {
        false
    }

    /// Stateful evaluators persist a status per version and environment
    fn is_stateful(&self) -> bool {
        false
    }

    async fn can_promote(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, PluginError>;

    /// Whether this evaluator applies to the environment
    fn applies_to(&self, environment: &Environment) -> bool {
        self.is_implicit() || environment.has_constraint(self.constraint_kind())
    }
}
