//! Error types for drydock-plugin

use thiserror::Error;

/// Errors raised by plugin implementations
#[derive(Error, Debug, Clone)]
pub enum PluginError {
    /// A dependency of the resource is not ready yet; retry next cycle
    #[error("currently unresolvable: {0}")]
    CurrentlyUnresolvable(String),

    /// The resource spec could not be interpreted by the handler
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// A call to the backing system failed
    #[error("upstream call failed: {0}")]
    Upstream(String),

    /// The artifact or version is unknown to the supplier
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Another plugin already claims the same kind
    #[error("duplicate plugin for {0}")]
    Duplicate(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl PluginError {
    /// Whether the failure should end the check early without being reported as an error
    #[must_use]
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, PluginError::CurrentlyUnresolvable(_))
    }

    /// Whether retrying on the next cycle may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PluginError::CurrentlyUnresolvable(_) | PluginError::Upstream(_)
        )
    }
}
