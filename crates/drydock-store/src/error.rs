//! Error types for drydock-store

use thiserror::Error;

/// Errors returned by repositories
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No delivery config with this name
    #[error("no such delivery config: {0}")]
    NoSuchDeliveryConfig(String),

    /// No resource with this id
    #[error("no such resource: {0}")]
    NoSuchResource(String),

    /// No registered artifact with this reference
    #[error("no such artifact: {reference} in {delivery_config}")]
    NoSuchArtifact {
        /// Owning config
        delivery_config: String,
        /// Artifact reference
        reference: String,
    },

    /// The config name is already owned by another application
    #[error("delivery config {name} belongs to {existing_application}, not {application}")]
    ConflictingDeliveryConfig {
        /// Config name
        name: String,
        /// Application submitting the config
        application: String,
        /// Application that owns the name
        existing_application: String,
    },

    /// The resource id is already declared by another config
    #[error("resource {id} is already declared by delivery config {owner}")]
    ResourceOwnedElsewhere {
        /// Resource id
        id: String,
        /// Config owning the id
        owner: String,
    },

    /// Backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the error means "not found"
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NoSuchDeliveryConfig(_)
                | StoreError::NoSuchResource(_)
                | StoreError::NoSuchArtifact { .. }
        )
    }
}
