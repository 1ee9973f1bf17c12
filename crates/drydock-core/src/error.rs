//! Core error types for drydock-core

use std::fmt;

use drydock_plugin::PluginError;
use drydock_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resource id declared more than once in a submitted config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateResourceId {
    /// The repeated id
    pub id: String,
    /// Every environment declaring it, once per declaration
    pub environments: Vec<String>,
}

impl fmt::Display for DuplicateResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in [{}]", self.id, self.environments.join(", "))
    }
}

fn join_duplicates(duplicates: &[DuplicateResourceId]) -> String {
    duplicates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur in engine operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Submitted config declares the same resource id more than once
    #[error("duplicate resource ids: {}", join_duplicates(.0))]
    DuplicateResourceIds(Vec<DuplicateResourceId>),

    /// Submitted config is unusable for another reason
    #[error("invalid delivery config: {0}")]
    InvalidDeliveryConfig(String),

    /// Plugin failed to compute the desired state
    #[error("cannot resolve desired state of {resource}: {reason}")]
    CannotResolveDesiredState {
        /// Resource id
        resource: String,
        /// Plugin error message
        reason: String,
    },

    /// Plugin failed to compute the current state
    #[error("cannot resolve current state of {resource}: {reason}")]
    CannotResolveCurrentState {
        /// Resource id
        resource: String,
        /// Plugin error message
        reason: String,
    },

    /// No handler registered for the resource kind
    #[error("no resource handler for {0}")]
    NoHandler(String),

    /// Published version is missing a required field
    #[error("invalid artifact version: {0}")]
    InvalidArtifactVersion(String),

    /// No supplier registered for the artifact kind
    #[error("no artifact supplier for {0}")]
    NoSupplier(String),

    /// Persistence failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Plugin failure outside state resolution
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    Actor(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
