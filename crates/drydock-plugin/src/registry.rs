//! Lookup tables from resource and artifact kinds to plugins

use std::collections::HashMap;
use std::sync::Arc;

use drydock_api::{DeliveryArtifact, ResourceKind};
use tracing::debug;

use crate::error::PluginError;
use crate::traits::{ArtifactSupplier, ResourceHandler};

/// Resource handlers keyed by `(apiVersion, kind)`
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<ResourceKind, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler
    ///
    /// # Errors
    /// Returns `PluginError::Duplicate` if the kind already has a handler
    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) -> Result<(), PluginError> {
        let kind = handler.supported_kind();
        if self.handlers.contains_key(&kind) {
            return Err(PluginError::Duplicate(kind.to_string()));
        }
        debug!(kind = %kind, handler = handler.name(), "registered resource handler");
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Handler for a kind
    #[must_use]
    pub fn supporting(&self, kind: &ResourceKind) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers.get(kind).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Artifact suppliers keyed by artifact kind
#[derive(Default, Clone)]
pub struct SupplierRegistry {
    suppliers: Vec<Arc<dyn ArtifactSupplier>>,
}

impl SupplierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a supplier
    ///
    /// # Errors
    /// Returns `PluginError::Duplicate` if the (kind, versioning) pair is taken
    pub fn register(&mut self, supplier: Arc<dyn ArtifactSupplier>) -> Result<(), PluginError> {
        let supported = supplier.supported_artifact();
        if self
            .suppliers
            .iter()
            .any(|s| s.supported_artifact() == supported)
        {
            return Err(PluginError::Duplicate(format!(
                "{}/{}",
                supported.kind, supported.versioning
            )));
        }
        debug!(kind = %supported.kind, versioning = %supported.versioning, "registered artifact supplier");
        self.suppliers.push(supplier);
        Ok(())
    }

    /// Supplier for an artifact
    ///
    /// Prefers an exact (kind, versioning) match and falls back to any
    /// supplier of the kind.
    #[must_use]
    pub fn for_artifact(&self, artifact: &DeliveryArtifact) -> Option<Arc<dyn ArtifactSupplier>> {
        self.suppliers
            .iter()
            .find(|s| {
                let supported = s.supported_artifact();
                supported.kind == artifact.kind && supported.versioning == artifact.versioning
            })
            .or_else(|| self.for_kind_ref(&artifact.kind))
            .cloned()
    }

    /// Any supplier of the kind
    #[must_use]
    pub fn for_kind(&self, kind: &str) -> Option<Arc<dyn ArtifactSupplier>> {
        self.for_kind_ref(kind).cloned()
    }

    fn for_kind_ref(&self, kind: &str) -> Option<&Arc<dyn ArtifactSupplier>> {
        self.suppliers
            .iter()
            .find(|s| s.supported_artifact().kind == kind)
    }
}
