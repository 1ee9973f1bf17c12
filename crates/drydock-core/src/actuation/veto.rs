//! Cross-cutting actuation vetoes

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use drydock_api::Resource;
use tracing::debug;

use crate::constraints::TimeWindows;

/// A veto's verdict on actuating one resource right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VetoResponse {
    pub allowed: bool,
    /// Name of the veto that decided
    pub veto: String,
    pub message: Option<String>,
    /// Also record the resource's desired artifact version as vetoed
    pub veto_artifact: bool,
}

impl VetoResponse {
    pub fn allow(veto: impl Into<String>) -> Self {
        Self {
            allowed: true,
            veto: veto.into(),
            message: None,
            veto_artifact: false,
        }
    }

    pub fn deny(veto: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            veto: veto.into(),
            message: Some(message.into()),
            veto_artifact: false,
        }
    }

    #[must_use]
    pub fn with_artifact_veto(mut self) -> Self {
        self.veto_artifact = true;
        self
    }
}

/// Policy that may forbid actuating a resource
#[async_trait]
pub trait Veto: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, resource: &Resource) -> VetoResponse;
}

/// Runs every registered veto; the first denial wins
#[derive(Default, Clone)]
pub struct VetoEnforcer {
    vetoes: Vec<Arc<dyn Veto>>,
}

impl VetoEnforcer {
    #[must_use]
    pub fn new(vetoes: Vec<Arc<dyn Veto>>) -> Self {
        Self { vetoes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vetoes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vetoes.is_empty()
    }

    pub async fn can_check(&self, resource: &Resource) -> VetoResponse {
        for veto in &self.vetoes {
            let response = veto.check(resource).await;
            if !response.allowed {
                debug!(resource = %resource.id, veto = %response.veto, "actuation vetoed");
                return response;
            }
        }
        VetoResponse::allow("all")
    }
}

/// Forbids actuation inside configured blackout windows
pub struct BlackoutWindowVeto {
    windows: TimeWindows,
}

impl BlackoutWindowVeto {
    #[must_use]
    pub fn new(windows: TimeWindows) -> Self {
        Self { windows }
    }
}

#[async_trait]
impl Veto for BlackoutWindowVeto {
    fn name(&self) -> &str {
        "blackout-window"
    }

    async fn check(&self, _resource: &Resource) -> VetoResponse {
        if self.windows.contains(Utc::now()) {
            VetoResponse::deny(self.name(), "inside a blackout window")
        } else {
            VetoResponse::allow(self.name())
        }
    }
}
