//! Pausing actuation per application or per resource

use std::sync::Arc;

use drydock_api::Resource;
use drydock_store::Store;
use tracing::{info, instrument};

use crate::error::CoreError;

pub struct ActuationPauser {
    store: Arc<dyn Store>,
}

impl ActuationPauser {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// # Errors
    /// Returns `CoreError::Store` if the pause cannot be recorded
    #[instrument(skip(self))]
    pub async fn pause_application(&self, application: &str) -> Result<(), CoreError> {
        self.store.pause_application(application).await?;
        info!("paused application");
        Ok(())
    }

    /// Resume an application and make its resources due right away
    ///
    /// # Errors
    /// Returns `CoreError::Store` if the store fails
    #[instrument(skip(self))]
    pub async fn resume_application(&self, application: &str) -> Result<(), CoreError> {
        self.store.resume_application(application).await?;

        let ids: Vec<String> = self
            .store
            .delivery_configs_for_application(application)
            .await?
            .iter()
            .flat_map(|c| c.resources().map(|r| r.id.clone()))
            .collect();
        self.store.trigger_recheck(&ids).await?;
        info!(resources = ids.len(), "resumed application");
        Ok(())
    }

    /// # Errors
    /// Returns `CoreError::Store` if the pause cannot be recorded
    #[instrument(skip(self))]
    pub async fn pause_resource(&self, id: &str) -> Result<(), CoreError> {
        self.store.pause_resource(id).await?;
        info!("paused resource");
        Ok(())
    }

    /// # Errors
    /// Returns `CoreError::Store` if the store fails
    #[instrument(skip(self))]
    pub async fn resume_resource(&self, id: &str) -> Result<(), CoreError> {
        self.store.resume_resource(id).await?;
        self.store.trigger_recheck(&[id.to_string()]).await?;
        info!("resumed resource");
        Ok(())
    }

    /// Whether the resource or its application is paused
    ///
    /// # Errors
    /// Returns `CoreError::Store` if the store fails
    pub async fn is_paused(&self, resource: &Resource) -> Result<bool, CoreError> {
        if self.store.is_resource_paused(&resource.id).await? {
            return Ok(true);
        }
        match resource.application() {
            Some(application) => Ok(self.store.is_application_paused(application).await?),
            None => Ok(false),
        }
    }
}
