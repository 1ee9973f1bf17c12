//! Delivery config upsert and delete
//!
//! An upsert is planned in memory first ([`normalize`], [`plan_changes`])
//! and then handed to the store as one change set, so either all of it lands
//! or none of it does.

use std::collections::BTreeMap;
use std::sync::Arc;

use drydock_api::resource::{APPLICATION_KEY, SERVICE_ACCOUNT_KEY};
use drydock_api::{
    DeliveryConfig, DeliveryEvent, Environment, Resource, SubmittedDeliveryConfig,
};
use drydock_store::{ConfigChangeSet, ResourceChange, Store};
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{CoreError, DuplicateResourceId};
use crate::publisher::EventPublisher;

pub struct ResourcePersister {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
}

impl ResourcePersister {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Create or replace a delivery config with its resources and artifacts
    ///
    /// # Errors
    /// - `CoreError::DuplicateResourceIds` if a resource id is declared twice
    /// - `CoreError::InvalidDeliveryConfig` if no service account is known
    /// - `CoreError::Store` if the name belongs to another application or a
    ///   resource belongs to another config
    #[instrument(skip_all, fields(config = %submitted.safe_name(), application = %submitted.application))]
    pub async fn upsert(
        &self,
        submitted: &SubmittedDeliveryConfig,
    ) -> Result<DeliveryConfig, CoreError> {
        let name = submitted.safe_name();
        let existing = match self.store.get_delivery_config(&name).await {
            Ok(existing) => Some(existing),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        let service_account = submitted
            .service_account
            .clone()
            .or_else(|| existing.as_ref().map(|c| c.service_account.clone()))
            .ok_or_else(|| {
                CoreError::InvalidDeliveryConfig(format!("{name} has no service account"))
            })?;

        let config = normalize(submitted, &service_account)?;
        let changes = plan_changes(existing.as_ref(), config);
        self.store.apply_change_set(&changes).await?;

        let application = changes.config.application.clone();
        for (resource, change) in &changes.resources {
            let event = match change {
                ResourceChange::Created => DeliveryEvent::ResourceCreated {
                    resource: resource.id.clone(),
                    application: application.clone(),
                },
                ResourceChange::Updated => DeliveryEvent::ResourceUpdated {
                    resource: resource.id.clone(),
                    application: application.clone(),
                },
            };
            self.publisher.publish(event);
        }
        for id in &changes.removed_resources {
            self.publisher.publish(DeliveryEvent::ResourceDeleted {
                resource: id.clone(),
                application: application.clone(),
            });
        }

        info!(
            changed = changes.resources.len(),
            removed = changes.removed_resources.len(),
            "stored delivery config"
        );
        Ok(changes.config)
    }

    /// Delete a delivery config and everything it owns
    ///
    /// # Errors
    /// Returns `CoreError::Store` if no config has the name
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<DeliveryConfig, CoreError> {
        let removed = self.store.delete_delivery_config(name).await?;
        for resource in removed.resources() {
            self.publisher.publish(DeliveryEvent::ResourceDeleted {
                resource: resource.id.clone(),
                application: removed.application.clone(),
            });
        }
        info!(resources = removed.resources().count(), "deleted delivery config");
        Ok(removed)
    }
}

/// Build the stored form of a submitted config
///
/// Artifacts get their owning config name and every resource gets the
/// application and service account in its metadata.
///
/// # Errors
/// Returns `CoreError::DuplicateResourceIds` listing every repeated id
pub fn normalize(
    submitted: &SubmittedDeliveryConfig,
    service_account: &str,
) -> Result<DeliveryConfig, CoreError> {
    let name = submitted.safe_name();

    let mut seen: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for environment in &submitted.environments {
        for resource in &environment.resources {
            seen.entry(resource.id.as_str())
                .or_default()
                .push(environment.name.clone());
        }
    }
    let duplicates: Vec<DuplicateResourceId> = seen
        .into_iter()
        .filter(|(_, environments)| environments.len() > 1)
        .map(|(id, environments)| DuplicateResourceId {
            id: id.to_string(),
            environments,
        })
        .collect();
    if !duplicates.is_empty() {
        return Err(CoreError::DuplicateResourceIds(duplicates));
    }

    let mut config = DeliveryConfig::new(&name, &submitted.application, service_account);
    config.metadata = submitted.metadata.clone();
    config.artifacts = submitted
        .artifacts
        .iter()
        .map(|a| {
            let mut artifact = a.clone();
            artifact.delivery_config_name = Some(name.clone());
            artifact
        })
        .collect();

    for submitted_env in &submitted.environments {
        let mut environment = Environment::new(&submitted_env.name);
        environment.constraints = submitted_env.constraints.clone();
        for r in &submitted_env.resources {
            let mut resource = Resource::new(&r.id, &r.api_version, &r.kind, r.spec.clone());
            resource.metadata = r.metadata.clone();
            resource.metadata.insert(
                APPLICATION_KEY.to_string(),
                Value::String(submitted.application.clone()),
            );
            resource.metadata.insert(
                SERVICE_ACCOUNT_KEY.to_string(),
                Value::String(service_account.to_string()),
            );
            environment.resources.push(resource);
        }
        config.environments.push(environment);
    }

    Ok(config)
}

/// Work out what storing `config` over `existing` changes
#[must_use]
pub fn plan_changes(existing: Option<&DeliveryConfig>, config: DeliveryConfig) -> ConfigChangeSet {
    let mut changes = ConfigChangeSet::new(config);

    for resource in changes.config.resources() {
        let previous = existing.and_then(|c| c.resources().find(|r| r.id == resource.id));
        match previous {
            None => changes
                .resources
                .push((resource.clone(), ResourceChange::Created)),
            Some(previous) if !previous.same_definition(resource) => changes
                .resources
                .push((resource.clone(), ResourceChange::Updated)),
            Some(_) => {}
        }
    }
    changes.artifacts = changes.config.artifacts.clone();

    if let Some(existing) = existing {
        changes.removed_resources = existing
            .resources()
            .filter(|r| !changes.config.resources().any(|n| n.id == r.id))
            .map(|r| r.id.clone())
            .collect();
        changes.removed_artifacts = existing
            .artifacts
            .iter()
            .map(|a| a.effective_reference().to_string())
            .filter(|r| changes.config.artifact_by_reference(r).is_none())
            .collect();
        changes.removed_environments = existing
            .environments
            .iter()
            .filter(|e| changes.config.environment(&e.name).is_none())
            .map(|e| e.name.clone())
            .collect();
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_api::{DeliveryArtifact, SubmittedEnvironment, SubmittedResource};
    use serde_json::json;

    fn submitted_resource(id: &str, image: &str) -> SubmittedResource {
        SubmittedResource {
            id: id.to_string(),
            api_version: "ec2.spinnaker.netflix.com/v1".to_string(),
            kind: "cluster".to_string(),
            spec: json!({ "image": image }),
            metadata: BTreeMap::new(),
        }
    }

    fn submitted(environments: Vec<SubmittedEnvironment>) -> SubmittedDeliveryConfig {
        SubmittedDeliveryConfig {
            name: None,
            application: "fnord".to_string(),
            service_account: Some("keel@spinnaker".to_string()),
            artifacts: vec![DeliveryArtifact::new("fnord", "deb")],
            environments,
            metadata: BTreeMap::new(),
        }
    }

    fn env(name: &str, resources: Vec<SubmittedResource>) -> SubmittedEnvironment {
        SubmittedEnvironment {
            name: name.to_string(),
            resources,
            constraints: Vec::new(),
        }
    }

    #[test]
    fn test_normalize_injects_metadata() {
        let config = normalize(
            &submitted(vec![env("test", vec![submitted_resource("r1", "a")])]),
            "keel@spinnaker",
        )
        .unwrap();

        assert_eq!(config.name, "fnord-manifest");
        assert_eq!(
            config.artifacts[0].delivery_config_name.as_deref(),
            Some("fnord-manifest")
        );
        let resource = config.resources().next().unwrap();
        assert_eq!(resource.application(), Some("fnord"));
        assert_eq!(resource.service_account(), Some("keel@spinnaker"));
    }

    #[test]
    fn test_normalize_reports_every_duplicate() {
        let err = normalize(
            &submitted(vec![
                env("test", vec![submitted_resource("r1", "a"), submitted_resource("r2", "a")]),
                env("prod", vec![submitted_resource("r1", "b"), submitted_resource("r2", "b")]),
            ]),
            "keel@spinnaker",
        )
        .unwrap_err();

        let CoreError::DuplicateResourceIds(duplicates) = err else {
            panic!("expected duplicate resource ids, got {err:?}");
        };
        assert_eq!(
            duplicates,
            vec![
                DuplicateResourceId {
                    id: "r1".to_string(),
                    environments: vec!["test".to_string(), "prod".to_string()],
                },
                DuplicateResourceId {
                    id: "r2".to_string(),
                    environments: vec!["test".to_string(), "prod".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_plan_changes_against_previous_version() {
        let previous = normalize(
            &submitted(vec![
                env("test", vec![submitted_resource("r1", "a"), submitted_resource("r2", "a")]),
                env("staging", vec![submitted_resource("r3", "a")]),
            ]),
            "keel@spinnaker",
        )
        .unwrap();
        let mut next = submitted(vec![env(
            "test",
            vec![
                submitted_resource("r1", "a"),
                submitted_resource("r2", "b"),
                submitted_resource("r4", "a"),
            ],
        )]);
        next.artifacts = vec![DeliveryArtifact::new("fnord-2", "deb")];
        let next = normalize(&next, "keel@spinnaker").unwrap();

        let changes = plan_changes(Some(&previous), next);

        let planned: Vec<(&str, ResourceChange)> = changes
            .resources
            .iter()
            .map(|(r, c)| (r.id.as_str(), *c))
            .collect();
        assert_eq!(
            planned,
            vec![("r2", ResourceChange::Updated), ("r4", ResourceChange::Created)]
        );
        assert_eq!(changes.removed_resources, vec!["r3".to_string()]);
        assert_eq!(changes.removed_environments, vec!["staging".to_string()]);
        assert_eq!(changes.removed_artifacts, vec!["fnord".to_string()]);
    }

    #[test]
    fn test_plan_changes_for_new_config_creates_everything() {
        let config = normalize(
            &submitted(vec![env("test", vec![submitted_resource("r1", "a")])]),
            "keel@spinnaker",
        )
        .unwrap();

        let changes = plan_changes(None, config);
        assert_eq!(changes.resources.len(), 1);
        assert_eq!(changes.resources[0].1, ResourceChange::Created);
        assert!(changes.removed_resources.is_empty());
        assert_eq!(changes.artifacts.len(), 1);
    }
}
