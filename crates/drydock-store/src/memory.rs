//! In-process store
//!
//! All state sits behind one `RwLock`, which makes `apply_change_set` atomic
//! and keeps every repository consistent with the others.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drydock_api::{
    ConstraintState, ConstraintStatus, DeliveryArtifact, DeliveryConfig, DeliveryEvent,
    EnvironmentArtifactVeto, PinnedEnvironment, PublishedArtifact, Resource, VersioningStrategy,
};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::traits::{
    AgentLockRepository, ArtifactRepository, DeliveryConfigRepository, DiffFingerprintRepository,
    PausedRepository, ResourceRepository,
};
use crate::types::{
    ApprovalQueue, ConfigChangeSet, EnvironmentKey, ResourceChange, ResourceHistoryEntry,
};

/// Most history entries kept per resource; the oldest are dropped first
pub const RESOURCE_HISTORY_LIMIT: usize = 100;

#[derive(Debug)]
struct ConfigEntry {
    config: DeliveryConfig,
    last_checked: DateTime<Utc>,
}

#[derive(Debug)]
struct ResourceEntry {
    resource: Resource,
    delivery_config_name: String,
    last_checked: DateTime<Utc>,
    history: VecDeque<ResourceHistoryEntry>,
}

#[derive(Debug, Default)]
struct ApprovalEntry {
    current: Option<String>,
    approved: BTreeSet<String>,
}

#[derive(Debug)]
struct FingerprintEntry {
    fingerprint: String,
    action_count: u32,
    last_action_at: Option<DateTime<Utc>>,
}

type ConstraintKey = (EnvironmentKey, String, String);

#[derive(Debug, Default)]
struct Inner {
    configs: HashMap<String, ConfigEntry>,
    resources: HashMap<String, ResourceEntry>,
    artifacts: Vec<DeliveryArtifact>,
    versions: HashMap<(String, String), BTreeMap<String, PublishedArtifact>>,
    approvals: HashMap<EnvironmentKey, ApprovalEntry>,
    pins: HashMap<EnvironmentKey, PinnedEnvironment>,
    vetoes: HashMap<EnvironmentKey, BTreeMap<String, EnvironmentArtifactVeto>>,
    constraint_states: HashMap<ConstraintKey, ConstraintState>,
    queues: HashMap<(ApprovalQueue, EnvironmentKey), BTreeSet<String>>,
    fingerprints: HashMap<String, FingerprintEntry>,
    paused_applications: BTreeSet<String>,
    paused_resources: HashSet<String>,
    locks: HashMap<String, DateTime<Utc>>,
}

impl Inner {
    /// Drop every piece of environment-scoped state matching the predicate
    fn retain_environment_state(&mut self, keep: impl Fn(&EnvironmentKey) -> bool) {
        self.approvals.retain(|k, _| keep(k));
        self.pins.retain(|k, _| keep(k));
        self.vetoes.retain(|k, _| keep(k));
        self.constraint_states.retain(|(k, _, _), _| keep(k));
        self.queues.retain(|(_, k), _| keep(k));
    }

    fn remove_resource(&mut self, id: &str) {
        self.resources.remove(id);
        self.fingerprints.remove(id);
        self.paused_resources.remove(id);
    }
}

fn same_registration(a: &DeliveryArtifact, b: &DeliveryArtifact) -> bool {
    a.name == b.name
        && a.kind == b.kind
        && a.delivery_config_name == b.delivery_config_name
        && a.effective_reference() == b.effective_reference()
}

fn cutoff(min_age: Duration) -> DateTime<Utc> {
    let age = chrono::Duration::from_std(min_age).unwrap_or_else(|_| chrono::Duration::zero());
    Utc::now() - age
}

/// Store keeping everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactRepository for MemoryStore {
    #[instrument(skip(self, artifact), fields(name = %artifact.name, kind = %artifact.kind))]
    async fn register_artifact(&self, artifact: &DeliveryArtifact) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .artifacts
            .iter_mut()
            .find(|a| same_registration(a, artifact))
        {
            *existing = artifact.clone();
        } else {
            debug!("registered artifact");
            inner.artifacts.push(artifact.clone());
        }
        Ok(())
    }

    async fn is_registered(&self, name: &str, kind: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .artifacts
            .iter()
            .any(|a| a.name == name && a.kind == kind))
    }

    async fn get_artifact(
        &self,
        delivery_config_name: &str,
        reference: &str,
    ) -> Result<DeliveryArtifact, StoreError> {
        let inner = self.inner.read().await;
        inner
            .artifacts
            .iter()
            .find(|a| {
                a.delivery_config_name.as_deref() == Some(delivery_config_name)
                    && a.effective_reference() == reference
            })
            .cloned()
            .ok_or_else(|| StoreError::NoSuchArtifact {
                delivery_config: delivery_config_name.to_string(),
                reference: reference.to_string(),
            })
    }

    async fn artifacts_named(
        &self,
        name: &str,
        kind: &str,
    ) -> Result<Vec<DeliveryArtifact>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .artifacts
            .iter()
            .filter(|a| a.name == name && a.kind == kind)
            .cloned()
            .collect())
    }

    async fn all_artifacts(&self) -> Result<Vec<DeliveryArtifact>, StoreError> {
        Ok(self.inner.read().await.artifacts.clone())
    }

    #[instrument(skip(self, version), fields(name = %version.name, version = %version.version))]
    async fn store_artifact_version(
        &self,
        version: &PublishedArtifact,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let known = inner
            .versions
            .entry((version.name.clone(), version.kind.clone()))
            .or_default();
        if known.contains_key(&version.version) {
            return Ok(false);
        }
        let mut stored = version.clone();
        stored.created_at.get_or_insert_with(Utc::now);
        known.insert(version.version.clone(), stored);
        Ok(true)
    }

    async fn get_artifact_version(
        &self,
        name: &str,
        kind: &str,
        version: &str,
    ) -> Result<Option<PublishedArtifact>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .versions
            .get(&(name.to_string(), kind.to_string()))
            .and_then(|v| v.get(version))
            .cloned())
    }

    async fn artifact_versions(
        &self,
        artifact: &DeliveryArtifact,
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        let mut versions: Vec<String> = inner
            .versions
            .get(&(artifact.name.clone(), artifact.kind.clone()))
            .map(|known| {
                known
                    .values()
                    .filter(|v| artifact.accepts_status(v.status))
                    .map(|v| v.version.clone())
                    .collect()
            })
            .unwrap_or_default();
        artifact.versioning.sort_newest_first(&mut versions);
        Ok(versions)
    }

    #[instrument(skip(self, key), fields(key = %key))]
    async fn approve_version_for(
        &self,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let entry = inner.approvals.entry(key.clone()).or_default();
        let is_new = entry.current.as_deref() != Some(version);
        entry.current = Some(version.to_string());
        entry.approved.insert(version.to_string());
        Ok(is_new)
    }

    async fn is_approved_for(
        &self,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .approvals
            .get(key)
            .is_some_and(|a| a.approved.contains(version)))
    }

    async fn latest_approved_version(
        &self,
        key: &EnvironmentKey,
        versioning: VersioningStrategy,
    ) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().await;
        if let Some(pin) = inner.pins.get(key) {
            return Ok(Some(pin.version.clone()));
        }
        let vetoed = inner.vetoes.get(key);
        Ok(inner.approvals.get(key).and_then(|entry| {
            entry
                .approved
                .iter()
                .filter(|v| !vetoed.is_some_and(|vs| vs.contains_key(*v)))
                .max_by(|a, b| versioning.compare(a, b))
                .cloned()
        }))
    }

    async fn pin_environment(&self, pin: &PinnedEnvironment) -> Result<(), StoreError> {
        let key = EnvironmentKey::new(
            &pin.delivery_config_name,
            &pin.environment,
            &pin.artifact_reference,
        );
        self.inner.write().await.pins.insert(key, pin.clone());
        Ok(())
    }

    async fn delete_pin(&self, key: &EnvironmentKey) -> Result<(), StoreError> {
        self.inner.write().await.pins.remove(key);
        Ok(())
    }

    async fn pinned_environments(
        &self,
        delivery_config_name: &str,
    ) -> Result<Vec<PinnedEnvironment>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .pins
            .values()
            .filter(|p| p.delivery_config_name == delivery_config_name)
            .cloned()
            .collect())
    }

    async fn mark_as_vetoed(&self, veto: &EnvironmentArtifactVeto) -> Result<bool, StoreError> {
        let key = EnvironmentKey::new(
            &veto.delivery_config_name,
            &veto.environment,
            &veto.artifact_reference,
        );
        let mut inner = self.inner.write().await;
        let vetoes = inner.vetoes.entry(key).or_default();
        if vetoes.contains_key(&veto.version) {
            return Ok(false);
        }
        vetoes.insert(veto.version.clone(), veto.clone());
        Ok(true)
    }

    async fn delete_veto(&self, key: &EnvironmentKey, version: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(vetoes) = inner.vetoes.get_mut(key) {
            vetoes.remove(version);
        }
        Ok(())
    }

    async fn vetoed_versions(&self, key: &EnvironmentKey) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .vetoes
            .get(key)
            .map(|v| v.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DeliveryConfigRepository for MemoryStore {
    async fn get_delivery_config(&self, name: &str) -> Result<DeliveryConfig, StoreError> {
        let inner = self.inner.read().await;
        inner
            .configs
            .get(name)
            .map(|e| e.config.clone())
            .ok_or_else(|| StoreError::NoSuchDeliveryConfig(name.to_string()))
    }

    async fn delivery_configs_for_application(
        &self,
        application: &str,
    ) -> Result<Vec<DeliveryConfig>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .configs
            .values()
            .filter(|e| e.config.application == application)
            .map(|e| e.config.clone())
            .collect())
    }

    async fn delivery_config_for_resource(
        &self,
        resource_id: &str,
    ) -> Result<DeliveryConfig, StoreError> {
        let inner = self.inner.read().await;
        let entry = inner
            .resources
            .get(resource_id)
            .ok_or_else(|| StoreError::NoSuchResource(resource_id.to_string()))?;
        inner
            .configs
            .get(&entry.delivery_config_name)
            .map(|e| e.config.clone())
            .ok_or_else(|| StoreError::NoSuchDeliveryConfig(entry.delivery_config_name.clone()))
    }

    async fn all_delivery_configs(&self) -> Result<Vec<DeliveryConfig>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.configs.values().map(|e| e.config.clone()).collect())
    }

    #[instrument(skip(self, changes), fields(config = %changes.config.name))]
    async fn apply_change_set(&self, changes: &ConfigChangeSet) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let name = changes.config.name.clone();

        // validate everything before the first write
        if let Some(existing) = inner.configs.get(&name)
            && existing.config.application != changes.config.application
        {
            return Err(StoreError::ConflictingDeliveryConfig {
                name,
                application: changes.config.application.clone(),
                existing_application: existing.config.application.clone(),
            });
        }
        for (resource, _) in &changes.resources {
            if let Some(entry) = inner.resources.get(&resource.id)
                && entry.delivery_config_name != name
            {
                return Err(StoreError::ResourceOwnedElsewhere {
                    id: resource.id.clone(),
                    owner: entry.delivery_config_name.clone(),
                });
            }
        }

        for (resource, change) in &changes.resources {
            if *change == ResourceChange::Updated
                && let Some(entry) = inner.resources.get_mut(&resource.id)
            {
                entry.resource = resource.clone();
                entry.last_checked = DateTime::<Utc>::MIN_UTC;
                continue;
            }
            inner.resources.insert(
                resource.id.clone(),
                ResourceEntry {
                    resource: resource.clone(),
                    delivery_config_name: name.clone(),
                    last_checked: DateTime::<Utc>::MIN_UTC,
                    history: VecDeque::new(),
                },
            );
        }

        for id in &changes.removed_resources {
            inner.remove_resource(id);
        }

        if !changes.removed_artifacts.is_empty() {
            inner.artifacts.retain(|a| {
                a.delivery_config_name.as_deref() != Some(name.as_str())
                    || !changes
                        .removed_artifacts
                        .iter()
                        .any(|r| r == a.effective_reference())
            });
        }
        inner.retain_environment_state(|k| {
            k.delivery_config_name != name
                || !(changes.removed_environments.contains(&k.environment)
                    || changes.removed_artifacts.contains(&k.artifact_reference))
        });

        for artifact in &changes.artifacts {
            if let Some(existing) = inner
                .artifacts
                .iter_mut()
                .find(|a| same_registration(a, artifact))
            {
                *existing = artifact.clone();
            } else {
                inner.artifacts.push(artifact.clone());
            }
        }

        let last_checked = inner
            .configs
            .get(&name)
            .map_or(DateTime::<Utc>::MIN_UTC, |e| e.last_checked);
        inner.configs.insert(
            name,
            ConfigEntry {
                config: changes.config.clone(),
                last_checked,
            },
        );

        debug!(
            resources = changes.resources.len(),
            removed = changes.removed_resources.len(),
            "applied delivery config change set"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_delivery_config(&self, name: &str) -> Result<DeliveryConfig, StoreError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .configs
            .remove(name)
            .ok_or_else(|| StoreError::NoSuchDeliveryConfig(name.to_string()))?;

        let owned: Vec<String> = inner
            .resources
            .iter()
            .filter(|(_, e)| e.delivery_config_name == name)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &owned {
            inner.remove_resource(id);
        }
        inner
            .artifacts
            .retain(|a| a.delivery_config_name.as_deref() != Some(name));
        inner.retain_environment_state(|k| k.delivery_config_name != name);

        Ok(entry.config)
    }

    async fn delivery_configs_due_for_check(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<DeliveryConfig>, StoreError> {
        let cutoff = cutoff(min_age);
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        let mut due: Vec<&mut ConfigEntry> = inner
            .configs
            .values_mut()
            .filter(|e| e.last_checked <= cutoff)
            .collect();
        due.sort_by_key(|e| e.last_checked);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|e| {
                e.last_checked = now;
                e.config.clone()
            })
            .collect())
    }

    async fn get_constraint_state(
        &self,
        key: &EnvironmentKey,
        version: &str,
        constraint_kind: &str,
    ) -> Result<Option<ConstraintState>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .constraint_states
            .get(&(key.clone(), version.to_string(), constraint_kind.to_string()))
            .cloned())
    }

    async fn store_constraint_state(&self, state: &ConstraintState) -> Result<(), StoreError> {
        let key = EnvironmentKey::new(
            &state.delivery_config_name,
            &state.environment_name,
            &state.artifact_reference,
        );
        self.inner.write().await.constraint_states.insert(
            (
                key,
                state.artifact_version.clone(),
                state.constraint_kind.clone(),
            ),
            state.clone(),
        );
        Ok(())
    }

    async fn constraint_states_for(
        &self,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<Vec<ConstraintState>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .constraint_states
            .iter()
            .filter(|((k, v, _), _)| k == key && v == version)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn pending_constraint_versions(
        &self,
        key: &EnvironmentKey,
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        let pending: BTreeSet<String> = inner
            .constraint_states
            .iter()
            .filter(|((k, _, _), s)| k == key && s.status == ConstraintStatus::Pending)
            .map(|((_, v, _), _)| v.clone())
            .collect();
        Ok(pending.into_iter().collect())
    }

    async fn queue_for_approval(
        &self,
        queue: ApprovalQueue,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .queues
            .entry((queue, key.clone()))
            .or_default()
            .insert(version.to_string());
        Ok(())
    }

    async fn queued_for_approval(
        &self,
        queue: ApprovalQueue,
        key: &EnvironmentKey,
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .queues
            .get(&(queue, key.clone()))
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_from_queue(
        &self,
        queue: ApprovalQueue,
        key: &EnvironmentKey,
        version: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(q) = inner.queues.get_mut(&(queue, key.clone())) {
            q.remove(version);
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceRepository for MemoryStore {
    async fn get_resource(&self, id: &str) -> Result<Resource, StoreError> {
        let inner = self.inner.read().await;
        inner
            .resources
            .get(id)
            .map(|e| e.resource.clone())
            .ok_or_else(|| StoreError::NoSuchResource(id.to_string()))
    }

    async fn has_resource(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.resources.contains_key(id))
    }

    async fn resources_due_for_check(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<Resource>, StoreError> {
        let cutoff = cutoff(min_age);
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        let mut due: Vec<&mut ResourceEntry> = inner
            .resources
            .values_mut()
            .filter(|e| e.last_checked <= cutoff)
            .collect();
        due.sort_by_key(|e| e.last_checked);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|e| {
                e.last_checked = now;
                e.resource.clone()
            })
            .collect())
    }

    async fn trigger_recheck(&self, ids: &[String]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for id in ids {
            if let Some(entry) = inner.resources.get_mut(id) {
                entry.last_checked = DateTime::<Utc>::MIN_UTC;
            }
        }
        Ok(())
    }

    async fn append_resource_history(
        &self,
        id: &str,
        event: &DeliveryEvent,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .resources
            .get_mut(id)
            .ok_or_else(|| StoreError::NoSuchResource(id.to_string()))?;
        let now = Utc::now();

        // a steady state only refreshes the timestamp of the last entry
        if let Some(last) = entry.history.back_mut()
            && matches!(last.event, DeliveryEvent::ResourceValid { .. })
            && last.event == *event
        {
            last.at = now;
            return Ok(());
        }

        if entry.history.len() >= RESOURCE_HISTORY_LIMIT {
            entry.history.pop_front();
        }
        entry.history.push_back(ResourceHistoryEntry {
            event: event.clone(),
            at: now,
        });
        Ok(())
    }

    async fn resource_history(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<ResourceHistoryEntry>, StoreError> {
        let inner = self.inner.read().await;
        let entry = inner
            .resources
            .get(id)
            .ok_or_else(|| StoreError::NoSuchResource(id.to_string()))?;
        Ok(entry.history.iter().rev().take(limit).cloned().collect())
    }

    async fn last_resource_event(&self, id: &str) -> Result<Option<DeliveryEvent>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .resources
            .get(id)
            .and_then(|e| e.history.back())
            .map(|h| h.event.clone()))
    }
}

#[async_trait]
impl DiffFingerprintRepository for MemoryStore {
    async fn store_fingerprint(&self, id: &str, fingerprint: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .fingerprints
            .get(id)
            .is_some_and(|e| e.fingerprint == fingerprint)
        {
            return Ok(false);
        }
        inner.fingerprints.insert(
            id.to_string(),
            FingerprintEntry {
                fingerprint: fingerprint.to_string(),
                action_count: 0,
                last_action_at: None,
            },
        );
        Ok(true)
    }

    async fn mark_action_taken(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.fingerprints.get_mut(id) {
            entry.action_count += 1;
            entry.last_action_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn action_taken_count(&self, id: &str) -> Result<u32, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.fingerprints.get(id).map_or(0, |e| e.action_count))
    }

    async fn last_action_at(&self, id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.fingerprints.get(id).and_then(|e| e.last_action_at))
    }

    async fn clear_fingerprint(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.fingerprints.remove(id).is_some())
    }
}

#[async_trait]
impl PausedRepository for MemoryStore {
    async fn pause_application(&self, application: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .paused_applications
            .insert(application.to_string());
        Ok(())
    }

    async fn resume_application(&self, application: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .paused_applications
            .remove(application);
        Ok(())
    }

    async fn is_application_paused(&self, application: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .paused_applications
            .contains(application))
    }

    async fn pause_resource(&self, id: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .paused_resources
            .insert(id.to_string());
        Ok(())
    }

    async fn resume_resource(&self, id: &str) -> Result<(), StoreError> {
        self.inner.write().await.paused_resources.remove(id);
        Ok(())
    }

    async fn is_resource_paused(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.paused_resources.contains(id))
    }

    async fn paused_applications(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .paused_applications
            .iter()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AgentLockRepository for MemoryStore {
    async fn try_acquire_lock(&self, name: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        if inner.locks.get(name).is_some_and(|expires| *expires > now) {
            return Ok(false);
        }
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        inner.locks.insert(name.to_string(), now + ttl);
        Ok(true)
    }

    async fn release_lock(&self, name: &str) -> Result<(), StoreError> {
        self.inner.write().await.locks.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_api::{ArtifactStatus, Environment};
    use serde_json::json;

    fn key() -> EnvironmentKey {
        EnvironmentKey::new("fnord-manifest", "test", "fnord")
    }

    fn config(application: &str) -> DeliveryConfig {
        DeliveryConfig::new("fnord-manifest", application, "keel@example.com").with_environment(
            Environment::new("test").with_resource(Resource::new(
                "ec2:cluster:test:fnord",
                "ec2.example.io/v1",
                "cluster",
                json!({"artifactReference": "fnord"}),
            )),
        )
    }

    fn change_set(config: DeliveryConfig) -> ConfigChangeSet {
        let mut changes = ConfigChangeSet::new(config.clone());
        changes.resources = config
            .resources()
            .map(|r| (r.clone(), ResourceChange::Created))
            .collect();
        changes
    }

    #[tokio::test]
    async fn test_store_version_is_idempotent() {
        let store = MemoryStore::new();
        let version = PublishedArtifact::new("fnord", "deb", "fnord-0.156.0-h58.f67fe09");

        assert!(store.store_artifact_version(&version).await.unwrap());
        assert!(!store.store_artifact_version(&version).await.unwrap());

        let artifact = DeliveryArtifact::new("fnord", "deb");
        assert_eq!(store.artifact_versions(&artifact).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_versions_filtered_by_status() {
        let store = MemoryStore::new();
        store
            .store_artifact_version(
                &PublishedArtifact::new("fnord", "deb", "1.0.0").with_status(ArtifactStatus::Final),
            )
            .await
            .unwrap();
        store
            .store_artifact_version(
                &PublishedArtifact::new("fnord", "deb", "1.1.0")
                    .with_status(ArtifactStatus::Snapshot),
            )
            .await
            .unwrap();

        let all = DeliveryArtifact::new("fnord", "deb");
        assert_eq!(store.artifact_versions(&all).await.unwrap(), vec!["1.1.0", "1.0.0"]);

        let finals =
            DeliveryArtifact::new("fnord", "deb").with_statuses(vec![ArtifactStatus::Final]);
        assert_eq!(store.artifact_versions(&finals).await.unwrap(), vec!["1.0.0"]);
    }

    #[tokio::test]
    async fn test_approval_is_new_only_on_change() {
        let store = MemoryStore::new();
        assert!(store.approve_version_for(&key(), "1.0.0").await.unwrap());
        assert!(!store.approve_version_for(&key(), "1.0.0").await.unwrap());
        assert!(store.approve_version_for(&key(), "1.1.0").await.unwrap());
        assert!(store.is_approved_for(&key(), "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_latest_approved_honours_pin_and_veto() {
        let store = MemoryStore::new();
        store.approve_version_for(&key(), "1.0.0").await.unwrap();
        store.approve_version_for(&key(), "1.1.0").await.unwrap();

        let latest = store
            .latest_approved_version(&key(), VersioningStrategy::Semver)
            .await
            .unwrap();
        assert_eq!(latest.as_deref(), Some("1.1.0"));

        store
            .mark_as_vetoed(&EnvironmentArtifactVeto {
                delivery_config_name: "fnord-manifest".into(),
                environment: "test".into(),
                artifact_reference: "fnord".into(),
                version: "1.1.0".into(),
                vetoed_by: None,
                comment: None,
            })
            .await
            .unwrap();
        let latest = store
            .latest_approved_version(&key(), VersioningStrategy::Semver)
            .await
            .unwrap();
        assert_eq!(latest.as_deref(), Some("1.0.0"));

        store
            .pin_environment(&PinnedEnvironment {
                delivery_config_name: "fnord-manifest".into(),
                environment: "test".into(),
                artifact_reference: "fnord".into(),
                version: "0.9.0".into(),
                pinned_by: Some("someone".into()),
                comment: None,
            })
            .await
            .unwrap();
        let latest = store
            .latest_approved_version(&key(), VersioningStrategy::Semver)
            .await
            .unwrap();
        assert_eq!(latest.as_deref(), Some("0.9.0"));
    }

    #[tokio::test]
    async fn test_due_for_check_marks_checked() {
        let store = MemoryStore::new();
        store.apply_change_set(&change_set(config("fnord"))).await.unwrap();

        let due = store
            .resources_due_for_check(Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);

        let again = store
            .resources_due_for_check(Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(again.is_empty());

        store
            .trigger_recheck(&["ec2:cluster:test:fnord".to_string()])
            .await
            .unwrap();
        let rechecked = store
            .resources_due_for_check(Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert_eq!(rechecked.len(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_application_writes_nothing() {
        let store = MemoryStore::new();
        store.apply_change_set(&change_set(config("fnord"))).await.unwrap();

        let mut other = config("other-app");
        other.environments[0].resources[0].spec = json!({"changed": true});
        let err = store.apply_change_set(&change_set(other)).await.unwrap_err();
        assert!(matches!(err, StoreError::ConflictingDeliveryConfig { .. }));

        let stored = store.get_resource("ec2:cluster:test:fnord").await.unwrap();
        assert_eq!(stored.spec, json!({"artifactReference": "fnord"}));
    }

    #[tokio::test]
    async fn test_delete_config_cascades() {
        let store = MemoryStore::new();
        store.apply_change_set(&change_set(config("fnord"))).await.unwrap();
        store.approve_version_for(&key(), "1.0.0").await.unwrap();

        store.delete_delivery_config("fnord-manifest").await.unwrap();

        assert!(!store.has_resource("ec2:cluster:test:fnord").await.unwrap());
        assert!(!store.is_approved_for(&key(), "1.0.0").await.unwrap());
        assert!(
            store
                .delete_delivery_config("fnord-manifest")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_resource_history_is_bounded() {
        let store = MemoryStore::new();
        store.apply_change_set(&change_set(config("fnord"))).await.unwrap();
        let id = "ec2:cluster:test:fnord";
        let valid = DeliveryEvent::ResourceValid {
            resource: id.to_string(),
            application: "fnord".to_string(),
        };

        // repeated steady state collapses into one entry
        for _ in 0..5 {
            store.append_resource_history(id, &valid).await.unwrap();
        }
        assert_eq!(store.resource_history(id, 10).await.unwrap().len(), 1);

        for i in 0..RESOURCE_HISTORY_LIMIT + 20 {
            let event = DeliveryEvent::ResourceDeltaDetected {
                resource: id.to_string(),
                application: "fnord".to_string(),
                delta: json!({ "n": i }),
            };
            store.append_resource_history(id, &event).await.unwrap();
        }

        let history = store.resource_history(id, usize::MAX).await.unwrap();
        assert_eq!(history.len(), RESOURCE_HISTORY_LIMIT);
        let DeliveryEvent::ResourceDeltaDetected { delta, .. } = &history[0].event else {
            panic!("expected delta detected, got {:?}", history[0].event);
        };
        assert_eq!(delta["n"], json!(RESOURCE_HISTORY_LIMIT + 19));
    }

    #[tokio::test]
    async fn test_fingerprint_tracking() {
        let store = MemoryStore::new();
        assert!(store.store_fingerprint("r", "abc").await.unwrap());
        store.mark_action_taken("r").await.unwrap();
        assert!(!store.store_fingerprint("r", "abc").await.unwrap());
        assert_eq!(store.action_taken_count("r").await.unwrap(), 1);

        assert!(store.store_fingerprint("r", "def").await.unwrap());
        assert_eq!(store.action_taken_count("r").await.unwrap(), 0);

        assert!(store.clear_fingerprint("r").await.unwrap());
        assert!(!store.clear_fingerprint("r").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_excludes_until_expiry() {
        let store = MemoryStore::new();
        assert!(
            store
                .try_acquire_lock("artifact-sync", Duration::from_secs(300))
                .await
                .unwrap()
        );
        assert!(
            !store
                .try_acquire_lock("artifact-sync", Duration::from_secs(300))
                .await
                .unwrap()
        );

        store.release_lock("artifact-sync").await.unwrap();
        assert!(
            store
                .try_acquire_lock("artifact-sync", Duration::ZERO)
                .await
                .unwrap()
        );
        assert!(
            store
                .try_acquire_lock("artifact-sync", Duration::from_secs(1))
                .await
                .unwrap()
        );
    }
}
