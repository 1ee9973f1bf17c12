#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use drydock_api::{
    DeliveryArtifact, DeliveryConfig, DeliveryEvent, Environment, GitMetadata, PublishedArtifact,
    Resource, ResourceKind, Task,
};
use drydock_core::{BroadcastPublisher, EventPublisher};
use drydock_plugin::{
    ArtifactSupplier, ArtifactVersionRef, ConstraintEvaluator, PluginError, ResourceDiff,
    ResourceHandler, SupportedArtifact,
};
use drydock_store::{MemoryStore, Store};

pub const API_VERSION: &str = "test.drydock.io/v1";
pub const KIND: &str = "cluster";

// ============================================================================
// Mock resource handler
// ============================================================================

pub struct MockHandler {
    pub desired: Mutex<Result<Value, PluginError>>,
    pub current: Mutex<Result<Option<Value>, PluginError>>,
    pub in_progress: AtomicBool,
    pub calls: Mutex<Vec<String>>,
    pub artifact: Mutex<Option<ArtifactVersionRef>>,
}

impl MockHandler {
    pub fn new(desired: Value, current: Option<Value>) -> Self {
        Self {
            desired: Mutex::new(Ok(desired)),
            current: Mutex::new(Ok(current)),
            in_progress: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            artifact: Mutex::new(None),
        }
    }

    pub fn set_current(&self, current: Option<Value>) {
        *self.current.lock().unwrap() = Ok(current);
    }

    pub fn set_desired_error(&self, error: PluginError) {
        *self.desired.lock().unwrap() = Err(error);
    }

    pub fn set_current_error(&self, error: PluginError) {
        *self.current.lock().unwrap() = Err(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceHandler for MockHandler {
    fn name(&self) -> &str {
        "mock"
    }

    fn supported_kind(&self) -> ResourceKind {
        ResourceKind::new(API_VERSION, KIND)
    }

    async fn desired(&self, _resource: &Resource) -> Result<Value, PluginError> {
        self.desired.lock().unwrap().clone()
    }

    async fn current(&self, _resource: &Resource) -> Result<Option<Value>, PluginError> {
        self.current.lock().unwrap().clone()
    }

    async fn create(
        &self,
        resource: &Resource,
        _diff: &ResourceDiff,
    ) -> Result<Vec<Task>, PluginError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("create:{}", resource.id));
        Ok(vec![Task::new("task-1", format!("create {}", resource.id))])
    }

    async fn update(
        &self,
        resource: &Resource,
        _diff: &ResourceDiff,
    ) -> Result<Vec<Task>, PluginError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("update:{}", resource.id));
        Ok(vec![Task::new("task-2", format!("update {}", resource.id))])
    }

    async fn actuation_in_progress(&self, _resource: &Resource) -> Result<bool, PluginError> {
        Ok(self.in_progress.load(Ordering::SeqCst))
    }

    fn desired_artifact(&self, _desired: &Value) -> Option<ArtifactVersionRef> {
        self.artifact.lock().unwrap().clone()
    }
}

// ============================================================================
// Mock artifact supplier
// ============================================================================

pub struct MockSupplier {
    pub kind: String,
    pub latest: Mutex<Option<PublishedArtifact>>,
    pub git: Option<GitMetadata>,
}

impl MockSupplier {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            latest: Mutex::new(None),
            git: None,
        }
    }

    pub fn with_latest(self, latest: PublishedArtifact) -> Self {
        *self.latest.lock().unwrap() = Some(latest);
        self
    }

    pub fn with_git(mut self, git: GitMetadata) -> Self {
        self.git = Some(git);
        self
    }
}

#[async_trait]
impl ArtifactSupplier for MockSupplier {
    fn supported_artifact(&self) -> SupportedArtifact {
        SupportedArtifact::new(&self.kind, drydock_api::VersioningStrategy::Semver)
    }

    async fn latest_artifact(
        &self,
        _artifact: &DeliveryArtifact,
        _config: Option<&DeliveryConfig>,
    ) -> Result<Option<PublishedArtifact>, PluginError> {
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn git_metadata(
        &self,
        artifact: &PublishedArtifact,
    ) -> Result<Option<GitMetadata>, PluginError> {
        Ok(self.git.clone().or_else(|| artifact.git.clone()))
    }
}

// ============================================================================
// Mock constraint evaluator
// ============================================================================

/// Evaluator passing only the listed versions
pub struct MockEvaluator {
    pub kind: String,
    pub implicit: bool,
    pub stateful: bool,
    pub passing: Mutex<HashSet<String>>,
}

impl MockEvaluator {
    pub fn new(kind: &str, passing: &[&str]) -> Self {
        Self {
            kind: kind.to_string(),
            implicit: false,
            stateful: false,
            passing: Mutex::new(passing.iter().map(ToString::to_string).collect()),
        }
    }

    pub fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }

    pub fn stateful(mut self) -> Self {
        self.stateful = true;
        self
    }

    pub fn allow(&self, version: &str) {
        self.passing.lock().unwrap().insert(version.to_string());
    }
}

#[async_trait]
impl ConstraintEvaluator for MockEvaluator {
    fn constraint_kind(&self) -> &str {
        &self.kind
    }

    fn is_implicit(&self) -> bool {
        self.implicit
    }

    fn is_stateful(&self) -> bool {
        self.stateful
    }

    async fn can_promote(
        &self,
        _artifact: &DeliveryArtifact,
        version: &str,
        _config: &DeliveryConfig,
        _environment: &Environment,
    ) -> Result<bool, PluginError> {
        Ok(self.passing.lock().unwrap().contains(version))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub struct Fixture {
    pub store: Arc<dyn Store>,
    pub publisher: Arc<BroadcastPublisher>,
    pub events: broadcast::Receiver<DeliveryEvent>,
}

impl Fixture {
    pub fn new() -> Self {
        let publisher = Arc::new(BroadcastPublisher::new(256));
        let events = publisher.subscribe();
        Self {
            store: Arc::new(MemoryStore::new()),
            publisher,
            events,
        }
    }

    pub fn publisher(&self) -> Arc<dyn EventPublisher> {
        self.publisher.clone()
    }

    /// Everything published since the last call
    pub fn drain(&mut self) -> Vec<DeliveryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn drain_names(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(DeliveryEvent::name).collect()
    }
}

pub fn resource(id: &str, spec: Value) -> Resource {
    let mut resource = Resource::new(id, API_VERSION, KIND, spec);
    resource
        .metadata
        .insert("application".to_string(), json!("fnord"));
    resource
}

pub fn published(name: &str, version: &str) -> PublishedArtifact {
    PublishedArtifact::new(name, "deb", version)
}
