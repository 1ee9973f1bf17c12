mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use drydock_api::{DeliveryConfig, DeliveryEvent, Environment, Resource, SkipReason, Task};
use drydock_core::{CheckOutcome, ResourceActuator, Veto, VetoEnforcer, VetoResponse};
use drydock_plugin::{ArtifactVersionRef, HandlerRegistry, PluginError};
use drydock_store::{ConfigChangeSet, EnvironmentKey, ResourceChange};
use serde_json::json;

use common::{Fixture, MockHandler, resource};

struct DenyAll {
    veto_artifact: bool,
}

#[async_trait]
impl Veto for DenyAll {
    fn name(&self) -> &str {
        "deny-all"
    }

    async fn check(&self, _resource: &Resource) -> VetoResponse {
        let response = VetoResponse::deny("deny-all", "region unhealthy");
        if self.veto_artifact {
            response.with_artifact_veto()
        } else {
            response
        }
    }
}

struct Harness {
    fixture: Fixture,
    handler: Arc<MockHandler>,
    actuator: ResourceActuator,
    resource: Resource,
}

async fn harness(handler: MockHandler, vetoes: Vec<Arc<dyn Veto>>) -> Harness {
    let fixture = Fixture::new();
    let resource = resource("ec2:cluster:test:fnord", json!({ "artifactReference": "fnord" }));

    let config = DeliveryConfig::new("fnord-manifest", "fnord", "keel@spinnaker")
        .with_environment(Environment::new("test").with_resource(resource.clone()));
    let mut changes = ConfigChangeSet::new(config);
    changes.resources = vec![(resource.clone(), ResourceChange::Created)];
    fixture.store.apply_change_set(&changes).await.unwrap();

    let handler = Arc::new(handler);
    let mut handlers = HandlerRegistry::new();
    handlers.register(handler.clone()).unwrap();

    let actuator = ResourceActuator::new(
        fixture.store.clone(),
        Arc::new(handlers),
        VetoEnforcer::new(vetoes),
        fixture.publisher(),
        Duration::from_secs(600),
    );

    Harness {
        fixture,
        handler,
        actuator,
        resource,
    }
}

#[tokio::test]
async fn test_valid_resource_publishes_single_valid_event() {
    let mut h = harness(
        MockHandler::new(json!({ "image": "fnord-1.0" }), Some(json!({ "image": "fnord-1.0" }))),
        vec![],
    )
    .await;

    let outcome = h.actuator.check_resource(&h.resource).await;

    assert_eq!(outcome, CheckOutcome::Valid);
    assert_eq!(h.fixture.drain_names(), vec!["ResourceValid"]);
    assert!(h.handler.calls().is_empty());
}

#[tokio::test]
async fn test_missing_resource_is_created() {
    let mut h = harness(MockHandler::new(json!({ "image": "fnord-1.0" }), None), vec![]).await;

    let outcome = h.actuator.check_resource(&h.resource).await;

    assert_eq!(outcome, CheckOutcome::Missing);
    assert_eq!(
        h.fixture.drain_names(),
        vec!["ResourceMissing", "ResourceActuationLaunched"]
    );
    assert_eq!(h.handler.calls(), vec!["create:ec2:cluster:test:fnord"]);
    assert_eq!(
        h.fixture
            .store
            .action_taken_count(&h.resource.id)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_unchanged_delta_not_actuated_twice() {
    let mut h = harness(
        MockHandler::new(json!({ "image": "fnord-1.1" }), Some(json!({ "image": "fnord-1.0" }))),
        vec![],
    )
    .await;

    assert_eq!(h.actuator.check_resource(&h.resource).await, CheckOutcome::Delta);
    let events = h.fixture.drain();
    let DeliveryEvent::ResourceDeltaDetected { delta, .. } = &events[0] else {
        panic!("expected delta detected, got {events:?}");
    };
    assert_eq!(delta["/image"]["desired"], json!("fnord-1.1"));
    assert_eq!(events[1].name(), "ResourceActuationLaunched");

    let outcome = h.actuator.check_resource(&h.resource).await;
    assert_eq!(outcome, CheckOutcome::Skipped(SkipReason::DeltaUnchanged));
    assert_eq!(h.fixture.drain_names(), vec!["ResourceCheckSkipped"]);
    assert_eq!(h.handler.calls(), vec!["update:ec2:cluster:test:fnord"]);

    // a different delta is acted on again
    h.handler.set_current(Some(json!({ "image": "fnord-0.9" })));
    assert_eq!(h.actuator.check_resource(&h.resource).await, CheckOutcome::Delta);
    assert_eq!(h.handler.calls().len(), 2);
}

#[tokio::test]
async fn test_converged_after_launch_waits_for_task_outcome() {
    let mut h = harness(
        MockHandler::new(json!({ "image": "fnord-1.1" }), Some(json!({ "image": "fnord-1.0" }))),
        vec![],
    )
    .await;
    h.actuator.check_resource(&h.resource).await;
    h.fixture.drain();

    // converged, but the launched task has not reported back
    h.handler.set_current(Some(json!({ "image": "fnord-1.1" })));
    for _ in 0..2 {
        assert_eq!(h.actuator.check_resource(&h.resource).await, CheckOutcome::Waiting);
    }
    assert!(h.fixture.drain().is_empty());

    h.actuator
        .record_task_outcome(&h.resource.id, Task::new("task-2", "update"), true)
        .await
        .unwrap();
    assert_eq!(h.fixture.drain_names(), vec!["ResourceTaskCompleted"]);

    assert_eq!(
        h.actuator.check_resource(&h.resource).await,
        CheckOutcome::DeltaResolved
    );
    assert_eq!(h.fixture.drain_names(), vec!["ResourceDeltaResolved"]);

    assert_eq!(h.actuator.check_resource(&h.resource).await, CheckOutcome::Valid);
    assert_eq!(h.fixture.drain_names(), vec!["ResourceValid"]);

    let history = h.fixture.store.resource_history(&h.resource.id, 10).await.unwrap();
    let names: Vec<&str> = history.iter().map(|e| e.event.name()).collect();
    assert_eq!(
        names,
        vec![
            "ResourceValid",
            "ResourceDeltaResolved",
            "ResourceTaskCompleted",
            "ResourceActuationLaunched",
            "ResourceDeltaDetected",
        ]
    );
}

#[tokio::test]
async fn test_task_outcome_for_unknown_resource_fails() {
    let h = harness(MockHandler::new(json!({}), None), vec![]).await;

    let result = h
        .actuator
        .record_task_outcome("no-such-resource", Task::new("task-1", "create"), false)
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_in_progress_actuation_blocks_calls() {
    let mut h = harness(MockHandler::new(json!({ "image": "fnord-1.0" }), None), vec![]).await;
    h.handler.in_progress.store(true, Ordering::SeqCst);

    for _ in 0..3 {
        assert_eq!(
            h.actuator.check_resource(&h.resource).await,
            CheckOutcome::Skipped(SkipReason::ActuationInProgress)
        );
    }
    assert!(h.handler.calls().is_empty());
    assert_eq!(h.fixture.drain().len(), 3);
    // skips are not part of the history
    assert!(
        h.fixture
            .store
            .last_resource_event(&h.resource.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_paused_application_skips_check() {
    let mut h = harness(MockHandler::new(json!({ "image": "fnord-1.0" }), None), vec![]).await;
    h.fixture.store.pause_application("fnord").await.unwrap();

    assert_eq!(
        h.actuator.check_resource(&h.resource).await,
        CheckOutcome::Skipped(SkipReason::ActuationPaused)
    );
    assert_eq!(
        h.fixture.drain(),
        vec![DeliveryEvent::ResourceCheckSkipped {
            resource: h.resource.id.clone(),
            reason: SkipReason::ActuationPaused,
        }]
    );
    assert!(h.handler.calls().is_empty());
}

#[tokio::test]
async fn test_veto_records_artifact_version() {
    let handler = MockHandler::new(json!({ "image": "fnord-1.0" }), None);
    *handler.artifact.lock().unwrap() = Some(ArtifactVersionRef::new("fnord", "1.0.0"));
    let mut h = harness(handler, vec![Arc::new(DenyAll { veto_artifact: true })]).await;

    assert_eq!(
        h.actuator.check_resource(&h.resource).await,
        CheckOutcome::Skipped(SkipReason::ActuationVetoed)
    );
    assert_eq!(
        h.fixture.drain_names(),
        vec!["ArtifactVersionVetoed", "ResourceActuationVetoed"]
    );
    assert!(h.handler.calls().is_empty());

    let vetoed = h
        .fixture
        .store
        .vetoed_versions(&EnvironmentKey::new("fnord-manifest", "test", "fnord"))
        .await
        .unwrap();
    assert_eq!(vetoed, vec!["1.0.0".to_string()]);
}

#[tokio::test]
async fn test_veto_without_artifact_flag() {
    let mut h = harness(
        MockHandler::new(json!({ "image": "fnord-1.0" }), None),
        vec![Arc::new(DenyAll { veto_artifact: false })],
    )
    .await;

    h.actuator.check_resource(&h.resource).await;
    assert_eq!(h.fixture.drain_names(), vec!["ResourceActuationVetoed"]);
}

#[tokio::test]
async fn test_unresolvable_is_not_an_error() {
    let mut h = harness(MockHandler::new(json!({}), None), vec![]).await;
    h.handler
        .set_current_error(PluginError::CurrentlyUnresolvable("image not baked yet".to_string()));

    assert_eq!(
        h.actuator.check_resource(&h.resource).await,
        CheckOutcome::Unresolvable
    );
    assert_eq!(h.fixture.drain_names(), vec!["ResourceCheckUnresolvable"]);
    assert!(h.handler.calls().is_empty());
}

#[tokio::test]
async fn test_resolution_failures_name_the_side() {
    let mut h = harness(MockHandler::new(json!({}), None), vec![]).await;
    h.handler
        .set_desired_error(PluginError::Upstream("bakery down".to_string()));

    assert_eq!(h.actuator.check_resource(&h.resource).await, CheckOutcome::Error);
    let events = h.fixture.drain();
    let DeliveryEvent::ResourceCheckError { error, .. } = &events[0] else {
        panic!("expected check error, got {events:?}");
    };
    assert!(error.contains("desired state"));

    *h.handler.desired.lock().unwrap() = Ok(json!({}));
    h.handler
        .set_current_error(PluginError::Upstream("cloud api down".to_string()));
    assert_eq!(h.actuator.check_resource(&h.resource).await, CheckOutcome::Error);
    let events = h.fixture.drain();
    let DeliveryEvent::ResourceCheckError { error, .. } = &events[0] else {
        panic!("expected check error, got {events:?}");
    };
    assert!(error.contains("current state"));
}

#[tokio::test]
async fn test_unknown_kind_is_check_error() {
    let mut h = harness(MockHandler::new(json!({}), None), vec![]).await;
    let mut other = h.resource.clone();
    other.kind = "security-group".to_string();

    assert_eq!(h.actuator.check_resource(&other).await, CheckOutcome::Error);
    assert_eq!(h.fixture.drain_names(), vec!["ResourceCheckError"]);
}
