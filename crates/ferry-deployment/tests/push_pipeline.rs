//! End-to-end push pipeline against the in-memory platform.
//!
//! Covers the ordering of remote calls, the distinction between failed and
//! timed-out observation loops, cancellation, and concurrent pushes.

use ferry_deployment::{
    AppRef, DeploymentConfig, DeploymentError, DeploymentManager, PushOptions, Timeouts,
    WaitOptions, WaitPhase,
};
use ferry_platform::{InMemoryPlatform, Operation, PlatformError};
use ferry_routing::{FixedWords, RandomWords};
use ferry_types::{
    AppState, ApplicationManifest, BuildState, InstanceState, ManifestCommon, ManifestV3,
    ManifestV3Application, ManifestV3Process, PackageState, PushEvent, PushEventEnvelope,
    PushStage, SpaceId,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

struct Harness {
    platform: Arc<InMemoryPlatform>,
    manager: DeploymentManager,
    space: SpaceId,
}

fn harness() -> Harness {
    let platform = Arc::new(InMemoryPlatform::new());
    let space = platform.add_space("org-1");
    platform.add_shared_domain("apps.example.com");
    let manager = DeploymentManager::with_words(
        platform.clone(),
        Arc::new(FixedWords::new("brave", "otter")),
        DeploymentConfig::default(),
    );
    Harness {
        platform,
        manager,
        space,
    }
}

fn manifest(name: &str) -> ApplicationManifest {
    ApplicationManifest::new(ManifestCommon {
        instances: Some(1),
        memory: Some(64),
        disk: Some(512),
        buildpacks: vec!["x".into()],
        ..ManifestCommon::named(name)
    })
}

fn drain(rx: &mut broadcast::Receiver<PushEventEnvelope>) -> Vec<PushEventEnvelope> {
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope);
    }
    events
}

fn stages(events: &[PushEventEnvelope], app: &str) -> Vec<PushStage> {
    events
        .iter()
        .filter(|e| e.application == app)
        .filter_map(|e| match e.event {
            PushEvent::StageChanged { stage, .. } => Some(stage),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_push_new_application_with_artifact() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "hello").unwrap();

    let mut manifest = manifest("app1");
    manifest.common.path = Some(dir.path().to_path_buf());

    let outcome = h
        .manager
        .push(&h.space, &manifest, &PushOptions::default())
        .await
        .unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.stage, PushStage::Running);
    assert_eq!(outcome.routes.len(), 1);

    let app = h.platform.find_application(&h.space, "app1").unwrap();
    assert_eq!(app.state, AppState::Started);
    assert_eq!(app.memory, 64);
    assert_eq!(app.disk_quota, 512);
    assert_eq!(app.buildpacks, vec!["x".to_string()]);
    assert_eq!(h.platform.running_instances(&app.id), 1);

    let routes = h.platform.application_routes(&app.id);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].host, "app1");

    let uploads = h.platform.uploads(&app.id);
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].files.len(), 1);
    assert_eq!(uploads[0].files[0].sha256, HELLO_SHA256);
}

#[tokio::test]
async fn test_event_stream_follows_pipeline_order() {
    let h = harness();
    let mut rx = h.manager.subscribe();

    h.manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert!(matches!(
        events.iter().find(|e| !matches!(e.event, PushEvent::StageChanged { .. })).map(|e| &e.event),
        Some(PushEvent::ApplicationCreated { .. })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(&e.event, PushEvent::RouteMapped { route, .. } if !route.is_empty())));
    assert_eq!(
        stages(&events, "web"),
        vec![
            PushStage::Resolving,
            PushStage::RoutesPrepared,
            PushStage::ServicesBound,
            PushStage::ArtifactUploaded,
            PushStage::Staging,
            PushStage::Staged,
            PushStage::Starting,
            PushStage::Running,
        ]
    );
}

#[tokio::test]
async fn test_known_files_are_not_sent_again() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "hello").unwrap();
    std::fs::write(dir.path().join("app.js"), "run()").unwrap();
    h.platform.add_known_resource(HELLO_SHA256);

    let mut manifest = manifest("web");
    manifest.common.path = Some(dir.path().to_path_buf());

    let outcome = h
        .manager
        .push(&h.space, &manifest, &PushOptions::default())
        .await
        .unwrap();
    let first = &h.platform.uploads(&outcome.app_id)[0];
    assert_eq!(first.matched.len(), 1);
    assert_eq!(first.matched[0].path, "index.html");
    assert_eq!(first.files.len(), 1);

    // Everything is known after the first upload; the upload is still issued
    h.manager
        .push(&h.space, &manifest, &PushOptions::default())
        .await
        .unwrap();
    let uploads = h.platform.uploads(&outcome.app_id);
    assert_eq!(uploads.len(), 2);
    assert!(uploads[1].files.is_empty());
    assert_eq!(uploads[1].matched.len(), 2);
}

#[tokio::test]
async fn test_update_keeps_variables_set_outside_manifest() {
    let h = harness();
    h.manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap();
    let app = AppRef::new(h.space.clone(), "web");
    h.manager
        .set_environment_variable(&app, "SECRET", "s3cr3t")
        .await
        .unwrap();

    let mut updated = manifest("web");
    updated
        .common
        .environment_variables
        .insert("MODE".into(), Some("prod".into()));
    h.manager
        .push(&h.space, &updated, &PushOptions::default())
        .await
        .unwrap();

    let env = h.platform.find_application(&h.space, "web").unwrap().environment;
    assert_eq!(env["SECRET"], Some("s3cr3t".to_string()));
    assert_eq!(env["MODE"], Some("prod".to_string()));
}

// ---------------------------------------------------------------------------
// Observation outcomes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_staging_never_finishes_times_out() {
    let h = harness();
    h.platform
        .script_staging("web", vec![Ok(PackageState::Pending)]);
    let mut rx = h.manager.subscribe();

    let start = tokio::time::Instant::now();
    let err = h
        .manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeploymentError::TimedOut {
            phase: WaitPhase::Staging,
            ..
        }
    ));
    assert!(start.elapsed() >= Duration::from_secs(15 * 60));
    assert!(start.elapsed() < Duration::from_secs(15 * 60 + 16));
    assert_eq!(h.platform.call_count(Operation::Instances), 0);

    let events = drain(&mut rx);
    assert_eq!(stages(&events, "web").last(), Some(&PushStage::StagingTimedOut));
}

#[tokio::test(start_paused = true)]
async fn test_staging_failure_is_reported_at_once() {
    let h = harness();
    h.platform.script_staging(
        "web",
        vec![Ok(PackageState::Pending), Ok(PackageState::Failed)],
    );

    let start = tokio::time::Instant::now();
    let err = h
        .manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DeploymentError::StagingFailed { .. }));
    assert!(!err.is_timeout());
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_transient_staging_errors_are_polled_through() {
    let h = harness();
    h.platform.script_staging(
        "web",
        vec![
            Err(PlatformError::api(
                ferry_platform::codes::STAGING_NOT_FINISHED,
                "staging not finished",
            )),
            Ok(PackageState::Staged),
        ],
    );

    let outcome = h
        .manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.stage, PushStage::Running);
}

#[tokio::test(start_paused = true)]
async fn test_crashed_instances_fail_the_run() {
    let h = harness();
    h.platform.script_instances(
        "web",
        vec![
            Ok(vec![InstanceState::Starting]),
            Ok(vec![InstanceState::Crashed, InstanceState::Flapping]),
        ],
    );

    let err = h
        .manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap_err();

    let app_id = h.platform.find_application(&h.space, "web").unwrap().id;
    match err {
        DeploymentError::RunFailed { app, reason } => {
            assert_eq!(app, "web");
            assert!(reason.contains(&app_id.to_string()));
            assert!(reason.contains("CRASHED"));
            assert!(reason.contains("FLAPPING"));
        }
        other => panic!("expected RunFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_one_running_instance_is_enough() {
    let h = harness();
    h.platform.script_instances(
        "web",
        vec![Ok(vec![InstanceState::Crashed, InstanceState::Running])],
    );

    let outcome = h
        .manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.stage, PushStage::Running);
}

#[tokio::test(start_paused = true)]
async fn test_instances_never_running_times_out() {
    let h = harness();
    h.platform
        .script_instances("web", vec![Ok(vec![InstanceState::Starting])]);
    let options = PushOptions::default().with_timeouts(Timeouts {
        staging: Duration::from_secs(60),
        startup: Duration::from_secs(30),
    });

    let err = h
        .manager
        .push(&h.space, &manifest("web"), &options)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeploymentError::TimedOut {
            phase: WaitPhase::Start,
            ..
        }
    ));
    assert_eq!(
        err.to_string(),
        "Application web timed out during start"
    );
}

/// Hands out a fresh adjective on every draw
#[derive(Default)]
struct CountingWords {
    draws: AtomicU32,
}

impl RandomWords for CountingWords {
    fn adjective(&self) -> String {
        format!("a{}", self.draws.fetch_add(1, Ordering::SeqCst))
    }

    fn noun(&self) -> String {
        "n".to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn test_repushing_random_route_keeps_one_route() {
    let platform = Arc::new(InMemoryPlatform::new());
    let space = platform.add_space("org-1");
    platform.add_shared_domain("apps.example.com");
    let words = Arc::new(CountingWords::default());
    let manager =
        DeploymentManager::with_words(platform.clone(), words.clone(), DeploymentConfig::default());

    let mut random = manifest("web");
    random.common.random_route = Some(true);
    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(
            manager
                .push(&space, &random, &PushOptions::default())
                .await
                .unwrap(),
        );
    }

    let routes = platform.application_routes(&outcomes[0].app_id);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].host, "web-a0-n");
    assert_eq!(words.draws.load(Ordering::SeqCst), 1);
    assert_eq!(platform.call_count(Operation::CreateRoute), 1);
    assert!(outcomes.iter().all(|o| o.routes == outcomes[0].routes));
}

// ---------------------------------------------------------------------------
// Failures, cancellation, concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_mutation_is_not_retried() {
    let h = harness();
    h.platform.fail_next(
        Operation::AssociateRoute,
        PlatformError::api(210003, "The host is taken"),
    );

    let err = h
        .manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DeploymentError::RemoteOperationFailed { .. }));
    assert_eq!(h.platform.call_count(Operation::AssociateRoute), 1);
    assert_eq!(h.platform.call_count(Operation::Upload), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_staging_wait() {
    let h = harness();
    h.platform
        .script_staging("web", vec![Ok(PackageState::Pending)]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        trigger.cancel();
    });

    let mut rx = h.manager.subscribe();
    let err = h
        .manager
        .push(
            &h.space,
            &manifest("web"),
            &PushOptions::default().with_cancel(cancel),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeploymentError::Cancelled {
            stage: PushStage::Staging,
            ..
        }
    ));
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e.event, PushEvent::Cancelled { stage: PushStage::Staging })));
}

#[tokio::test]
async fn test_cancel_before_push_stops_at_first_checkpoint() {
    let h = harness();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .manager
        .push(
            &h.space,
            &manifest("web"),
            &PushOptions::default().with_cancel(cancel),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DeploymentError::Cancelled { .. }));
    // Calls already issued are not undone
    assert!(h.platform.find_application(&h.space, "web").is_some());
    assert_eq!(h.platform.call_count(Operation::CreateRoute), 0);
}

#[tokio::test]
async fn test_sibling_pushes_are_independent() {
    let h = harness();
    let mut broken = manifest("broken");
    broken.services = vec!["missing-db".into()];
    let manifests = vec![manifest("web"), broken, manifest("worker")];

    let results = h
        .manager
        .push_all(&h.space, &manifests, &PushOptions::default())
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(DeploymentError::NotFound {
            kind: "service instance",
            ..
        })
    ));
    assert!(results[2].is_ok());
    assert_eq!(results[1].as_ref().unwrap_err().app(), "broken");
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_restart_and_restage() {
    let h = harness();
    h.manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap();
    let app = AppRef::new(h.space.clone(), "web");

    h.manager.restart(&app, &WaitOptions::default()).await.unwrap();
    h.manager.restage(&app, &WaitOptions::default()).await.unwrap();

    assert_eq!(h.platform.call_count(Operation::Restage), 1);
    let resource = h.platform.find_application(&h.space, "web").unwrap();
    assert_eq!(resource.state, AppState::Started);
    assert_eq!(h.platform.running_instances(&resource.id), 1);
}

#[tokio::test]
async fn test_stop_then_start() {
    let h = harness();
    h.manager
        .push(&h.space, &manifest("web"), &PushOptions::default())
        .await
        .unwrap();
    let app = AppRef::new(h.space.clone(), "web");

    h.manager.stop(&app).await.unwrap();
    let resource = h.platform.find_application(&h.space, "web").unwrap();
    assert_eq!(h.platform.running_instances(&resource.id), 0);

    h.manager.start(&app, &WaitOptions::default()).await.unwrap();
    assert_eq!(h.platform.running_instances(&resource.id), 1);
}

// ---------------------------------------------------------------------------
// Manifest v3
// ---------------------------------------------------------------------------

fn v3_manifest(dir: &std::path::Path) -> ManifestV3 {
    ManifestV3 {
        version: Some(1),
        applications: vec![
            ManifestV3Application {
                common: ManifestCommon {
                    path: Some(dir.to_path_buf()),
                    ..ManifestCommon::named("api")
                },
                processes: vec![ManifestV3Process {
                    process_type: "web".into(),
                    instances: Some(2),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ManifestV3Application {
                common: ManifestCommon::named("config-only"),
                ..Default::default()
            },
        ],
    }
}

#[tokio::test]
async fn test_v3_push_builds_and_starts() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "hello").unwrap();

    let results = h
        .manager
        .push_manifest_v3(&h.space, &v3_manifest(dir.path()), &PushOptions::default())
        .await
        .unwrap();

    // Only the application with an artifact is built
    assert_eq!(results.len(), 1);
    let outcome = results[0].as_ref().unwrap();
    assert_eq!(outcome.app, "api");
    assert_eq!(outcome.stage, PushStage::Running);
    assert!(h.platform.find_application(&h.space, "config-only").is_some());
    assert_eq!(h.platform.call_count(Operation::ApplyManifest), 1);
    assert_eq!(h.platform.call_count(Operation::UploadPackage), 1);
    assert_eq!(h.platform.call_count(Operation::SetDroplet), 1);
}

#[tokio::test(start_paused = true)]
async fn test_v3_build_failure_carries_platform_reason() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "hello").unwrap();
    h.platform.script_builds(
        "api",
        vec![Ok(BuildState::Staging), Ok(BuildState::Failed)],
    );

    let results = h
        .manager
        .push_manifest_v3(&h.space, &v3_manifest(dir.path()), &PushOptions::default())
        .await
        .unwrap();

    match &results[0] {
        Err(DeploymentError::StagingFailed { reason, .. }) => {
            assert!(reason.contains("StagingError"));
        }
        other => panic!("expected StagingFailed, got {other:?}"),
    }
    assert_eq!(h.platform.call_count(Operation::SetDroplet), 0);
}

#[tokio::test]
async fn test_v3_rejects_empty_document() {
    let h = harness();
    let err = h
        .manager
        .push_manifest_v3(&h.space, &ManifestV3::default(), &PushOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DeploymentError::InvalidManifest { .. }));
    assert_eq!(h.platform.call_count(Operation::ApplyManifest), 0);
}
