//! Cross-backend parity and remote request shape tests.

mod common;

use common::{FakeProvider, FakeRuntime, FakeTransport, FakeUpdater, error_response, json_response};
use magikengine::config::{EngineConfig, RuntimeConfig};
use magikengine::constants::REGISTRY_AUTH_HEADER;
use magikengine::engine::{
    ArtifactPullOptions, AutoUpdateOptions, CapabilityTable, ContainerEngine, EventsOptions,
    HealthCheckOptions, HealthCheckStatus, ImageUntagOptions, NetworkUpdateOptions, Operation,
    RemoteEngine, SetTrustOptions, ShowTrustOptions, UpdateStatus,
};
use magikengine::protocol::{QueryParams, ToParams, endpoint};
use magikengine::runtime::{HealthCheckOutcome, UpdateUnit};
use magikengine::transport::{ApiResponse, Method};
use magikengine::{ClientContext, EngineBuilder, ErrorKind, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ALL_STATUSES: [HealthCheckStatus; 7] = [
    HealthCheckStatus::Healthy,
    HealthCheckStatus::Unhealthy,
    HealthCheckStatus::Starting,
    HealthCheckStatus::Stopped,
    HealthCheckStatus::ContainerNotFound,
    HealthCheckStatus::NotDefined,
    HealthCheckStatus::InternalError,
];

fn outcome(status: HealthCheckStatus) -> HealthCheckOutcome {
    match status {
        HealthCheckStatus::Healthy | HealthCheckStatus::Unhealthy | HealthCheckStatus::Starting => {
            HealthCheckOutcome::completed(status)
        }
        _ => HealthCheckOutcome::failed(status, format!("{status}")),
    }
}

/// Response the engine service sends for a local health check outcome.
fn served(status: HealthCheckStatus) -> ApiResponse {
    match status {
        HealthCheckStatus::ContainerNotFound => error_response(404, "no such container"),
        HealthCheckStatus::NotDefined => {
            error_response(409, "container has no defined healthcheck")
        }
        HealthCheckStatus::Stopped => error_response(409, "container is not running"),
        HealthCheckStatus::InternalError => error_response(500, "health check failed"),
        _ => json_response(200, serde_json::json!({ "Status": status.as_str() })),
    }
}

async fn direct(runtime: FakeRuntime) -> Arc<dyn ContainerEngine> {
    EngineBuilder::new(EngineConfig::direct(RuntimeConfig::default()))
        .with_local_provider(FakeProvider::new(runtime))
        .build()
        .await
        .unwrap()
}

fn remote(transport: &Arc<FakeTransport>) -> RemoteEngine {
    RemoteEngine::new(ClientContext::new(transport.clone()))
}

fn kind_of<T>(result: &Result<T>) -> Option<ErrorKind> {
    result.as_ref().err().map(|e| e.kind())
}

// =============================================================================
// Health Check Parity
// =============================================================================

#[tokio::test]
async fn test_health_check_classification_matches() {
    for status in ALL_STATUSES {
        let direct = direct(FakeRuntime::default().with_health("web", outcome(status))).await;
        let transport = FakeTransport::new(move |_| served(status));
        let remote = remote(&transport);

        let local = direct.health_check_run("web", HealthCheckOptions::default()).await;
        let over_wire = remote.health_check_run("web", HealthCheckOptions::default()).await;

        assert_eq!(kind_of(&local), kind_of(&over_wire), "status {status}");
        if let (Ok(a), Ok(b)) = (&local, &over_wire) {
            assert_eq!(a, b);
        }
    }
}

#[tokio::test]
async fn test_unhealthy_is_a_result_not_an_error() {
    let transport = FakeTransport::new(|_| served(HealthCheckStatus::Unhealthy));
    let results = remote(&transport)
        .health_check_run("web", HealthCheckOptions::default())
        .await
        .unwrap();
    assert_eq!(results.status, "unhealthy");

    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.path, endpoint("/containers/web/healthcheck"));
}

#[tokio::test]
async fn test_missing_container_is_not_found_on_both() {
    let direct = direct(FakeRuntime::default()).await;
    let transport = FakeTransport::new(|_| error_response(404, "no such container"));
    let local = direct
        .health_check_run("ghost", HealthCheckOptions::default())
        .await
        .unwrap_err();
    let over_wire = remote(&transport)
        .health_check_run("ghost", HealthCheckOptions::default())
        .await
        .unwrap_err();
    assert!(local.is_not_found());
    assert!(over_wire.is_not_found());
    assert_eq!(local.to_string(), over_wire.to_string());
}

// =============================================================================
// Capability Gaps
// =============================================================================

#[tokio::test]
async fn test_remote_trust_is_unsupported_without_round_trip() {
    let transport = FakeTransport::new(|_| json_response(200, serde_json::json!({})));
    let remote = remote(&transport);

    let show = remote
        .show_trust(&["quay.io/app".into()], ShowTrustOptions::default())
        .await
        .unwrap_err();
    let set = remote
        .set_trust(&["default".into()], SetTrustOptions::default())
        .await
        .unwrap_err();

    assert_eq!(show.kind(), ErrorKind::Unsupported);
    assert_eq!(set.to_string(), "not implemented");
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_direct_trust_succeeds() {
    let direct = direct(FakeRuntime::default()).await;
    direct
        .show_trust(&[], ShowTrustOptions::default())
        .await
        .unwrap();
    direct
        .set_trust(&["default".into()], SetTrustOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_remote_auto_update_reports_unsupported() {
    let transport = FakeTransport::new(|_| json_response(200, serde_json::json!([])));
    let (reports, errors) = remote(&transport)
        .auto_update(AutoUpdateOptions::default())
        .await;
    assert!(reports.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_unsupported());
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_direct_auto_update_keeps_going_after_failure() {
    let updater = FakeUpdater {
        units: vec![
            UpdateUnit {
                unit: "web.service".into(),
                containers: vec!["web".into()],
            },
            UpdateUnit {
                unit: "db.service".into(),
                containers: vec!["db".into()],
            },
            UpdateUnit {
                unit: "cache.service".into(),
                containers: vec!["cache".into(), "cache-sidecar".into()],
            },
        ],
        failing: vec!["db.service".into()],
    };
    let engine = EngineBuilder::new(EngineConfig::direct(RuntimeConfig::default()))
        .with_local_provider(FakeProvider::with_updater(FakeRuntime::default(), updater))
        .build()
        .await
        .unwrap();

    let (reports, errors) = engine.auto_update(AutoUpdateOptions::default()).await;
    let names: Vec<_> = reports.iter().map(|r| r.container_name.as_str()).collect();
    assert_eq!(names, ["web", "cache", "cache-sidecar"]);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("db.service"));
}

#[tokio::test]
async fn test_narrowed_table_fails_before_request() {
    let transport = FakeTransport::new(|_| json_response(200, serde_json::json!({})));
    let remote = remote(&transport)
        .with_capabilities(CapabilityTable::remote().without(Operation::Info));
    assert!(!remote.capabilities().supports(Operation::Info));

    let err = remote.info().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert_eq!(transport.request_count(), 0);
}

/// Runs one operation and returns the error kind it failed with, if any.
async fn run_operation(engine: &RemoteEngine, op: Operation) -> Option<ErrorKind> {
    match op {
        Operation::HealthCheckRun => kind_of(
            &engine
                .health_check_run("web", HealthCheckOptions::default())
                .await,
        ),
        Operation::AutoUpdate => {
            let (_, errors) = engine.auto_update(AutoUpdateOptions::default()).await;
            errors.first().map(|e| e.kind())
        }
        Operation::Events => {
            let (sink, _out) = mpsc::channel(1);
            kind_of(
                &engine
                    .events(EventsOptions::default(), sink, CancellationToken::new())
                    .await,
            )
        }
        Operation::NetworkUpdate => kind_of(
            &engine
                .network_update("podnet", NetworkUpdateOptions::default())
                .await,
        ),
        Operation::ArtifactPull => kind_of(
            &engine
                .artifact_pull("quay.io/art:1", ArtifactPullOptions::default())
                .await,
        ),
        Operation::ImageUntag => kind_of(
            &engine
                .image_untag("app", &["app:v1".into()], ImageUntagOptions::default())
                .await,
        ),
        Operation::Info => kind_of(&engine.info().await),
        Operation::ShowTrust => kind_of(
            &engine
                .show_trust(&["quay.io/app".into()], ShowTrustOptions::default())
                .await,
        ),
        Operation::SetTrust => kind_of(
            &engine
                .set_trust(&["default".into()], SetTrustOptions::default())
                .await,
        ),
    }
}

#[tokio::test]
async fn test_table_alone_decides_unsupported() {
    let tables = [
        CapabilityTable::remote(),
        CapabilityTable::all(),
        CapabilityTable::remote().without(Operation::Info),
        CapabilityTable::remote().with(Operation::AutoUpdate),
    ];
    for table in tables {
        for op in Operation::ALL {
            let (line_tx, line_rx) = mpsc::channel(1);
            drop(line_tx);
            let transport = FakeTransport::streaming(line_rx);
            let engine = remote(&transport).with_capabilities(table.clone());

            let unsupported = run_operation(&engine, op).await == Some(ErrorKind::Unsupported);
            assert_eq!(unsupported, !table.supports(op), "{op} with {table:?}");
            assert_eq!(transport.request_count() == 0, unsupported, "{op} with {table:?}");
        }
    }
}

#[tokio::test]
async fn test_widened_table_reaches_trust_endpoint() {
    let transport = FakeTransport::new(|request| {
        if request.method == Method::GET {
            json_response(
                200,
                serde_json::json!({"policies": [{"name": "default", "type": "accept"}]}),
            )
        } else {
            ApiResponse::new(200, "")
        }
    });
    let remote = remote(&transport).with_capabilities(
        CapabilityTable::remote()
            .with(Operation::ShowTrust)
            .with(Operation::SetTrust),
    );

    let report = remote
        .show_trust(&["quay.io/app".into()], ShowTrustOptions::default())
        .await
        .unwrap();
    assert_eq!(report.policies[0].kind, "accept");
    remote
        .set_trust(
            &["quay.io".into()],
            SetTrustOptions {
                kind: "reject".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests[0].path, endpoint("/images/trust"));
    assert_eq!(requests[0].params.get("image"), Some("quay.io/app"));
    assert_eq!(requests[1].method, Method::POST);
    assert_eq!(requests[1].params.get("scope"), Some("quay.io"));
    assert_eq!(requests[1].params.get("type"), Some("reject"));
}

#[tokio::test]
async fn test_widened_table_decodes_auto_update_reports() {
    let transport = FakeTransport::new(|_| {
        json_response(
            200,
            serde_json::json!({
                "Reports": [{
                    "ContainerID": "c1",
                    "ContainerName": "web",
                    "ImageName": "quay.io/web:latest",
                    "Policy": "registry",
                    "SystemdUnit": "web.service",
                    "Updated": "true"
                }],
                "Errors": ["db.service: restart failed"]
            }),
        )
    });
    let remote =
        remote(&transport).with_capabilities(CapabilityTable::remote().with(Operation::AutoUpdate));

    let (reports, errors) = remote
        .auto_update(AutoUpdateOptions {
            dry_run: true,
            ..Default::default()
        })
        .await;
    assert_eq!(reports[0].container_name, "web");
    assert_eq!(reports[0].updated, UpdateStatus::True);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("db.service"));

    let request = &transport.requests()[0];
    assert_eq!(request.path, endpoint("/autoupdate"));
    assert_eq!(request.params.get("dryRun"), Some("true"));
    assert!(!request.headers.iter().any(|(k, _)| k == REGISTRY_AUTH_HEADER));
}

// =============================================================================
// Query Round Trip
// =============================================================================

fn round_trip(params: &QueryParams) -> QueryParams {
    let decoded = QueryParams::decode(&params.encode());
    assert!(
        decoded.iter().all(|(k, v)| !k.is_empty() && !v.is_empty()),
        "empty key or value in {decoded:?}"
    );
    decoded
}

#[test]
fn test_events_options_survive_query_round_trip() {
    let opts = EventsOptions {
        filters: vec![
            "type=container".into(),
            "label=tier=web & api".into(),
            "event=start".into(),
        ],
        since: Some("2026-10-19T08:00:00Z".into()),
        until: Some("10m".into()),
        stream: false,
    };
    let decoded = round_trip(&opts.to_params().unwrap());

    assert_eq!(decoded.get("since"), Some("2026-10-19T08:00:00Z"));
    assert_eq!(decoded.get("until"), Some("10m"));
    assert_eq!(decoded.get("stream"), Some("false"));
    let filters: serde_json::Value =
        serde_json::from_str(decoded.get("filters").unwrap()).unwrap();
    assert_eq!(
        filters,
        serde_json::json!({
            "event": ["start"],
            "label": ["tier=web & api"],
            "type": ["container"],
        })
    );
    assert_eq!(decoded.len(), 4);
}

#[test]
fn test_artifact_options_survive_query_round_trip() {
    let opts = ArtifactPullOptions {
        quiet: Some(true),
        retry: Some(5),
        retry_delay: Some("1m30s".into()),
        tls_verify: Some(false),
        ..Default::default()
    };
    let decoded = round_trip(&opts.to_params().unwrap());

    assert_eq!(decoded.get("quiet"), Some("true"));
    assert_eq!(decoded.get("retry"), Some("5"));
    assert_eq!(decoded.get("retryDelay"), Some("1m30s"));
    assert_eq!(decoded.get("tlsVerify"), Some("false"));
    assert_eq!(decoded.len(), 4);
}

#[test]
fn test_unset_options_encode_to_nothing_but_defaults() {
    let decoded = round_trip(&ArtifactPullOptions::default().to_params().unwrap());
    assert!(decoded.is_empty());
    let decoded = round_trip(&EventsOptions::default().to_params().unwrap());
    assert_eq!(decoded.iter().collect::<Vec<_>>(), [("stream", "true")]);
}

// =============================================================================
// Request Shapes
// =============================================================================

#[tokio::test]
async fn test_untag_sends_one_request_per_tag() {
    let transport = FakeTransport::new(|_| ApiResponse::new(201, ""));
    remote(&transport)
        .image_untag(
            "app",
            &["quay.io/team/app:v1".into(), "localhost:5000/app".into()],
            ImageUntagOptions::default(),
        )
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.method == Method::POST));
    assert!(requests.iter().all(|r| r.path == endpoint("/images/app/untag")));
    assert_eq!(requests[0].params.get("repo"), Some("quay.io/team/app"));
    assert_eq!(requests[0].params.get("tag"), Some("v1"));
    assert_eq!(requests[1].params.get("repo"), Some("localhost:5000/app"));
    assert_eq!(requests[1].params.get("tag"), Some("latest"));
}

#[tokio::test]
async fn test_untag_rejects_digest_and_empty_tag() {
    let transport = FakeTransport::new(|_| ApiResponse::new(201, ""));
    let remote = remote(&transport);
    for reference in ["app@sha256:abc", "app:"] {
        let err = remote
            .image_untag("app", &[reference.into()], ImageUntagOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal, "{reference}");
    }
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_untag_without_tags_removes_all() {
    let transport = FakeTransport::new(|_| ApiResponse::new(201, ""));
    remote(&transport)
        .image_untag("app", &[], ImageUntagOptions::default())
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].params.is_empty());
}

#[tokio::test]
async fn test_untag_stops_at_first_failure() {
    let transport = FakeTransport::new(|_| error_response(404, "no such image"));
    let err = remote(&transport)
        .image_untag(
            "app",
            &["app:v1".into(), "app:v2".into()],
            ImageUntagOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn test_artifact_pull_carries_registry_auth() {
    let transport = FakeTransport::new(|_| {
        json_response(200, serde_json::json!({ "ArtifactDigest": "sha256:beef" }))
    });
    let report = remote(&transport)
        .artifact_pull(
            "quay.io/team/model:1",
            ArtifactPullOptions {
                username: Some("alice".into()),
                password: Some("s3cret".into()),
                retry: Some(3),
                ..ArtifactPullOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(report.artifact_digest.as_deref(), Some("sha256:beef"));

    let request = &transport.requests()[0];
    assert_eq!(request.path, endpoint("/artifacts/pull"));
    assert_eq!(request.params.get("name"), Some("quay.io/team/model:1"));
    assert_eq!(request.params.get("retry"), Some("3"));
    assert!(!request.params.contains("username"));
    assert!(!request.params.contains("password"));
    assert!(
        request
            .headers
            .iter()
            .any(|(name, value)| name == REGISTRY_AUTH_HEADER && !value.is_empty())
    );
}

#[tokio::test]
async fn test_artifact_pull_without_credentials_has_no_auth_header() {
    let transport = FakeTransport::new(|_| json_response(200, serde_json::json!({})));
    remote(&transport)
        .artifact_pull("quay.io/team/model:1", ArtifactPullOptions::default())
        .await
        .unwrap();
    assert!(transport.requests()[0].headers.is_empty());
}

#[tokio::test]
async fn test_artifact_pull_bad_authfile_fails_before_request() {
    let dir = tempfile::tempdir().unwrap();
    let authfile = dir.path().join("auth.json");
    std::fs::write(&authfile, "not json").unwrap();

    let transport = FakeTransport::new(|_| json_response(200, serde_json::json!({})));
    let err = remote(&transport)
        .artifact_pull(
            "quay.io/team/model:1",
            ArtifactPullOptions {
                authfile: Some(authfile),
                ..ArtifactPullOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_network_update_sends_json_body() {
    let transport = FakeTransport::new(|_| ApiResponse::new(204, ""));
    remote(&transport)
        .network_update(
            "podnet",
            NetworkUpdateOptions {
                add_dns_servers: vec!["10.0.0.53".into()],
                remove_dns_servers: Vec::new(),
            },
        )
        .await
        .unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, endpoint("/networks/podnet/update"));
    let body: serde_json::Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
    assert_eq!(body["adddnsservers"][0], "10.0.0.53");
}

#[tokio::test]
async fn test_network_not_found_matches_direct_kind() {
    let transport = FakeTransport::new(|_| error_response(404, "network not found"));
    let err = remote(&transport)
        .network_update("ghost", NetworkUpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_info_decodes_report() {
    let transport = FakeTransport::new(|_| {
        json_response(
            200,
            serde_json::json!({ "store": { "graphDriverName": "overlay" } }),
        )
    });
    let remote_info = remote(&transport).info().await.unwrap();
    let direct_info = direct(FakeRuntime::default()).await.info().await.unwrap();
    assert_eq!(
        remote_info.store.graph_driver_name,
        direct_info.store.graph_driver_name
    );
    assert_eq!(transport.requests()[0].path, endpoint("/info"));
}
