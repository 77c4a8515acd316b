//! Tests for mode resolution and facade construction.

mod common;

use common::{FakeConnector, FakeMachines, FakeProvider, FakeRuntime, FakeTransport, json_response};
use magikengine::config::{EngineConfig, RuntimeConfig};
use magikengine::machine::{MachineConfig, MachineState, VmFile, VmType};
use magikengine::platform::{Arch, Os, Platform};
use magikengine::{
    ClientContext, ContainerEngine, EngineBuilder, EngineMode, Error, ErrorKind, RemoteEngine,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn linux() -> Platform {
    Platform {
        os: Os::Linux,
        arch: Arch::Amd64,
    }
}

fn windows() -> Platform {
    Platform {
        os: Os::Windows,
        arch: Arch::Amd64,
    }
}

fn machine_config(socket: Option<&str>, pipe: Option<&str>) -> MachineConfig {
    let mut mc = MachineConfig::new("dev", VmType::Qemu);
    mc.api_socket = socket.map(VmFile::new);
    mc.api_pipe = pipe.map(VmFile::new);
    mc
}

fn machine_engine_config() -> EngineConfig {
    EngineConfig {
        machine_mode: true,
        machine_name: Some("dev".into()),
        ..EngineConfig::remote("unix:///ignored.sock")
    }
}

// =============================================================================
// Mode Resolution
// =============================================================================

#[tokio::test]
async fn test_unknown_mode_is_unsupported() {
    let config = EngineConfig {
        mode: "hybrid".into(),
        ..EngineConfig::default()
    };
    let connector = FakeConnector::new(FakeTransport::new(|_| {
        json_response(200, serde_json::json!({}))
    }));
    let err = EngineBuilder::new(config)
        .with_connector(connector.clone())
        .with_local_provider(FakeProvider::new(FakeRuntime::default()))
        .build()
        .await
        .err()
        .unwrap();

    assert_eq!(err.to_string(), "runtime mode 'hybrid' is not supported");
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_direct_mode_binds_runtime_then_store() {
    let provider = FakeProvider::new(FakeRuntime::default());
    let engine = EngineBuilder::new(EngineConfig::direct(RuntimeConfig::default()))
        .with_local_provider(provider.clone())
        .build()
        .await
        .unwrap();

    assert_eq!(engine.mode(), EngineMode::Direct);
    assert!(provider.runtime_opened.load(Ordering::SeqCst));
    assert!(provider.store_opened.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_direct_runtime_failure_skips_store() {
    let provider = FakeProvider::failing();
    let err = EngineBuilder::new(EngineConfig::direct(RuntimeConfig::default()))
        .with_local_provider(provider.clone())
        .build()
        .await
        .err()
        .unwrap();

    assert!(matches!(err, Error::RuntimeInit(_)));
    assert!(provider.runtime_opened.load(Ordering::SeqCst));
    assert!(!provider.store_opened.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_direct_store_failure_shuts_runtime_down() {
    let provider = FakeProvider::failing_store(FakeRuntime::default());
    let err = EngineBuilder::new(EngineConfig::direct(RuntimeConfig::default()))
        .with_local_provider(provider.clone())
        .build()
        .await
        .err()
        .unwrap();

    assert!(matches!(err, Error::RuntimeInit(_)));
    assert!(provider.store_opened.load(Ordering::SeqCst));
    let calls = provider.runtime.as_ref().unwrap().calls.lock().unwrap().clone();
    assert_eq!(calls, ["shutdown"]);
}

#[tokio::test]
async fn test_direct_without_provider_fails() {
    let result = EngineBuilder::new(EngineConfig::direct(RuntimeConfig::default()))
        .build()
        .await;
    assert!(matches!(result, Err(Error::RuntimeInit(_))));
}

#[tokio::test]
async fn test_remote_mode_connects_to_configured_uri() {
    let connector = FakeConnector::new(FakeTransport::new(|_| {
        json_response(200, serde_json::json!({}))
    }));
    let engine = EngineBuilder::new(EngineConfig::remote("tcp://10.0.0.5:8888"))
        .with_connector(connector.clone())
        .build()
        .await
        .unwrap();

    assert_eq!(engine.mode(), EngineMode::Remote);
    assert_eq!(
        connector.uris.lock().unwrap().as_slice(),
        ["tcp://10.0.0.5:8888".to_string()]
    );
}

// =============================================================================
// Machine-mediated Connections
// =============================================================================

#[tokio::test]
async fn test_stopped_machine_fails_without_transport_attempt() {
    let connector = FakeConnector::new(FakeTransport::new(|_| {
        json_response(200, serde_json::json!({}))
    }));
    let machines = Arc::new(FakeMachines {
        config: machine_config(Some("/run/dev-api.sock"), None),
        state: MachineState::Stopped,
    });

    let err = EngineBuilder::new(machine_engine_config())
        .with_platform(linux())
        .with_machine_provider(machines)
        .with_connector(connector.clone())
        .build()
        .await
        .err()
        .unwrap();

    assert!(matches!(err, Error::MachineNotRunning { .. }));
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_running_machine_uses_socket_on_unix() {
    let connector = FakeConnector::new(FakeTransport::new(|_| {
        json_response(200, serde_json::json!({}))
    }));
    let machines = Arc::new(FakeMachines {
        config: machine_config(Some("/run/dev-api.sock"), Some(r"\\.\pipe\magikengine-dev")),
        state: MachineState::Running,
    });

    EngineBuilder::new(machine_engine_config())
        .with_platform(linux())
        .with_machine_provider(machines)
        .with_connector(connector.clone())
        .build()
        .await
        .unwrap();

    assert_eq!(
        connector.uris.lock().unwrap().as_slice(),
        ["unix:///run/dev-api.sock".to_string()]
    );
}

#[tokio::test]
async fn test_running_machine_uses_pipe_on_windows() {
    let connector = FakeConnector::new(FakeTransport::new(|_| {
        json_response(200, serde_json::json!({}))
    }));
    let machines = Arc::new(FakeMachines {
        config: machine_config(Some("/run/dev-api.sock"), Some(r"\\.\pipe\magikengine-dev")),
        state: MachineState::Running,
    });

    EngineBuilder::new(machine_engine_config())
        .with_platform(windows())
        .with_machine_provider(machines)
        .with_connector(connector.clone())
        .build()
        .await
        .unwrap();

    assert_eq!(
        connector.uris.lock().unwrap().as_slice(),
        ["npipe:////./pipe/magikengine-dev".to_string()]
    );
}

#[tokio::test]
async fn test_missing_pipe_on_windows_is_fatal() {
    let connector = FakeConnector::new(FakeTransport::new(|_| {
        json_response(200, serde_json::json!({}))
    }));
    let machines = Arc::new(FakeMachines {
        config: machine_config(Some("/run/dev-api.sock"), None),
        state: MachineState::Running,
    });

    let err = EngineBuilder::new(machine_engine_config())
        .with_platform(windows())
        .with_machine_provider(machines)
        .with_connector(connector.clone())
        .build()
        .await
        .err()
        .unwrap();

    assert_eq!(err.to_string(), "pipe of machine is not set");
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_remote_context_close() {
    let transport = FakeTransport::new(|_| json_response(200, serde_json::json!({})));
    let engine = RemoteEngine::new(ClientContext::new(transport));
    assert_eq!(engine.context().uri(), "unix:///fake/engine.sock");
    assert!(!engine.context().is_closed());
    engine.shutdown().await;
    assert!(engine.context().is_closed());
}

#[tokio::test]
async fn test_shutdown_closes_remote_context() {
    let transport = FakeTransport::new(|_| json_response(200, serde_json::json!({})));
    let connector = FakeConnector::new(transport.clone());
    let engine = EngineBuilder::new(EngineConfig::remote("unix:///run/engine.sock"))
        .with_connector(connector)
        .build()
        .await
        .unwrap();

    engine.shutdown().await;
    let err = engine.info().await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(transport.request_count(), 0);
}
