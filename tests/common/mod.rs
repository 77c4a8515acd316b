//! Shared test doubles for the engine facade.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use magikengine::config::RuntimeConfig;
use magikengine::engine::{
    ArtifactPullOptions, ArtifactPullReport, AutoUpdateOptions, AutoUpdateReport, Event,
    EventsOptions, HealthCheckStatus, NetworkUpdateOptions, SetTrustOptions, ShowTrustOptions,
    ShowTrustReport, SystemInfo, UpdateStatus,
};
use magikengine::machine::{
    MachineConfig, MachineProvider, MachineState, MachineStubber, StubberOutcome, VmType,
};
use magikengine::runtime::{
    AutoUpdater, HealthCheckOutcome, LocalProvider, LocalRuntime, Storage, StorageConfig,
    TrustPolicy, UpdateUnit,
};
use magikengine::transport::{ApiRequest, ApiResponse, Connector, StreamResponse, Transport};
use magikengine::{ConnectionDescriptor, Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// =============================================================================
// Transport
// =============================================================================

type Handler = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// Transport answering from a handler and recording every request.
pub struct FakeTransport {
    pub requests: Mutex<Vec<ApiRequest>>,
    handler: Handler,
    streams: Mutex<VecDeque<mpsc::Receiver<Result<Bytes>>>>,
}

impl FakeTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            handler: Box::new(handler),
            streams: Mutex::new(VecDeque::new()),
        })
    }

    /// Transport whose streaming call yields lines from `rx`.
    pub fn streaming(rx: mpsc::Receiver<Result<Bytes>>) -> Arc<Self> {
        Self::streaming_many(vec![rx])
    }

    /// Transport handing out one line source per streaming call, in order.
    pub fn streaming_many(sources: Vec<mpsc::Receiver<Result<Bytes>>>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            handler: Box::new(|_| ApiResponse::new(200, "{}")),
            streams: Mutex::new(sources.into()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn uri(&self) -> &str {
        "unix:///fake/engine.sock"
    }

    async fn do_request(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }

    async fn open_stream(&self, request: ApiRequest) -> Result<StreamResponse> {
        let stream = self.streams.lock().unwrap().pop_front();
        let response = match stream {
            Some(rx) => StreamResponse::Lines(rx),
            None => StreamResponse::Failed((self.handler)(&request)),
        };
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

/// Connector handing out one fake transport and counting attempts.
pub struct FakeConnector {
    pub transport: Arc<FakeTransport>,
    pub attempts: AtomicUsize,
    pub uris: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(transport: Arc<FakeTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            attempts: AtomicUsize::new(0),
            uris: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        uri: &str,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.uris.lock().unwrap().push(uri.to_string());
        Ok(self.transport.clone())
    }
}

pub fn json_response(status: u16, value: serde_json::Value) -> ApiResponse {
    ApiResponse::new(status, serde_json::to_vec(&value).unwrap())
}

pub fn error_response(status: u16, message: &str) -> ApiResponse {
    json_response(
        status,
        serde_json::json!({"cause": message, "message": message, "response": status}),
    )
}

// =============================================================================
// Local Runtime
// =============================================================================

/// Runtime with scripted health outcomes and an optional event source.
#[derive(Default)]
pub struct FakeRuntime {
    pub health: HashMap<String, HealthCheckOutcome>,
    pub events: Mutex<Option<mpsc::Receiver<Event>>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn with_health(mut self, name: &str, outcome: HealthCheckOutcome) -> Self {
        self.health.insert(name.to_string(), outcome);
        self
    }

    pub fn with_events(self, rx: mpsc::Receiver<Event>) -> Self {
        *self.events.lock().unwrap() = Some(rx);
        self
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl LocalRuntime for FakeRuntime {
    fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            graph_root: "/var/lib/fake".into(),
            run_root: "/run/fake".into(),
            driver: "overlay".into(),
        }
    }

    async fn health_check(&self, name: &str) -> HealthCheckOutcome {
        self.record(format!("healthcheck {name}"));
        self.health.get(name).cloned().unwrap_or_else(|| {
            HealthCheckOutcome::failed(HealthCheckStatus::ContainerNotFound, "no such container")
        })
    }

    async fn subscribe_events(&self, _opts: &EventsOptions) -> Result<mpsc::Receiver<Event>> {
        self.events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Internal("no event source".into()))
    }

    async fn network_update(&self, name: &str, _opts: &NetworkUpdateOptions) -> Result<()> {
        self.record(format!("network update {name}"));
        Ok(())
    }

    async fn artifact_pull(
        &self,
        name: &str,
        _opts: &ArtifactPullOptions,
    ) -> Result<ArtifactPullReport> {
        self.record(format!("artifact pull {name}"));
        Ok(ArtifactPullReport {
            artifact_digest: Some("sha256:feed".into()),
        })
    }

    async fn untag(&self, name: &str, tags: &[String]) -> Result<()> {
        self.record(format!("untag {name} {}", tags.join(",")));
        Ok(())
    }

    async fn info(&self) -> Result<SystemInfo> {
        let mut info = SystemInfo::default();
        info.store.graph_driver_name = "overlay".into();
        Ok(info)
    }

    async fn shutdown(&self) -> Result<()> {
        self.record("shutdown".into());
        Ok(())
    }
}

pub struct FakeStore {
    config: StorageConfig,
}

impl Storage for FakeStore {
    fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn shutdown(&self, _force: bool) -> Result<()> {
        Ok(())
    }
}

/// Auto-updater where listed units fail.
pub struct FakeUpdater {
    pub units: Vec<UpdateUnit>,
    pub failing: Vec<String>,
}

#[async_trait]
impl AutoUpdater for FakeUpdater {
    async fn units(&self, _opts: &AutoUpdateOptions) -> Result<Vec<UpdateUnit>> {
        Ok(self.units.clone())
    }

    async fn update(
        &self,
        unit: &UpdateUnit,
        _opts: &AutoUpdateOptions,
    ) -> Result<Vec<AutoUpdateReport>> {
        if self.failing.contains(&unit.unit) {
            return Err(Error::Internal(format!("restarting {} failed", unit.unit)));
        }
        Ok(unit
            .containers
            .iter()
            .map(|c| AutoUpdateReport {
                container_id: format!("{c}-id"),
                container_name: c.clone(),
                image_name: "quay.io/app:latest".into(),
                policy: "registry".into(),
                systemd_unit: unit.unit.clone(),
                updated: UpdateStatus::True,
            })
            .collect())
    }
}

pub struct FakeTrust;

#[async_trait]
impl TrustPolicy for FakeTrust {
    async fn show(&self, _images: &[String], _opts: &ShowTrustOptions) -> Result<ShowTrustReport> {
        Ok(ShowTrustReport::default())
    }

    async fn set(&self, _scopes: &[String], _opts: &SetTrustOptions) -> Result<()> {
        Ok(())
    }
}

/// Provider returning prepared collaborators and tracking acquisition.
pub struct FakeProvider {
    pub runtime: Option<Arc<FakeRuntime>>,
    pub updater: Arc<FakeUpdater>,
    pub runtime_opened: AtomicBool,
    pub store_opened: AtomicBool,
    pub store_fails: bool,
}

impl FakeProvider {
    pub fn new(runtime: FakeRuntime) -> Arc<Self> {
        Self::with_updater(
            runtime,
            FakeUpdater {
                units: Vec::new(),
                failing: Vec::new(),
            },
        )
    }

    pub fn with_updater(runtime: FakeRuntime, updater: FakeUpdater) -> Arc<Self> {
        Arc::new(Self {
            runtime: Some(Arc::new(runtime)),
            updater: Arc::new(updater),
            runtime_opened: AtomicBool::new(false),
            store_opened: AtomicBool::new(false),
            store_fails: false,
        })
    }

    /// Provider whose storage cannot be opened.
    pub fn failing_store(runtime: FakeRuntime) -> Arc<Self> {
        Arc::new(Self {
            runtime: Some(Arc::new(runtime)),
            updater: Arc::new(FakeUpdater {
                units: Vec::new(),
                failing: Vec::new(),
            }),
            runtime_opened: AtomicBool::new(false),
            store_opened: AtomicBool::new(false),
            store_fails: true,
        })
    }

    /// Provider whose runtime cannot be opened.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            runtime: None,
            updater: Arc::new(FakeUpdater {
                units: Vec::new(),
                failing: Vec::new(),
            }),
            runtime_opened: AtomicBool::new(false),
            store_opened: AtomicBool::new(false),
            store_fails: false,
        })
    }
}

impl LocalProvider for FakeProvider {
    fn open_runtime(&self, _config: &RuntimeConfig) -> Result<Arc<dyn LocalRuntime>> {
        self.runtime_opened.store(true, Ordering::SeqCst);
        match &self.runtime {
            Some(runtime) => Ok(runtime.clone()),
            None => Err(Error::RuntimeInit("runtime database is locked".into())),
        }
    }

    fn open_store(&self, config: &StorageConfig) -> Result<Arc<dyn Storage>> {
        self.store_opened.store(true, Ordering::SeqCst);
        if self.store_fails {
            return Err(Error::RuntimeInit("storage is read-only".into()));
        }
        Ok(Arc::new(FakeStore {
            config: config.clone(),
        }))
    }

    fn auto_updater(&self, _runtime: &Arc<dyn LocalRuntime>) -> Arc<dyn AutoUpdater> {
        self.updater.clone()
    }

    fn trust_policy(&self) -> Arc<dyn TrustPolicy> {
        Arc::new(FakeTrust)
    }
}

// =============================================================================
// Machines
// =============================================================================

/// Stubber reporting a fixed state.
pub struct FixedStubber(pub MachineState);

#[async_trait]
impl MachineStubber for FixedStubber {
    fn vm_type(&self) -> VmType {
        VmType::Qemu
    }

    async fn state(&self, _mc: &MachineConfig) -> Result<StubberOutcome<MachineState>> {
        Ok(StubberOutcome::new(self.0))
    }

    async fn stop(&self, _mc: &MachineConfig, _force: bool) -> Result<StubberOutcome<()>> {
        Ok(StubberOutcome::new(()))
    }

    async fn remove(&self, _mc: &MachineConfig) -> Result<StubberOutcome<()>> {
        Ok(StubberOutcome::new(()))
    }
}

/// Provider serving one machine in a fixed state.
pub struct FakeMachines {
    pub config: MachineConfig,
    pub state: MachineState,
}

impl MachineProvider for FakeMachines {
    fn vm_type(&self) -> VmType {
        VmType::Qemu
    }

    fn machine(&self, name: &str) -> Result<MachineConfig> {
        if name == self.config.name {
            Ok(self.config.clone())
        } else {
            Err(Error::Machine {
                name: name.to_string(),
                reason: "machine does not exist".into(),
            })
        }
    }

    fn stubber(&self, _mc: &MachineConfig) -> Arc<dyn MachineStubber> {
        Arc::new(FixedStubber(self.state))
    }
}
