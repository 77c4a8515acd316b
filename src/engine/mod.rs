//! # Container Engine Facade
//!
//! One operation surface, two interchangeable backends chosen at
//! construction:
//!
//! ```text
//!                        ┌─────────────────────┐
//!      EngineConfig ───► │   EngineBuilder     │
//!                        │  (mode resolution)  │
//!                        └──────────┬──────────┘
//!                 direct            │            remote
//!           ┌───────────────────────┴───────────────────────┐
//!           ▼                                               ▼
//!  ┌─────────────────┐                           ┌──────────────────────┐
//!  │  DirectEngine   │                           │    RemoteEngine      │
//!  │ LocalRuntime    │                           │ ClientContext        │
//!  │ Storage         │                           │  └─ Transport (HTTP) │
//!  │ AutoUpdater     │                           │ CapabilityTable      │
//!  │ TrustPolicy     │                           │ AuthHeaderBuilder    │
//!  └─────────────────┘                           └──────────────────────┘
//! ```
//!
//! | Operation        | Direct                    | Remote                              |
//! |------------------|---------------------------|-------------------------------------|
//! | health_check_run | runtime health check      | `GET /containers/{name}/healthcheck`|
//! | auto_update      | auto-update collaborator  | not implemented                     |
//! | events           | runtime subscription      | `GET /events` (NDJSON)              |
//! | network_update   | runtime                   | `POST /networks/{name}/update`      |
//! | artifact_pull    | runtime                   | `POST /artifacts/pull`              |
//! | image_untag      | runtime                   | `POST /images/{name}/untag`         |
//! | info             | runtime                   | `GET /info`                         |
//! | show/set_trust   | trust collaborator        | not implemented                     |
//!
//! Both backends classify failures into the same [`ErrorKind`](crate::ErrorKind)
//! for the same logical outcome.

mod direct;
mod parity;
mod remote;
mod types;

pub use direct::{DirectEngine, RuntimeHandle};
pub use parity::{CapabilityTable, Operation};
pub use remote::RemoteEngine;
pub use types::*;

use crate::client::negotiate;
use crate::config::{EngineConfig, EngineMode};
use crate::error::{Error, Result};
use crate::machine::{MachineProvider, PlatformProvider};
use crate::platform::Platform;
use crate::protocol::{AuthHeaderBuilder, RegistryAuth};
use crate::runtime::LocalProvider;
use crate::transport::{Connector, HttpConnector};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// =============================================================================
// Facade Capability
// =============================================================================

/// Container engine operations, independent of backend.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Backend mode.
    fn mode(&self) -> EngineMode;

    /// Runs a container's health check.
    ///
    /// A completed check returns its status even when unhealthy. Missing
    /// container, missing check and stopped container are errors.
    async fn health_check_run(
        &self,
        name: &str,
        opts: HealthCheckOptions,
    ) -> Result<HealthCheckResults>;

    /// Auto-updates eligible units. Never aborts on a single unit's failure.
    async fn auto_update(&self, opts: AutoUpdateOptions) -> AutoUpdateOutcome;

    /// Streams events into `sink` until `cancel` fires or the source closes.
    ///
    /// Blocks for the life of the subscription; run it on its own task
    /// (see [`EventSubscription`]).
    async fn events(
        &self,
        opts: EventsOptions,
        sink: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> Result<EventsEnd>;

    /// Updates a network's DNS servers.
    async fn network_update(&self, name: &str, opts: NetworkUpdateOptions) -> Result<()>;

    /// Pulls an artifact.
    async fn artifact_pull(&self, name: &str, opts: ArtifactPullOptions)
    -> Result<ArtifactPullReport>;

    /// Removes tags from an image; no tags removes all of them.
    async fn image_untag(&self, name: &str, tags: &[String], opts: ImageUntagOptions)
    -> Result<()>;

    /// Engine information.
    async fn info(&self) -> Result<SystemInfo>;

    /// Shows image trust policy.
    async fn show_trust(
        &self,
        images: &[String],
        opts: ShowTrustOptions,
    ) -> Result<ShowTrustReport>;

    /// Sets image trust policy.
    async fn set_trust(&self, scopes: &[String], opts: SetTrustOptions) -> Result<()>;

    /// Releases backend resources. Remote: cancels every in-flight call.
    async fn shutdown(&self);
}

// =============================================================================
// Event Subscription
// =============================================================================

/// A running event subscription on its own task.
#[derive(Debug)]
pub struct EventSubscription {
    /// Received events.
    pub events: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    task: JoinHandle<Result<EventsEnd>>,
}

impl EventSubscription {
    /// Spawns `engine.events` and returns its receiving end.
    pub fn spawn(engine: Arc<dyn ContainerEngine>, opts: EventsOptions, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { engine.events(opts, tx, token).await });
        Self {
            events: rx,
            cancel,
            task,
        }
    }

    /// Requests cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels and waits for the subscription to end.
    pub async fn stop(self) -> Result<EventsEnd> {
        self.cancel.cancel();
        self.join().await
    }

    /// Waits for the subscription to end on its own.
    pub async fn join(self) -> Result<EventsEnd> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("event task failed: {e}")))?
    }
}

// =============================================================================
// Mode Resolution
// =============================================================================

/// Builds a facade bound to the configured mode.
///
/// Collaborators are injected here; nothing is looked up from
/// process-wide state.
pub struct EngineBuilder {
    config: EngineConfig,
    platform: Platform,
    local: Option<Arc<dyn LocalProvider>>,
    machines: Option<Arc<dyn MachineProvider>>,
    connector: Arc<dyn Connector>,
    auth: Arc<dyn AuthHeaderBuilder>,
    capabilities: CapabilityTable,
}

impl EngineBuilder {
    /// Creates a builder with the HTTP connector and default auth.
    pub fn new(config: EngineConfig) -> Self {
        let connector = HttpConnector::new().with_timeout(config.request_timeout());
        Self {
            config,
            platform: Platform::detect(),
            local: None,
            machines: None,
            connector: Arc::new(connector),
            auth: Arc::new(RegistryAuth),
            capabilities: CapabilityTable::remote(),
        }
    }

    /// Sets the local collaborator provider (Direct mode).
    #[must_use]
    pub fn with_local_provider(mut self, local: Arc<dyn LocalProvider>) -> Self {
        self.local = Some(local);
        self
    }

    /// Sets the machine provider (machine-mediated Remote mode).
    #[must_use]
    pub fn with_machine_provider(mut self, machines: Arc<dyn MachineProvider>) -> Self {
        self.machines = Some(machines);
        self
    }

    /// Sets the transport connector.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Sets the registry auth header builder.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthHeaderBuilder>) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the Remote capability table.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilityTable) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Overrides platform detection.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Resolves the mode and constructs the backend.
    pub async fn build(self) -> Result<Arc<dyn ContainerEngine>> {
        match self.config.engine_mode()? {
            EngineMode::Direct => {
                let local = self.local.ok_or_else(|| {
                    Error::RuntimeInit("no local runtime provider configured".into())
                })?;
                let runtime = local.open_runtime(&self.config.runtime)?;
                let store = match local.open_store(&runtime.storage_config()) {
                    Ok(store) => store,
                    Err(e) => {
                        if let Err(close) = runtime.shutdown().await {
                            warn!(error = %close, "runtime shutdown after storage failure failed");
                        }
                        return Err(e);
                    }
                };
                let updater = local.auto_updater(&runtime);
                let trust = local.trust_policy();
                info!(mode = %EngineMode::Direct, "container engine ready");
                Ok(Arc::new(DirectEngine::new(
                    RuntimeHandle { runtime, store },
                    updater,
                    trust,
                )))
            }
            EngineMode::Remote => {
                let descriptor = self.config.connection_descriptor();
                let machines = match (&descriptor.machine, self.machines) {
                    (Some(_), None) => Some(Arc::new(PlatformProvider::detect(
                        &self.platform,
                        self.config.machine_dir(),
                    )?) as Arc<dyn MachineProvider>),
                    (_, machines) => machines,
                };
                let ctx = negotiate(
                    &descriptor,
                    machines.as_deref(),
                    &self.platform,
                    self.connector.as_ref(),
                )
                .await?;
                info!(mode = %EngineMode::Remote, uri = ctx.uri(), "container engine ready");
                Ok(Arc::new(
                    RemoteEngine::new(ctx)
                        .with_capabilities(self.capabilities)
                        .with_auth(self.auth),
                ))
            }
        }
    }
}

/// Constructs a facade for `config` with default collaborators.
///
/// Direct mode needs a local provider; Remote mode uses the HTTP connector
/// and, for machine targets, the platform's machine provider.
pub async fn new_container_engine(
    config: EngineConfig,
    local: Option<Arc<dyn LocalProvider>>,
) -> Result<Arc<dyn ContainerEngine>> {
    let mut builder = EngineBuilder::new(config);
    if let Some(local) = local {
        builder = builder.with_local_provider(local);
    }
    builder.build().await
}
