//! In-process backend.

use super::{
    ArtifactPullOptions, ArtifactPullReport, AutoUpdateOptions, AutoUpdateOutcome, ContainerEngine,
    Event, EventsEnd, EventsOptions, HealthCheckOptions, HealthCheckResults, HealthCheckStatus,
    ImageUntagOptions, NetworkUpdateOptions, SetTrustOptions, ShowTrustOptions, ShowTrustReport,
    SystemInfo,
};
use crate::config::EngineMode;
use crate::error::{Error, Result};
use crate::runtime::{AutoUpdater, LocalRuntime, Storage, TrustPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runtime and storage acquired together at construction.
#[derive(Clone)]
pub struct RuntimeHandle {
    /// Local runtime.
    pub runtime: Arc<dyn LocalRuntime>,
    /// Storage opened from the runtime's settings.
    pub store: Arc<dyn Storage>,
}

/// Backend calling local collaborators directly.
pub struct DirectEngine {
    handle: RuntimeHandle,
    updater: Arc<dyn AutoUpdater>,
    trust: Arc<dyn TrustPolicy>,
}

impl DirectEngine {
    /// Creates the backend from acquired collaborators.
    pub fn new(
        handle: RuntimeHandle,
        updater: Arc<dyn AutoUpdater>,
        trust: Arc<dyn TrustPolicy>,
    ) -> Self {
        Self {
            handle,
            updater,
            trust,
        }
    }
}

/// Maps a local health check outcome to the facade result.
fn health_result(
    name: &str,
    status: HealthCheckStatus,
    detail: Option<String>,
) -> Result<HealthCheckResults> {
    match status {
        HealthCheckStatus::ContainerNotFound => Err(Error::ContainerNotFound(name.to_string())),
        HealthCheckStatus::NotDefined => Err(Error::HealthCheckNotDefined(name.to_string())),
        HealthCheckStatus::Stopped => Err(Error::ContainerNotRunning(name.to_string())),
        HealthCheckStatus::InternalError => Err(Error::Internal(
            detail.unwrap_or_else(|| format!("health check of {name} failed")),
        )),
        HealthCheckStatus::Healthy | HealthCheckStatus::Unhealthy | HealthCheckStatus::Starting => {
            Ok(HealthCheckResults::from_status(status))
        }
    }
}

/// Forwards events from `source` to `sink` until cancellation, consumer
/// loss or source closure.
pub(crate) async fn forward_events(
    mut source: mpsc::Receiver<Event>,
    sink: &mpsc::Sender<Event>,
    cancel: &CancellationToken,
) -> EventsEnd {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return EventsEnd::Cancelled,
            event = source.recv() => event,
        };
        let Some(event) = event else {
            return EventsEnd::StreamClosed;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return EventsEnd::Cancelled,
            sent = sink.send(event) => {
                if sent.is_err() {
                    return EventsEnd::Cancelled;
                }
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for DirectEngine {
    fn mode(&self) -> EngineMode {
        EngineMode::Direct
    }

    async fn health_check_run(
        &self,
        name: &str,
        _opts: HealthCheckOptions,
    ) -> Result<HealthCheckResults> {
        let outcome = self.handle.runtime.health_check(name).await;
        debug!(container = name, status = %outcome.status, "health check ran");
        health_result(name, outcome.status, outcome.error)
    }

    async fn auto_update(&self, opts: AutoUpdateOptions) -> AutoUpdateOutcome {
        let units = match self.updater.units(&opts).await {
            Ok(units) => units,
            Err(e) => return (Vec::new(), vec![e]),
        };
        let mut reports = Vec::new();
        let mut errors = Vec::new();
        for unit in &units {
            match self.updater.update(unit, &opts).await {
                Ok(mut unit_reports) => reports.append(&mut unit_reports),
                Err(e) => {
                    warn!(unit = %unit.unit, error = %e, "auto-update failed");
                    errors.push(e);
                }
            }
        }
        info!(
            units = units.len(),
            reports = reports.len(),
            errors = errors.len(),
            "auto-update finished"
        );
        (reports, errors)
    }

    async fn events(
        &self,
        opts: EventsOptions,
        sink: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> Result<EventsEnd> {
        let source = self.handle.runtime.subscribe_events(&opts).await?;
        let end = forward_events(source, &sink, &cancel).await;
        debug!(?end, "event subscription ended");
        Ok(end)
    }

    async fn network_update(&self, name: &str, opts: NetworkUpdateOptions) -> Result<()> {
        self.handle.runtime.network_update(name, &opts).await
    }

    async fn artifact_pull(
        &self,
        name: &str,
        opts: ArtifactPullOptions,
    ) -> Result<ArtifactPullReport> {
        self.handle.runtime.artifact_pull(name, &opts).await
    }

    async fn image_untag(
        &self,
        name: &str,
        tags: &[String],
        _opts: ImageUntagOptions,
    ) -> Result<()> {
        self.handle.runtime.untag(name, tags).await
    }

    async fn info(&self) -> Result<SystemInfo> {
        self.handle.runtime.info().await
    }

    async fn show_trust(
        &self,
        images: &[String],
        opts: ShowTrustOptions,
    ) -> Result<ShowTrustReport> {
        self.trust.show(images, &opts).await
    }

    async fn set_trust(&self, scopes: &[String], opts: SetTrustOptions) -> Result<()> {
        self.trust.set(scopes, &opts).await
    }

    async fn shutdown(&self) {
        if let Err(e) = self.handle.runtime.shutdown().await {
            warn!(error = %e, "runtime shutdown failed");
        }
        if let Err(e) = self.handle.store.shutdown(false) {
            warn!(error = %e, "storage shutdown failed");
        }
    }
}
