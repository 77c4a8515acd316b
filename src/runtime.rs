//! Local runtime collaborators used by the Direct backend.
//!
//! The Direct backend does not implement container management itself. It
//! binds to these capabilities at construction:
//!
//! - [`LocalRuntime`]: health checks, events, networks, artifacts, images
//! - [`Storage`]: the image/layer store opened from the runtime's settings
//! - [`AutoUpdater`]: per-unit auto-update
//! - [`TrustPolicy`]: image trust policy
//!
//! A [`LocalProvider`] acquires them from a [`RuntimeConfig`]. Acquisition
//! order is runtime first, then storage; a runtime failure means storage
//! is never attempted.

use crate::config::RuntimeConfig;
use crate::engine::{
    ArtifactPullOptions, ArtifactPullReport, AutoUpdateOptions, AutoUpdateReport, Event,
    EventsOptions, HealthCheckStatus, NetworkUpdateOptions, SetTrustOptions, ShowTrustOptions,
    ShowTrustReport, SystemInfo,
};
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

// =============================================================================
// Health Check
// =============================================================================

/// What a local health check run produced.
///
/// `status` is always set. `error` is present when the status is one of the
/// failure classes (not found, not defined, stopped, internal error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckOutcome {
    /// Outcome class.
    pub status: HealthCheckStatus,
    /// Failure detail.
    pub error: Option<String>,
}

impl HealthCheckOutcome {
    /// A completed check.
    pub fn completed(status: HealthCheckStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    /// A failed check with detail.
    pub fn failed(status: HealthCheckStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            error: Some(error.into()),
        }
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Settings the runtime hands to the storage layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Persistent root.
    pub graph_root: PathBuf,
    /// Volatile root.
    pub run_root: PathBuf,
    /// Driver name.
    pub driver: String,
}

/// Image/layer store.
pub trait Storage: Send + Sync {
    /// Store settings.
    fn config(&self) -> &StorageConfig;

    /// Releases the store. Idempotent.
    fn shutdown(&self, force: bool) -> Result<()>;
}

// =============================================================================
// Runtime
// =============================================================================

/// In-process container runtime.
#[async_trait]
pub trait LocalRuntime: Send + Sync {
    /// Storage settings derived from the runtime's configuration.
    fn storage_config(&self) -> StorageConfig;

    /// Runs a container's health check.
    async fn health_check(&self, name: &str) -> HealthCheckOutcome;

    /// Subscribes to events. The channel closes when the source ends.
    async fn subscribe_events(&self, opts: &EventsOptions) -> Result<mpsc::Receiver<Event>>;

    /// Updates a network's DNS servers.
    async fn network_update(&self, name: &str, opts: &NetworkUpdateOptions) -> Result<()>;

    /// Pulls an artifact.
    async fn artifact_pull(&self, name: &str, opts: &ArtifactPullOptions)
    -> Result<ArtifactPullReport>;

    /// Removes tags from an image; empty `tags` removes all of them.
    async fn untag(&self, name: &str, tags: &[String]) -> Result<()>;

    /// Engine information.
    async fn info(&self) -> Result<SystemInfo>;

    /// Releases runtime resources. Idempotent.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Auto-Update and Trust
// =============================================================================

/// A unit eligible for auto-update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUnit {
    /// Service unit name.
    pub unit: String,
    /// Container names in the unit.
    pub containers: Vec<String>,
}

/// Auto-update collaborator.
#[async_trait]
pub trait AutoUpdater: Send + Sync {
    /// Lists units with an auto-update policy.
    async fn units(&self, opts: &AutoUpdateOptions) -> Result<Vec<UpdateUnit>>;

    /// Updates one unit, reporting each of its containers.
    async fn update(&self, unit: &UpdateUnit, opts: &AutoUpdateOptions)
    -> Result<Vec<AutoUpdateReport>>;
}

/// Image trust policy collaborator.
#[async_trait]
pub trait TrustPolicy: Send + Sync {
    /// Shows the policy for images.
    async fn show(&self, images: &[String], opts: &ShowTrustOptions) -> Result<ShowTrustReport>;

    /// Sets the policy for scopes.
    async fn set(&self, scopes: &[String], opts: &SetTrustOptions) -> Result<()>;
}

// =============================================================================
// Provider
// =============================================================================

/// Acquires local collaborators.
pub trait LocalProvider: Send + Sync {
    /// Opens the runtime.
    fn open_runtime(&self, config: &RuntimeConfig) -> Result<Arc<dyn LocalRuntime>>;

    /// Opens storage using settings derived from the runtime.
    fn open_store(&self, config: &StorageConfig) -> Result<Arc<dyn Storage>>;

    /// Auto-update collaborator bound to a runtime.
    fn auto_updater(&self, runtime: &Arc<dyn LocalRuntime>) -> Arc<dyn AutoUpdater>;

    /// Trust policy collaborator.
    fn trust_policy(&self) -> Arc<dyn TrustPolicy>;
}
