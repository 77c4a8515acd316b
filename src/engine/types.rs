//! Operation inputs and reports shared by both backends.
//!
//! Field names on the wire follow the engine API (PascalCase reports,
//! lowercase query keys).

use crate::error::{Error, Result};
use crate::protocol::{QueryParams, ToParams};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

// =============================================================================
// Health Check
// =============================================================================

/// Health check options. Currently carries nothing; kept for API stability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheckOptions {}

/// Outcome class of a health check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthCheckStatus {
    /// Check passed.
    Healthy,
    /// Check ran and failed.
    Unhealthy,
    /// Container is inside its start period.
    Starting,
    /// Container is not running.
    Stopped,
    /// Container does not exist.
    ContainerNotFound,
    /// Container has no health check configured.
    NotDefined,
    /// Check could not be executed.
    InternalError,
}

impl HealthCheckStatus {
    /// Returns the wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Starting => "starting",
            Self::Stopped => "stopped",
            Self::ContainerNotFound => "not found",
            Self::NotDefined => "not defined",
            Self::InternalError => "internal error",
        }
    }
}

impl std::fmt::Display for HealthCheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResults {
    /// Status string (`healthy`, `unhealthy`, `starting`).
    #[serde(rename = "Status")]
    pub status: String,
}

impl HealthCheckResults {
    /// Builds a report from a status.
    pub fn from_status(status: HealthCheckStatus) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

// =============================================================================
// Auto-Update
// =============================================================================

/// Auto-update options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoUpdateOptions {
    /// Registry auth file.
    pub authfile: Option<PathBuf>,
    /// Only report what would be updated.
    pub dry_run: bool,
    /// Roll back units whose restart fails.
    pub rollback: bool,
    /// Verify registry TLS (`None` uses the registry default).
    pub tls_verify: Option<bool>,
}

impl ToParams for AutoUpdateOptions {
    /// The auth file travels as the registry auth header.
    fn to_params(&self) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        params
            .set("dryRun", self.dry_run)
            .set("rollback", self.rollback)
            .set_opt("tlsVerify", self.tls_verify);
        Ok(params)
    }
}

/// Per-unit auto-update outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    /// Image was updated and the unit restarted.
    True,
    /// Image is current.
    False,
    /// An update is available (dry run).
    Pending,
    /// Update failed.
    Failed,
    /// Update failed and the previous image was restored.
    #[serde(rename = "rolled back")]
    RolledBack,
}

/// One auto-updated unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutoUpdateReport {
    /// Container ID.
    #[serde(rename = "ContainerID")]
    pub container_id: String,
    /// Container name.
    pub container_name: String,
    /// Image reference.
    pub image_name: String,
    /// Update policy (`registry`, `local`).
    pub policy: String,
    /// Service unit owning the container.
    pub systemd_unit: String,
    /// Outcome.
    pub updated: UpdateStatus,
}

/// Reports for units that were processed plus errors for those that failed.
pub type AutoUpdateOutcome = (Vec<AutoUpdateReport>, Vec<crate::error::Error>);

// =============================================================================
// Events
// =============================================================================

/// Event subscription options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsOptions {
    /// `key=value` filters; repeated keys are OR-ed.
    pub filters: Vec<String>,
    /// Only events at or after this time.
    pub since: Option<String>,
    /// Only events up to this time.
    pub until: Option<String>,
    /// Keep the subscription open for new events.
    pub stream: bool,
}

impl Default for EventsOptions {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            since: None,
            until: None,
            stream: true,
        }
    }
}

impl EventsOptions {
    /// Groups `key=value` filters by key. Entries without `=` are dropped.
    pub fn filter_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for filter in &self.filters {
            if let Some((key, value)) = filter.split_once('=') {
                map.entry(key.to_string()).or_default().push(value.to_string());
            }
        }
        map
    }
}

impl ToParams for EventsOptions {
    fn to_params(&self) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        let filters = self.filter_map();
        if !filters.is_empty() {
            params.set("filters", serde_json::to_string(&filters)?);
        }
        params
            .set_opt("since", self.since.as_deref())
            .set_opt("until", self.until.as_deref())
            .set("stream", self.stream);
        Ok(params)
    }
}

/// Entity that produced an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventActor {
    /// Entity ID.
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Entity attributes (`name`, `image`, ...).
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, String>,
}

/// One engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Entity type (`container`, `image`, `network`, ...).
    #[serde(rename = "Type")]
    pub kind: String,
    /// Action (`create`, `start`, `health_status`, ...).
    #[serde(rename = "Action")]
    pub action: String,
    /// Producing entity.
    #[serde(rename = "Actor", default)]
    pub actor: EventActor,
    /// Unix seconds.
    #[serde(rename = "time", default)]
    pub time: i64,
    /// Unix nanoseconds.
    #[serde(rename = "timeNano", default)]
    pub time_nano: i64,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn now(kind: impl Into<String>, action: impl Into<String>, id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            kind: kind.into(),
            action: action.into(),
            actor: EventActor {
                id: id.into(),
                attributes: HashMap::new(),
            },
            time: now.timestamp(),
            time_nano: now.timestamp_nanos_opt().unwrap_or_default(),
        }
    }
}

/// How an event subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventsEnd {
    /// The caller's cancellation fired or the consumer went away.
    Cancelled,
    /// The source closed the stream on its own.
    StreamClosed,
}

// =============================================================================
// Networks
// =============================================================================

/// Network update options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkUpdateOptions {
    /// DNS servers to add.
    #[serde(rename = "adddnsservers", default)]
    pub add_dns_servers: Vec<String>,
    /// DNS servers to remove.
    #[serde(rename = "removednsservers", default)]
    pub remove_dns_servers: Vec<String>,
}

// =============================================================================
// Artifacts
// =============================================================================

/// Artifact pull options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPullOptions {
    /// Registry auth file.
    pub authfile: Option<PathBuf>,
    /// Registry username.
    pub username: Option<String>,
    /// Registry password.
    pub password: Option<String>,
    /// Suppress progress output on the service side.
    pub quiet: Option<bool>,
    /// Retry count.
    pub retry: Option<u32>,
    /// Delay between retries (duration string, e.g. `2s`).
    pub retry_delay: Option<String>,
    /// Verify registry TLS.
    pub tls_verify: Option<bool>,
}

impl ToParams for ArtifactPullOptions {
    /// Credentials travel in the auth header, never in the query.
    fn to_params(&self) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        params
            .set_opt("quiet", self.quiet)
            .set_opt("retry", self.retry)
            .set_opt("retryDelay", self.retry_delay.as_deref())
            .set_opt("tlsVerify", self.tls_verify);
        Ok(params)
    }
}

/// Result of an artifact pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPullReport {
    /// Digest of the pulled artifact.
    #[serde(rename = "ArtifactDigest", default)]
    pub artifact_digest: Option<String>,
}

// =============================================================================
// Images
// =============================================================================

/// Image untag options. Currently carries nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageUntagOptions {}

/// Splits `repo[:tag]` at the last colon that follows the last slash.
///
/// A missing tag yields `latest`. Digest references and references with an
/// empty repository or tag are rejected.
pub fn split_tag(reference: &str) -> Result<(&str, &str)> {
    let invalid = || Error::Internal(format!("invalid image tag {reference:?}"));
    if reference.contains('@') {
        return Err(invalid());
    }
    let slash = reference.rfind('/').map_or(0, |i| i + 1);
    let (repo, tag) = match reference[slash..].rfind(':') {
        Some(i) => (&reference[..slash + i], &reference[slash + i + 1..]),
        None => (reference, "latest"),
    };
    if repo.is_empty() || tag.is_empty() {
        return Err(invalid());
    }
    Ok((repo, tag))
}

// =============================================================================
// System Info
// =============================================================================

/// Host details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostInfo {
    /// CPU architecture.
    pub arch: String,
    /// Operating system.
    pub os: String,
    /// Host name.
    pub hostname: String,
    /// Kernel version.
    pub kernel: String,
    /// Whether the engine runs rootless.
    pub rootless: bool,
}

/// Storage details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreInfo {
    /// Storage driver.
    pub graph_driver_name: String,
    /// Persistent root.
    pub graph_root: String,
    /// Volatile root.
    pub run_root: String,
}

/// Version details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VersionInfo {
    /// API version.
    #[serde(rename = "APIVersion")]
    pub api_version: String,
    /// Engine version.
    pub version: String,
    /// `os/arch`.
    #[serde(rename = "OsArch")]
    pub os_arch: String,
}

/// Engine information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    /// Host section.
    pub host: HostInfo,
    /// Storage section.
    pub store: StoreInfo,
    /// Version section.
    pub version: VersionInfo,
}

// =============================================================================
// Trust
// =============================================================================

/// Options for showing trust policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowTrustOptions {
    /// Policy file.
    pub policy_path: Option<PathBuf>,
    /// Registries configuration directory.
    pub registry_path: Option<PathBuf>,
    /// Return the raw policy document.
    pub raw: bool,
}

/// One trust policy entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrustPolicyEntry {
    /// Scope name.
    pub name: String,
    /// Repository.
    pub repo_name: String,
    /// Policy type (`accept`, `reject`, `signedBy`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Transport (`docker`, ...).
    pub transport: String,
    /// Key identities.
    pub gpg_id: String,
}

impl ToParams for ShowTrustOptions {
    fn to_params(&self) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        params
            .set_opt("policypath", self.policy_path.as_ref().map(|p| p.display()))
            .set_opt("registrypath", self.registry_path.as_ref().map(|p| p.display()))
            .set("raw", self.raw);
        Ok(params)
    }
}

/// Trust policy report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowTrustReport {
    /// Raw policy document when requested.
    pub raw: Option<String>,
    /// Parsed entries.
    pub policies: Vec<TrustPolicyEntry>,
}

/// Options for changing trust policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetTrustOptions {
    /// Policy file.
    pub policy_path: Option<PathBuf>,
    /// Policy type.
    pub kind: String,
    /// Public key files for `signedBy`.
    pub pub_key_files: Vec<PathBuf>,
}

impl ToParams for SetTrustOptions {
    fn to_params(&self) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        params
            .set_opt("policypath", self.policy_path.as_ref().map(|p| p.display()))
            .set("type", &self.kind);
        for key in &self.pub_key_files {
            params.append("pubkeysfile", key.display());
        }
        Ok(params)
    }
}
