//! Engine configuration.
//!
//! Configuration is read once at process start from built-in defaults, an
//! optional YAML file and environment overrides, in that order. The result
//! is passed explicitly into facade construction.

use crate::connection::{ConnectionDescriptor, TlsMaterial};
use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_REQUEST_TIMEOUT, ENV_HOST, ENV_IDENTITY,
    ENV_MACHINE, ENV_MODE, ENV_TLS_CA, ENV_TLS_CERT, ENV_TLS_KEY, MACHINE_DIR_NAME,
    SOCKET_FILE_NAME,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Which backend realizes the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// In-process calls against local runtime and storage.
    Direct,
    /// Calls over a negotiated connection.
    Remote,
}

impl EngineMode {
    /// Parses a configured mode string.
    ///
    /// Returns `None` for anything outside the known aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "abi" | "local" => Some(Self::Direct),
            "remote" | "tunnel" => Some(Self::Remote),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Local runtime settings used in Direct mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Persistent storage root.
    pub root: Option<PathBuf>,
    /// Volatile state root.
    pub run_root: Option<PathBuf>,
    /// Storage driver name (e.g. `overlay`).
    pub storage_driver: Option<String>,
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Raw mode string; validated at facade construction.
    pub mode: String,
    /// Connection URI for Remote mode.
    pub uri: Option<String>,
    /// Identity credential path.
    pub identity: Option<PathBuf>,
    /// TLS client certificate.
    pub tls_cert_file: Option<PathBuf>,
    /// TLS client key.
    pub tls_key_file: Option<PathBuf>,
    /// TLS CA bundle.
    pub tls_ca_file: Option<PathBuf>,
    /// Target is reached through an auto-managed VM.
    pub machine_mode: bool,
    /// Machine name (machine mode only).
    pub machine_name: Option<String>,
    /// Directory holding machine configs.
    pub machine_dir: Option<PathBuf>,
    /// Direct-mode runtime settings.
    pub runtime: RuntimeConfig,
    /// Per-call timeout in seconds for buffered remote calls.
    pub request_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Direct.to_string(),
            uri: None,
            identity: None,
            tls_cert_file: None,
            tls_key_file: None,
            tls_ca_file: None,
            machine_mode: false,
            machine_name: None,
            machine_dir: None,
            runtime: RuntimeConfig::default(),
            request_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Creates a Remote-mode config for a URI.
    pub fn remote(uri: impl Into<String>) -> Self {
        Self {
            mode: EngineMode::Remote.to_string(),
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Creates a Direct-mode config.
    pub fn direct(runtime: RuntimeConfig) -> Self {
        Self {
            mode: EngineMode::Direct.to_string(),
            runtime,
            ..Self::default()
        }
    }

    /// Parses the mode string.
    pub fn engine_mode(&self) -> Result<EngineMode> {
        EngineMode::parse(&self.mode).ok_or_else(|| Error::UnsupportedMode(self.mode.clone()))
    }

    /// Returns the per-call timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Returns the machine directory, defaulting under the user config dir.
    pub fn machine_dir(&self) -> PathBuf {
        self.machine_dir
            .clone()
            .unwrap_or_else(|| config_dir().join(MACHINE_DIR_NAME))
    }

    /// Builds the connection descriptor for Remote mode.
    ///
    /// Without a configured URI the local runtime socket is used.
    pub fn connection_descriptor(&self) -> ConnectionDescriptor {
        let uri = self.uri.clone().unwrap_or_else(default_uri);
        ConnectionDescriptor {
            uri,
            identity: self.identity.clone(),
            tls: TlsMaterial {
                cert_file: self.tls_cert_file.clone(),
                key_file: self.tls_key_file.clone(),
                ca_file: self.tls_ca_file.clone(),
            },
            machine: if self.machine_mode {
                Some(self.machine_name.clone().unwrap_or_else(|| "default".into()))
            } else {
                None
            },
        }
    }

    /// Applies environment overrides through a lookup function.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(mode) = get(ENV_MODE) {
            self.mode = mode;
        }
        if let Some(uri) = get(ENV_HOST) {
            self.uri = Some(uri);
            if EngineMode::parse(&self.mode) == Some(EngineMode::Direct) && get(ENV_MODE).is_none()
            {
                self.mode = EngineMode::Remote.to_string();
            }
        }
        if let Some(identity) = get(ENV_IDENTITY) {
            self.identity = Some(PathBuf::from(identity));
        }
        if let Some(cert) = get(ENV_TLS_CERT) {
            self.tls_cert_file = Some(PathBuf::from(cert));
        }
        if let Some(key) = get(ENV_TLS_KEY) {
            self.tls_key_file = Some(PathBuf::from(key));
        }
        if let Some(ca) = get(ENV_TLS_CA) {
            self.tls_ca_file = Some(PathBuf::from(ca));
        }
        if let Some(machine) = get(ENV_MACHINE) {
            self.machine_mode = true;
            self.machine_name = Some(machine);
        }
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }
}

/// Returns the user config directory for the engine.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(CONFIG_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(CONFIG_DIR_NAME))
}

/// Returns the default config file path.
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Returns the default connection URI (local runtime socket).
pub fn default_uri() -> String {
    #[cfg(windows)]
    {
        format!("npipe:////./pipe/{}", crate::constants::NAME_PREFIX)
    }

    #[cfg(not(windows))]
    {
        let socket = crate::platform::runtime_dir()
            .join(crate::constants::NAME_PREFIX)
            .join(SOCKET_FILE_NAME);
        format!("unix://{}", socket.display())
    }
}

/// Loads a config file; a missing file yields `None`.
pub fn load_file(path: &Path) -> Result<Option<EngineConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let config = serde_yaml::from_str(&contents).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!("loaded engine config from {}", path.display());
    Ok(Some(config))
}

/// Loads configuration: defaults, then `path` (or the default file), then env.
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    let default_path = config_path();
    let path = path.unwrap_or(&default_path);
    let mut config = load_file(path)?.unwrap_or_default();
    config.apply_env();
    Ok(config)
}
