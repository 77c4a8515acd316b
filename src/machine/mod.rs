//! # Machine Lifecycle
//!
//! A machine-mediated connection reaches the engine through an
//! auto-provisioned VM. Before such a connection is negotiated the VM's
//! state is queried through a [`MachineStubber`], one implementation per
//! hypervisor family:
//!
//! | VmType    | Stubber           | State source              |
//! |-----------|-------------------|---------------------------|
//! | `qemu`    | `QemuStubber`     | pid file + `kill(pid, 0)` |
//! | `libkrun` | `LibKrunStubber`  | pid file + `kill(pid, 0)` |
//! | `applehv` | `AppleHvStubber`  | vfkit pid file            |
//! | `wsl`     | `WslStubber`      | `wsl.exe --list --running`|
//!
//! Stubbers never start a VM. Connection negotiation fails with
//! `MachineNotRunning` instead.

mod pidfile;
mod provider;
#[cfg(unix)]
mod process;
mod wsl;

pub use pidfile::{AppleHvStubber, LibKrunStubber, QemuStubber};
pub use provider::{ClientInfo, MachineProvider, PlatformProvider, client_info, stubber_for};
pub use wsl::WslStubber;

use crate::constants::{NAME_PREFIX, PIPE_PATH_PREFIX};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Machine State
// =============================================================================

/// Observed VM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    /// VM is up and its endpoint is reachable.
    Running,
    /// VM is booting.
    Starting,
    /// VM is not running.
    Stopped,
    /// State could not be determined.
    Unknown,
}

impl MachineState {
    /// Returns true if connections may be attempted.
    pub fn is_running(&self) -> bool {
        *self == Self::Running
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Starting => write!(f, "starting"),
            Self::Stopped => write!(f, "stopped"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Hypervisor Variants
// =============================================================================

/// Hypervisor family backing a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmType {
    Qemu,
    LibKrun,
    AppleHv,
    Wsl,
}

impl VmType {
    /// Parses a provider name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qemu" => Some(Self::Qemu),
            "libkrun" | "krun" => Some(Self::LibKrun),
            "applehv" | "vfkit" => Some(Self::AppleHv),
            "wsl" => Some(Self::Wsl),
            _ => None,
        }
    }
}

impl std::fmt::Display for VmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Qemu => write!(f, "qemu"),
            Self::LibKrun => write!(f, "libkrun"),
            Self::AppleHv => write!(f, "applehv"),
            Self::Wsl => write!(f, "wsl"),
        }
    }
}

// =============================================================================
// Machine Config
// =============================================================================

/// A file (socket, pipe or pid file) provisioned for a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmFile {
    /// Absolute path or pipe name.
    pub path: PathBuf,
}

impl VmFile {
    /// Creates a VM file entry.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the named pipe entry for a machine.
    pub fn pipe_for(machine: &str) -> Self {
        Self::new(format!("{PIPE_PATH_PREFIX}{NAME_PREFIX}-{machine}"))
    }
}

/// Persisted description of a provisioned machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfig {
    /// Machine name.
    pub name: String,
    /// Hypervisor family.
    pub vm_type: VmType,
    /// Pid file of the hypervisor process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<VmFile>,
    /// Forwarded API socket (unix platforms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_socket: Option<VmFile>,
    /// Forwarded API pipe (Windows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_pipe: Option<VmFile>,
    /// Path this config was loaded from.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl MachineConfig {
    /// Creates a config with no provisioned artifacts.
    pub fn new(name: impl Into<String>, vm_type: VmType) -> Self {
        Self {
            name: name.into(),
            vm_type,
            pid_file: None,
            api_socket: None,
            api_pipe: None,
            config_path: None,
        }
    }

    /// Returns the config file path for a machine in a directory.
    pub fn path_in(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.json"))
    }

    /// Loads `<dir>/<name>.json`.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let path = Self::path_in(dir, name);
        let data = std::fs::read(&path).map_err(|e| Error::Machine {
            name: name.to_string(),
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let mut config: Self = serde_json::from_slice(&data).map_err(|e| Error::Machine {
            name: name.to_string(),
            reason: format!("invalid config {}: {e}", path.display()),
        })?;
        config.config_path = Some(path);
        Ok(config)
    }

    /// Writes the config to `<dir>/<name>.json`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_in(dir, &self.name);
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, data)?;
        Ok(path)
    }
}

// =============================================================================
// Stubber Capability
// =============================================================================

/// Primary result plus non-fatal messages collected on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubberOutcome<T> {
    /// Primary result.
    pub value: T,
    /// Non-fatal cleanup/diagnostic messages.
    pub messages: Vec<String>,
}

impl<T> StubberOutcome<T> {
    /// Creates an outcome with no messages.
    pub fn new(value: T) -> Self {
        Self {
            value,
            messages: Vec::new(),
        }
    }

    /// Appends a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }
}

/// Lifecycle capabilities of one hypervisor family.
#[async_trait]
pub trait MachineStubber: Send + Sync {
    /// Returns the hypervisor family this stubber drives.
    fn vm_type(&self) -> VmType;

    /// Queries the VM's current state.
    async fn state(&self, mc: &MachineConfig) -> Result<StubberOutcome<MachineState>>;

    /// Stops the VM. `force` skips the graceful phase.
    async fn stop(&self, mc: &MachineConfig, force: bool) -> Result<StubberOutcome<()>>;

    /// Removes the VM and its files. Removing an absent VM succeeds.
    async fn remove(&self, mc: &MachineConfig) -> Result<StubberOutcome<()>>;
}

/// Removes a file, tolerating its absence. Other failures become messages.
pub(crate) fn remove_quietly(path: &Path, messages: &mut Vec<String>) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => messages.push(format!("could not remove {}: {e}", path.display())),
    }
}
