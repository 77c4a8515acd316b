//! Hypervisor provider lookup.
//!
//! Maps the platform (or an explicit override) to the [`MachineStubber`]
//! for its hypervisor family. The lookup is passed into engine construction
//! as a [`MachineProvider`] instead of living in process-wide state.

use super::{
    AppleHvStubber, LibKrunStubber, MachineConfig, MachineStubber, QemuStubber, VmType,
    WslStubber,
};
use crate::constants::ENV_MACHINE_PROVIDER;
use crate::error::{Error, Result};
use crate::platform::{Os, Platform};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Returns the stubber for a hypervisor family.
pub fn stubber_for(vm_type: VmType) -> Arc<dyn MachineStubber> {
    match vm_type {
        VmType::Qemu => Arc::new(QemuStubber),
        VmType::LibKrun => Arc::new(LibKrunStubber),
        VmType::AppleHv => Arc::new(AppleHvStubber),
        VmType::Wsl => Arc::new(WslStubber),
    }
}

/// Source of machine configs and their stubbers.
pub trait MachineProvider: Send + Sync {
    /// Default hypervisor family for new machines.
    fn vm_type(&self) -> VmType;

    /// Loads a machine's config.
    fn machine(&self, name: &str) -> Result<MachineConfig>;

    /// Returns the stubber driving a machine.
    fn stubber(&self, mc: &MachineConfig) -> Arc<dyn MachineStubber> {
        stubber_for(mc.vm_type)
    }
}

/// Provider backed by machine config files for the current platform.
#[derive(Debug, Clone)]
pub struct PlatformProvider {
    vm_type: VmType,
    machine_dir: PathBuf,
}

impl PlatformProvider {
    /// Creates a provider for an explicit family.
    pub fn new(vm_type: VmType, machine_dir: impl Into<PathBuf>) -> Self {
        Self {
            vm_type,
            machine_dir: machine_dir.into(),
        }
    }

    /// Detects the provider: `MAGIKENGINE_MACHINE_PROVIDER`, else the platform default.
    pub fn detect(platform: &Platform, machine_dir: impl Into<PathBuf>) -> Result<Self> {
        let vm_type = match std::env::var(ENV_MACHINE_PROVIDER).ok().filter(|v| !v.is_empty()) {
            Some(name) => VmType::parse(&name).ok_or(Error::ProviderUnavailable(name))?,
            None => default_vm_type(platform)?,
        };
        Ok(Self::new(vm_type, machine_dir))
    }
}

impl MachineProvider for PlatformProvider {
    fn vm_type(&self) -> VmType {
        self.vm_type
    }

    fn machine(&self, name: &str) -> Result<MachineConfig> {
        MachineConfig::load(&self.machine_dir, name)
    }
}

/// Returns the default hypervisor family for a platform.
pub fn default_vm_type(platform: &Platform) -> Result<VmType> {
    match platform.os {
        Os::Linux => Ok(VmType::Qemu),
        Os::Darwin => Ok(VmType::AppleHv),
        Os::Windows => Ok(VmType::Wsl),
        Os::Unknown => Err(Error::ProviderUnavailable("unknown".into())),
    }
}

/// Client-side diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// `os/arch`.
    #[serde(rename = "OS")]
    pub os_arch: String,
    /// Machine provider name.
    pub provider: String,
    /// Crate version.
    pub version: String,
}

/// Returns client diagnostics for a provider.
pub fn client_info(platform: &Platform, provider: &dyn MachineProvider) -> ClientInfo {
    ClientInfo {
        os_arch: platform.os_arch(),
        provider: provider.vm_type().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}
