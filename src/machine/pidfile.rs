//! Stubbers for hypervisors that run as one host process per VM.
//!
//! QEMU, libkrun and vfkit (Apple Hypervisor) each record the hypervisor
//! pid in a pid file. A pid counts as the VM only while `kill(pid, 0)`
//! succeeds and the process executable matches the hypervisor binary; any
//! other process behind a stale pid file is left alone. Stop is SIGTERM
//! with a grace period, then SIGKILL.

use super::{MachineConfig, MachineState, MachineStubber, StubberOutcome, VmType, remove_quietly};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hypervisor process identity and stop timing.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(unix), allow(dead_code))]
struct Hypervisor {
    /// Substrings of the executable name (`qemu-system-aarch64`, `krunkit`).
    binaries: &'static [&'static str],
    /// Grace period before escalating to SIGKILL.
    grace: Duration,
}

const QEMU: Hypervisor = Hypervisor {
    binaries: &["qemu"],
    grace: Duration::from_secs(10),
};

/// No guest ACPI handling, exits quickly.
const KRUN: Hypervisor = Hypervisor {
    binaries: &["krun"],
    grace: Duration::from_secs(5),
};

const VFKIT: Hypervisor = Hypervisor {
    binaries: &["vfkit"],
    grace: Duration::from_secs(15),
};

/// Pid of the running hypervisor, if the pid file names one.
#[cfg(unix)]
fn running_pid(mc: &MachineConfig, hv: &Hypervisor) -> Option<i32> {
    use super::process::{is_hypervisor, read_pid};

    let pid = read_pid(&mc.pid_file.as_ref()?.path)?;
    if is_hypervisor(pid, hv.binaries) {
        Some(pid)
    } else {
        debug!(machine = %mc.name, pid, "pid file does not name a hypervisor process");
        None
    }
}

#[cfg(unix)]
async fn pid_state(mc: &MachineConfig, hv: Hypervisor) -> Result<StubberOutcome<MachineState>> {
    if mc.pid_file.is_none() {
        return Ok(StubberOutcome::new(MachineState::Stopped)
            .with_message(format!("machine {} has no pid file", mc.name)));
    }
    let state = match running_pid(mc, &hv) {
        Some(_) => MachineState::Running,
        None => MachineState::Stopped,
    };
    debug!(machine = %mc.name, vm_type = %mc.vm_type, %state, "queried machine state");
    Ok(StubberOutcome::new(state))
}

#[cfg(unix)]
async fn pid_stop(mc: &MachineConfig, force: bool, hv: Hypervisor) -> Result<StubberOutcome<()>> {
    use super::process::{signal, wait_for_exit};

    let grace = hv.grace;
    let mut outcome = StubberOutcome::new(());
    let Some(pid) = running_pid(mc, &hv) else {
        if let Some(pid_file) = &mc.pid_file {
            remove_quietly(&pid_file.path, &mut outcome.messages);
        }
        return Ok(outcome.with_message(format!("machine {} is not running", mc.name)));
    };

    let machine_err = |e: std::io::Error| Error::Machine {
        name: mc.name.clone(),
        reason: format!("failed to signal pid {pid}: {e}"),
    };

    if force {
        signal(pid, libc::SIGKILL).map_err(machine_err)?;
    } else {
        signal(pid, libc::SIGTERM).map_err(machine_err)?;
        if !wait_for_exit(pid, grace).await {
            warn!(machine = %mc.name, pid, "graceful stop timed out, killing");
            outcome
                .messages
                .push(format!("machine {} did not stop within {grace:?}, killed", mc.name));
            signal(pid, libc::SIGKILL).map_err(machine_err)?;
        }
    }
    wait_for_exit(pid, grace).await;

    if let Some(pid_file) = &mc.pid_file {
        remove_quietly(&pid_file.path, &mut outcome.messages);
    }
    info!(machine = %mc.name, "machine stopped");
    Ok(outcome)
}

#[cfg(unix)]
async fn pid_remove(mc: &MachineConfig, hv: Hypervisor) -> Result<StubberOutcome<()>> {
    let mut outcome = pid_stop(mc, true, hv).await?;
    // "not running" is expected here
    outcome.messages.retain(|m| !m.ends_with("is not running"));

    let files = [
        mc.pid_file.as_ref().map(|f| f.path.clone()),
        mc.api_socket.as_ref().map(|f| f.path.clone()),
        mc.config_path.clone(),
    ];
    for path in files.into_iter().flatten() {
        remove_quietly(&path, &mut outcome.messages);
    }
    info!(machine = %mc.name, "machine removed");
    Ok(outcome)
}

#[cfg(not(unix))]
async fn pid_state(mc: &MachineConfig, _hv: Hypervisor) -> Result<StubberOutcome<MachineState>> {
    Err(Error::ProviderUnavailable(mc.vm_type.to_string()))
}

#[cfg(not(unix))]
async fn pid_stop(
    mc: &MachineConfig,
    _force: bool,
    _hv: Hypervisor,
) -> Result<StubberOutcome<()>> {
    Err(Error::ProviderUnavailable(mc.vm_type.to_string()))
}

#[cfg(not(unix))]
async fn pid_remove(mc: &MachineConfig, _hv: Hypervisor) -> Result<StubberOutcome<()>> {
    Err(Error::ProviderUnavailable(mc.vm_type.to_string()))
}

/// QEMU machines.
#[derive(Debug, Clone, Copy, Default)]
pub struct QemuStubber;

#[async_trait]
impl MachineStubber for QemuStubber {
    fn vm_type(&self) -> VmType {
        VmType::Qemu
    }

    async fn state(&self, mc: &MachineConfig) -> Result<StubberOutcome<MachineState>> {
        pid_state(mc, QEMU).await
    }

    async fn stop(&self, mc: &MachineConfig, force: bool) -> Result<StubberOutcome<()>> {
        pid_stop(mc, force, QEMU).await
    }

    async fn remove(&self, mc: &MachineConfig) -> Result<StubberOutcome<()>> {
        pid_remove(mc, QEMU).await
    }
}

/// libkrun machines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibKrunStubber;

#[async_trait]
impl MachineStubber for LibKrunStubber {
    fn vm_type(&self) -> VmType {
        VmType::LibKrun
    }

    async fn state(&self, mc: &MachineConfig) -> Result<StubberOutcome<MachineState>> {
        pid_state(mc, KRUN).await
    }

    async fn stop(&self, mc: &MachineConfig, force: bool) -> Result<StubberOutcome<()>> {
        pid_stop(mc, force, KRUN).await
    }

    async fn remove(&self, mc: &MachineConfig) -> Result<StubberOutcome<()>> {
        pid_remove(mc, KRUN).await
    }
}

/// Apple Hypervisor machines driven by vfkit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppleHvStubber;

#[async_trait]
impl MachineStubber for AppleHvStubber {
    fn vm_type(&self) -> VmType {
        VmType::AppleHv
    }

    async fn state(&self, mc: &MachineConfig) -> Result<StubberOutcome<MachineState>> {
        pid_state(mc, VFKIT).await
    }

    async fn stop(&self, mc: &MachineConfig, force: bool) -> Result<StubberOutcome<()>> {
        pid_stop(mc, force, VFKIT).await
    }

    async fn remove(&self, mc: &MachineConfig) -> Result<StubberOutcome<()>> {
        pid_remove(mc, VFKIT).await
    }
}
