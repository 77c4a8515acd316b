//! WSL machines, driven through `wsl.exe`.

use super::{MachineConfig, MachineState, MachineStubber, StubberOutcome, VmType, remove_quietly};
use crate::constants::NAME_PREFIX;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// WSL executable.
const WSL_EXE: &str = "wsl.exe";

/// Output fragment `wsl.exe` prints for an unknown distribution.
const NOT_FOUND_MARKER: &str = "WSL_E_DISTRO_NOT_FOUND";

/// WSL machines. Each machine is a WSL distribution named
/// `magikengine-<machine>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WslStubber;

impl WslStubber {
    /// Returns the distribution name backing a machine.
    pub fn distribution_name(machine: &str) -> String {
        format!("{NAME_PREFIX}-{machine}")
    }

    async fn run(&self, machine: &str, args: &[&str]) -> Result<(bool, String)> {
        let output = Command::new(WSL_EXE)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Machine {
                name: machine.to_string(),
                reason: format!("failed to run {WSL_EXE}: {e}"),
            })?;
        let mut text = decode_wsl_output(&output.stdout);
        text.push_str(&decode_wsl_output(&output.stderr));
        Ok((output.status.success(), text))
    }
}

/// Decodes `wsl.exe` output, which is UTF-16LE when not redirected to a console.
pub(crate) fn decode_wsl_output(bytes: &[u8]) -> String {
    let looks_utf16 = bytes.len() >= 2 && bytes.len() % 2 == 0 && bytes[1] == 0;
    if looks_utf16 {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
            .trim_start_matches('\u{feff}')
            .to_string()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Returns true if `name` appears as a line in `wsl --list` output.
pub(crate) fn list_contains(output: &str, name: &str) -> bool {
    output
        .lines()
        .map(|l| l.trim().trim_matches('\0'))
        .any(|l| l.eq_ignore_ascii_case(name))
}

#[async_trait]
impl MachineStubber for WslStubber {
    fn vm_type(&self) -> VmType {
        VmType::Wsl
    }

    async fn state(&self, mc: &MachineConfig) -> Result<StubberOutcome<MachineState>> {
        let dist = Self::distribution_name(&mc.name);
        let (ok, output) = self
            .run(&mc.name, &["--list", "--running", "--quiet"])
            .await?;
        let state = if !ok {
            MachineState::Unknown
        } else if list_contains(&output, &dist) {
            MachineState::Running
        } else {
            MachineState::Stopped
        };
        debug!(machine = %mc.name, %state, "queried WSL state");
        Ok(StubberOutcome::new(state))
    }

    async fn stop(&self, mc: &MachineConfig, _force: bool) -> Result<StubberOutcome<()>> {
        // WSL has no graceful shutdown for a single distribution
        let dist = Self::distribution_name(&mc.name);
        let (ok, output) = self.run(&mc.name, &["--terminate", &dist]).await?;
        if ok {
            info!(machine = %mc.name, "WSL distribution terminated");
            return Ok(StubberOutcome::new(()));
        }
        if output.contains(NOT_FOUND_MARKER) {
            return Ok(StubberOutcome::new(())
                .with_message(format!("machine {} is not running", mc.name)));
        }
        Err(Error::Machine {
            name: mc.name.clone(),
            reason: format!("terminate failed: {}", output.trim()),
        })
    }

    async fn remove(&self, mc: &MachineConfig) -> Result<StubberOutcome<()>> {
        let dist = Self::distribution_name(&mc.name);
        let (ok, output) = self.run(&mc.name, &["--unregister", &dist]).await?;
        let mut outcome = StubberOutcome::new(());
        if !ok && !output.contains(NOT_FOUND_MARKER) {
            return Err(Error::Machine {
                name: mc.name.clone(),
                reason: format!("unregister failed: {}", output.trim()),
            });
        }
        if let Some(path) = &mc.config_path {
            remove_quietly(path, &mut outcome.messages);
        }
        info!(machine = %mc.name, "WSL distribution removed");
        Ok(outcome)
    }
}
