//! Platform detection.
//!
//! Determines the OS family, which decides whether machine-provisioned
//! connection artifacts are named pipes or unix sockets, and which
//! hypervisor provider is the default.

use std::path::PathBuf;

/// Detected platform information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    Unknown,
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
    Unknown,
}

/// Kind of local IPC endpoint a platform exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFamily {
    /// Windows named pipes.
    Pipe,
    /// Unix domain sockets.
    Socket,
}

impl Platform {
    /// Detects the current platform.
    pub fn detect() -> Self {
        Self {
            os: Self::detect_os(),
            arch: Self::detect_arch(),
        }
    }

    fn detect_os() -> Os {
        #[cfg(target_os = "linux")]
        return Os::Linux;

        #[cfg(target_os = "macos")]
        return Os::Darwin;

        #[cfg(target_os = "windows")]
        return Os::Windows;

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        return Os::Unknown;
    }

    fn detect_arch() -> Arch {
        #[cfg(target_arch = "x86_64")]
        return Arch::Amd64;

        #[cfg(target_arch = "aarch64")]
        return Arch::Arm64;

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        return Arch::Unknown;
    }

    /// Returns the IPC family used for machine connections on this OS.
    pub fn transport_family(&self) -> TransportFamily {
        match self.os {
            Os::Windows => TransportFamily::Pipe,
            _ => TransportFamily::Socket,
        }
    }

    /// Returns the `os/arch` string reported in client info.
    pub fn os_arch(&self) -> String {
        let os = match self.os {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
            Os::Unknown => "unknown",
        };
        let arch = match self.arch {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
            Arch::Unknown => "unknown",
        };
        format!("{os}/{arch}")
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.os_arch())
    }
}

/// Returns true if the current process runs without root privileges.
pub fn is_rootless() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() != 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Returns the directory holding runtime sockets.
///
/// - root: `/run`
/// - rootless: `$XDG_RUNTIME_DIR`, falling back to `/run/user/<uid>`
pub fn runtime_dir() -> PathBuf {
    if !is_rootless() {
        return PathBuf::from("/run");
    }

    if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    #[cfg(unix)]
    {
        // SAFETY: getuid has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}"))
    }

    #[cfg(not(unix))]
    {
        dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."))
    }
}
