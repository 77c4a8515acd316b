//! Connection descriptor for the Remote backend.

use std::path::PathBuf;

/// TLS client material. All fields optional; none set means plaintext.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    /// Client certificate (PEM).
    pub cert_file: Option<PathBuf>,
    /// Client private key (PEM).
    pub key_file: Option<PathBuf>,
    /// CA bundle used to verify the server (PEM).
    pub ca_file: Option<PathBuf>,
}

impl TlsMaterial {
    /// Returns true if any TLS field is set.
    pub fn is_configured(&self) -> bool {
        self.cert_file.is_some() || self.key_file.is_some() || self.ca_file.is_some()
    }
}

/// Immutable description of how to reach a remote engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Transport URI (`unix://`, `npipe://`, `tcp://`, `ssh://`).
    ///
    /// Ignored for machine-mediated targets, whose URI comes from the
    /// machine's provisioned artifacts.
    pub uri: String,
    /// Identity credential path.
    pub identity: Option<PathBuf>,
    /// TLS material.
    pub tls: TlsMaterial,
    /// Machine name when the target is behind an auto-managed VM.
    pub machine: Option<String>,
}

impl ConnectionDescriptor {
    /// Creates a descriptor for a directly reachable URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            identity: None,
            tls: TlsMaterial::default(),
            machine: None,
        }
    }

    /// Marks the target as reached through the named machine.
    #[must_use]
    pub fn with_machine(mut self, name: impl Into<String>) -> Self {
        self.machine = Some(name.into());
        self
    }

    /// Sets TLS material.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the identity credential path.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Returns true if the target is machine-mediated.
    pub fn is_machine_mediated(&self) -> bool {
        self.machine.is_some()
    }
}
