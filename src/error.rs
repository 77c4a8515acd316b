//! Error types for the engine facade.
//!
//! Every error, whichever backend produced it, classifies into one
//! [`ErrorKind`]. Callers branch on the kind, never on the backend.

use std::path::PathBuf;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification shared by the Direct and Remote backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The named entity does not exist.
    NotFound,
    /// The entity exists but its state is incompatible with the request.
    Conflict,
    /// The operation has no implementation in the current mode.
    Unsupported,
    /// Connection-level failure (includes TLS, identity and VM-not-running).
    TransportFailure,
    /// Everything else.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::TransportFailure => write!(f, "transport failure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Errors that can occur in the engine facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Entity Errors
    // =========================================================================
    /// Container not found.
    #[error("no container with name or ID \"{0}\" found")]
    ContainerNotFound(String),

    /// Any other named entity not found (network, image, artifact).
    #[error("{kind} \"{name}\" not found: {message}")]
    NotFound {
        kind: String,
        name: String,
        message: String,
    },

    /// Container has no health check configured.
    #[error("container {0} has no defined healthcheck")]
    HealthCheckNotDefined(String),

    /// Container is not running.
    #[error("container {0} is not running")]
    ContainerNotRunning(String),

    /// Entity is in a state incompatible with the request.
    #[error("conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Mode Errors
    // =========================================================================
    /// Operation not implemented by the bound backend.
    ///
    /// Renders as the bare `not implemented` literal.
    #[error("not implemented")]
    Unsupported { operation: String },

    /// Configured engine mode is neither direct nor remote.
    #[error("runtime mode '{0}' is not supported")]
    UnsupportedMode(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Machine-mediated target whose VM is not running.
    #[error("machine \"{name}\" is not running (state: {state})")]
    MachineNotRunning { name: String, state: String },

    /// Machine did not provision the artifact this platform needs.
    #[error("{artifact} of machine is not set")]
    ConnectionArtifactNotSet { artifact: String },

    /// Connection URI could not be understood.
    #[error("invalid connection URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Connection could not be established or broke mid-call.
    #[error("unable to connect to engine at {uri}: {reason}")]
    Connection { uri: String, reason: String },

    /// TLS material could not be loaded or the handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Call was cancelled through its scope.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },

    // =========================================================================
    // Machine Errors
    // =========================================================================
    /// Machine configuration missing or unreadable.
    #[error("machine \"{name}\": {reason}")]
    Machine { name: String, reason: String },

    /// Hypervisor provider not available on this platform.
    #[error("machine provider '{0}' is not supported on this platform")]
    ProviderUnavailable(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Remote side answered with an unclassified failure status.
    #[error("engine returned status {status}: {message}")]
    Remote { status: u16, message: String },

    /// Registry credentials could not be resolved into a header.
    #[error("registry auth: {0}")]
    Auth(String),

    /// Configuration could not be loaded.
    #[error("invalid configuration at {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// Local runtime or storage collaborator could not be acquired.
    #[error("failed to initialize local runtime: {0}")]
    RuntimeInit(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContainerNotFound(_) | Self::NotFound { .. } => ErrorKind::NotFound,
            Self::HealthCheckNotDefined(_) | Self::ContainerNotRunning(_) | Self::Conflict(_) => {
                ErrorKind::Conflict
            }
            Self::Unsupported { .. } | Self::UnsupportedMode(_) => ErrorKind::Unsupported,
            Self::MachineNotRunning { .. }
            | Self::ConnectionArtifactNotSet { .. }
            | Self::InvalidUri { .. }
            | Self::Connection { .. }
            | Self::Tls(_)
            | Self::Cancelled
            | Self::Timeout { .. } => ErrorKind::TransportFailure,
            Self::Machine { .. }
            | Self::ProviderUnavailable(_)
            | Self::Remote { .. }
            | Self::Auth(_)
            | Self::Config { .. }
            | Self::RuntimeInit(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Creates an "unsupported in this mode" error for an operation.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Returns true if this error means the entity does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns true if the operation is not available in the bound mode.
    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::Unsupported
    }
}
