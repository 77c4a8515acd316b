//! # Engine Constants
//!
//! Wire literals, timeouts and naming conventions shared by the Direct and
//! Remote backends. Values that appear on the wire must not change without
//! a matching change on the service side.
//!
//! ## Cross-References
//!
//! - [`crate::protocol`]: API prefix, auth header name, status codes
//! - [`crate::transport`]: URI schemes, pipe prefix, timeouts
//! - [`crate::machine`]: machine config layout and pipe naming

use std::time::Duration;

// =============================================================================
// API Surface
// =============================================================================

/// Version of the remote API this client speaks.
pub const API_VERSION: &str = "5.0.0";

/// Path prefix for every remote call (`/v5.0.0/libpod`).
pub fn api_prefix() -> String {
    format!("/v{API_VERSION}/libpod")
}

/// Header carrying base64url-encoded registry credentials.
pub const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Placeholder host used in the HTTP `Host` header for socket and pipe transports.
pub const LOCAL_HOST: &str = "d";

/// Maximum accepted size of a buffered (non-streaming) response body (32 MiB).
///
/// Streaming responses (events) are framed per line and bounded by
/// [`MAX_EVENT_LINE_LEN`] instead.
pub const MAX_RESPONSE_BODY: usize = 32 * 1024 * 1024;

/// Maximum length of a single NDJSON event line (1 MiB).
pub const MAX_EVENT_LINE_LEN: usize = 1024 * 1024;

/// Capacity of the channel between the event stream reader and the caller.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Transport
// =============================================================================

/// URI scheme for unix domain sockets.
pub const UNIX_SCHEME: &str = "unix";

/// URI scheme for Windows named pipes.
pub const NPIPE_SCHEME: &str = "npipe";

/// URI scheme for plain or TLS-wrapped TCP.
pub const TCP_SCHEME: &str = "tcp";

/// URI scheme for SSH tunnels.
pub const SSH_SCHEME: &str = "ssh";

/// Prefix of every named pipe path.
pub const PIPE_PATH_PREFIX: &str = r"\\.\pipe\";

/// Prefix applied to engine-owned pipe and socket names.
pub const NAME_PREFIX: &str = "magikengine";

/// Default request timeout for buffered calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for establishing a connection (dial + TLS handshake).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Configuration
// =============================================================================

/// Directory name under the user config dir.
pub const CONFIG_DIR_NAME: &str = "magikengine";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "engine.yaml";

/// Environment override for the engine mode.
pub const ENV_MODE: &str = "MAGIKENGINE_MODE";

/// Environment override for the connection URI.
pub const ENV_HOST: &str = "CONTAINER_HOST";

/// Environment override for the identity file.
pub const ENV_IDENTITY: &str = "CONTAINER_SSHKEY";

/// Environment override for the TLS client certificate.
pub const ENV_TLS_CERT: &str = "CONTAINER_TLS_CERT";

/// Environment override for the TLS client key.
pub const ENV_TLS_KEY: &str = "CONTAINER_TLS_KEY";

/// Environment override for the TLS CA bundle.
pub const ENV_TLS_CA: &str = "CONTAINER_TLS_CA";

/// Environment override selecting a machine by name (implies machine mode).
pub const ENV_MACHINE: &str = "MAGIKENGINE_MACHINE";

/// Environment override for the machine provider.
pub const ENV_MACHINE_PROVIDER: &str = "MAGIKENGINE_MACHINE_PROVIDER";

/// Environment variable holding the log filter for the binary.
pub const ENV_LOG: &str = "MAGIKENGINE_LOG";

/// Socket file name under the runtime directory.
pub const SOCKET_FILE_NAME: &str = "magikengine.sock";

/// Machine configuration subdirectory under the user config dir.
pub const MACHINE_DIR_NAME: &str = "machine";
