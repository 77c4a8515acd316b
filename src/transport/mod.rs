//! # Transport
//!
//! Addressing and the request/response primitive used by the Remote backend.
//!
//! ## Addressing
//!
//! | URI form                  | Endpoint                       |
//! |---------------------------|--------------------------------|
//! | `unix:///run/x.sock`      | unix domain socket             |
//! | `npipe:////./pipe/name`   | Windows named pipe `\\.\pipe\name` |
//! | `tcp://host:port`         | TCP, TLS when material is set  |
//! | `ssh://user@host/path`    | rejected (no tunnelling here)  |
//!
//! Machine-mediated connections derive their URI from the machine's
//! provisioned artifact through [`resolve_address`]: a pipe on platforms
//! that expose pipes, a socket otherwise. A missing artifact for the
//! platform's family is fatal and never substituted by the other family.
//!
//! ## Primitive
//!
//! [`Transport::do_request`] sends one request and returns the fully read
//! body. [`Transport::open_stream`] returns newline-framed chunks for
//! long-lived responses (events).

mod http;
mod tls;

pub use http::{HttpConnector, HttpTransport};
pub use tls::client_config;

use crate::connection::ConnectionDescriptor;
use crate::constants::{NPIPE_SCHEME, SSH_SCHEME, TCP_SCHEME, UNIX_SCHEME};
use crate::error::{Error, Result};
use crate::machine::VmFile;
use crate::platform::TransportFamily;
use crate::protocol::QueryParams;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use hyper::Method;

// =============================================================================
// Transport Address
// =============================================================================

/// Kind of resolved machine endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    /// Windows named pipe.
    Pipe,
    /// Unix domain socket.
    Socket,
}

/// A resolved pipe name or socket path for a machine-mediated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportAddress {
    /// Endpoint kind.
    pub kind: AddressKind,
    /// Socket path or pipe name.
    pub path: String,
}

impl TransportAddress {
    /// Returns the connection URI for this address.
    ///
    /// Pipe names have their backslashes turned into forward slashes, so
    /// `\\.\pipe\x` becomes `npipe:////./pipe/x`.
    pub fn to_uri(&self) -> String {
        match self.kind {
            AddressKind::Socket => format!("{UNIX_SCHEME}://{}", self.path),
            AddressKind::Pipe => format!("{NPIPE_SCHEME}://{}", self.path.replace('\\', "/")),
        }
    }
}

/// Resolves a machine's provisioned artifacts to an address for the
/// platform's transport family.
pub fn resolve_address(
    family: TransportFamily,
    socket: Option<&VmFile>,
    pipe: Option<&VmFile>,
) -> Result<TransportAddress> {
    match family {
        TransportFamily::Pipe => {
            let pipe = pipe.ok_or_else(|| Error::ConnectionArtifactNotSet {
                artifact: "pipe".into(),
            })?;
            Ok(TransportAddress {
                kind: AddressKind::Pipe,
                path: pipe.path.to_string_lossy().into_owned(),
            })
        }
        TransportFamily::Socket => {
            let socket = socket.ok_or_else(|| Error::ConnectionArtifactNotSet {
                artifact: "socket".into(),
            })?;
            Ok(TransportAddress {
                kind: AddressKind::Socket,
                path: socket.path.to_string_lossy().into_owned(),
            })
        }
    }
}

// =============================================================================
// Endpoint Parsing
// =============================================================================

/// A dialable endpoint parsed from a connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// Windows named pipe name (`\\.\pipe\...`).
    Pipe(String),
    /// TCP host and port.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Parses a connection URI.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;

        match scheme {
            UNIX_SCHEME => {
                if rest.is_empty() {
                    return Err(invalid("empty socket path"));
                }
                Ok(Self::Unix(PathBuf::from(rest)))
            }
            NPIPE_SCHEME => {
                let name = rest.trim_start_matches('/');
                if name.is_empty() {
                    return Err(invalid("empty pipe name"));
                }
                Ok(Self::Pipe(format!(r"\\{}", name.replace('/', "\\"))))
            }
            TCP_SCHEME => {
                let url = url::Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
                let host = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| invalid("missing host"))?;
                let port = url.port().ok_or_else(|| invalid("missing port"))?;
                Ok(Self::Tcp {
                    host: host.trim_matches(['[', ']']).to_string(),
                    port,
                })
            }
            SSH_SCHEME => Err(Error::Connection {
                uri: uri.to_string(),
                reason: "ssh tunnelling is not supported by this client".into(),
            }),
            other => Err(invalid(&format!("unsupported scheme '{other}'"))),
        }
    }

    /// Value for the HTTP `Host` header.
    pub fn host_header(&self) -> String {
        match self {
            Self::Tcp { host, port } => format!("{host}:{port}"),
            _ => crate::constants::LOCAL_HOST.to_string(),
        }
    }
}

// =============================================================================
// Request / Response
// =============================================================================

/// One request to the engine API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute path including the API prefix.
    pub path: String,
    /// Query parameters.
    pub params: QueryParams,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Bytes>,
}

impl ApiRequest {
    /// Creates a request with no parameters, headers or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: QueryParams::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Sets the query parameters.
    #[must_use]
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    pub fn with_json<T: serde::Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// Returns the origin-form target (`/path?query`).
    pub fn target(&self) -> String {
        if self.params.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.params.encode())
        }
    }
}

/// A fully read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of opening a streaming call.
#[derive(Debug)]
pub enum StreamResponse {
    /// 2xx: newline-framed chunks; the channel closes when the server ends the stream.
    Lines(mpsc::Receiver<Result<Bytes>>),
    /// Non-success status with its buffered body.
    Failed(ApiResponse),
}

// =============================================================================
// Transport Capability
// =============================================================================

/// A negotiated connection usable for request/response exchanges.
#[async_trait]
pub trait Transport: Send + Sync {
    /// URI this transport dials.
    fn uri(&self) -> &str;

    /// Sends a request and reads the whole response.
    async fn do_request(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// Sends a request whose response body is an open-ended line stream.
    async fn open_stream(&self, request: ApiRequest) -> Result<StreamResponse>;
}

/// Establishes transports from a URI plus TLS/identity material.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `uri` using the descriptor's credentials.
    async fn connect(
        &self,
        uri: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn Transport>>;
}
