//! HTTP/1.1 transport over unix sockets, named pipes and TCP.
//!
//! Each request dials a fresh connection, performs one exchange and drops
//! the connection. Nothing is pooled, so a cancelled call never leaves a
//! half-read response behind for the next caller.

use super::{ApiRequest, ApiResponse, Connector, Endpoint, StreamResponse, Transport};
use crate::connection::ConnectionDescriptor;
use crate::constants::{
    CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, EVENT_CHANNEL_CAPACITY, MAX_EVENT_LINE_LEN,
    MAX_RESPONSE_BODY, api_prefix,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Any bidirectional byte stream a connection can run over.
trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// HTTP transport bound to one endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    uri: String,
    endpoint: Endpoint,
    tls: Option<Arc<rustls::ClientConfig>>,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a plaintext transport for a URI.
    pub fn new(uri: &str) -> Result<Self> {
        Ok(Self {
            uri: uri.to_string(),
            endpoint: Endpoint::parse(uri)?,
            tls: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Sets the TLS client config (TCP endpoints only).
    #[must_use]
    pub fn with_tls(mut self, tls: Option<Arc<rustls::ClientConfig>>) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the timeout for buffered requests.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the parsed endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn connection_error(&self, reason: impl std::fmt::Display) -> Error {
        Error::Connection {
            uri: self.uri.clone(),
            reason: reason.to_string(),
        }
    }

    async fn dial(&self) -> Result<Box<dyn Io>> {
        let io: Box<dyn Io> = match &self.endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => Box::new(
                tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|e| self.connection_error(e))?,
            ),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(
                    self.connection_error("unix sockets are not available on this platform")
                );
            }
            #[cfg(windows)]
            Endpoint::Pipe(name) => Box::new(
                tokio::net::windows::named_pipe::ClientOptions::new()
                    .open(name)
                    .map_err(|e| self.connection_error(e))?,
            ),
            #[cfg(not(windows))]
            Endpoint::Pipe(_) => {
                return Err(self.connection_error("named pipes are only available on Windows"));
            }
            Endpoint::Tcp { host, port } => {
                let stream = tokio::net::TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(|e| self.connection_error(e))?;
                match &self.tls {
                    Some(config) => {
                        let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                            .map_err(|e| Error::Tls(format!("invalid server name {host}: {e}")))?;
                        let tls = tokio_rustls::TlsConnector::from(Arc::clone(config))
                            .connect(server_name, stream)
                            .await
                            .map_err(|e| Error::Tls(format!("handshake with {host} failed: {e}")))?;
                        Box::new(tls)
                    }
                    None => Box::new(stream),
                }
            }
        };
        Ok(io)
    }

    /// Dials, handshakes and sends the request, returning the response head.
    async fn send(&self, request: &ApiRequest) -> Result<Response<Incoming>> {
        let io = timeout(CONNECT_TIMEOUT, self.dial())
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("connect to {}", self.uri),
                duration: CONNECT_TIMEOUT,
            })??;

        let (mut sender, conn) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(io))
            .await
            .map_err(|e| self.connection_error(e))?;
        let uri = self.uri.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(%uri, error = %e, "connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(request.target())
            .header(HOST, self.endpoint.host_header());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let http_request = builder
            .body(Full::new(request.body.clone().unwrap_or_default()))
            .map_err(|e| Error::Internal(format!("invalid request {}: {e}", request.path)))?;

        debug!(method = %request.method, path = %request.path, "sending request");
        sender
            .send_request(http_request)
            .await
            .map_err(|e| self.connection_error(e))
    }

    async fn exchange(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self.send(&request).await?;
        let status = response.status().as_u16();
        let body = Limited::new(response.into_body(), MAX_RESPONSE_BODY)
            .collect()
            .await
            .map_err(|e| self.connection_error(format!("failed to read response body: {e}")))?
            .to_bytes();
        debug!(path = %request.path, status, len = body.len(), "received response");
        Ok(ApiResponse::new(status, body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn do_request(&self, request: ApiRequest) -> Result<ApiResponse> {
        let operation = format!("{} {}", request.method, request.path);
        timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| Error::Timeout {
                operation,
                duration: self.timeout,
            })?
    }

    async fn open_stream(&self, request: ApiRequest) -> Result<StreamResponse> {
        let operation = format!("{} {}", request.method, request.path);
        let response = timeout(self.timeout, self.send(&request))
            .await
            .map_err(|_| Error::Timeout {
                operation,
                duration: self.timeout,
            })??;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = Limited::new(response.into_body(), MAX_RESPONSE_BODY)
                .collect()
                .await
                .map(|c| c.to_bytes())
                .unwrap_or_default();
            return Ok(StreamResponse::Failed(ApiResponse::new(status, body)));
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(pump_lines(response.into_body(), tx));
        Ok(StreamResponse::Lines(rx))
    }
}

/// Splits a streaming body into newline-terminated chunks.
///
/// Ends when the server closes the body or the receiver is dropped;
/// dropping the body here also drops the connection.
async fn pump_lines(mut body: Incoming, tx: mpsc::Sender<Result<Bytes>>) {
    let mut buf = BytesMut::new();
    loop {
        let frame = match body.frame().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(Error::Connection {
                        uri: String::new(),
                        reason: format!("stream read failed: {e}"),
                    }))
                    .await;
                return;
            }
            None => break,
        };
        let Ok(data) = frame.into_data() else {
            continue;
        };
        buf.extend_from_slice(&data);

        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let line = buf.split_to(pos + 1);
            if let Some(line) = trim_line(&line)
                && tx.send(Ok(line)).await.is_err()
            {
                return;
            }
        }
        if buf.len() > MAX_EVENT_LINE_LEN {
            warn!(len = buf.len(), "event line exceeds limit, closing stream");
            let _ = tx
                .send(Err(Error::Internal(format!(
                    "stream line exceeds {MAX_EVENT_LINE_LEN} bytes"
                ))))
                .await;
            return;
        }
    }
    if let Some(line) = trim_line(&buf) {
        let _ = tx.send(Ok(line)).await;
    }
}

fn trim_line(line: &[u8]) -> Option<Bytes> {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\n' | b'\r' | b' '))
        .map(|i| i + 1)?;
    Some(Bytes::copy_from_slice(&line[..end]))
}

// =============================================================================
// Connector
// =============================================================================

/// Connector producing [`HttpTransport`]s.
///
/// Connecting verifies the service with a ping, so negotiation failures
/// surface at facade construction.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpConnector {
    /// Creates a connector with the default request timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the request timeout of produced transports.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        uri: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn Transport>> {
        let mut transport = HttpTransport::new(uri)?.with_timeout(self.timeout);
        if matches!(transport.endpoint(), Endpoint::Tcp { .. }) {
            transport = transport.with_tls(super::client_config(&descriptor.tls)?);
        } else if descriptor.tls.is_configured() {
            debug!(uri, "ignoring TLS material for local transport");
        }
        if let Some(identity) = &descriptor.identity {
            debug!(
                uri,
                identity = %identity.display(),
                "identity is only used for ssh connections"
            );
        }

        let ping = ApiRequest::new(Method::GET, format!("{}/_ping", api_prefix()));
        let response = transport.do_request(ping).await?;
        if !response.is_success() {
            return Err(Error::Connection {
                uri: uri.to_string(),
                reason: format!("ping returned status {}", response.status),
            });
        }
        debug!(uri, "connection negotiated");
        Ok(Arc::new(transport))
    }
}
