//! Negotiated client context for the Remote backend.
//!
//! A [`ClientContext`] owns the transport and a root cancellation scope.
//! Every call derives a child scope, so closing the context cancels all
//! in-flight calls while individual calls stay independent of each other.

use crate::connection::ConnectionDescriptor;
use crate::error::{Error, Result};
use crate::machine::MachineProvider;
use crate::platform::Platform;
use crate::transport::{Connector, Transport, resolve_address};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Transport plus cancellation scope shared by all remote calls.
#[derive(Clone)]
pub struct ClientContext {
    uri: String,
    transport: Arc<dyn Transport>,
    scope: CancellationToken,
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("uri", &self.uri)
            .field("closed", &self.scope.is_cancelled())
            .finish()
    }
}

impl ClientContext {
    /// Wraps an established transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            uri: transport.uri().to_string(),
            transport,
            scope: CancellationToken::new(),
        }
    }

    /// URI of the negotiated endpoint.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Derives a scope for one call.
    pub fn call_scope(&self) -> CancellationToken {
        self.scope.child_token()
    }

    /// Runs a call future under a fresh child scope.
    pub async fn run<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let scope = self.call_scope();
        tokio::select! {
            biased;
            _ = scope.cancelled() => Err(Error::Cancelled),
            result = call => result,
        }
    }

    /// Cancels every in-flight and future call.
    pub fn close(&self) {
        self.scope.cancel();
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.scope.is_cancelled()
    }
}

/// Negotiates a client context from a descriptor.
///
/// For machine-mediated targets the machine's state is checked first; a
/// machine that is not running fails here without any transport attempt.
pub async fn negotiate(
    descriptor: &ConnectionDescriptor,
    machines: Option<&dyn MachineProvider>,
    platform: &Platform,
    connector: &dyn Connector,
) -> Result<ClientContext> {
    let uri = match &descriptor.machine {
        Some(name) => {
            let provider = machines.ok_or_else(|| Error::Machine {
                name: name.clone(),
                reason: "no machine provider configured".into(),
            })?;
            let mc = provider.machine(name)?;
            let state = provider.stubber(&mc).state(&mc).await?;
            for message in &state.messages {
                debug!(machine = %name, "{message}");
            }
            if !state.value.is_running() {
                return Err(Error::MachineNotRunning {
                    name: name.clone(),
                    state: state.value.to_string(),
                });
            }
            let address = resolve_address(
                platform.transport_family(),
                mc.api_socket.as_ref(),
                mc.api_pipe.as_ref(),
            )?;
            address.to_uri()
        }
        None => descriptor.uri.clone(),
    };

    let transport = connector.connect(&uri, descriptor).await?;
    info!(%uri, "connected to engine");
    Ok(ClientContext::new(transport))
}
