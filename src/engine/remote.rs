//! Backend issuing API calls over a negotiated connection.

use super::{
    ArtifactPullOptions, ArtifactPullReport, AutoUpdateOptions, AutoUpdateOutcome,
    AutoUpdateReport, CapabilityTable, ContainerEngine, Event, EventsEnd, EventsOptions,
    HealthCheckOptions, HealthCheckResults, ImageUntagOptions, NetworkUpdateOptions, Operation,
    SetTrustOptions, ShowTrustOptions, ShowTrustReport, SystemInfo, split_tag,
};
use crate::client::ClientContext;
use crate::config::EngineMode;
use crate::constants::REGISTRY_AUTH_HEADER;
use crate::error::{Error, Result};
use crate::protocol::{
    self, AuthHeaderBuilder, Credentials, QueryParams, RegistryAuth, Subject, ToParams, endpoint,
};
use crate::transport::{ApiRequest, ApiResponse, Method, StreamResponse};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Backend realizing the facade through the engine API.
pub struct RemoteEngine {
    ctx: ClientContext,
    capabilities: CapabilityTable,
    auth: Arc<dyn AuthHeaderBuilder>,
}

impl RemoteEngine {
    /// Creates the backend over a negotiated context.
    pub fn new(ctx: ClientContext) -> Self {
        Self {
            ctx,
            capabilities: CapabilityTable::remote(),
            auth: Arc::new(RegistryAuth),
        }
    }

    /// Replaces the capability table.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilityTable) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replaces the registry auth header builder.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthHeaderBuilder>) -> Self {
        self.auth = auth;
        self
    }

    /// The client context.
    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    /// The capability table.
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    async fn call(&self, op: Operation, request: ApiRequest) -> Result<ApiResponse> {
        self.capabilities.ensure(op)?;
        debug!(operation = %op, method = %request.method, path = %request.path, "remote call");
        self.ctx.run(self.ctx.transport().do_request(request)).await
    }

    async fn call_auto_update(&self, opts: &AutoUpdateOptions) -> Result<AutoUpdateBody> {
        self.capabilities.ensure(Operation::AutoUpdate)?;
        let header = self.auth.header_value(&Credentials {
            authfile: opts.authfile.as_deref(),
            username: None,
            password: None,
        })?;
        let mut request =
            ApiRequest::new(Method::POST, endpoint("/autoupdate")).with_params(opts.to_params()?);
        if let Some(value) = header {
            request = request.with_header(REGISTRY_AUTH_HEADER, value);
        }
        let response = self.call(Operation::AutoUpdate, request).await?;
        protocol::process(&response, Operation::AutoUpdate, Subject::system())
    }
}

/// Auto-update response: per-unit reports plus per-unit failures.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AutoUpdateBody {
    #[serde(rename = "Reports")]
    reports: Vec<AutoUpdateReport>,
    #[serde(rename = "Errors")]
    errors: Vec<String>,
}

#[async_trait]
impl ContainerEngine for RemoteEngine {
    fn mode(&self) -> EngineMode {
        EngineMode::Remote
    }

    async fn health_check_run(
        &self,
        name: &str,
        _opts: HealthCheckOptions,
    ) -> Result<HealthCheckResults> {
        let request = ApiRequest::new(
            Method::GET,
            endpoint(&format!("/containers/{name}/healthcheck")),
        );
        let response = self.call(Operation::HealthCheckRun, request).await?;
        protocol::process(&response, Operation::HealthCheckRun, Subject::container(name))
    }

    async fn auto_update(&self, opts: AutoUpdateOptions) -> AutoUpdateOutcome {
        match self.call_auto_update(&opts).await {
            Ok(body) => (body.reports, body.errors.into_iter().map(Error::Internal).collect()),
            Err(e) => (Vec::new(), vec![e]),
        }
    }

    async fn events(
        &self,
        opts: EventsOptions,
        sink: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> Result<EventsEnd> {
        self.capabilities.ensure(Operation::Events)?;
        let request =
            ApiRequest::new(Method::GET, endpoint("/events")).with_params(opts.to_params()?);

        let scope = self.ctx.call_scope();
        let stop = async {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = scope.cancelled() => {}
            }
        };
        tokio::pin!(stop);

        let opened = tokio::select! {
            biased;
            _ = &mut stop => return Ok(EventsEnd::Cancelled),
            opened = self.ctx.transport().open_stream(request) => opened?,
        };
        let mut lines = match opened {
            StreamResponse::Lines(lines) => lines,
            StreamResponse::Failed(response) => {
                return Err(protocol::status_error(
                    &response,
                    Operation::Events,
                    Subject::system(),
                ));
            }
        };

        loop {
            let line = tokio::select! {
                biased;
                _ = &mut stop => return Ok(EventsEnd::Cancelled),
                line = lines.recv() => line,
            };
            let Some(line) = line else {
                debug!("event stream closed by engine");
                return Ok(EventsEnd::StreamClosed);
            };
            let event: Event = serde_json::from_slice(&line?)?;
            tokio::select! {
                biased;
                _ = &mut stop => return Ok(EventsEnd::Cancelled),
                sent = sink.send(event) => {
                    if sent.is_err() {
                        return Ok(EventsEnd::Cancelled);
                    }
                }
            }
        }
    }

    async fn network_update(&self, name: &str, opts: NetworkUpdateOptions) -> Result<()> {
        let request = ApiRequest::new(Method::POST, endpoint(&format!("/networks/{name}/update")))
            .with_json(&opts)?;
        let response = self.call(Operation::NetworkUpdate, request).await?;
        protocol::check(&response, Operation::NetworkUpdate, Subject::network(name))
    }

    async fn artifact_pull(
        &self,
        name: &str,
        opts: ArtifactPullOptions,
    ) -> Result<ArtifactPullReport> {
        self.capabilities.ensure(Operation::ArtifactPull)?;
        let header = self.auth.header_value(&Credentials {
            authfile: opts.authfile.as_deref(),
            username: opts.username.as_deref(),
            password: opts.password.as_deref(),
        })?;

        let mut params = opts.to_params()?;
        params.set("name", name);
        let mut request =
            ApiRequest::new(Method::POST, endpoint("/artifacts/pull")).with_params(params);
        if let Some(value) = header {
            request = request.with_header(REGISTRY_AUTH_HEADER, value);
        }
        let response = self.call(Operation::ArtifactPull, request).await?;
        protocol::process(&response, Operation::ArtifactPull, Subject::artifact(name))
    }

    async fn image_untag(
        &self,
        name: &str,
        tags: &[String],
        _opts: ImageUntagOptions,
    ) -> Result<()> {
        let path = endpoint(&format!("/images/{name}/untag"));
        if tags.is_empty() {
            let response = self
                .call(Operation::ImageUntag, ApiRequest::new(Method::POST, path))
                .await?;
            return protocol::check(&response, Operation::ImageUntag, Subject::image(name));
        }

        for reference in tags {
            let (repo, tag) = split_tag(reference)?;
            let mut params = QueryParams::new();
            params.set("repo", repo).set("tag", tag);
            let request = ApiRequest::new(Method::POST, path.clone()).with_params(params);
            let response = self.call(Operation::ImageUntag, request).await?;
            protocol::check(&response, Operation::ImageUntag, Subject::image(name))?;
        }
        Ok(())
    }

    async fn info(&self) -> Result<SystemInfo> {
        let response = self
            .call(Operation::Info, ApiRequest::new(Method::GET, endpoint("/info")))
            .await?;
        protocol::process(&response, Operation::Info, Subject::system())
    }

    async fn show_trust(
        &self,
        images: &[String],
        opts: ShowTrustOptions,
    ) -> Result<ShowTrustReport> {
        let mut params = opts.to_params()?;
        for image in images {
            params.append("image", image);
        }
        let request = ApiRequest::new(Method::GET, endpoint("/images/trust")).with_params(params);
        let response = self.call(Operation::ShowTrust, request).await?;
        protocol::process(&response, Operation::ShowTrust, Subject::system())
    }

    async fn set_trust(&self, scopes: &[String], opts: SetTrustOptions) -> Result<()> {
        let mut params = opts.to_params()?;
        for scope in scopes {
            params.append("scope", scope);
        }
        let request = ApiRequest::new(Method::POST, endpoint("/images/trust")).with_params(params);
        let response = self.call(Operation::SetTrust, request).await?;
        protocol::check(&response, Operation::SetTrust, Subject::system())
    }

    async fn shutdown(&self) {
        self.ctx.close();
        debug!(uri = self.ctx.uri(), "client context closed");
    }
}
