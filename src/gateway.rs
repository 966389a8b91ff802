//! HTTP client for a remote resolution gateway.
//!
//! An alternative to the subprocess resolver for deployments where camera
//! capture and inference run as their own service: the ambiguous window is
//! POSTed to the service and the JSON verdict comes back in the response.
//! The router needs a blocking call, so the async client is wrapped in a
//! current-thread runtime facade.

use crate::core::event::{RawEvent, ResolutionVerdict};
use crate::resolver::{ResolutionGateway, ResolverError};
use serde_json::json;
use tracing::debug;

/// Remote gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    pub host: String,
    /// Gateway port
    pub port: u16,
    /// Bearer authentication token, if the gateway requires one
    pub token: Option<String>,
    /// Round-trip timeout; capture plus inference can take seconds
    pub timeout: std::time::Duration,
}

impl GatewayConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            token: None,
            timeout: std::time::Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the full gateway URL.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get the resolve endpoint URL.
    pub fn resolve_url(&self) -> String {
        format!("{}/v1/resolve", self.url())
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.url())
    }
}

/// Async client for the resolution gateway service.
pub struct HttpResolverClient {
    config: GatewayConfig,
    client: reqwest::Client,
    client_id: String,
}

impl HttpResolverClient {
    pub fn new(config: GatewayConfig) -> Result<Self, ResolverError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ResolverError::Launch(e.to_string()))?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let client_id = format!("triage-{}-{}", host, &uuid::Uuid::new_v4().to_string()[..8]);

        Ok(Self {
            config,
            client,
            client_id,
        })
    }

    /// Test connection to the gateway.
    pub async fn test_connection(&self) -> Result<bool, ResolverError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| ResolverError::Unavailable(e.to_string()))?;
        Ok(response.status().is_success())
    }

    /// POST the candidate events and parse the verdict.
    pub async fn resolve_window(
        &self,
        events: &[RawEvent],
    ) -> Result<ResolutionVerdict, ResolverError> {
        let body = json!({
            "client_id": self.client_id,
            "events": events,
        });

        let mut request = self
            .client
            .post(self.config.resolve_url())
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref token) = self.config.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResolverError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ResolverError::Unavailable(format!(
                "gateway returned {status}: {message}"
            )));
        }

        let verdict: ResolutionVerdict = response
            .json()
            .await
            .map_err(|e| ResolverError::Malformed(e.to_string()))?;
        debug!(resolved = verdict.resolved, "gateway verdict");
        Ok(verdict)
    }

    /// Get the client ID.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Blocking facade over `HttpResolverClient` for use inside `dispatch()`.
pub struct BlockingResolverClient {
    inner: HttpResolverClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingResolverClient {
    pub fn new(config: GatewayConfig) -> Result<Self, ResolverError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ResolverError::Launch(format!("failed to create runtime: {e}")))?;

        Ok(Self {
            inner: HttpResolverClient::new(config)?,
            runtime,
        })
    }

    /// Test connection to the gateway.
    pub fn test_connection(&self) -> Result<bool, ResolverError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    /// Get the client ID.
    pub fn client_id(&self) -> &str {
        self.inner.client_id()
    }
}

impl ResolutionGateway for BlockingResolverClient {
    fn resolve(&self, events: &[RawEvent]) -> Result<ResolutionVerdict, ResolverError> {
        self.runtime.block_on(self.inner.resolve_window(events))
    }
}
