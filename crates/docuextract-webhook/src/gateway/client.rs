//! Gateway client implementation.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{Error, TRACING_TARGET};
use crate::{ClientConfig, EventType};

/// Path of the webhook registration endpoint, relative to the gateway URL.
pub const REGISTER_PATH: &str = "/api/webhooks/register";

/// JSON body of the registration request.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest<'a> {
    /// Endpoint the gateway should deliver to.
    ///
    /// Sent in [`Url`]'s normalized form, so a bare host gains a trailing
    /// slash (`https://hooks.example.com` is sent as
    /// `https://hooks.example.com/`).
    pub url: &'a Url,
    /// Event tags to subscribe to.
    pub events: &'a [EventType],
}

struct GatewayClientInner {
    http: Client,
    gateway_url: Url,
}

/// HTTP client for talking to the extraction gateway.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<GatewayClientInner>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("gateway_url", &self.inner.gateway_url.as_str())
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Creates a gateway client from the client configuration.
    pub fn new(config: &ClientConfig) -> crate::Result<Self> {
        let timeout = config.effective_timeout();
        let user_agent = config.effective_user_agent();

        tracing::debug!(
            target: TRACING_TARGET,
            gateway_url = %config.gateway_url,
            timeout_ms = timeout.as_millis(),
            "Creating gateway client"
        );

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(&user_agent)
            .build()
            .map_err(Error::from)?;

        let inner = GatewayClientInner {
            http,
            gateway_url: config.gateway_url.clone(),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Returns the gateway base URL.
    pub fn gateway_url(&self) -> &Url {
        &self.inner.gateway_url
    }

    /// Returns the full registration endpoint URL.
    pub fn register_endpoint(&self) -> String {
        let base = self.inner.gateway_url.as_str().trim_end_matches('/');
        format!("{base}{REGISTER_PATH}")
    }

    /// Registers `webhook_url` with the gateway for the given events.
    ///
    /// Any non-2xx response is reported as an error.
    pub async fn register(&self, webhook_url: &Url, events: &[EventType]) -> crate::Result<()> {
        let endpoint = self.register_endpoint();
        let body = RegistrationRequest {
            url: webhook_url,
            events,
        };

        tracing::debug!(
            target: TRACING_TARGET,
            endpoint = %endpoint,
            webhook_url = %webhook_url,
            events = events.len(),
            "Registering webhook with gateway"
        );

        self.inner
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(Error::from)?;

        Ok(())
    }
}
