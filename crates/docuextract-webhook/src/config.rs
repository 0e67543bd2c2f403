//! Webhook client configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default gateway base URL.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:3000";

/// Default timeout for HTTP requests: 30 seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the [`WebhookClient`](crate::WebhookClient).
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the extraction gateway
    #[cfg_attr(
        feature = "config",
        arg(
            long = "gateway-url",
            env = "DOCUEXTRACT_GATEWAY_URL",
            default_value = DEFAULT_GATEWAY_URL
        )
    )]
    #[serde(default = "default_gateway_url")]
    pub gateway_url: Url,

    /// Publicly reachable URL the gateway should deliver webhooks to
    ///
    /// Registered in normalized form: a URL without a path gains a trailing
    /// slash, so `https://hooks.example.com` registers as
    /// `https://hooks.example.com/`.
    #[cfg_attr(
        feature = "config",
        arg(long = "webhook-url", env = "DOCUEXTRACT_WEBHOOK_URL")
    )]
    #[serde(default)]
    pub webhook_url: Option<Url>,

    /// Shared signing secret; enables signature verification when set
    #[cfg_attr(
        feature = "config",
        arg(long = "webhook-secret", env = "DOCUEXTRACT_WEBHOOK_SECRET")
    )]
    #[serde(default)]
    pub secret: Option<String>,

    /// HTTP request timeout in seconds
    #[cfg_attr(
        feature = "config",
        arg(long = "http-timeout", env = "HTTP_TIMEOUT", default_value = "30")
    )]
    #[serde(default = "default_timeout_secs")]
    pub http_timeout: u64,

    /// User-Agent header to send with requests
    #[cfg_attr(
        feature = "config",
        arg(long = "http-user-agent", env = "HTTP_USER_AGENT")
    )]
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_gateway_url() -> Url {
    Url::parse(DEFAULT_GATEWAY_URL).expect("default gateway url is valid")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("gateway_url", &self.gateway_url.as_str())
            .field("webhook_url", &self.webhook_url.as_ref().map(Url::as_str))
            .field("has_secret", &self.secret.is_some())
            .field("http_timeout", &self.http_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            webhook_url: None,
            secret: None,
            http_timeout: default_timeout_secs(),
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration pointing at the given gateway.
    pub fn new(gateway_url: Url) -> Self {
        Self {
            gateway_url,
            ..Self::default()
        }
    }

    /// Returns the effective timeout, using default if zero.
    pub fn effective_timeout(&self) -> Duration {
        if self.http_timeout == 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.http_timeout)
        }
    }

    /// Returns the effective user agent, using default if not set.
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(Self::default_user_agent)
    }

    fn default_user_agent() -> String {
        format!("docuextract-webhook/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Set the gateway base URL.
    #[must_use]
    pub fn with_gateway_url(mut self, gateway_url: Url) -> Self {
        self.gateway_url = gateway_url;
        self
    }

    /// Set the URL this client receives webhooks on.
    #[must_use]
    pub fn with_webhook_url(mut self, webhook_url: Url) -> Self {
        self.webhook_url = Some(webhook_url);
        self
    }

    /// Set the shared signing secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Set the timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.http_timeout = timeout_secs;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
