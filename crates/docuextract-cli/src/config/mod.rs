//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── client: ClientConfig   # Gateway URL, webhook URL, secret, HTTP options
//! └── command: Command       # register | payload | dispatch
//! ```
//!
//! All client options can be provided via CLI arguments or environment
//! variables. Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! # Register a receiving endpoint with the gateway
//! docuextract --gateway-url https://gateway.internal \
//!     --webhook-url https://hooks.example.com/docuextract register
//!
//! # Or via environment variables
//! DOCUEXTRACT_WEBHOOK_SECRET=whsec_... docuextract payload extraction.complete --sign
//! ```

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use docuextract_webhook::ClientConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "docuextract")]
#[command(about = "DocuExtract webhook helper")]
#[command(version)]
pub struct Cli {
    /// Gateway and webhook client configuration.
    #[clap(flatten)]
    pub client: ClientConfig,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed on the command line.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Register the webhook URL with the gateway for every event type.
    Register,

    /// Print a freshly created webhook payload as JSON.
    Payload {
        /// Event tag, e.g. `extraction.complete`.
        event_type: String,

        /// Event data as a JSON document.
        #[arg(long, default_value = "{}", value_parser = parse_json)]
        data: serde_json::Value,

        /// Sign the payload with the configured secret.
        #[arg(long)]
        sign: bool,
    },

    /// Dispatch a webhook payload read from a file (or `-` for stdin).
    Dispatch {
        /// Path of the JSON payload.
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Verify signatures with HMAC-SHA256 instead of accepting all.
        #[arg(long)]
        verify_hmac: bool,
    },
}

fn parse_json(input: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(input)
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    /// Logs configuration at debug level (no sensitive information).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            features = ?Self::enabled_features(),
            "Build information"
        );

        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            gateway_url = %self.client.gateway_url,
            webhook_url = ?self.client.webhook_url.as_ref().map(|url| url.as_str()),
            has_secret = self.client.secret.is_some(),
            http_timeout_secs = self.client.http_timeout,
            "Client configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
