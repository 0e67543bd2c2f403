//! Reqwest-based HTTP client for the extraction gateway.
//!
//! # Example
//!
//! ```rust,ignore
//! use docuextract_webhook::gateway::GatewayClient;
//! use docuextract_webhook::{ClientConfig, EventType};
//!
//! let config = ClientConfig::default();
//! let gateway = GatewayClient::new(&config)?;
//!
//! let url = Url::parse("https://hooks.example.com/docuextract")?;
//! gateway.register(&url, &EventType::ALL).await?;
//! ```

mod client;
mod error;

pub use client::{GatewayClient, REGISTER_PATH, RegistrationRequest};
pub use error::Error;

/// Tracing target for gateway operations.
pub const TRACING_TARGET: &str = "docuextract_webhook::gateway";
