#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod client;
mod config;
mod error;
mod event;
mod payload;

pub mod gateway;
pub mod listener;
pub mod verify;

pub use client::{DispatchReport, TRACING_TARGET, WebhookClient};
pub use config::{ClientConfig, DEFAULT_GATEWAY_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{BoxedError, Error, ErrorKind, Result};
pub use event::EventType;
pub use listener::{ListenerRegistry, ListenerResult, WebhookListener};
pub use payload::{PayloadTimestamp, WebhookPayload};
pub use verify::{AcceptAllVerifier, HmacSha256Verifier, SignatureVerifier};
