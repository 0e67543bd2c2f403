//! Error types for gateway HTTP calls.

use thiserror::Error;

/// Error type for gateway operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl From<Error> for crate::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                if e.is_timeout() {
                    crate::Error::timeout()
                        .with_message(e.to_string())
                        .with_source(e)
                } else if e.is_connect() {
                    crate::Error::network_error()
                        .with_message("Connection failed")
                        .with_source(e)
                } else if let Some(status) = e.status() {
                    crate::Error::external_error()
                        .with_message(format!("Gateway responded with {status}"))
                        .with_source(e)
                } else if e.is_builder() {
                    crate::Error::configuration()
                        .with_message(e.to_string())
                        .with_source(e)
                } else {
                    crate::Error::network_error()
                        .with_message(e.to_string())
                        .with_source(e)
                }
            }
        }
    }
}
