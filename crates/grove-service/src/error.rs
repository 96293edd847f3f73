//! Errors raised by the outbound integrations (event bus, challenge API).

use grove_core::error::GroveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} responded with status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("event publisher has been shut down")]
    Closed,

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<IntegrationError> for GroveError {
    fn from(err: IntegrationError) -> Self {
        GroveError::Upstream(err.to_string())
    }
}
