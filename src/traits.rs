use crate::model::{FetchOutcome, WorkItem};
use crate::secrets::SecretString;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to build request: {0}")]
    Request(String),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Downgrades the error to a per-item [`FetchOutcome::Failure`].
    pub fn into_outcome(self) -> FetchOutcome {
        let status_code = self.status_code();
        FetchOutcome::Failure {
            error_message: self.to_string(),
            status_code,
        }
    }
}

/// Opaque credentials handed to a provider adapter.
#[derive(Clone, Debug)]
pub enum Credentials {
    /// HTTP basic auth (e.g. Oxylabs realtime API).
    Basic {
        username: SecretString,
        password: SecretString,
    },
    /// Single API key sent in a provider-specific header.
    ApiKey(SecretString),
    /// Provider needs no credentials.
    Anonymous,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the provider ID this adapter talks to (e.g., "oxylabs", "axesso").
    fn provider_id(&self) -> &str;

    /// Issues exactly one request for `item` and classifies the response.
    ///
    /// Never fails: every transport, HTTP or decoding problem is reported as
    /// [`FetchOutcome::Failure`].
    async fn fetch(&self, item: &WorkItem, credentials: &Credentials) -> FetchOutcome;
}
