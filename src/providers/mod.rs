//! Provider adapters.
//!
//! Each adapter owns request construction for its provider and enough
//! response interpretation to tell a failed call from a valid-but-empty one.
//! All of them implement [`ProviderAdapter`](crate::traits::ProviderAdapter).

pub mod axesso;
pub mod oxylabs;

pub use axesso::AxessoAdapter;
pub use oxylabs::OxylabsAdapter;

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::traits::FetchError;

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Oxylabs,
    Axesso,
}

/// Builds the shared HTTP client with a fixed per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(FetchError::from)
}

/// Checks the status and decodes the body as JSON.
pub(crate) async fn read_json(resp: reqwest::Response) -> Result<Value, FetchError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
}

/// `true` for null, `{}` and `[]`.
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
