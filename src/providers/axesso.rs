//! Axesso marketplace product-detail API.

use async_trait::async_trait;
use serde_json::Value;

use super::{is_blank, read_json};
use crate::model::{FetchOutcome, WorkItem};
use crate::traits::{Credentials, FetchError, ProviderAdapter};

pub struct AxessoAdapter {
    client: reqwest::Client,
    endpoint: String,
}

/// Encodes a target page URL the way Axesso expects it: the scheme stays,
/// `://` becomes `:%2F%2F` and the rest is percent-encoded except `=`.
pub fn encode_target_url(url: &str) -> Result<String, FetchError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| FetchError::Request(format!("URL has no scheme: '{}'", url)))?;
    let encoded_rest = urlencoding::encode(rest).replace("%3D", "=");
    Ok(format!("{}:%2F%2F{}", scheme, encoded_rest))
}

impl AxessoAdapter {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Assembled by hand so the already-encoded target is not encoded twice.
    pub fn request_url(&self, item: &WorkItem) -> Result<String, FetchError> {
        Ok(format!("{}?url={}", self.endpoint, encode_target_url(&item.key)?))
    }

    async fn try_fetch(
        &self,
        item: &WorkItem,
        credentials: &Credentials,
    ) -> Result<Value, FetchError> {
        let Credentials::ApiKey(api_key) = credentials else {
            return Err(FetchError::Request(
                "Axesso requires an API key".to_string(),
            ));
        };

        let resp = self
            .client
            .get(self.request_url(item)?)
            .header("axesso-api-key", api_key.expose())
            .header("Cache-Control", "no-cache")
            .send()
            .await?;

        read_json(resp).await
    }
}

#[async_trait]
impl ProviderAdapter for AxessoAdapter {
    fn provider_id(&self) -> &str {
        "axesso"
    }

    async fn fetch(&self, item: &WorkItem, credentials: &Credentials) -> FetchOutcome {
        match self.try_fetch(item, credentials).await {
            Ok(raw_payload) if is_blank(&raw_payload) => FetchOutcome::EmptyContent { raw_payload },
            Ok(raw_payload) => FetchOutcome::Success { raw_payload },
            Err(e) => e.into_outcome(),
        }
    }
}
