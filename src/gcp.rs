//! Minimal Google Cloud REST clients for the external seams:
//! Cloud Storage ([`ObjectStore`]), BigQuery ([`Warehouse`]) and
//! Secret Manager ([`RemoteSecretStore`]).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::input::Warehouse;
use crate::secrets::{RemoteSecretStore, SecretString};
use crate::storage::{BoxError, ObjectStore, ObjectUri};

const STORAGE_URL: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_URL: &str = "https://storage.googleapis.com/upload/storage/v1";
const BIGQUERY_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Environment variable holding a ready-made OAuth access token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    Response(String),
}

pub type Result<T> = std::result::Result<T, GcpError>;

async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(GcpError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// Access tokens from a fixed value or the GCE metadata server.
pub struct GcpAuth {
    client: reqwest::Client,
    fixed: Option<SecretString>,
    cached: Mutex<Option<(SecretString, Instant)>>,
}

impl GcpAuth {
    pub fn new(client: reqwest::Client, fixed: Option<SecretString>) -> Self {
        Self {
            client,
            fixed,
            cached: Mutex::new(None),
        }
    }

    /// Uses [`ACCESS_TOKEN_ENV`] when set, the metadata server otherwise.
    pub fn from_env(client: reqwest::Client) -> Self {
        let fixed = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::new);
        Self::new(client, fixed)
    }

    pub async fn token(&self) -> Result<SecretString> {
        if let Some(token) = &self.fixed {
            return Ok(token.clone());
        }

        let mut cached = self.cached.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }

        debug!("Fetching access token from metadata server");
        let resp = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        let body: MetadataToken = check(resp).await?.json().await?;

        // Refresh a minute early.
        let ttl = Duration::from_secs(body.expires_in.saturating_sub(60));
        let token = SecretString::new(body.access_token);
        *cached = Some((token.clone(), Instant::now() + ttl));
        Ok(token)
    }
}

// ============================================================================
// Cloud Storage
// ============================================================================

pub struct GcsClient {
    client: reqwest::Client,
    auth: Arc<GcpAuth>,
}

impl GcsClient {
    pub fn new(client: reqwest::Client, auth: Arc<GcpAuth>) -> Self {
        Self { client, auth }
    }

    pub fn download_url(uri: &ObjectUri) -> String {
        format!(
            "{}/b/{}/o/{}?alt=media",
            STORAGE_URL,
            uri.bucket,
            urlencoding::encode(&uri.object)
        )
    }

    pub fn upload_url(uri: &ObjectUri) -> String {
        format!(
            "{}/b/{}/o?uploadType=media&name={}",
            UPLOAD_URL,
            uri.bucket,
            urlencoding::encode(&uri.object)
        )
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn get_text(&self, uri: &ObjectUri) -> std::result::Result<String, BoxError> {
        let token = self.auth.token().await?;
        let resp = self
            .client
            .get(Self::download_url(uri))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(GcpError::from)?;
        Ok(check(resp).await?.text().await.map_err(GcpError::from)?)
    }

    async fn put(
        &self,
        uri: &ObjectUri,
        body: Vec<u8>,
        content_type: &str,
    ) -> std::result::Result<(), BoxError> {
        let token = self.auth.token().await?;
        let resp = self
            .client
            .post(Self::upload_url(uri))
            .bearer_auth(token.expose())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(GcpError::from)?;
        check(resp).await?;
        Ok(())
    }
}

// ============================================================================
// BigQuery
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Value,
}

impl TableRow {
    fn first_value(&self) -> Option<String> {
        match self.f.first().map(|cell| &cell.v) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

pub struct BigQueryClient {
    client: reqwest::Client,
    auth: Arc<GcpAuth>,
    project: String,
}

impl BigQueryClient {
    pub fn new(client: reqwest::Client, auth: Arc<GcpAuth>, project: impl Into<String>) -> Self {
        Self {
            client,
            auth,
            project: project.into(),
        }
    }

    async fn page(&self, job: &JobReference, page_token: &str) -> Result<QueryResponse> {
        let token = self.auth.token().await?;
        let url = format!("{}/projects/{}/queries/{}", BIGQUERY_URL, self.project, job.job_id);
        let mut query = vec![("pageToken", page_token.to_string())];
        if let Some(location) = &job.location {
            query.push(("location", location.clone()));
        }
        let resp = self
            .client
            .get(url)
            .bearer_auth(token.expose())
            .query(&query)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn query_column(&self, sql: &str) -> std::result::Result<Vec<Option<String>>, BoxError> {
        let token = self.auth.token().await?;
        let url = format!("{}/projects/{}/queries", BIGQUERY_URL, self.project);
        let resp = self
            .client
            .post(url)
            .bearer_auth(token.expose())
            .json(&json!({ "query": sql, "useLegacySql": false, "timeoutMs": 60000 }))
            .send()
            .await
            .map_err(GcpError::from)?;
        let mut page: QueryResponse = check(resp).await?.json().await.map_err(GcpError::from)?;

        if !page.job_complete {
            return Err(GcpError::Response("query did not complete within 60s".into()).into());
        }

        let mut values: Vec<Option<String>> = page.rows.iter().map(TableRow::first_value).collect();
        let job = page.job_reference.take();
        let mut page_token = page.page_token.take();
        while let (Some(job), Some(token)) = (job.as_ref(), page_token.take()) {
            let next = self.page(job, &token).await?;
            values.extend(next.rows.iter().map(TableRow::first_value));
            page_token = next.page_token;
        }
        Ok(values)
    }
}

// ============================================================================
// Secret Manager
// ============================================================================

#[derive(Deserialize)]
struct AccessResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

pub struct SecretManagerClient {
    client: reqwest::Client,
    auth: Arc<GcpAuth>,
}

impl SecretManagerClient {
    pub fn new(client: reqwest::Client, auth: Arc<GcpAuth>) -> Self {
        Self { client, auth }
    }

    pub fn access_url(project: &str, name: &str, version: &str) -> String {
        format!(
            "{}/projects/{}/secrets/{}/versions/{}:access",
            SECRET_MANAGER_URL, project, name, version
        )
    }
}

/// Secret Manager payloads are standard base64.
pub fn decode_payload(data: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| GcpError::Response(format!("invalid secret payload: {e}")))?;
    String::from_utf8(bytes).map_err(|e| GcpError::Response(format!("secret is not UTF-8: {e}")))
}

#[async_trait]
impl RemoteSecretStore for SecretManagerClient {
    async fn access(
        &self,
        project: &str,
        name: &str,
        version: &str,
    ) -> std::result::Result<Option<String>, BoxError> {
        let token = self.auth.token().await?;
        let resp = self
            .client
            .get(Self::access_url(project, name, version))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(GcpError::from)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: AccessResponse = check(resp).await?.json().await.map_err(GcpError::from)?;
        Ok(Some(decode_payload(&body.payload.data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcs_urls_encode_object_path() {
        let uri = ObjectUri::new("raw-data", "washers/20240501_100000.jsonl");
        assert_eq!(
            GcsClient::download_url(&uri),
            "https://storage.googleapis.com/storage/v1/b/raw-data/o/washers%2F20240501_100000.jsonl?alt=media"
        );
        assert_eq!(
            GcsClient::upload_url(&uri),
            "https://storage.googleapis.com/upload/storage/v1/b/raw-data/o?uploadType=media&name=washers%2F20240501_100000.jsonl"
        );
    }

    #[test]
    fn test_secret_access_url() {
        assert_eq!(
            SecretManagerClient::access_url("proj", "axesso-key", "latest"),
            "https://secretmanager.googleapis.com/v1/projects/proj/secrets/axesso-key/versions/latest:access"
        );
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload("c2VjcmV0LXZhbHVl").unwrap(), "secret-value");
        assert!(decode_payload("%%%").is_err());
    }

    #[test]
    fn test_query_response_rows() {
        let body = json!({
            "jobComplete": true,
            "jobReference": {"projectId": "p", "jobId": "job_1", "location": "EU"},
            "rows": [
                {"f": [{"v": "B0A"}]},
                {"f": [{"v": null}]},
                {"f": [{"v": 42}]}
            ]
        });
        let page: QueryResponse = serde_json::from_value(body).unwrap();
        let values: Vec<_> = page.rows.iter().map(TableRow::first_value).collect();

        assert!(page.job_complete);
        assert_eq!(page.job_reference.unwrap().job_id, "job_1");
        assert_eq!(
            values,
            vec![Some("B0A".to_string()), None, Some("42".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fixed_token_skips_metadata_server() {
        let auth = GcpAuth::new(reqwest::Client::new(), Some(SecretString::new("ya29.token")));
        assert_eq!(auth.token().await.unwrap().expose(), "ya29.token");
    }
}
