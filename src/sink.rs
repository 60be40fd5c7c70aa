//! Newline-delimited JSON output to a local directory or an object store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::NormalizedRow;
use crate::storage::{ObjectStore, ObjectUri};

pub const NDJSON_CONTENT_TYPE: &str = "application/jsonl";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to serialize rows: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload to {uri} failed: {message}")]
    Upload { uri: String, message: String },
}

/// One JSON object per row, each terminated by `\n`.
pub fn to_ndjson(rows: &[NormalizedRow]) -> Result<Vec<u8>, SinkError> {
    let mut buf = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buf, row)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// `20240501_100000.jsonl`
pub fn output_file_name(now: DateTime<Utc>) -> String {
    format!("{}.jsonl", now.format("%Y%m%d_%H%M%S"))
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Writes `rows` under `file_name` and returns the final location.
    async fn write(&self, file_name: &str, rows: &[NormalizedRow]) -> Result<String, SinkError>;
}

/// Writes into a local directory, creating it if needed.
pub struct LocalSink {
    dir: PathBuf,
}

impl LocalSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Sink for LocalSink {
    async fn write(&self, file_name: &str, rows: &[NormalizedRow]) -> Result<String, SinkError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, to_ndjson(rows)?).await?;
        info!(path = %path.display(), rows = rows.len(), "Saved locally");
        Ok(path.display().to_string())
    }
}

/// Uploads to `gs://<bucket>/<prefix>/<file_name>`.
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl ObjectStoreSink {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    pub fn destination(&self, file_name: &str) -> ObjectUri {
        let prefix = self.prefix.trim_matches('/');
        let object = if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        };
        ObjectUri::new(self.bucket.clone(), object)
    }
}

#[async_trait]
impl Sink for ObjectStoreSink {
    async fn write(&self, file_name: &str, rows: &[NormalizedRow]) -> Result<String, SinkError> {
        let uri = self.destination(file_name);
        if rows.is_empty() {
            warn!(uri = %uri, "No rows, skipping upload");
            return Ok(uri.to_string());
        }

        self.store
            .put(&uri, to_ndjson(rows)?, NDJSON_CONTENT_TYPE)
            .await
            .map_err(|e| SinkError::Upload {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;
        info!(uri = %uri, rows = rows.len(), "Data saved to object store");
        Ok(uri.to_string())
    }
}
