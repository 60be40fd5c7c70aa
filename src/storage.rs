//! Object-storage addressing and the object store seam shared by the input
//! resolver and the sink.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type used at external-service seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UriError {
    #[error("Object URI must start with gs://: '{0}'")]
    Scheme(String),
    #[error("Object URI must include bucket and object path: '{0}'")]
    MissingPath(String),
}

/// `gs://bucket/path/to/object`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUri {
    pub bucket: String,
    pub object: String,
}

impl ObjectUri {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }
}

impl FromStr for ObjectUri {
    type Err = UriError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let rest = uri
            .strip_prefix("gs://")
            .ok_or_else(|| UriError::Scheme(uri.to_string()))?;
        let (bucket, object) = rest
            .split_once('/')
            .ok_or_else(|| UriError::MissingPath(uri.to_string()))?;
        if bucket.is_empty() || object.is_empty() {
            return Err(UriError::MissingPath(uri.to_string()));
        }
        Ok(Self::new(bucket, object))
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.object)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Downloads an object as UTF-8 text.
    async fn get_text(&self, uri: &ObjectUri) -> Result<String, BoxError>;

    /// Uploads `body` to `uri`, replacing any existing object.
    async fn put(&self, uri: &ObjectUri, body: Vec<u8>, content_type: &str)
        -> Result<(), BoxError>;
}
