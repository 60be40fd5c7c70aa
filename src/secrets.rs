//! Credential lookup with secure memory.
//!
//! Secrets are resolved from three tiers, first non-empty match wins:
//! 1. process environment (derived name, then registered aliases)
//! 2. a file named after the secret in the mount directory
//! 3. a remote secret store, `(project, name, "latest")`
//!
//! Values are wrapped in [`SecretString`] so they never show up in logs.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretBox};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::storage::BoxError;

/// Default directory where secrets are mounted as files.
pub const DEFAULT_SECRET_MOUNT: &str = "/etc/secrets";

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the secret value for use.
    ///
    /// Only call this when actually using the secret (e.g., in an API request).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential '{name}' not found in environment, mounted secrets or secret store")]
    NotFound { name: String },
    #[error("Failed to read mounted secret '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Secret store lookup for '{name}' failed: {message}")]
    Remote { name: String, message: String },
}

/// Remote secret store seam (e.g. GCP Secret Manager).
#[async_trait]
pub trait RemoteSecretStore: Send + Sync {
    /// Returns `Ok(None)` when the secret does not exist.
    async fn access(
        &self,
        project: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<String>, BoxError>;
}

enum EnvSource {
    Process,
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            EnvSource::Process => std::env::var(key).ok(),
            EnvSource::Fixed(map) => map.get(key).cloned(),
        }
    }
}

pub struct SecretResolver {
    env: EnvSource,
    env_aliases: HashMap<String, Vec<String>>,
    mount_dir: PathBuf,
    remote: Option<(String, Arc<dyn RemoteSecretStore>)>,
}

impl SecretResolver {
    /// Resolver reading the process environment and [`DEFAULT_SECRET_MOUNT`],
    /// with no remote store.
    pub fn new() -> Self {
        Self {
            env: EnvSource::Process,
            env_aliases: HashMap::new(),
            mount_dir: PathBuf::from(DEFAULT_SECRET_MOUNT),
            remote: None,
        }
    }

    /// Replaces the process environment with a fixed map.
    pub fn with_env_map(mut self, env: HashMap<String, String>) -> Self {
        self.env = EnvSource::Fixed(env);
        self
    }

    pub fn with_mount_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mount_dir = dir.into();
        self
    }

    pub fn with_remote(
        mut self,
        project: impl Into<String>,
        store: Arc<dyn RemoteSecretStore>,
    ) -> Self {
        self.remote = Some((project.into(), store));
        self
    }

    /// Registers an extra environment variable checked for `logical_name`
    /// after its derived name.
    pub fn with_env_alias(mut self, logical_name: &str, env_name: impl Into<String>) -> Self {
        self.env_aliases
            .entry(logical_name.to_string())
            .or_default()
            .push(env_name.into());
        self
    }

    /// `marketplace1-price-oxylabs-username` -> `MARKETPLACE1_PRICE_OXYLABS_USERNAME`
    pub fn env_var_name(logical_name: &str) -> String {
        logical_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Resolves `logical_name`, right-trimming the value.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NotFound`] when no tier yields a non-empty
    /// value; I/O and remote errors are reported as such.
    pub async fn resolve(&self, logical_name: &str) -> Result<SecretString, CredentialError> {
        let derived = Self::env_var_name(logical_name);
        let aliases = self
            .env_aliases
            .get(logical_name)
            .map(|v| v.as_slice())
            .unwrap_or_default();

        for env_name in std::iter::once(&derived).chain(aliases) {
            if let Some(value) = self.env.get(env_name).and_then(non_empty) {
                info!(secret = logical_name, env = %env_name, "Loaded secret from environment");
                return Ok(SecretString::new(value));
            }
        }

        let path = self.mount_dir.join(logical_name);
        if path.is_file() {
            let content = tokio::fs::read_to_string(&path).await.map_err(|source| {
                CredentialError::Io {
                    name: logical_name.to_string(),
                    source,
                }
            })?;
            if let Some(value) = non_empty(content) {
                info!(secret = logical_name, "Loaded secret from mounted file");
                return Ok(SecretString::new(value));
            }
        }

        if let Some((project, store)) = &self.remote {
            let fetched = store
                .access(project, logical_name, "latest")
                .await
                .map_err(|e| CredentialError::Remote {
                    name: logical_name.to_string(),
                    message: e.to_string(),
                })?;
            if let Some(value) = fetched.and_then(non_empty) {
                info!(secret = logical_name, "Loaded secret from secret store");
                return Ok(SecretString::new(value));
            }
        }

        Err(CredentialError::NotFound {
            name: logical_name.to_string(),
        })
    }
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubStore {
        value: Option<String>,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl RemoteSecretStore for StubStore {
        async fn access(
            &self,
            project: &str,
            name: &str,
            version: &str,
        ) -> Result<Option<String>, BoxError> {
            self.calls.lock().unwrap().push((
                project.to_string(),
                name.to_string(),
                version.to_string(),
            ));
            Ok(self.value.clone())
        }
    }

    fn empty_mount() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_env_var_name_derivation() {
        assert_eq!(
            SecretResolver::env_var_name("marketplace1-price-oxylabs-username"),
            "MARKETPLACE1_PRICE_OXYLABS_USERNAME"
        );
        assert_eq!(SecretResolver::env_var_name("api.key/v2"), "API_KEY_V2");
    }

    #[tokio::test]
    async fn test_environment_wins_and_is_trimmed() {
        let mount = empty_mount();
        std::fs::write(mount.path().join("axesso-key"), "from-file").unwrap();
        let env = HashMap::from([("AXESSO_KEY".to_string(), "from-env \n".to_string())]);

        let resolver = SecretResolver::new()
            .with_env_map(env)
            .with_mount_dir(mount.path());

        let secret = resolver.resolve("axesso-key").await.unwrap();
        assert_eq!(secret.expose(), "from-env");
    }

    #[tokio::test]
    async fn test_alias_is_checked_after_derived_name() {
        let env = HashMap::from([("OXYLABS_USERNAME".to_string(), "user".to_string())]);
        let resolver = SecretResolver::new()
            .with_env_map(env)
            .with_mount_dir(empty_mount().path())
            .with_env_alias("price-username", "OXYLABS_USERNAME");

        let secret = resolver.resolve("price-username").await.unwrap();
        assert_eq!(secret.expose(), "user");
    }

    #[tokio::test]
    async fn test_mounted_file_fallback() {
        let mount = empty_mount();
        std::fs::write(mount.path().join("axesso-key"), "file-secret\n\n").unwrap();
        let env = HashMap::from([("AXESSO_KEY".to_string(), "   ".to_string())]);

        let resolver = SecretResolver::new()
            .with_env_map(env)
            .with_mount_dir(mount.path());

        let secret = resolver.resolve("axesso-key").await.unwrap();
        assert_eq!(secret.expose(), "file-secret");
    }

    #[tokio::test]
    async fn test_remote_store_fallback() {
        let store = Arc::new(StubStore {
            value: Some("remote-secret\n".to_string()),
            calls: Mutex::new(vec![]),
        });
        let resolver = SecretResolver::new()
            .with_env_map(HashMap::new())
            .with_mount_dir(empty_mount().path())
            .with_remote("my-project", store.clone());

        let secret = resolver.resolve("axesso-key").await.unwrap();
        assert_eq!(secret.expose(), "remote-secret");

        let calls = store.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            (
                "my-project".to_string(),
                "axesso-key".to_string(),
                "latest".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_not_found_when_all_tiers_empty() {
        let store = Arc::new(StubStore {
            value: None,
            calls: Mutex::new(vec![]),
        });
        let resolver = SecretResolver::new()
            .with_env_map(HashMap::new())
            .with_mount_dir(empty_mount().path())
            .with_remote("my-project", store);

        let err = resolver.resolve("missing").await.unwrap_err();
        assert!(matches!(err, CredentialError::NotFound { ref name } if name == "missing"));
    }

    #[test]
    fn test_secret_not_in_debug_or_display() {
        let secret = SecretString::new("sk-super-secret-key");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose(), "sk-super-secret-key");
    }
}
