//! Oxylabs realtime scraper API.
//!
//! One `POST` per item with basic auth and a JSON body
//! `{source, domain, query, parse: true}`. Parsed content lives at
//! `results[0].content`.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{is_blank, read_json};
use crate::model::{FetchOutcome, WorkItem};
use crate::secrets::SecretResolver;
use crate::traits::{Credentials, FetchError, ProviderAdapter};

pub const DEFAULT_ENDPOINT: &str = "https://realtime.oxylabs.io/v1/queries";

/// JSON pointer of the parsed content block.
pub const CONTENT_POINTER: &str = "/results/0/content";

pub struct OxylabsAdapter {
    client: reqwest::Client,
    endpoint: String,
    source: String,
    domain: String,
}

impl OxylabsAdapter {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        source: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            source: source.into(),
            domain: domain.into(),
        }
    }

    pub fn build_payload(&self, item: &WorkItem) -> Value {
        json!({
            "source": self.source,
            "domain": self.domain,
            "query": item.key,
            "parse": true,
        })
    }

    async fn try_fetch(
        &self,
        item: &WorkItem,
        credentials: &Credentials,
    ) -> Result<Value, FetchError> {
        let Credentials::Basic { username, password } = credentials else {
            return Err(FetchError::Request(
                "Oxylabs requires username/password credentials".to_string(),
            ));
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(username.expose(), Some(password.expose()))
            .json(&self.build_payload(item))
            .send()
            .await?;

        read_json(resp).await
    }
}

/// Success when `results[0].content` is a non-empty object.
pub fn classify_payload(raw_payload: Value) -> FetchOutcome {
    let has_content = matches!(
        raw_payload.pointer(CONTENT_POINTER),
        Some(content @ Value::Object(_)) if !is_blank(content)
    );
    if has_content {
        FetchOutcome::Success { raw_payload }
    } else {
        FetchOutcome::EmptyContent { raw_payload }
    }
}

/// Registers the shared `OXYLABS_USERNAME` / `OXYLABS_PASSWORD` variables as
/// fallbacks for the given secret names.
pub fn register_env_aliases(
    resolver: SecretResolver,
    username_secret: &str,
    password_secret: &str,
) -> SecretResolver {
    let mut resolver = resolver;
    if username_secret.contains("username") {
        resolver = resolver.with_env_alias(username_secret, "OXYLABS_USERNAME");
    }
    if password_secret.contains("password") {
        resolver = resolver.with_env_alias(password_secret, "OXYLABS_PASSWORD");
    }
    resolver
}

#[async_trait]
impl ProviderAdapter for OxylabsAdapter {
    fn provider_id(&self) -> &str {
        "oxylabs"
    }

    async fn fetch(&self, item: &WorkItem, credentials: &Credentials) -> FetchOutcome {
        match self.try_fetch(item, credentials).await {
            Ok(payload) => classify_payload(payload),
            Err(e) => e.into_outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::HarvestScheduler;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn adapter() -> OxylabsAdapter {
        OxylabsAdapter::new(reqwest::Client::new(), DEFAULT_ENDPOINT, "amazon_pricing", "de")
    }

    #[test]
    fn test_build_payload() {
        let payload = adapter().build_payload(&WorkItem::new("B0TEST1234", 0));
        assert_eq!(
            payload,
            json!({
                "source": "amazon_pricing",
                "domain": "de",
                "query": "B0TEST1234",
                "parse": true,
            })
        );
    }

    #[test]
    fn test_classify_payload() {
        let ok = json!({"results": [{"content": {"asin": "B0TEST1234", "pricing": []}}]});
        assert!(matches!(classify_payload(ok), FetchOutcome::Success { .. }));

        let no_results = json!({"results": []});
        assert!(matches!(
            classify_payload(no_results),
            FetchOutcome::EmptyContent { .. }
        ));

        let null_content = json!({"results": [{"content": null}]});
        assert!(matches!(
            classify_payload(null_content),
            FetchOutcome::EmptyContent { .. }
        ));
    }

    #[tokio::test]
    async fn test_wrong_credentials_kind_is_failure() {
        let outcome = adapter()
            .fetch(&WorkItem::new("B0TEST1234", 0), &Credentials::Anonymous)
            .await;
        match outcome {
            FetchOutcome::Failure {
                error_message,
                status_code,
            } => {
                assert!(error_message.contains("username/password"));
                assert_eq!(status_code, None);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failure_logged_once_by_scheduler() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let results = HarvestScheduler::new(1)
            .run(
                &[WorkItem::new("B0TEST1234", 0)],
                Arc::new(adapter()),
                Arc::new(Credentials::Anonymous),
            )
            .await;
        assert!(results[0].1.is_failure());

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("username/password").count(), 1, "{text}");
        assert!(text.contains("Fetch failed"));
    }

    #[tokio::test]
    async fn test_env_aliases_registered() {
        let env = HashMap::from([
            ("OXYLABS_USERNAME".to_string(), "user".to_string()),
            ("OXYLABS_PASSWORD".to_string(), "pass".to_string()),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let resolver = register_env_aliases(
            SecretResolver::new()
                .with_env_map(env)
                .with_mount_dir(dir.path()),
            "price-oxylabs-username",
            "price-oxylabs-password",
        );

        let user = resolver.resolve("price-oxylabs-username").await.unwrap();
        let pass = resolver.resolve("price-oxylabs-password").await.unwrap();
        assert_eq!(user.expose(), "user");
        assert_eq!(pass.expose(), "pass");
    }
}
