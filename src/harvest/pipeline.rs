//! Harvest pipeline executor.
//!
//! This module provides the [`HarvestPipeline`] coordinator that runs one
//! harvest over already-resolved work items (Schedule → Normalize) with:
//! - Bounded concurrent fetching via [`HarvestScheduler`]
//! - Uniform row normalization via [`normalize`]
//! - Structured logging via `tracing`
//! - Loud failure on runs that produce no rows

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::executor::{HarvestScheduler, ThrottleRange};
use crate::harvest::normalizer::normalize;
use crate::harvest::traits::ExtractionStrategy;
use crate::input::InputError;
use crate::model::{RunMetadata, RunResult, WorkItem};
use crate::secrets::CredentialError;
use crate::sink::SinkError;
use crate::traits::{Credentials, ProviderAdapter};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Complete harvest result with rows and statistics.
#[derive(Debug)]
pub struct HarvestResult {
    /// Normalized rows, in input order
    pub run: RunResult,

    /// Performance and outcome statistics
    pub stats: HarvestStats,
}

/// Statistics about one harvest run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HarvestStats {
    /// Total time spent on the whole run (milliseconds)
    pub total_duration_ms: u64,

    /// Time spent fetching, throttle included (milliseconds)
    pub fetch_duration_ms: u64,

    /// Time spent normalizing (milliseconds)
    pub normalize_duration_ms: u64,

    /// Number of work items harvested
    pub items: usize,

    /// Number of rows produced
    pub rows: usize,

    /// Items that produced at least one `ok` row
    pub ok_items: usize,

    /// Items that ended in `no_content`
    pub no_content_items: usize,

    /// Items that ended in `error`
    pub error_items: usize,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that abort a run.
///
/// Per-item fetch problems never show up here; they become `error` or
/// `no_content` rows instead.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Bad or absent configuration, detected before any network activity
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration file could not be loaded
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Input source missing, conflicting or unreachable
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// A required credential could not be resolved
    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),

    /// The run produced zero rows
    #[error("No data to save: {items} items produced no rows")]
    NoOutput { items: usize },

    /// Writing the output failed
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// One provider, one payload shape, one scheduler.
///
/// # Example
///
/// ```ignore
/// use listing_harvester::harvest::HarvestPipeline;
///
/// let pipeline = HarvestPipeline::new(adapter, FormatKind::Pricing.strategy())
///     .with_concurrency(8)
///     .with_throttle(ThrottleRange::from_secs_f64(0.05, 0.2)?);
///
/// let result = pipeline.execute(&items, credentials, &metadata).await?;
/// println!("{} rows", result.stats.rows);
/// ```
pub struct HarvestPipeline {
    /// Provider the items are fetched from
    adapter: Arc<dyn ProviderAdapter>,

    /// Payload shape used for flattening
    strategy: Arc<dyn ExtractionStrategy>,

    /// Concurrency and throttle settings
    scheduler: HarvestScheduler,
}

impl HarvestPipeline {
    /// Creates a new pipeline.
    ///
    /// Default configuration:
    /// - Concurrency: 1
    /// - Throttle: none
    pub fn new(adapter: Arc<dyn ProviderAdapter>, strategy: Arc<dyn ExtractionStrategy>) -> Self {
        Self {
            adapter,
            strategy,
            scheduler: HarvestScheduler::new(1),
        }
    }

    /// Sets the number of simultaneous provider calls (clamped to at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.scheduler = self.scheduler.with_concurrency(concurrency);
        self
    }

    /// Sets how many completions pass between progress log lines.
    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.scheduler = self.scheduler.with_progress_every(every);
        self
    }

    /// Sets the post-call throttle range.
    pub fn with_throttle(mut self, throttle: ThrottleRange) -> Self {
        self.scheduler = self.scheduler.with_throttle(throttle);
        self
    }

    pub fn scheduler(&self) -> &HarvestScheduler {
        &self.scheduler
    }

    /// Harvests `items` and normalizes the outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for an empty item list and
    /// [`PipelineError::NoOutput`] when no rows were produced.
    pub async fn execute(
        &self,
        items: &[WorkItem],
        credentials: Credentials,
        metadata: &RunMetadata,
    ) -> Result<HarvestResult, PipelineError> {
        if items.is_empty() {
            return Err(PipelineError::Configuration(
                "no work items to harvest".to_string(),
            ));
        }

        let start = Instant::now();
        let mut stats = HarvestStats::default();

        info!(
            items = items.len(),
            provider = self.adapter.provider_id(),
            format = self.strategy.name(),
            concurrency = self.scheduler.concurrency(),
            "Starting fetch stage"
        );
        let fetch_start = Instant::now();
        let outcomes = self
            .scheduler
            .run(items, Arc::clone(&self.adapter), Arc::new(credentials))
            .await;
        stats.fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;

        let normalize_start = Instant::now();
        let run = normalize(&outcomes, self.strategy.as_ref(), metadata);
        stats.normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;

        if run.is_empty() {
            return Err(PipelineError::NoOutput { items: items.len() });
        }

        stats.items = run.items;
        stats.rows = run.rows.len();
        stats.ok_items = run.ok_items();
        stats.no_content_items = run.no_content_items;
        stats.error_items = run.error_items;
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            rows = stats.rows,
            ok = stats.ok_items,
            duration_ms = stats.total_duration_ms,
            "Harvest completed"
        );
        if run.problem_items() > 0 {
            warn!(
                errors = stats.error_items,
                no_content = stats.no_content_items,
                "Completed with {} items without content",
                run.problem_items()
            );
        }

        Ok(HarvestResult { run, stats })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::formats::ProductDetails;
    use crate::model::{FetchOutcome, PipelineStatus};
    use async_trait::async_trait;
    use serde_json::json;

    // Mock adapter for testing
    struct MockAdapter;

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn provider_id(&self) -> &str {
            "mock"
        }

        async fn fetch(&self, item: &WorkItem, _credentials: &Credentials) -> FetchOutcome {
            match item.key.as_str() {
                "missing" => FetchOutcome::EmptyContent {
                    raw_payload: json!({"results": []}),
                },
                "broken" => FetchOutcome::failure("connection reset"),
                key => FetchOutcome::Success {
                    raw_payload: json!({"results": [{"content": {"title": key}}]}),
                },
            }
        }
    }

    fn pipeline() -> HarvestPipeline {
        HarvestPipeline::new(Arc::new(MockAdapter), Arc::new(ProductDetails::new()))
            .with_concurrency(2)
    }

    #[tokio::test]
    async fn test_pipeline_execution() {
        let items = WorkItem::from_keys(["kettle", "missing", "broken"]);
        let result = pipeline()
            .execute(&items, Credentials::Anonymous, &RunMetadata::new("kettles"))
            .await
            .unwrap();

        assert_eq!(result.run.rows.len(), 3);
        assert_eq!(result.run.rows[0].fields["title"], "kettle");
        assert_eq!(result.run.rows[1].pipeline_status, PipelineStatus::NoContent);
        assert_eq!(result.run.rows[2].pipeline_status, PipelineStatus::Error);
    }

    #[tokio::test]
    async fn test_pipeline_stats() {
        let items = WorkItem::from_keys(["a", "b", "missing", "broken"]);
        let result = pipeline()
            .execute(&items, Credentials::Anonymous, &RunMetadata::new("kettles"))
            .await
            .unwrap();

        assert_eq!(result.stats.items, 4);
        assert_eq!(result.stats.rows, 4);
        assert_eq!(result.stats.ok_items, 2);
        assert_eq!(result.stats.no_content_items, 1);
        assert_eq!(result.stats.error_items, 1);
    }

    #[tokio::test]
    async fn test_pipeline_rejects_empty_input() {
        let err = pipeline()
            .execute(&[], Credentials::Anonymous, &RunMetadata::new("kettles"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_builder_keeps_settings() {
        let throttle = ThrottleRange::from_secs_f64(0.3, 0.8).unwrap();
        let pipeline = HarvestPipeline::new(Arc::new(MockAdapter), Arc::new(ProductDetails::new()))
            .with_progress_every(7)
            .with_throttle(throttle)
            .with_concurrency(0);

        assert_eq!(pipeline.scheduler().concurrency(), 1);
        assert_eq!(pipeline.scheduler().throttle(), throttle);
        assert_eq!(pipeline.scheduler().progress_every(), 7);
    }
}
