use crate::model::{FetchOutcome, WorkItem};
use crate::traits::{Credentials, ProviderAdapter};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, TryFromFloatSecsError};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, instrument, warn};

/// Randomized politeness delay applied after each provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleRange {
    min: Duration,
    max: Duration,
}

impl ThrottleRange {
    /// Creates a range; bounds given in the wrong order are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Creates a range from fractional seconds. Negative values clamp to
    /// zero; NaN, infinite and out-of-range values are rejected.
    pub fn from_secs_f64(min: f64, max: f64) -> Result<Self, TryFromFloatSecsError> {
        let to_duration = |secs: f64| {
            if secs <= 0.0 {
                Ok(Duration::ZERO)
            } else {
                Duration::try_from_secs_f64(secs)
            }
        };
        Ok(Self::new(to_duration(min)?, to_duration(max)?))
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draws a uniformly random delay within `[min, max]`.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rand::rng().random_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max)
            .clamp(self.min, self.max)
    }
}

impl Default for ThrottleRange {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(200))
    }
}

enum Slot {
    Running(JoinHandle<FetchOutcome>),
    Settled(FetchOutcome),
}

/// Drives a provider adapter over a list of work items with bounded concurrency.
///
/// At most `concurrency` items are in flight at once. Admission happens in the
/// submission loop, so submitting item `concurrency + 1` waits until a worker
/// frees its slot. A slot is only freed after the post-call throttle sleep.
/// Outcomes are returned in input order regardless of completion order.
pub struct HarvestScheduler {
    concurrency: usize,
    throttle: ThrottleRange,
    progress_every: usize,
}

impl HarvestScheduler {
    /// Creates a scheduler. A concurrency of zero is clamped to one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            throttle: ThrottleRange::none(),
            progress_every: 20,
        }
    }

    /// Changes the worker count, keeping every other setting.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleRange) -> Self {
        self.throttle = throttle;
        self
    }

    /// Logs progress every `every` completions (and on the last one).
    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn throttle(&self) -> ThrottleRange {
        self.throttle
    }

    pub fn progress_every(&self) -> usize {
        self.progress_every
    }

    /// Fetches every item once and returns `(item, outcome)` pairs in the
    /// order of `items`.
    ///
    /// No item is dropped: a worker that panics or is cancelled is reported
    /// as [`FetchOutcome::Failure`] carrying the panic message.
    #[instrument(
        skip_all,
        fields(items = items.len(), concurrency = self.concurrency, provider = adapter.provider_id())
    )]
    pub async fn run<A>(
        &self,
        items: &[WorkItem],
        adapter: Arc<A>,
        credentials: Arc<Credentials>,
    ) -> Vec<(WorkItem, FetchOutcome)>
    where
        A: ProviderAdapter + ?Sized + 'static,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut slots = Vec::with_capacity(total);

        info!("Starting harvest of {} items", total);

        for item in items {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    slots.push(Slot::Settled(FetchOutcome::failure(format!(
                        "Semaphore error: {}",
                        e
                    ))));
                    continue;
                }
            };

            let adapter = Arc::clone(&adapter);
            let credentials = Arc::clone(&credentials);
            let completed = Arc::clone(&completed);
            let throttle = self.throttle;
            let progress_every = self.progress_every;
            let item = item.clone();

            slots.push(Slot::Running(tokio::spawn(async move {
                let _permit = permit;

                let outcome = adapter.fetch(&item, &credentials).await;
                if let FetchOutcome::Failure {
                    error_message,
                    status_code,
                } = &outcome
                {
                    warn!(
                        provider = adapter.provider_id(),
                        item = %item.key,
                        position = item.position,
                        status_code = ?status_code,
                        "Fetch failed: {}",
                        error_message
                    );
                }

                tokio::time::sleep(throttle.sample()).await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if done % progress_every == 0 || done == total {
                    info!(completed = done, total, "Processed {}/{} items", done, total);
                }
                outcome
            })));
        }

        let mut results = Vec::with_capacity(total);
        for (item, slot) in items.iter().zip(slots) {
            let outcome = match slot {
                Slot::Settled(outcome) => outcome,
                Slot::Running(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let message = join_error_message(e);
                        warn!(item = %item.key, position = item.position, "Worker crashed: {}", message);
                        FetchOutcome::failure(message)
                    }
                },
            };
            results.push((item.clone(), outcome));
        }

        results
    }
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("Worker cancelled: {}", err);
    }
    let panic = err.into_panic();
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("Worker panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("Worker panicked: {}", msg)
    } else {
        "Worker panicked".to_string()
    }
}
