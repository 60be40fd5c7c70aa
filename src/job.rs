//! One harvest job, end to end: configuration, credentials, input, fetch,
//! normalize and write.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::{
    ConfigError, FormatDefaults, GcpConfig, SourceConfig, SourceParameters, SourcesConfig,
    DEFAULT_AXESSO_API_KEY_SECRET, DEFAULT_BQ_COLUMN, DEFAULT_CONFIG_DIR,
    DEFAULT_OXYLABS_PASSWORD_SECRET, DEFAULT_OXYLABS_USERNAME_SECRET,
    DEFAULT_PROGRESS_EVERY, DEFAULT_REQUEST_TIMEOUT_SECONDS, GCP_CONFIG_FILE, SOURCES_FILE,
};
use crate::executor::ThrottleRange;
use crate::gcp::{BigQueryClient, GcpAuth, GcsClient, SecretManagerClient};
use crate::harvest::{FormatKind, HarvestPipeline, HarvestStats, PipelineError};
use crate::input::{InputError, InputResolver, InputSource, WarehouseQuery};
use crate::model::RunMetadata;
use crate::providers::{self, oxylabs, AxessoAdapter, OxylabsAdapter, ProviderKind};
use crate::secrets::SecretResolver;
use crate::sink::{output_file_name, LocalSink, ObjectStoreSink, Sink};
use crate::storage::ObjectStore;
use crate::traits::{Credentials, ProviderAdapter};

pub const DEFAULT_LOCAL_DIR: &str = "local_output";

/// Command-line overrides for one job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub source_name: String,
    pub category_label: Option<String>,
    pub node_label: Option<String>,
    pub input_file: Option<PathBuf>,
    pub input_file_gcs: Option<String>,
    pub bq_table: Option<String>,
    pub bq_column: Option<String>,
    pub bq_where: Option<String>,
    pub bq_distinct: bool,
    pub max_items: Option<usize>,
    pub max_workers: Option<usize>,
    pub no_upload: bool,
    pub local_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl JobOptions {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            category_label: None,
            node_label: None,
            input_file: None,
            input_file_gcs: None,
            bq_table: None,
            bq_column: None,
            bq_where: None,
            bq_distinct: false,
            max_items: None,
            max_workers: None,
            no_upload: false,
            local_dir: PathBuf::from(DEFAULT_LOCAL_DIR),
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
        }
    }
}

/// Logical secret names a provider needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialNames {
    Basic { username: String, password: String },
    ApiKey(String),
}

/// Fully resolved job settings: options over source parameters over defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    pub provider: ProviderKind,
    pub format: FormatKind,
    pub endpoint: String,
    pub oxylabs_source: String,
    pub domain: String,
    pub category_label: String,
    pub node_label: Option<String>,
    pub throttle: ThrottleRange,
    pub max_workers: usize,
    pub progress_every: usize,
    pub max_items: Option<usize>,
    pub input: InputSource,
    pub request_timeout: Duration,
    pub credentials: CredentialNames,
    pub gcs_bucket: Option<String>,
}

impl JobSettings {
    /// Merges `options` over `params`.
    ///
    /// # Errors
    ///
    /// Missing or invalid provider parameters, conflicting input flags and a
    /// missing input source are all [`PipelineError::Configuration`]-class
    /// errors.
    pub fn resolve(params: &SourceParameters, options: &JobOptions) -> Result<Self, PipelineError> {
        let provider = params.provider.unwrap_or(ProviderKind::Oxylabs);
        let format = params.format.unwrap_or(match provider {
            ProviderKind::Oxylabs => FormatKind::Pricing,
            ProviderKind::Axesso => FormatKind::Raw,
        });
        let defaults = FormatDefaults::for_format(format);

        let (endpoint, domain, credentials) = match provider {
            ProviderKind::Oxylabs => {
                let domain = SourceParameters::required(&params.domain, "domain")?;
                let credentials = CredentialNames::Basic {
                    username: params
                        .username_secret_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_OXYLABS_USERNAME_SECRET.to_string()),
                    password: params
                        .password_secret_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_OXYLABS_PASSWORD_SECRET.to_string()),
                };
                let endpoint = params
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| oxylabs::DEFAULT_ENDPOINT.to_string());
                (endpoint, domain.to_string(), credentials)
            }
            ProviderKind::Axesso => {
                let endpoint = SourceParameters::required(&params.endpoint, "endpoint")?;
                let credentials = CredentialNames::ApiKey(
                    params
                        .api_key_secret_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_AXESSO_API_KEY_SECRET.to_string()),
                );
                (
                    endpoint.to_string(),
                    params.domain.clone().unwrap_or_default(),
                    credentials,
                )
            }
        };

        let throttle = ThrottleRange::from_secs_f64(
            params
                .throttle_min_seconds
                .unwrap_or(defaults.throttle_min_seconds),
            params
                .throttle_max_seconds
                .unwrap_or(defaults.throttle_max_seconds),
        )
        .map_err(|e| ConfigError::InvalidParameter {
            name: "throttle_min_seconds/throttle_max_seconds",
            message: e.to_string(),
        })?;
        let max_workers = options
            .max_workers
            .filter(|&n| n > 0)
            .or(params.max_workers.filter(|&n| n > 0))
            .unwrap_or(defaults.max_workers);

        Ok(Self {
            provider,
            format,
            endpoint,
            oxylabs_source: params
                .source
                .clone()
                .unwrap_or_else(|| defaults.oxylabs_source.to_string()),
            domain,
            category_label: options
                .category_label
                .clone()
                .or_else(|| params.category_label.clone())
                .unwrap_or_else(|| options.source_name.clone()),
            node_label: options
                .node_label
                .clone()
                .or_else(|| params.node_label.clone()),
            throttle,
            max_workers,
            progress_every: params
                .progress_every
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_PROGRESS_EVERY),
            max_items: options.max_items.or(params.max_items),
            input: select_input(params, options, provider)?,
            request_timeout: Duration::from_secs(
                params
                    .request_timeout_seconds
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            ),
            credentials,
            gcs_bucket: params.gcs_bucket_name.clone(),
        })
    }

    pub fn metadata(&self) -> RunMetadata {
        RunMetadata::new(self.category_label.clone()).with_node_label(self.node_label.clone())
    }
}

/// At most one input flag; with none, the configured warehouse table is used.
fn select_input(
    params: &SourceParameters,
    options: &JobOptions,
    provider: ProviderKind,
) -> Result<InputSource, InputError> {
    let default_column = match provider {
        ProviderKind::Oxylabs => DEFAULT_BQ_COLUMN,
        ProviderKind::Axesso => "url",
    };
    let flags = [
        options.input_file.is_some(),
        options.input_file_gcs.is_some(),
        options.bq_table.is_some(),
    ];
    let warehouse = options
        .bq_table
        .clone()
        .or_else(|| {
            if flags.iter().any(|&f| f) {
                None
            } else {
                params.bq_table.clone()
            }
        })
        .map(|table| WarehouseQuery {
            table,
            column: options
                .bq_column
                .clone()
                .or_else(|| params.bq_column.clone())
                .unwrap_or_else(|| default_column.to_string()),
            predicate: options.bq_where.clone().or_else(|| params.bq_where.clone()),
            distinct: options.bq_distinct || params.bq_distinct,
        });

    InputSource::select(
        options.input_file.clone(),
        options.input_file_gcs.as_deref(),
        warehouse,
    )
}

/// What a finished job reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum JobReport {
    /// The source is disabled in `sources.yaml`.
    Skipped { source_name: String },
    Completed {
        location: String,
        stats: HarvestStats,
    },
}

/// Runs the job named by `options.source_name`.
#[instrument(skip_all, fields(source = %options.source_name))]
pub async fn run_job(options: &JobOptions) -> Result<JobReport, PipelineError> {
    let sources = SourcesConfig::load(options.config_dir.join(SOURCES_FILE))?;
    let source: &SourceConfig = sources.find(&options.source_name)?;
    if !source.enabled {
        warn!("Source '{}' is disabled. Exiting.", options.source_name);
        return Ok(JobReport::Skipped {
            source_name: options.source_name.clone(),
        });
    }

    let gcp = GcpConfig::load(options.config_dir.join(GCP_CONFIG_FILE))?;
    let settings = JobSettings::resolve(&source.parameters, options)?;

    let client = providers::http_client(settings.request_timeout)
        .map_err(|e| PipelineError::Configuration(e.to_string()))?;
    let auth = Arc::new(GcpAuth::from_env(client.clone()));
    let gcs: Arc<dyn ObjectStore> = Arc::new(GcsClient::new(client.clone(), auth.clone()));

    let metadata = settings.metadata();
    let sink: Box<dyn Sink> = if options.no_upload {
        Box::new(LocalSink::new(options.local_dir.clone()))
    } else {
        let bucket = settings.gcs_bucket.clone().ok_or_else(|| {
            PipelineError::Configuration("gcs_bucket_name missing in source parameters".to_string())
        })?;
        Box::new(ObjectStoreSink::new(gcs.clone(), bucket, metadata.output_label()))
    };

    let mut resolver = SecretResolver::new();
    if let Some(project) = &gcp.project_id {
        resolver = resolver.with_remote(
            project.clone(),
            Arc::new(SecretManagerClient::new(client.clone(), auth.clone())),
        );
    }
    let credentials = resolve_credentials(resolver, &settings.credentials).await?;

    let mut inputs = InputResolver::new().with_object_store(gcs);
    if let Some(project) = &gcp.project_id {
        inputs = inputs.with_warehouse(Arc::new(BigQueryClient::new(
            client.clone(),
            auth.clone(),
            project.clone(),
        )));
    }
    let items = inputs.resolve(&settings.input, settings.max_items).await?;
    if items.is_empty() {
        return Err(PipelineError::Configuration(
            "no inputs to process".to_string(),
        ));
    }

    let adapter: Arc<dyn ProviderAdapter> = match settings.provider {
        ProviderKind::Oxylabs => Arc::new(OxylabsAdapter::new(
            client.clone(),
            settings.endpoint.clone(),
            settings.oxylabs_source.clone(),
            settings.domain.clone(),
        )),
        ProviderKind::Axesso => Arc::new(AxessoAdapter::new(client.clone(), settings.endpoint.clone())),
    };

    info!(
        items = items.len(),
        workers = settings.max_workers,
        provider = adapter.provider_id(),
        "Processing items"
    );

    let result = HarvestPipeline::new(adapter, settings.format.strategy())
        .with_concurrency(settings.max_workers)
        .with_throttle(settings.throttle)
        .with_progress_every(settings.progress_every)
        .execute(&items, credentials, &metadata)
        .await?;

    let location = sink
        .write(&output_file_name(Utc::now()), &result.run.rows)
        .await?;

    info!(location = %location, "Job completed");
    Ok(JobReport::Completed {
        location,
        stats: result.stats,
    })
}

/// Resolves the secrets named in `names` into provider credentials.
pub async fn resolve_credentials(
    resolver: SecretResolver,
    names: &CredentialNames,
) -> Result<Credentials, PipelineError> {
    match names {
        CredentialNames::Basic { username, password } => {
            let resolver = oxylabs::register_env_aliases(resolver, username, password);
            Ok(Credentials::Basic {
                username: resolver.resolve(username).await?,
                password: resolver.resolve(password).await?,
            })
        }
        CredentialNames::ApiKey(name) => Ok(Credentials::ApiKey(resolver.resolve(name).await?)),
    }
}
