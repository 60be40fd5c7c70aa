use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use listing_harvester::job::{run_job, JobOptions, JobReport, DEFAULT_LOCAL_DIR};

/// Harvest marketplace listings for a configured source.
#[derive(Parser, Debug)]
#[command(name = "listing-harvester", version, about)]
struct Cli {
    /// Source name in sources.yaml (e.g. marketplace1_price_listing)
    source_name: String,

    /// Override category label for tagging output and filenames
    #[arg(long)]
    category_label: Option<String>,

    /// Optional node/segment label appended to the category
    #[arg(long)]
    node_label: Option<String>,

    /// Object URI (gs://bucket/path) of a text file with one item per line
    #[arg(long)]
    input_file_gcs: Option<String>,

    /// Local file with one item per line; '-' reads stdin
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Warehouse table in project.dataset.table format
    #[arg(long)]
    bq_table: Option<String>,

    /// Column to read from the warehouse table
    #[arg(long)]
    bq_column: Option<String>,

    /// Optional WHERE clause (without 'WHERE')
    #[arg(long)]
    bq_where: Option<String>,

    /// Deduplicate warehouse values
    #[arg(long)]
    bq_distinct: bool,

    /// Cap on items to process (0 means no cap)
    #[arg(long)]
    max_items: Option<usize>,

    /// Number of concurrent provider requests
    #[arg(long)]
    max_workers: Option<usize>,

    /// Save locally instead of uploading
    #[arg(long)]
    no_upload: bool,

    /// Local output directory used with --no-upload
    #[arg(long, default_value = DEFAULT_LOCAL_DIR)]
    local_dir: PathBuf,

    /// Directory holding gcp_config.yaml and sources.yaml
    #[arg(long, default_value = listing_harvester::config::DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,
}

impl From<Cli> for JobOptions {
    fn from(cli: Cli) -> Self {
        JobOptions {
            source_name: cli.source_name,
            category_label: cli.category_label,
            node_label: cli.node_label,
            input_file: cli.input_file,
            input_file_gcs: cli.input_file_gcs,
            bq_table: cli.bq_table,
            bq_column: cli.bq_column,
            bq_where: cli.bq_where,
            bq_distinct: cli.bq_distinct,
            max_items: cli.max_items,
            max_workers: cli.max_workers,
            no_upload: cli.no_upload,
            local_dir: cli.local_dir,
            config_dir: cli.config_dir,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = JobOptions::from(Cli::parse());
    match run_job(&options).await {
        Ok(JobReport::Skipped { source_name }) => {
            tracing::info!(source = %source_name, "Nothing to do");
            Ok(())
        }
        Ok(JobReport::Completed { location, stats }) => {
            tracing::info!(
                location = %location,
                rows = stats.rows,
                errors = stats.error_items,
                no_content = stats.no_content_items,
                "Harvest summary"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Job failed");
            Err(e.into())
        }
    }
}
