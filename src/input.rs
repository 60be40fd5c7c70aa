//! Input resolution: turns exactly one configured source into an ordered list
//! of [`WorkItem`]s.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::model::WorkItem;
use crate::storage::{BoxError, ObjectStore, ObjectUri, UriError};

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Provide only one input source (got: {0})")]
    ConflictingSources(String),
    #[error("No input source configured")]
    NoSource,
    #[error("Input configuration invalid: {0}")]
    Invalid(String),
    #[error(transparent)]
    Uri(#[from] UriError),
    #[error("Input source '{source_name}' unreachable: {message}")]
    Unreachable {
        source_name: String,
        message: String,
    },
}

/// Parameters of a warehouse read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseQuery {
    pub table: String,
    pub column: String,
    pub predicate: Option<String>,
    pub distinct: bool,
}

/// The single source items are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    LocalFile(PathBuf),
    Stdin,
    Object(ObjectUri),
    Warehouse(WarehouseQuery),
}

impl InputSource {
    /// Picks the one configured source.
    ///
    /// A local path of `-` selects standard input.
    ///
    /// # Errors
    ///
    /// [`InputError::ConflictingSources`] when more than one is given,
    /// [`InputError::NoSource`] when none is.
    pub fn select(
        local_file: Option<PathBuf>,
        object_uri: Option<&str>,
        warehouse: Option<WarehouseQuery>,
    ) -> Result<Self, InputError> {
        let mut given = Vec::new();
        if local_file.is_some() {
            given.push("local file");
        }
        if object_uri.is_some() {
            given.push("object uri");
        }
        if warehouse.is_some() {
            given.push("warehouse table");
        }
        if given.len() > 1 {
            return Err(InputError::ConflictingSources(given.join(", ")));
        }

        if let Some(path) = local_file {
            if path.as_os_str() == "-" {
                return Ok(InputSource::Stdin);
            }
            return Ok(InputSource::LocalFile(path));
        }
        if let Some(uri) = object_uri {
            return Ok(InputSource::Object(uri.parse()?));
        }
        if let Some(query) = warehouse {
            return Ok(InputSource::Warehouse(query));
        }
        Err(InputError::NoSource)
    }

    fn describe(&self) -> String {
        match self {
            InputSource::LocalFile(path) => path.display().to_string(),
            InputSource::Stdin => "stdin".to_string(),
            InputSource::Object(uri) => uri.to_string(),
            InputSource::Warehouse(q) => format!("{}.{}", q.table, q.column),
        }
    }
}

/// Analytical warehouse seam (e.g. BigQuery).
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Runs `sql` and returns the single `val` column, nulls included.
    async fn query_column(&self, sql: &str) -> Result<Vec<Option<String>>, BoxError>;
}

/// Builds `SELECT [DISTINCT] <column> AS val FROM `<table>` [WHERE ..] [LIMIT n]`.
pub fn build_warehouse_query(
    query: &WarehouseQuery,
    max_items: Option<usize>,
) -> Result<String, InputError> {
    let table = query.table.trim();
    let column = query.column.trim();
    if table.is_empty() {
        return Err(InputError::Invalid("warehouse table not specified".into()));
    }
    if column.is_empty() {
        return Err(InputError::Invalid("warehouse column not specified".into()));
    }

    let mut sql = if query.distinct {
        format!("SELECT DISTINCT {} AS val FROM `{}`", column, table)
    } else {
        format!("SELECT {} AS val FROM `{}`", column, table)
    };
    if let Some(predicate) = query.predicate.as_deref().map(str::trim) {
        if !predicate.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
    }
    if let Some(limit) = effective_cap(max_items) {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    Ok(sql)
}

/// Trimmed non-empty lines in order, stopping at the cap.
pub fn read_lines(text: &str, max_items: Option<usize>) -> Vec<String> {
    let cap = effective_cap(max_items).unwrap_or(usize::MAX);
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(cap)
        .map(str::to_string)
        .collect()
}

// A cap of zero means "no cap".
fn effective_cap(max_items: Option<usize>) -> Option<usize> {
    max_items.filter(|&n| n > 0)
}

#[derive(Default)]
pub struct InputResolver {
    object_store: Option<Arc<dyn ObjectStore>>,
    warehouse: Option<Arc<dyn Warehouse>>,
}

impl InputResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn with_warehouse(mut self, warehouse: Arc<dyn Warehouse>) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    /// Reads the source and returns positioned work items.
    ///
    /// # Errors
    ///
    /// Any failure here is a configuration error that aborts the run: the
    /// source is unreachable, or the needed client/table/column is missing.
    pub async fn resolve(
        &self,
        source: &InputSource,
        max_items: Option<usize>,
    ) -> Result<Vec<WorkItem>, InputError> {
        let unreachable = |message: String| InputError::Unreachable {
            source_name: source.describe(),
            message,
        };

        let keys = match source {
            InputSource::LocalFile(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| unreachable(e.to_string()))?;
                read_lines(&text, max_items)
            }
            InputSource::Stdin => {
                let mut text = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut text)
                    .await
                    .map_err(|e| unreachable(e.to_string()))?;
                read_lines(&text, max_items)
            }
            InputSource::Object(uri) => {
                let store = self
                    .object_store
                    .as_ref()
                    .ok_or_else(|| InputError::Invalid("no object store configured".into()))?;
                let text = store
                    .get_text(uri)
                    .await
                    .map_err(|e| unreachable(e.to_string()))?;
                read_lines(&text, max_items)
            }
            InputSource::Warehouse(query) => {
                let warehouse = self
                    .warehouse
                    .as_ref()
                    .ok_or_else(|| InputError::Invalid("no warehouse configured".into()))?;
                let sql = build_warehouse_query(query, max_items)?;
                info!(sql = %sql, "Running warehouse query");
                let values = warehouse
                    .query_column(&sql)
                    .await
                    .map_err(|e| unreachable(e.to_string()))?;
                collect_values(values, query.distinct, max_items)
            }
        };

        info!(source = %source.describe(), items = keys.len(), "Resolved input items");
        Ok(WorkItem::from_keys(keys))
    }
}

fn collect_values(
    values: Vec<Option<String>>,
    distinct: bool,
    max_items: Option<usize>,
) -> Vec<String> {
    let cap = effective_cap(max_items).unwrap_or(usize::MAX);
    let mut seen = HashSet::new();
    values
        .into_iter()
        .flatten()
        .filter(|v| !v.trim().is_empty())
        .filter(|v| !distinct || seen.insert(v.clone()))
        .take(cap)
        .collect()
}
