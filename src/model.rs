use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of harvesting work: an opaque key (ASIN, product URL, ...) and its
/// 0-based position in the resolved input list.
///
/// The position is the ownership key used to put outcomes back in input
/// order after concurrent completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub key: String,
    pub position: usize,
}

impl WorkItem {
    pub fn new(key: impl Into<String>, position: usize) -> Self {
        Self {
            key: key.into(),
            position,
        }
    }

    /// Builds positioned work items from keys, in iteration order.
    pub fn from_keys<I, S>(keys: I) -> Vec<WorkItem>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keys.into_iter()
            .enumerate()
            .map(|(position, key)| WorkItem::new(key, position))
            .collect()
    }
}

/// Result of one provider call. Exactly one exists per [`WorkItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Provider returned a well-formed response with content.
    Success { raw_payload: Value },

    /// Provider answered successfully but the payload has nothing to extract.
    EmptyContent { raw_payload: Value },

    /// Network error, non-2xx response, malformed body or worker crash.
    Failure {
        error_message: String,
        status_code: Option<u16>,
    },
}

impl FetchOutcome {
    pub fn failure(error_message: impl Into<String>) -> Self {
        FetchOutcome::Failure {
            error_message: error_message.into(),
            status_code: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchOutcome::Failure { .. })
    }
}

/// Per-row outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Ok,
    NoContent,
    Error,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Ok => "ok",
            PipelineStatus::NoContent => "no_content",
            PipelineStatus::Error => "error",
        }
    }
}

/// Values shared by every row of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetadata {
    /// Single timestamp stamped on the whole run.
    pub extracted_at: DateTime<Utc>,

    /// Category the run is tagged with (defaults to the source name).
    pub category_label: String,

    /// Optional node/segment label (e.g. a marketplace browse node).
    pub node_label: Option<String>,
}

impl RunMetadata {
    pub fn new(category_label: impl Into<String>) -> Self {
        Self {
            extracted_at: Utc::now(),
            category_label: category_label.into(),
            node_label: None,
        }
    }

    pub fn with_node_label(mut self, node_label: Option<String>) -> Self {
        self.node_label = node_label;
        self
    }

    pub fn with_extracted_at(mut self, extracted_at: DateTime<Utc>) -> Self {
        self.extracted_at = extracted_at;
        self
    }

    /// RFC 3339 with microseconds, e.g. `2024-05-01T10:00:00.000000+00:00`.
    pub fn extracted_at_string(&self) -> String {
        self.extracted_at.to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    /// `category_label` or `category_label-node_label`; used for output folders.
    pub fn output_label(&self) -> String {
        match &self.node_label {
            Some(node) => format!("{}-{}", self.category_label, node),
            None => self.category_label.clone(),
        }
    }
}

/// One flat, reportable output record.
///
/// The metadata fields are always present; provider fields are flattened
/// into the top level of the serialized object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub source_item: String,
    pub source_position: usize,
    pub extracted_at: String,
    pub pipeline_status: PipelineStatus,
    pub category_label: String,
    pub node_label: Option<String>,
    pub error_message: Option<String>,
    pub status_code: Option<u16>,

    /// Provider-specific content fields (null when not applicable)
    #[serde(flatten)]
    pub fields: Map<String, Value>,

    /// Full raw payload of the originating item, serialized as JSON text
    pub payload_raw: Option<String>,
}

/// Ordered rows of one run plus per-item outcome counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    pub rows: Vec<NormalizedRow>,

    /// Number of work items normalized
    pub items: usize,

    /// Items that ended in `error`
    pub error_items: usize,

    /// Items that ended in `no_content`
    pub no_content_items: usize,
}

impl RunResult {
    /// Items that did not produce content (`error` or `no_content`).
    pub fn problem_items(&self) -> usize {
        self.error_items + self.no_content_items
    }

    pub fn ok_items(&self) -> usize {
        self.items - self.problem_items()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_work_items_from_keys_keep_positions() {
        let items = WorkItem::from_keys(["A", "B", "C"]);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], WorkItem::new("A", 0));
        assert_eq!(items[2].position, 2);
    }

    #[test]
    fn test_pipeline_status_serialization() {
        let json = serde_json::to_string(&PipelineStatus::NoContent).unwrap();
        assert_eq!(json, "\"no_content\"");
        assert_eq!(PipelineStatus::Error.as_str(), "error");
    }

    #[test]
    fn test_row_fields_are_flattened() {
        let mut fields = Map::new();
        fields.insert("price".to_string(), Value::from(19.99));
        let row = NormalizedRow {
            source_item: "B000TEST".to_string(),
            source_position: 0,
            extracted_at: "2024-05-01T10:00:00.000000+00:00".to_string(),
            pipeline_status: PipelineStatus::Ok,
            category_label: "washers".to_string(),
            node_label: None,
            error_message: None,
            status_code: None,
            fields,
            payload_raw: Some("{}".to_string()),
        };

        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["price"], Value::from(19.99));
        assert_eq!(value["pipeline_status"], "ok");
        assert_eq!(value["source_item"], "B000TEST");
        assert!(value.get("fields").is_none());
    }

    #[test]
    fn test_run_metadata_labels() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let meta = RunMetadata::new("washers")
            .with_node_label(Some("16075991".to_string()))
            .with_extracted_at(ts);

        assert_eq!(meta.output_label(), "washers-16075991");
        assert_eq!(meta.extracted_at_string(), "2024-05-01T10:00:00.000000+00:00");
    }

    #[test]
    fn test_run_result_counts() {
        let result = RunResult {
            rows: vec![],
            items: 5,
            error_items: 1,
            no_content_items: 2,
        };
        assert_eq!(result.problem_items(), 3);
        assert_eq!(result.ok_items(), 2);
        assert!(result.is_empty());
    }
}
