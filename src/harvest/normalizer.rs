//! Maps fetch outcomes to flat rows with a uniform status taxonomy.
//!
//! Every item yields at least one row: `ok` rows per leaf unit, otherwise a
//! single `no_content` or `error` row. Rows keep input order.

use serde_json::{json, Map, Value};

use crate::harvest::traits::{ExtractionContext, ExtractionStrategy, LeafUnit};
use crate::model::{
    FetchOutcome, NormalizedRow, PipelineStatus, RunMetadata, RunResult, WorkItem,
};

/// Normalizes `(item, outcome)` pairs into a [`RunResult`].
///
/// Pairs are processed by ascending item position, so the output order does
/// not depend on how the pairs were collected. Calling this twice on the same
/// input produces identical rows.
pub fn normalize(
    outcomes: &[(WorkItem, FetchOutcome)],
    strategy: &dyn ExtractionStrategy,
    metadata: &RunMetadata,
) -> RunResult {
    let mut ordered: Vec<&(WorkItem, FetchOutcome)> = outcomes.iter().collect();
    ordered.sort_by_key(|(item, _)| item.position);

    let base = RowBase {
        extracted_at: metadata.extracted_at_string(),
        metadata,
        empty_fields: null_fields(strategy),
    };

    let mut result = RunResult {
        items: ordered.len(),
        ..RunResult::default()
    };

    for (item, outcome) in ordered {
        let ctx = ExtractionContext { item, metadata };
        match outcome {
            FetchOutcome::Success { raw_payload } => {
                let units = strategy.extract_units(raw_payload, &ctx);
                if units.is_empty() {
                    result.no_content_items += 1;
                    result
                        .rows
                        .push(base.no_content(item, strategy, raw_payload, &ctx));
                } else {
                    let payload_raw = raw_payload.to_string();
                    for unit in units {
                        result.rows.push(base.row(
                            item,
                            PipelineStatus::Ok,
                            unit,
                            Some(payload_raw.clone()),
                        ));
                    }
                }
            }
            FetchOutcome::EmptyContent { raw_payload } => {
                result.no_content_items += 1;
                result
                    .rows
                    .push(base.no_content(item, strategy, raw_payload, &ctx));
            }
            FetchOutcome::Failure {
                error_message,
                status_code,
            } => {
                result.error_items += 1;
                let preserved = json!({ "error": error_message, "status_code": status_code });
                let mut row = base.row(
                    item,
                    PipelineStatus::Error,
                    LeafUnit::new(),
                    Some(preserved.to_string()),
                );
                row.error_message = Some(error_message.clone());
                row.status_code = *status_code;
                result.rows.push(row);
            }
        }
    }

    result
}

fn null_fields(strategy: &dyn ExtractionStrategy) -> Map<String, Value> {
    strategy
        .content_fields()
        .into_iter()
        .map(|name| (name.to_string(), Value::Null))
        .collect()
}

struct RowBase<'a> {
    extracted_at: String,
    metadata: &'a RunMetadata,
    empty_fields: Map<String, Value>,
}

impl RowBase<'_> {
    fn row(
        &self,
        item: &WorkItem,
        status: PipelineStatus,
        unit: LeafUnit,
        payload_raw: Option<String>,
    ) -> NormalizedRow {
        let mut fields = self.empty_fields.clone();
        fields.extend(unit);
        NormalizedRow {
            source_item: item.key.clone(),
            source_position: item.position,
            extracted_at: self.extracted_at.clone(),
            pipeline_status: status,
            category_label: self.metadata.category_label.clone(),
            node_label: self.metadata.node_label.clone(),
            error_message: None,
            status_code: None,
            fields,
            payload_raw,
        }
    }

    fn no_content(
        &self,
        item: &WorkItem,
        strategy: &dyn ExtractionStrategy,
        raw_payload: &Value,
        ctx: &ExtractionContext<'_>,
    ) -> NormalizedRow {
        self.row(
            item,
            PipelineStatus::NoContent,
            strategy.context_fields(raw_payload, ctx),
            Some(raw_payload.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::formats::{PricingOffers, RawPayload};
    use chrono::{Duration, TimeZone, Utc};

    fn metadata() -> RunMetadata {
        RunMetadata::new("washers")
            .with_node_label(Some("16075991".to_string()))
            .with_extracted_at(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
    }

    fn offers(n: usize) -> Value {
        let pricing: Vec<Value> = (0..n)
            .map(|i| json!({"seller": format!("Shop {i}"), "price": 10.0 + i as f64}))
            .collect();
        json!({"results": [{"content": {"title": "Washer", "pricing": pricing}}]})
    }

    fn sample_outcomes() -> Vec<(WorkItem, FetchOutcome)> {
        vec![
            (
                WorkItem::new("A", 0),
                FetchOutcome::Success {
                    raw_payload: offers(2),
                },
            ),
            (
                WorkItem::new("B", 1),
                FetchOutcome::EmptyContent {
                    raw_payload: json!({"results": []}),
                },
            ),
            (
                WorkItem::new("C", 2),
                FetchOutcome::Failure {
                    error_message: "HTTP 503: busy".to_string(),
                    status_code: Some(503),
                },
            ),
        ]
    }

    #[test]
    fn test_status_per_branch() {
        let result = normalize(&sample_outcomes(), &PricingOffers::new(), &metadata());

        let summary: Vec<_> = result
            .rows
            .iter()
            .map(|r| (r.source_item.as_str(), r.pipeline_status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A", PipelineStatus::Ok),
                ("A", PipelineStatus::Ok),
                ("B", PipelineStatus::NoContent),
                ("C", PipelineStatus::Error),
            ]
        );
        assert_eq!(result.items, 3);
        assert_eq!(result.error_items, 1);
        assert_eq!(result.no_content_items, 1);
        assert_eq!(result.ok_items(), 1);
    }

    #[test]
    fn test_metadata_on_every_row() {
        let result = normalize(&sample_outcomes(), &PricingOffers::new(), &metadata());
        for row in &result.rows {
            assert_eq!(row.extracted_at, "2024-05-01T10:00:00.000000+00:00");
            assert_eq!(row.category_label, "washers");
            assert_eq!(row.node_label.as_deref(), Some("16075991"));
            assert!(row.payload_raw.is_some());
        }
    }

    #[test]
    fn test_error_row_shape() {
        let result = normalize(&sample_outcomes(), &PricingOffers::new(), &metadata());
        let error = &result.rows[3];

        assert_eq!(error.error_message.as_deref(), Some("HTTP 503: busy"));
        assert_eq!(error.status_code, Some(503));
        assert!(error.fields.values().all(Value::is_null));
        assert!(error.fields.contains_key("seller"));

        let preserved: Value = serde_json::from_str(error.payload_raw.as_deref().unwrap()).unwrap();
        assert_eq!(preserved["error"], "HTTP 503: busy");
        assert_eq!(preserved["status_code"], 503);
    }

    #[test]
    fn test_success_without_units_is_no_content() {
        let outcomes = vec![(
            WorkItem::new("A", 0),
            FetchOutcome::Success {
                raw_payload: offers(0),
            },
        )];
        let result = normalize(&outcomes, &PricingOffers::new(), &metadata());

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].pipeline_status, PipelineStatus::NoContent);
        assert_eq!(result.rows[0].fields["title"], "Washer");
        assert_eq!(result.rows[0].fields["seller"], Value::Null);
        assert_eq!(result.no_content_items, 1);
    }

    #[test]
    fn test_rows_follow_item_position() {
        let mut outcomes = sample_outcomes();
        outcomes.reverse();
        let result = normalize(&outcomes, &PricingOffers::new(), &metadata());

        let positions: Vec<_> = result.rows.iter().map(|r| r.source_position).collect();
        assert_eq!(positions, vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_normalize_is_idempotent_except_timestamp() {
        let outcomes = sample_outcomes();
        let first = normalize(&outcomes, &PricingOffers::new(), &metadata());
        let later = metadata().with_extracted_at(metadata().extracted_at + Duration::hours(1));
        let second = normalize(&outcomes, &PricingOffers::new(), &later);

        assert_eq!(first.rows.len(), second.rows.len());
        for (a, b) in first.rows.iter().zip(&second.rows) {
            let mut b = b.clone();
            b.extracted_at = a.extracted_at.clone();
            assert_eq!(
                serde_json::to_string(a).unwrap(),
                serde_json::to_string(&b).unwrap()
            );
        }
    }

    #[test]
    fn test_raw_strategy_keeps_payload() {
        let payload = json!({"title": "Toaster", "price": {"value": 20}});
        let outcomes = vec![(
            WorkItem::new("https://shop.example/p/1", 0),
            FetchOutcome::Success {
                raw_payload: payload.clone(),
            },
        )];
        let result = normalize(&outcomes, &RawPayload, &metadata());

        assert_eq!(result.rows.len(), 1);
        assert!(result.rows[0].fields.is_empty());
        let kept: Value = serde_json::from_str(result.rows[0].payload_raw.as_deref().unwrap()).unwrap();
        assert_eq!(kept, payload);
    }
}
