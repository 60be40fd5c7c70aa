use serde_json::Value;

use crate::harvest::traits::{ExtractionContext, ExtractionStrategy, LeafUnit};
use crate::providers::is_blank;

/// Opaque payloads: no flattened fields, one unit per non-empty payload.
/// The content survives only as `payload_raw`.
pub struct RawPayload;

impl ExtractionStrategy for RawPayload {
    fn name(&self) -> &str {
        "raw"
    }

    fn content_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn extract_units(&self, payload: &Value, _ctx: &ExtractionContext<'_>) -> Vec<LeafUnit> {
        if is_blank(payload) {
            Vec::new()
        } else {
            vec![LeafUnit::new()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunMetadata, WorkItem};
    use serde_json::json;

    #[test]
    fn test_raw_payload_units() {
        let item = WorkItem::new("https://shop.example/p/1", 0);
        let meta = RunMetadata::new("otto");
        let ctx = ExtractionContext {
            item: &item,
            metadata: &meta,
        };

        assert_eq!(RawPayload.extract_units(&json!({"title": "x"}), &ctx).len(), 1);
        assert!(RawPayload.extract_units(&json!({}), &ctx).is_empty());
        assert!(RawPayload.extract_units(&Value::Null, &ctx).is_empty());
    }
}
