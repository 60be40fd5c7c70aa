use serde_json::Value;

use crate::harvest::traits::{
    apply_rules, rule_names, ExtractionContext, ExtractionStrategy, FieldRule, FieldSource,
    LeafUnit,
};
use crate::providers::is_blank;
use crate::providers::oxylabs::CONTENT_POINTER;

/// A product detail page: one unit per product.
pub struct ProductDetails {
    rules: Vec<FieldRule>,
}

impl ProductDetails {
    pub fn new() -> Self {
        Self {
            rules: vec![
                FieldRule::pointer("title", "/title"),
                FieldRule::pointer("price", "/price"),
                FieldRule::pointer("currency", "/currency"),
                FieldRule::pointer("rating", "/rating"),
                FieldRule::pointer("review_count", "/review_count"),
                FieldRule::pointer("buybox_price", "/buybox_price"),
                FieldRule::pointer("buybox_currency", "/buybox_currency"),
                FieldRule::pointer("buybox_shipping", "/buybox_shipping"),
                FieldRule::pointer("url", "/url"),
                FieldRule::pointer("brand", "/brand"),
                FieldRule::pointer("category", "/category").or(FieldSource::CategoryLabel),
            ],
        }
    }
}

impl Default for ProductDetails {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy for ProductDetails {
    fn name(&self) -> &str {
        "product_details"
    }

    fn content_fields(&self) -> Vec<&'static str> {
        rule_names(&self.rules).collect()
    }

    fn extract_units(&self, payload: &Value, ctx: &ExtractionContext<'_>) -> Vec<LeafUnit> {
        match payload.pointer(CONTENT_POINTER) {
            Some(content) if content.is_object() && !is_blank(content) => {
                let mut unit = LeafUnit::new();
                apply_rules(&self.rules, content, ctx, &mut unit);
                vec![unit]
            }
            _ => Vec::new(),
        }
    }
}
