use serde_json::Value;

use crate::harvest::traits::{
    apply_rules, rule_names, ExtractionContext, ExtractionStrategy, FieldRule, FieldSource,
    LeafUnit,
};
use crate::providers::oxylabs::CONTENT_POINTER;

/// Price offers of a product page.
///
/// Expands `content.pricing[]` and each offer's `delivery_options[]` into one
/// unit per (offer, delivery option). An offer without delivery options still
/// yields one unit with null delivery fields. Positions are 1-based.
pub struct PricingOffers {
    product: Vec<FieldRule>,
    offer: Vec<FieldRule>,
    delivery: Vec<FieldRule>,
}

impl PricingOffers {
    pub fn new() -> Self {
        Self {
            product: vec![
                FieldRule::pointer("asin", "/asin").or(FieldSource::SourceItem),
                FieldRule::pointer("title", "/title"),
                FieldRule::pointer("url", "/url"),
                FieldRule::pointer("review_count", "/review_count"),
            ],
            offer: vec![
                FieldRule::pointer("seller", "/seller"),
                FieldRule::pointer("price", "/price"),
                FieldRule::pointer("currency", "/currency"),
                FieldRule::pointer("price_shipping", "/price_shipping"),
                FieldRule::pointer("condition", "/condition"),
                FieldRule::pointer("rating_count", "/rating_count"),
                FieldRule::pointer("seller_id", "/seller_id"),
                FieldRule::pointer("seller_link", "/seller_link"),
                FieldRule::pointer("delivery", "/delivery"),
            ],
            delivery: vec![
                FieldRule::pointer("delivery_type", "/type"),
                FieldRule::pointer("delivery_date", "/date/by"),
            ],
        }
    }
}

impl Default for PricingOffers {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy for PricingOffers {
    fn name(&self) -> &str {
        "pricing"
    }

    fn content_fields(&self) -> Vec<&'static str> {
        rule_names(&self.product)
            .chain(rule_names(&self.offer))
            .chain(rule_names(&self.delivery))
            .chain(["offer_position", "delivery_option_position"])
            .collect()
    }

    fn extract_units(&self, payload: &Value, ctx: &ExtractionContext<'_>) -> Vec<LeafUnit> {
        let Some(content) = payload.pointer(CONTENT_POINTER) else {
            return Vec::new();
        };
        let Some(offers) = content.get("pricing").and_then(Value::as_array) else {
            return Vec::new();
        };

        let mut product = LeafUnit::new();
        apply_rules(&self.product, content, ctx, &mut product);

        let mut units = Vec::new();
        for (offer_idx, offer) in offers.iter().enumerate() {
            let deliveries: Vec<Option<&Value>> = match offer
                .get("delivery_options")
                .and_then(Value::as_array)
            {
                Some(options) if !options.is_empty() => options.iter().map(Some).collect(),
                _ => vec![None],
            };

            for (delivery_idx, delivery) in deliveries.into_iter().enumerate() {
                let mut unit = product.clone();
                apply_rules(&self.offer, offer, ctx, &mut unit);
                apply_rules(&self.delivery, delivery.unwrap_or(&Value::Null), ctx, &mut unit);
                unit.insert("offer_position".to_string(), Value::from(offer_idx + 1));
                unit.insert(
                    "delivery_option_position".to_string(),
                    delivery.map_or(Value::Null, |_| Value::from(delivery_idx + 1)),
                );
                units.push(unit);
            }
        }
        units
    }

    fn context_fields(&self, payload: &Value, ctx: &ExtractionContext<'_>) -> LeafUnit {
        let mut unit = LeafUnit::new();
        let content = payload.pointer(CONTENT_POINTER).unwrap_or(&Value::Null);
        apply_rules(&self.product, content, ctx, &mut unit);
        unit
    }
}
