//! Per-provider payload shapes.
//!
//! Each module implements [`ExtractionStrategy`](crate::harvest::ExtractionStrategy):
//! - `pricing` - marketplace price offers, one row per offer x delivery option
//! - `details` - product detail pages, one row per product
//! - `raw` - opaque payloads kept only as `payload_raw`

pub mod details;
pub mod pricing;
pub mod raw;

pub use details::ProductDetails;
pub use pricing::PricingOffers;
pub use raw::RawPayload;

use serde::Deserialize;
use std::sync::Arc;

use crate::harvest::traits::ExtractionStrategy;

/// Configurable payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Pricing,
    ProductDetails,
    Raw,
}

impl FormatKind {
    pub fn strategy(self) -> Arc<dyn ExtractionStrategy> {
        match self {
            FormatKind::Pricing => Arc::new(PricingOffers::new()),
            FormatKind::ProductDetails => Arc::new(ProductDetails::new()),
            FormatKind::Raw => Arc::new(RawPayload),
        }
    }
}
