//! Harvest module - fetch, flatten and normalize provider payloads.
//!
//! This module provides the core abstractions for the listing harvester:
//! - **Traits**: [`ExtractionStrategy`], [`FieldRule`] for provider payload shapes
//! - **Formats**: concrete shapes in [`formats`]
//! - **Normalizer**: outcome-to-row mapping via [`normalize`]
//! - **Pipeline**: async executor via [`pipeline::HarvestPipeline`]

pub mod formats;
pub mod normalizer;
pub mod pipeline;
pub mod traits;

// Re-export commonly used types
pub use traits::{
    apply_rules, ExtractionContext, ExtractionStrategy, FieldRule, FieldSource, LeafUnit,
};

pub use formats::{FormatKind, PricingOffers, ProductDetails, RawPayload};
pub use normalizer::normalize;
pub use pipeline::{HarvestPipeline, HarvestResult, HarvestStats, PipelineError};
