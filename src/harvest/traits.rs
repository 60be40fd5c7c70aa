//! Core traits and types for payload flattening.
//!
//! This module defines how raw provider payloads become flat rows:
//! - Per-provider payload shapes via [`ExtractionStrategy`]
//! - Auditable field extraction via ordered [`FieldRule`]s
//! - The evaluation context shared by both via [`ExtractionContext`]

use serde_json::{Map, Value};

use crate::model::{RunMetadata, WorkItem};

/// One leaf unit of a payload (one offer, one detail record, ...).
/// Becomes exactly one output row.
pub type LeafUnit = Map<String, Value>;

// ============================================================================
// Extraction Context
// ============================================================================

/// What a strategy may look at besides the payload itself.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    /// The item the payload was fetched for
    pub item: &'a WorkItem,

    /// Run-level labels and timestamp
    pub metadata: &'a RunMetadata,
}

// ============================================================================
// Extraction Strategy Trait
// ============================================================================

/// Provider-specific payload shape.
///
/// Implementations are pure functions of the payload: they never touch the
/// network, so they can be tested against captured responses.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one strategy serves a whole run.
///
/// # Examples
///
/// ```ignore
/// struct Titles;
///
/// impl ExtractionStrategy for Titles {
///     fn name(&self) -> &str {
///         "titles"
///     }
///
///     fn content_fields(&self) -> Vec<&'static str> {
///         vec!["title"]
///     }
///
///     fn extract_units(&self, payload: &Value, ctx: &ExtractionContext<'_>) -> Vec<LeafUnit> {
///         todo!()
///     }
/// }
/// ```
pub trait ExtractionStrategy: Send + Sync {
    /// Returns the identifier of this payload shape (e.g., `"pricing"`).
    fn name(&self) -> &str;

    /// Names of every content field a row of this shape carries.
    ///
    /// Rows that have no content (`no_content`, `error`) still carry these
    /// fields as nulls, so all rows of a run share one schema.
    fn content_fields(&self) -> Vec<&'static str>;

    /// Splits the payload into leaf units, in payload order.
    ///
    /// # Returns
    ///
    /// An empty vector when nothing is extractable; the normalizer then emits
    /// a single `no_content` row.
    fn extract_units(&self, payload: &Value, ctx: &ExtractionContext<'_>) -> Vec<LeafUnit>;

    /// Item-level fields kept on a `no_content` row (e.g. product title).
    ///
    /// Default implementation keeps nothing.
    fn context_fields(&self, _payload: &Value, _ctx: &ExtractionContext<'_>) -> LeafUnit {
        LeafUnit::new()
    }
}

// ============================================================================
// Field Rules
// ============================================================================

/// Where a field value may come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// JSON pointer relative to the rule's root object (e.g. `/date/by`)
    Pointer(&'static str),

    /// The run's category label
    CategoryLabel,

    /// The run's node label
    NodeLabel,

    /// The originating work item key
    SourceItem,
}

impl FieldSource {
    fn lookup(&self, root: &Value, ctx: &ExtractionContext<'_>) -> Value {
        match self {
            FieldSource::Pointer(ptr) => root.pointer(ptr).cloned().unwrap_or(Value::Null),
            FieldSource::CategoryLabel => Value::from(ctx.metadata.category_label.clone()),
            FieldSource::NodeLabel => ctx
                .metadata
                .node_label
                .clone()
                .map(Value::from)
                .unwrap_or(Value::Null),
            FieldSource::SourceItem => Value::from(ctx.item.key.clone()),
        }
    }
}

/// A named output field with sources tried in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub sources: Vec<FieldSource>,
}

impl FieldRule {
    /// Rule reading a single pointer.
    pub fn pointer(name: &'static str, pointer: &'static str) -> Self {
        Self {
            name,
            sources: vec![FieldSource::Pointer(pointer)],
        }
    }

    /// Adds a lower-priority fallback source.
    pub fn or(mut self, source: FieldSource) -> Self {
        self.sources.push(source);
        self
    }

    /// First non-null value among the sources, or null.
    pub fn evaluate(&self, root: &Value, ctx: &ExtractionContext<'_>) -> Value {
        self.sources
            .iter()
            .map(|source| source.lookup(root, ctx))
            .find(|value| !value.is_null())
            .unwrap_or(Value::Null)
    }
}

/// Evaluates every rule against `root` into `unit`.
pub fn apply_rules(
    rules: &[FieldRule],
    root: &Value,
    ctx: &ExtractionContext<'_>,
    unit: &mut LeafUnit,
) {
    for rule in rules {
        unit.insert(rule.name.to_string(), rule.evaluate(root, ctx));
    }
}

/// Field names of a rule list, in order.
pub fn rule_names(rules: &[FieldRule]) -> impl Iterator<Item = &'static str> + '_ {
    rules.iter().map(|rule| rule.name)
}

// ============================================================================
// Tests
// ============================================================================
