//! Schema hints for a schema-less engine
//!
//! The engine never introspects the remote graph. The few things it must know
//! up front (which fields are entity relationships, which are derived
//! aggregates, how lists are ordered) live here and are loaded from config.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Page size used when a loop's limit is unparsable or no loop exists
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// A field that points at another entity and renders through its display field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    /// Cache typename of the referenced entity (e.g. "categories")
    pub typename: String,
    /// Field rendered in place of the raw reference (e.g. "name")
    pub display: String,
}

impl Relationship {
    pub fn new(typename: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            display: display.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Schema {
    /// Relationship field name → target entity
    pub relationships: BTreeMap<String, Relationship>,
    /// Field-name suffixes that mark aggregate/summary values
    pub aggregate_suffixes: Vec<String>,
    /// Root fields holding category-style summaries (evicted on invalidate)
    pub summary_fields: Vec<String>,
    /// Primary key field of every entity
    pub id_field: String,
    /// Field loop fragments are ordered by (ascending)
    pub order_by: String,
    pub default_page_size: usize,
}

impl Default for Schema {
    fn default() -> Self {
        let mut relationships = BTreeMap::new();
        relationships.insert("category".to_string(), Relationship::new("categories", "name"));

        Self {
            relationships,
            aggregate_suffixes: vec!["_aggregate".to_string()],
            summary_fields: vec!["categories".to_string()],
            id_field: "id".to_string(),
            order_by: "id".to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Schema {
    pub fn relationship(&self, field: &str) -> Option<&Relationship> {
        self.relationships.get(field)
    }

    /// Aggregates are derived server-side and can never be patched locally
    pub fn is_aggregate_field(&self, name: &str) -> bool {
        name == "aggregate" || self.aggregate_suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }

    pub fn is_summary_field(&self, name: &str) -> bool {
        self.summary_fields.iter().any(|f| f == name)
    }

    /// Typename for an object found under `field`
    ///
    /// Relationship fields name their target; anything else is typed by the
    /// field that holds it (list roots like `widgets` hold `widgets`).
    pub fn typename_for_field<'a>(&'a self, field: &'a str) -> &'a str {
        let base = field.strip_suffix("_by_pk").unwrap_or(field);
        self.relationship(base).map(|r| r.typename.as_str()).unwrap_or(base)
    }
}
