//! Query documents and synthesis from a binding table

use std::fmt;

use serde_json::Value;
use tracing::{debug, instrument};

use super::structure::{QueryStructure, Selection};
use super::syntax;
use crate::binding::BindingTable;
use crate::error::StencilError;
use crate::pagination::Pagination;
use crate::path::DataPath;
use crate::schema::Schema;

/// Operation name of every synthesized read
pub const GENERATED_QUERY_NAME: &str = "StencilGeneratedQuery";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Mutation,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Query => f.write_str("query"),
            Operation::Mutation => f.write_str("mutation"),
        }
    }
}

/// One top-level field of an operation
#[derive(Debug, Clone, PartialEq)]
pub struct RootField {
    pub name: String,
    /// Rendered argument list without parentheses
    pub arguments: Option<String>,
    pub selection: Selection,
}

impl RootField {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: None,
            selection: Selection::Leaf,
        }
    }

    pub fn nested(name: impl Into<String>, arguments: Option<String>, selection: QueryStructure) -> Self {
        Self {
            name: name.into(),
            arguments,
            selection: Selection::Nested(selection),
        }
    }

    /// Cache identity: the field name plus its arguments
    pub fn signature(&self) -> String {
        match &self.arguments {
            Some(args) => format!("{}({})", self.name, args),
            None => self.name.clone(),
        }
    }

    fn write_text(&self, out: &mut String) {
        out.push_str("  ");
        out.push_str(&self.signature());
        match &self.selection {
            Selection::Leaf => out.push('\n'),
            Selection::Nested(child) => {
                out.push_str(" {\n");
                out.push_str(&child.to_query_text(2));
                out.push_str("  }\n");
            }
        }
    }
}

/// A rendered, syntax-checked operation
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDocument {
    pub operation: Operation,
    pub name: String,
    pub root_fields: Vec<RootField>,
    text: String,
}

impl QueryDocument {
    /// Render and check an operation
    pub fn new(
        operation: Operation,
        name: impl Into<String>,
        root_fields: Vec<RootField>,
    ) -> Result<Self, StencilError> {
        let name = name.into();
        if root_fields.is_empty() {
            return Err(StencilError::Synthesis {
                details: format!("operation '{}' selects no fields", name),
            });
        }

        let mut text = format!("{} {} {{\n", operation, name);
        for field in &root_fields {
            field.write_text(&mut text);
        }
        text.push_str("}\n");

        syntax::check(&text)?;

        Ok(Self {
            operation,
            name,
            root_fields,
            text,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for QueryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Render a JSON value as a graph-query literal
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // JSON string escaping is valid graph-query string escaping
        Value::String(_) => value.to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, literal(v))).collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// Selection requested for every replicated item of a loop
///
/// Bare relationship fields expand to their display field, and the id is
/// always present so entities can be normalized in the cache.
pub fn loop_selection(item_fields: &[DataPath], schema: &Schema) -> QueryStructure {
    let mut structure = QueryStructure::new();
    for path in item_fields {
        match path.as_single_field().and_then(|f| schema.relationship(f).map(|r| (f, r))) {
            Some((field, rel)) => structure.insert_names(&[field.to_string(), rel.display.clone()]),
            None => structure.insert_path(path),
        }
    }
    structure.ensure_leading_leaf(&schema.id_field);
    structure
}

/// Build the query for one pipeline cycle
///
/// Loop fragments come first, then the scalar structure. Every object
/// selection also asks for `__typename` so the cache keys entities by type.
/// Returns `Ok(None)` when nothing in the table needs the server.
#[instrument(skip_all, fields(offset = pagination.offset()))]
pub fn synthesize(
    table: &BindingTable,
    pagination: &Pagination,
    schema: &Schema,
) -> Result<Option<QueryDocument>, StencilError> {
    if table.is_empty() {
        debug!("No queryable bindings");
        return Ok(None);
    }

    let mut root_fields: Vec<RootField> = Vec::new();

    for lp in &table.loops {
        let arguments = format!(
            "limit: {}, offset: {}, order_by: {{{}: asc}}",
            lp.page_size,
            pagination.offset(),
            schema.order_by
        );
        let selection = loop_selection(&lp.item_fields, schema);

        // Two containers over the same page share one fragment
        let existing = root_fields
            .iter_mut()
            .find(|f| f.name == lp.array_field && f.arguments.as_deref() == Some(arguments.as_str()));
        match existing {
            Some(RootField {
                selection: Selection::Nested(current),
                ..
            }) => current.merge(&selection),
            _ => root_fields.push(RootField::nested(&lp.array_field, Some(arguments), selection)),
        }
    }

    for field in &mut root_fields {
        if let Selection::Nested(selection) = &mut field.selection {
            selection.add_typename();
        }
    }

    let mut scalars = QueryStructure::from_paths(table.literal_paths());
    scalars.add_typename_to_children();
    for (name, selection) in scalars.entries() {
        root_fields.push(RootField {
            name: name.clone(),
            arguments: None,
            selection: selection.clone(),
        });
    }

    let doc = QueryDocument::new(Operation::Query, GENERATED_QUERY_NAME, root_fields)?;
    debug!(query = %doc.text(), "Generated query");
    Ok(Some(doc))
}
