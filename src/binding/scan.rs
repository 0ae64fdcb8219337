//! Binding scanner
//!
//! Produces a [`BindingTable`] snapshot from a document. The scan never fails:
//! malformed declarations become [`ScanWarning`]s and are skipped.

use std::fmt;

use tracing::{debug, warn};

use super::{attr, validate_field_name, CURRENT_PAGE};
use crate::command::{Command, Direction};
use crate::dom::{Document, NodeId};
use crate::path::{DataPath, IndexedPath};
use crate::schema::Schema;

/// Tagged form of a scalar binding path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingPath {
    /// Plain dotted path, contributes one leaf to the query
    Literal(DataPath),
    /// `arrayField.<index>.<field>`, rendered from a list fetched elsewhere
    Indexed(IndexedPath),
    /// `current_page`, computed from the pagination cursor
    CurrentPage,
}

impl BindingPath {
    pub fn parse(raw: &str) -> Result<Self, crate::error::StencilError> {
        let raw = raw.trim();
        if raw == CURRENT_PAGE {
            return Ok(BindingPath::CurrentPage);
        }
        if let Some(indexed) = IndexedPath::parse(raw) {
            return Ok(BindingPath::Indexed(indexed));
        }
        DataPath::parse(raw).map(BindingPath::Literal)
    }

    /// The path when it should be requested from the server
    pub fn literal(&self) -> Option<&DataPath> {
        match self {
            BindingPath::Literal(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for BindingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingPath::Literal(path) => write!(f, "{}", path),
            BindingPath::Indexed(path) => write!(f, "{}", path),
            BindingPath::CurrentPage => f.write_str(CURRENT_PAGE),
        }
    }
}

/// One leaf node bound to one data path
#[derive(Debug, Clone, PartialEq)]
pub struct BindingDeclaration {
    pub target: NodeId,
    pub path: BindingPath,
}

/// A container replicating its template once per array element
#[derive(Debug, Clone, PartialEq)]
pub struct LoopDeclaration {
    pub container: NodeId,
    pub array_field: String,
    pub page_size: usize,
    pub template: NodeId,
    /// Item-scoped paths bound inside the template, first-discovery order
    pub item_fields: Vec<DataPath>,
}

/// A node that triggers a command when activated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub node: NodeId,
    pub command: Command,
}

/// A declaration that was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWarning {
    pub node: NodeId,
    pub message: String,
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node #{}: {}", self.node.index(), self.message)
    }
}

/// Immutable result of one scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingTable {
    pub bindings: Vec<BindingDeclaration>,
    pub loops: Vec<LoopDeclaration>,
    pub controls: Vec<Control>,
    pub warnings: Vec<ScanWarning>,
}

impl BindingTable {
    /// Literal paths in discovery order
    pub fn literal_paths(&self) -> impl Iterator<Item = &DataPath> {
        self.bindings.iter().filter_map(|b| b.path.literal())
    }

    /// Page size driving the shared cursor (first loop wins)
    pub fn page_size(&self, default: usize) -> usize {
        self.loops.first().map(|l| l.page_size).unwrap_or(default)
    }

    pub fn command_for(&self, node: NodeId) -> Option<Command> {
        self.controls.iter().find(|c| c.node == node).map(|c| c.command)
    }

    /// Nothing would be requested from the server
    pub fn is_empty(&self) -> bool {
        self.literal_paths().next().is_none() && self.loops.is_empty()
    }
}

/// Scan a document for bindings, loops and controls
pub fn scan(doc: &Document, schema: &Schema) -> BindingTable {
    let mut table = BindingTable::default();
    let root = doc.root();

    scan_loops(doc, schema, &mut table);

    // Template and replica contents are item-scoped, never global
    let scoped: Vec<NodeId> = doc
        .descendants(root)
        .into_iter()
        .filter(|n| doc.has_attr(*n, attr::TEMPLATE) || doc.has_attr(*n, attr::REPLICATED))
        .collect();

    for node in doc.find_by_attr(root, attr::FIELD) {
        if scoped.iter().any(|s| doc.is_descendant_of(node, *s)) {
            continue;
        }
        let raw = doc.attr(node, attr::FIELD).unwrap_or_default();
        match BindingPath::parse(raw) {
            Ok(path) => {
                debug!(path = %path, node = node.index(), "Found field binding");
                table.bindings.push(BindingDeclaration { target: node, path });
            }
            Err(e) => push_warning(&mut table, node, format!("ignored binding '{}': {}", raw, e)),
        }
    }

    scan_controls(doc, &mut table);

    debug!(
        bindings = table.bindings.len(),
        loops = table.loops.len(),
        controls = table.controls.len(),
        warnings = table.warnings.len(),
        "Scan complete"
    );
    table
}

fn scan_loops(doc: &Document, schema: &Schema, table: &mut BindingTable) {
    for container in doc.find_by_attr(doc.root(), attr::LOOP) {
        let array_field = doc.attr(container, attr::LOOP).unwrap_or_default().trim().to_string();
        if let Err(e) = validate_field_name(&array_field) {
            push_warning(table, container, format!("loop skipped: {}", e));
            continue;
        }

        let Some(template) = doc.find_by_attr(container, attr::TEMPLATE).into_iter().next() else {
            push_warning(table, container, format!("loop '{}' skipped: no template", array_field));
            continue;
        };

        let Some(limit) = doc.attr(container, attr::LIMIT) else {
            push_warning(table, container, format!("loop '{}' skipped: no page size", array_field));
            continue;
        };
        let page_size = match limit.trim().parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                debug!(limit, array_field = %array_field, "Unusable page size, using default");
                schema.default_page_size
            }
        };

        let item_fields = scan_template(doc, template, table);
        debug!(array_field = %array_field, page_size, fields = item_fields.len(), "Found loop container");

        table.loops.push(LoopDeclaration {
            container,
            array_field,
            page_size,
            template,
            item_fields,
        });
    }
}

/// Item-scoped bindings of one template, de-duplicated
fn scan_template(doc: &Document, template: NodeId, table: &mut BindingTable) -> Vec<DataPath> {
    let mut fields: Vec<DataPath> = Vec::new();
    for node in doc.find_by_attr(template, attr::FIELD) {
        let raw = doc.attr(node, attr::FIELD).unwrap_or_default();
        match DataPath::parse(raw) {
            Ok(path) if !fields.contains(&path) => fields.push(path),
            Ok(_) => {}
            Err(e) => push_warning(table, node, format!("ignored item binding '{}': {}", raw, e)),
        }
    }
    fields
}

fn scan_controls(doc: &Document, table: &mut BindingTable) {
    for node in doc.find_by_attr(doc.root(), attr::REFRESH) {
        table.controls.push(Control {
            node,
            command: Command::Refresh,
        });
    }

    for node in doc.find_by_attr(doc.root(), attr::PAGINATE) {
        let value = doc.attr(node, attr::PAGINATE).unwrap_or_default();
        match value.parse::<Direction>() {
            Ok(direction) => table.controls.push(Control {
                node,
                command: Command::Paginate(direction),
            }),
            Err(e) => push_warning(table, node, e),
        }
    }
}

fn push_warning(table: &mut BindingTable, node: NodeId, message: String) {
    let warning = ScanWarning { node, message };
    warn!(%warning, "Scan warning");
    table.warnings.push(warning);
}
