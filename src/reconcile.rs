//! DOM reconciliation
//!
//! Writes one cycle's result back into the document: scalar bindings get
//! formatted text, loop containers get one replica of their template per
//! array element.

use serde_json::Value;
use tracing::{debug, warn};

use crate::binding::{attr, BindingDeclaration, BindingPath, LoopDeclaration};
use crate::dom::{Document, NodeId};
use crate::pagination::Pagination;
use crate::path::{resolve, resolve_indexed, resolve_item, DataPath, Resolved};
use crate::schema::Schema;

/// Text written when a bound path has no value
pub const PLACEHOLDER: &str = "N/A";

/// What one reconciliation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Scalar nodes written with a resolved value
    pub scalars: usize,
    /// Nodes (scalar or inside replicas) that got the placeholder
    pub placeholders: usize,
    pub replicas: usize,
    /// Loops left untouched because their result was not an array
    pub skipped_loops: usize,
}

/// Display text for a resolved value; `None` for null
pub fn format_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) => format!("{:.2}", f),
            None => n.to_string(),
        }),
        Value::Bool(true) => Some("Yes".to_string()),
        Value::Bool(false) => Some("No".to_string()),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Write formatted text or the placeholder; returns whether a value was found
fn write_resolved(doc: &mut Document, node: NodeId, resolved: Resolved<'_>, path: &dyn std::fmt::Display) -> bool {
    match resolved.value().and_then(format_value) {
        Some(text) => {
            doc.set_text_content(node, text);
            true
        }
        None => {
            warn!(path = %path, node = node.index(), "No value for bound path");
            doc.set_text_content(node, PLACEHOLDER);
            false
        }
    }
}

/// Render every scalar binding against the whole result
pub fn apply_scalars(
    doc: &mut Document,
    bindings: &[BindingDeclaration],
    result: &Value,
    pagination: &Pagination,
    page_size: usize,
    schema: &Schema,
) -> RenderReport {
    let mut report = RenderReport::default();

    for binding in bindings {
        if !doc.is_attached(binding.target) {
            debug!(node = binding.target.index(), "Skipping detached binding target");
            continue;
        }

        let found = match &binding.path {
            BindingPath::CurrentPage => {
                // Same number formatting as any other value: page 1 is "1.00"
                let page = Value::from(pagination.current_page(page_size));
                let text = format_value(&page).unwrap_or_default();
                doc.set_text_content(binding.target, text);
                true
            }
            BindingPath::Literal(path) => write_resolved(doc, binding.target, resolve(result, path), path),
            BindingPath::Indexed(path) => {
                write_resolved(doc, binding.target, resolve_indexed(result, path, schema), path)
            }
        };

        if found {
            report.scalars += 1;
        } else {
            report.placeholders += 1;
        }
    }

    report
}

/// Replace each loop's replicas with fresh copies of its template
pub fn apply_loops(doc: &mut Document, loops: &[LoopDeclaration], result: &Value, schema: &Schema) -> RenderReport {
    let mut report = RenderReport::default();

    for lp in loops {
        let items = match result.get(lp.array_field.as_str()) {
            Some(Value::Array(items)) => items,
            _ => {
                // Replicas from an earlier pass stay in place
                warn!(array = %lp.array_field, "Loop result is not an array");
                report.skipped_loops += 1;
                continue;
            }
        };

        let Some(parent) = doc.parent(lp.template).filter(|_| doc.is_attached(lp.template)) else {
            warn!(array = %lp.array_field, "Loop template is no longer in the document");
            report.skipped_loops += 1;
            continue;
        };

        for replica in doc.find_by_attr(lp.container, attr::REPLICATED) {
            if doc.is_alive(replica) {
                doc.remove(replica);
            }
        }

        doc.set_hidden(lp.template, false);

        for item in items {
            let clone = doc.deep_clone(lp.template);
            doc.set_attr(clone, attr::REPLICATED, "true");
            doc.remove_attr(clone, attr::TEMPLATE);

            let mut targets = vec![clone];
            targets.extend(doc.descendants(clone));
            for node in targets {
                let Some(raw) = doc.attr(node, attr::FIELD).map(str::to_string) else {
                    continue;
                };
                let found = match DataPath::parse(&raw) {
                    Ok(path) => write_resolved(doc, node, resolve_item(item, &path, schema), &path),
                    Err(e) => {
                        warn!(path = %raw, error = %e, "Invalid item binding");
                        doc.set_text_content(node, PLACEHOLDER);
                        false
                    }
                };
                if !found {
                    report.placeholders += 1;
                }
            }

            doc.insert_before(parent, clone, lp.template);
            report.replicas += 1;
        }

        doc.set_hidden(lp.template, true);
        debug!(array = %lp.array_field, replicas = items.len(), "Loop rendered");
    }

    report
}

/// Full reconciliation: loops first, then scalars
pub fn reconcile(
    doc: &mut Document,
    bindings: &[BindingDeclaration],
    loops: &[LoopDeclaration],
    result: &Value,
    pagination: &Pagination,
    page_size: usize,
    schema: &Schema,
) -> RenderReport {
    let looped = apply_loops(doc, loops, result, schema);
    let scalars = apply_scalars(doc, bindings, result, pagination, page_size, schema);

    RenderReport {
        scalars: scalars.scalars,
        placeholders: scalars.placeholders + looped.placeholders,
        replicas: looped.replicas,
        skipped_loops: looped.skipped_loops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::scan;
    use serde_json::json;

    fn render(html: &str, result: Value, offset: usize) -> (Document, RenderReport) {
        let mut doc = Document::parse_html(html).unwrap();
        let schema = Schema::default();
        let table = scan(&doc, &schema);
        let pagination = Pagination::at(offset);
        let page_size = table.page_size(schema.default_page_size);
        let report = reconcile(
            &mut doc,
            &table.bindings,
            &table.loops,
            &result,
            &pagination,
            page_size,
            &schema,
        );
        (doc, report)
    }

    fn texts(doc: &Document, name: &str) -> Vec<String> {
        doc.find_by_attr(doc.root(), name)
            .into_iter()
            .map(|n| doc.text_content(n))
            .collect()
    }

    // ──────────────────────────────────────────────────────────────
    // Formatting
    // ──────────────────────────────────────────────────────────────

    #[test]
    fn formats_by_type() {
        assert_eq!(format_value(&json!(9)).as_deref(), Some("9.00"));
        assert_eq!(format_value(&json!(12.345)).as_deref(), Some("12.35"));
        assert_eq!(format_value(&json!(true)).as_deref(), Some("Yes"));
        assert_eq!(format_value(&json!(false)).as_deref(), Some("No"));
        assert_eq!(format_value(&json!("Tools")).as_deref(), Some("Tools"));
        assert_eq!(format_value(&json!([1, 2])).as_deref(), Some("[1,2]"));
        assert_eq!(format_value(&json!(null)), None);
    }

    // ──────────────────────────────────────────────────────────────
    // Scalars
    // ──────────────────────────────────────────────────────────────

    #[test]
    fn widget_scenario() {
        let (doc, report) = render(
            r#"<h1 data-gql-field="name">old</h1>
               <p data-gql-field="price"></p>
               <p data-gql-field="category.name"></p>"#,
            json!({"name": "Widget A", "price": 9, "category": {"name": "Tools"}}),
            0,
        );
        assert_eq!(texts(&doc, attr::FIELD), vec!["Widget A", "9.00", "Tools"]);
        assert_eq!(report.scalars, 3);
        assert_eq!(report.placeholders, 0);
    }

    #[test]
    fn missing_value_gets_placeholder() {
        let (doc, report) = render(
            r#"<p data-gql-field="description">stale</p><p data-gql-field="note"></p>"#,
            json!({"description": null}),
            0,
        );
        assert_eq!(texts(&doc, attr::FIELD), vec![PLACEHOLDER, PLACEHOLDER]);
        assert_eq!(report.placeholders, 2);
    }

    #[test]
    fn indexed_and_current_page() {
        let (doc, _) = render(
            r#"<b data-gql-field="widgets.2.name"></b>
               <i data-gql-field="widgets.0.category"></i>
               <span data-gql-field="current_page"></span>
               <ul data-gql-loop="widgets" data-gql-limit="2"><li data-gql-template></li></ul>"#,
            json!({"widgets": [
                {"id": 1, "name": "A", "category": {"name": "Tools"}},
                {"id": 2, "name": "B"},
                {"id": 3, "name": "C"}
            ]}),
            4,
        );
        let values: Vec<String> = texts(&doc, attr::FIELD).into_iter().take(3).collect();
        assert_eq!(values, vec!["C", "Tools", "3.00"]);
    }

    // ──────────────────────────────────────────────────────────────
    // Loops
    // ──────────────────────────────────────────────────────────────

    const LIST: &str = r#"<ul data-gql-loop="widgets" data-gql-limit="2">
        <li data-gql-template><b data-gql-field="name"></b> <i data-gql-field="category"></i></li>
    </ul>"#;

    #[test]
    fn replicates_in_array_order() {
        let (doc, report) = render(
            LIST,
            json!({"widgets": [
                {"id": 3, "name": "C", "category": {"name": "Tools"}},
                {"id": 4, "name": "D", "category": null}
            ]}),
            2,
        );

        let replicas = doc.find_by_attr(doc.root(), attr::REPLICATED);
        assert_eq!(replicas.len(), 2);
        assert_eq!(report.replicas, 2);
        assert_eq!(report.placeholders, 1);
        assert_eq!(doc.text_content(replicas[0]), "C Tools");
        assert_eq!(doc.text_content(replicas[1]), format!("D {}", PLACEHOLDER));
        assert!(replicas.iter().all(|r| !doc.has_attr(*r, attr::TEMPLATE)));

        let template = doc.find_by_attr(doc.root(), attr::TEMPLATE)[0];
        assert!(doc.is_hidden(template));
        // replicas sit right before the template
        let siblings: Vec<NodeId> = doc
            .children(doc.parent(template).unwrap())
            .iter()
            .copied()
            .filter(|n| doc.tag(*n).is_some())
            .collect();
        assert_eq!(siblings, vec![replicas[0], replicas[1], template]);
    }

    #[test]
    fn loops_are_idempotent() {
        let mut doc = Document::parse_html(LIST).unwrap();
        let schema = Schema::default();
        let table = scan(&doc, &schema);
        let result = json!({"widgets": [{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]});

        apply_loops(&mut doc, &table.loops, &result, &schema);
        let once = doc.to_html();
        apply_loops(&mut doc, &table.loops, &result, &schema);

        assert_eq!(doc.to_html(), once);
        assert_eq!(doc.find_by_attr(doc.root(), attr::REPLICATED).len(), 2);
    }

    #[test]
    fn empty_array_clears_replicas() {
        let mut doc = Document::parse_html(LIST).unwrap();
        let schema = Schema::default();
        let table = scan(&doc, &schema);

        apply_loops(&mut doc, &table.loops, &json!({"widgets": [{"id": 1, "name": "A"}]}), &schema);
        apply_loops(&mut doc, &table.loops, &json!({"widgets": []}), &schema);

        assert!(doc.find_by_attr(doc.root(), attr::REPLICATED).is_empty());
    }

    #[test]
    fn non_array_leaves_stale_replicas() {
        let mut doc = Document::parse_html(LIST).unwrap();
        let schema = Schema::default();
        let table = scan(&doc, &schema);

        apply_loops(&mut doc, &table.loops, &json!({"widgets": [{"id": 1, "name": "A"}]}), &schema);
        let report = apply_loops(&mut doc, &table.loops, &json!({"widgets": {"oops": true}}), &schema);

        assert_eq!(report.skipped_loops, 1);
        assert_eq!(doc.find_by_attr(doc.root(), attr::REPLICATED).len(), 1);
    }
}
