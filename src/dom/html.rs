//! HTML import and serialization
//!
//! Parsing goes through html5ever's HTML5 tree builder, then the
//! reference-counted tree is copied into the arena. Comments, doctypes and
//! processing instructions carry no bindings and are dropped.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use super::{Document, NodeId, NodeKind};
use crate::error::StencilError;

/// Elements serialized without a closing tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text children are emitted verbatim
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

impl Document {
    /// Parse an HTML page into a new document
    pub fn parse_html(html: &str) -> Result<Self, StencilError> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())
            .map_err(|e| StencilError::Html {
                details: e.to_string(),
            })?;

        let mut doc = Document::new();
        let root = doc.root();
        import(&mut doc, root, &dom.document);
        Ok(doc)
    }

    /// Serialize the whole document
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.write_node(*child, false, &mut out);
        }
        out
    }

    fn write_node(&self, node: NodeId, raw_text: bool, out: &mut String) {
        match self.kind(node) {
            NodeKind::Root => {
                for child in self.children(node) {
                    self.write_node(*child, false, out);
                }
            }
            NodeKind::Text(text) => {
                if raw_text {
                    out.push_str(text);
                } else {
                    out.push_str(&escape(text, false));
                }
            }
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in self.attrs(node) {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                    return;
                }

                let raw = RAW_TEXT_ELEMENTS.contains(&el.tag.as_str());
                for child in self.children(node) {
                    self.write_node(*child, raw, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}

fn import(doc: &mut Document, parent: NodeId, handle: &Handle) {
    match &handle.data {
        NodeData::Document => {
            for child in handle.children.borrow().iter() {
                import(doc, parent, child);
            }
        }
        NodeData::Text { contents } => {
            let text = doc.create_text(contents.borrow().to_string());
            doc.append_child(parent, text);
        }
        NodeData::Element { name, attrs, .. } => {
            let el = doc.create_element(name.local.to_string());
            for attr in attrs.borrow().iter() {
                doc.set_attr(el, &attr.name.local, attr.value.to_string());
            }
            doc.append_child(parent, el);
            for child in handle.children.borrow().iter() {
                import(doc, el, child);
            }
        }
        NodeData::Doctype { .. } | NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } => {}
    }
}

fn escape(text: &str, in_attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' if !in_attribute => out.push_str("&lt;"),
            '>' if !in_attribute => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}
