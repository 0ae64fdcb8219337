//! Query structure tree
//!
//! Folding `category.name` and `category.id` yields one `category` node with
//! two leaves. Entries keep first-discovery order so the rendered text is
//! reproducible.

use crate::path::{DataPath, Segment};

/// Meta field naming the concrete type of an object
pub const TYPENAME_FIELD: &str = "__typename";

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Leaf,
    Nested(QueryStructure),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStructure {
    entries: Vec<(String, Selection)>,
}

impl QueryStructure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every path into one tree
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a DataPath>) -> Self {
        let mut structure = Self::new();
        for path in paths {
            structure.insert_path(path);
        }
        structure
    }

    /// Fold one path; shared prefixes merge into the existing subtree
    ///
    /// An object selection always wins over a leaf of the same name, since a
    /// leaf on an object field is not a valid request. Index segments address
    /// an element of the list the preceding field returns, so they select
    /// nothing of their own: `tags.0.label` requests `tags { label }`.
    pub fn insert_path(&mut self, path: &DataPath) {
        let names: Vec<String> = path
            .segments()
            .iter()
            .filter_map(|s| match s {
                Segment::Field(name) => Some(name.clone()),
                Segment::Index(_) => None,
            })
            .collect();
        self.insert_names(&names);
    }

    pub fn insert_names(&mut self, names: &[String]) {
        let Some((head, rest)) = names.split_first() else {
            return;
        };

        let pos = match self.entries.iter().position(|(k, _)| k == head) {
            Some(pos) => pos,
            None => {
                self.entries.push((head.clone(), Selection::Leaf));
                self.entries.len() - 1
            }
        };

        if rest.is_empty() {
            return;
        }

        let slot = &mut self.entries[pos].1;
        if matches!(slot, Selection::Leaf) {
            *slot = Selection::Nested(QueryStructure::new());
        }
        if let Selection::Nested(child) = slot {
            child.insert_names(rest);
        }
    }

    /// Put a leaf first unless the name is already selected
    pub fn ensure_leading_leaf(&mut self, name: &str) {
        if self.get(name).is_none() {
            self.entries.insert(0, (name.to_string(), Selection::Leaf));
        }
    }

    /// Request `__typename` on this selection set and every nested one
    ///
    /// Entities are keyed by the server's type, so the same row reached
    /// through different fields lands in one cache record.
    pub fn add_typename(&mut self) {
        self.add_typename_to_children();
        if self.get(TYPENAME_FIELD).is_none() {
            self.entries.push((TYPENAME_FIELD.to_string(), Selection::Leaf));
        }
    }

    /// Like [`add_typename`](Self::add_typename) but leaves this level alone
    pub fn add_typename_to_children(&mut self) {
        for (_, selection) in &mut self.entries {
            if let Selection::Nested(child) = selection {
                child.add_typename();
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Selection> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn entries(&self) -> &[(String, Selection)] {
        &self.entries
    }

    /// Merge another structure into this one, keeping this one's order first
    pub fn merge(&mut self, other: &QueryStructure) {
        for (name, selection) in &other.entries {
            match selection {
                Selection::Leaf => self.insert_names(std::slice::from_ref(name)),
                Selection::Nested(child) => {
                    self.insert_names(std::slice::from_ref(name));
                    if let Some((_, slot)) = self.entries.iter_mut().find(|(k, _)| k == name) {
                        match slot {
                            Selection::Nested(existing) => existing.merge(child),
                            Selection::Leaf => *slot = Selection::Nested(child.clone()),
                        }
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pre-order text: leaves as `field`, nesting as `field { ... }`
    pub fn to_query_text(&self, depth: usize) -> String {
        let mut out = String::new();
        self.write_text(depth, &mut out);
        out
    }

    fn write_text(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        for (name, selection) in &self.entries {
            match selection {
                Selection::Leaf => {
                    out.push_str(&indent);
                    out.push_str(name);
                    out.push('\n');
                }
                Selection::Nested(child) => {
                    out.push_str(&indent);
                    out.push_str(name);
                    out.push_str(" {\n");
                    child.write_text(depth + 1, out);
                    out.push_str(&indent);
                    out.push_str("}\n");
                }
            }
        }
    }

    /// Selection on one line, e.g. `name price category { name }`
    pub fn to_compact_text(&self) -> String {
        self.entries
            .iter()
            .map(|(name, selection)| match selection {
                Selection::Leaf => name.clone(),
                Selection::Nested(child) => format!("{} {{ {} }}", name, child.to_compact_text()),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
