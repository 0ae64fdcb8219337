//! Dotted-path addressing over query results
//!
//! Supports:
//! - `a.b.c` (field access)
//! - `items.0.name` (numeric segment indexes into an array)
//! - `widgets.2.category` (indexed form, relationship fields render through
//!   their display field)
//!
//! Resolution never fails: a missing segment yields [`Resolved::Missing`].

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::StencilError;
use crate::schema::Schema;

/// `arrayField.<index>.<field>` with a plain identifier for the array
static INDEXED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\.(\d+)\.(.+)$").unwrap());

/// A parsed path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object field access
    Field(String),
    /// Array index access
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => f.write_str(name),
            Segment::Index(idx) => write!(f, "{}", idx),
        }
    }
}

/// An ordered sequence of segments, e.g. `category.name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPath {
    segments: Vec<Segment>,
}

impl DataPath {
    /// Parse a dotted path
    ///
    /// Numeric segments become array indexes. Empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self, StencilError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(StencilError::InvalidPath {
                path: path.to_string(),
            });
        }

        let mut segments = Vec::new();
        for part in path.split('.') {
            if part.is_empty() {
                return Err(StencilError::InvalidPath {
                    path: path.to_string(),
                });
            }
            match part.parse::<usize>() {
                Ok(index) => segments.push(Segment::Index(index)),
                Err(_) => segments.push(Segment::Field(part.to_string())),
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The single field name when the path is one plain field
    pub fn as_single_field(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Field(name)] => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// `arrayField.<index>.<field>`, rendered from a known position in a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedPath {
    pub array: String,
    pub index: usize,
    pub field: DataPath,
}

impl IndexedPath {
    /// Match the indexed form; returns `None` for any other path
    pub fn parse(path: &str) -> Option<Self> {
        let caps = INDEXED_RE.captures(path.trim())?;
        let index = caps[2].parse().ok()?;
        let field = DataPath::parse(&caps[3]).ok()?;
        Some(Self {
            array: caps[1].to_string(),
            index,
            field,
        })
    }
}

impl fmt::Display for IndexedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.array, self.index, self.field)
    }
}

/// Outcome of walking a path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Found(&'a Value),
    Missing,
}

impl<'a> Resolved<'a> {
    pub fn value(self) -> Option<&'a Value> {
        match self {
            Resolved::Found(v) => Some(v),
            Resolved::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Resolved::Missing)
    }
}

/// Walk `path` from `root`, stopping at the first missing segment
pub fn resolve<'a>(root: &'a Value, path: &DataPath) -> Resolved<'a> {
    let mut current = root;
    for segment in path.segments() {
        let next = match segment {
            Segment::Field(name) => current.get(name.as_str()),
            Segment::Index(idx) => current.get(*idx),
        };
        match next {
            Some(v) => current = v,
            None => return Resolved::Missing,
        }
    }
    Resolved::Found(current)
}

/// Resolve a field of one list item
///
/// A bare relationship field renders through the related entity's display
/// field instead of returning the raw object.
pub fn resolve_item<'a>(item: &'a Value, field: &DataPath, schema: &Schema) -> Resolved<'a> {
    if let Some(name) = field.as_single_field() {
        if let Some(rel) = schema.relationship(name) {
            return match item.get(name).and_then(|r| r.get(rel.display.as_str())) {
                Some(v) => Resolved::Found(v),
                None => Resolved::Missing,
            };
        }
    }
    resolve(item, field)
}

/// Resolve the indexed form against a whole result
pub fn resolve_indexed<'a>(root: &'a Value, path: &IndexedPath, schema: &Schema) -> Resolved<'a> {
    let item = root
        .get(path.array.as_str())
        .filter(|v| v.is_array())
        .and_then(|arr| arr.get(path.index));
    match item {
        Some(item) => resolve_item(item, &path.field, schema),
        None => Resolved::Missing,
    }
}
