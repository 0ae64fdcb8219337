//! Normalized result cache with DashMap
//!
//! Two maps:
//! - entities: `typename:id` → field map, shared by every list that holds them
//! - roots: root field signature → normalized value (`{"__ref": ...}` links)
//!
//! Any object carrying the id field is normalized into an entity record, so a
//! patch to one entity shows up in every cached list that references it.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::query::{QueryDocument, RootField, Selection, QueryStructure};
use crate::schema::Schema;

/// Key of the reference object stored in place of a normalized entity
pub const REF_KEY: &str = "__ref";
const TYPENAME_KEY: &str = "__typename";

/// Identity of one cached entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub typename: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            id: id.into(),
        }
    }

    /// Key for a JSON id; only strings and numbers identify entities
    pub fn from_id(typename: impl Into<String>, id: &Value) -> Option<Self> {
        let id = match id {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self::new(typename, id))
    }

    pub fn parse_ref(reference: &str) -> Option<Self> {
        let (typename, id) = reference.split_once(':')?;
        Some(Self::new(typename, id))
    }

    pub fn to_ref(&self) -> Value {
        let mut map = Map::new();
        map.insert(REF_KEY.to_string(), Value::String(self.to_string()));
        Value::Object(map)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.typename, self.id)
    }
}

/// Prior values of patched fields (`None` = field was absent)
pub type FieldSnapshot = Vec<(String, Option<Value>)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub roots: usize,
    pub entities: usize,
}

/// Shared normalized cache (lock-free)
#[derive(Clone, Default)]
pub struct NormalizedCache {
    entities: Arc<DashMap<EntityKey, Map<String, Value>>>,
    roots: Arc<DashMap<String, Value>>,
}

impl NormalizedCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────

    /// Normalize and store one root field of a result
    pub fn write_root(&self, field: &RootField, value: &Value, schema: &Schema) {
        let normalized = self.normalize(value, &field.name, schema);
        self.roots.insert(field.signature(), normalized);
    }

    /// Store every root field of a query result that is present in `data`
    pub fn write_result(&self, doc: &QueryDocument, data: &Value, schema: &Schema) {
        for field in &doc.root_fields {
            if let Some(value) = data.get(field.name.as_str()) {
                self.write_root(field, value, schema);
            }
        }
    }

    /// Store an object as an entity, returning its reference
    ///
    /// Objects without an id are returned normalized but not stored.
    pub fn write_object(&self, value: &Value, field: &str, schema: &Schema) -> Value {
        self.normalize(value, field, schema)
    }

    fn normalize(&self, value: &Value, field: &str, schema: &Schema) -> Value {
        match value {
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.normalize(v, field, schema)).collect())
            }
            Value::Object(map) => {
                let mut fields = Map::new();
                for (k, v) in map {
                    fields.insert(k.clone(), self.normalize(v, k, schema));
                }

                let typename = map
                    .get(TYPENAME_KEY)
                    .and_then(Value::as_str)
                    .unwrap_or_else(|| schema.typename_for_field(field));
                let key = map
                    .get(schema.id_field.as_str())
                    .and_then(|id| EntityKey::from_id(typename, id));

                match key {
                    Some(key) => {
                        self.entities.entry(key.clone()).or_default().extend(fields);
                        key.to_ref()
                    }
                    None => Value::Object(fields),
                }
            }
            other => other.clone(),
        }
    }

    /// Overwrite fields of one entity, creating it if needed
    ///
    /// Returns the prior value of every written field.
    pub fn patch_entity(&self, key: &EntityKey, fields: &Map<String, Value>) -> FieldSnapshot {
        let mut entity = self.entities.entry(key.clone()).or_default();
        fields
            .iter()
            .map(|(k, v)| (k.clone(), entity.insert(k.clone(), v.clone())))
            .collect()
    }

    /// Put back values captured by [`patch_entity`](Self::patch_entity)
    pub fn restore_entity(&self, key: &EntityKey, snapshot: &FieldSnapshot) {
        if let Some(mut entity) = self.entities.get_mut(key) {
            for (field, prior) in snapshot {
                match prior {
                    Some(v) => {
                        entity.insert(field.clone(), v.clone());
                    }
                    None => {
                        entity.remove(field);
                    }
                }
            }
        }
    }

    pub fn remove_entity(&self, key: &EntityKey) -> bool {
        self.entities.remove(key).is_some()
    }

    // ─────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────

    pub fn entity(&self, key: &EntityKey) -> Option<Map<String, Value>> {
        self.entities.get(key).map(|e| e.value().clone())
    }

    pub fn contains_entity(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// Raw normalized root value
    pub fn root(&self, signature: &str) -> Option<Value> {
        self.roots.get(signature).map(|r| r.value().clone())
    }

    /// Read one root field, requiring every selected sub-field
    pub fn read_root(&self, field: &RootField) -> Option<Value> {
        let stored = self.root(&field.signature())?;
        match &field.selection {
            Selection::Leaf => Some(self.expand(&stored)),
            Selection::Nested(selection) => self.denormalize(&stored, selection),
        }
    }

    /// Answer a whole query from the cache, or `None` on any miss
    pub fn read_query(&self, doc: &QueryDocument) -> Option<Value> {
        let mut data = Map::new();
        for field in &doc.root_fields {
            data.insert(field.name.clone(), self.read_root(field)?);
        }
        Some(Value::Object(data))
    }

    fn denormalize(&self, value: &Value, selection: &QueryStructure) -> Option<Value> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|v| self.denormalize(v, selection))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => match ref_key(map) {
                Some(key) => {
                    let entity = self.entity(&key)?;
                    self.project(&entity, selection)
                }
                None => self.project(map, selection),
            },
            other => Some(other.clone()),
        }
    }

    fn project(&self, map: &Map<String, Value>, selection: &QueryStructure) -> Option<Value> {
        let mut out = Map::new();
        for (name, sel) in selection.entries() {
            // Not every server echoes the type name; it is never a miss
            let Some(child) = map.get(name) else {
                if name == TYPENAME_KEY {
                    continue;
                }
                return None;
            };
            let value = match sel {
                Selection::Leaf => self.expand(child),
                Selection::Nested(inner) => self.denormalize(child, inner)?,
            };
            out.insert(name.clone(), value);
        }
        Some(Value::Object(out))
    }

    /// Replace every reference with the full entity (dangling refs become null)
    fn expand(&self, value: &Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(items.iter().map(|v| self.expand(v)).collect()),
            Value::Object(map) => match ref_key(map) {
                Some(key) => match self.entity(&key) {
                    Some(entity) => {
                        Value::Object(entity.iter().map(|(k, v)| (k.clone(), self.expand(v))).collect())
                    }
                    None => Value::Null,
                },
                None => Value::Object(map.iter().map(|(k, v)| (k.clone(), self.expand(v))).collect()),
            },
            other => other.clone(),
        }
    }

    /// Signatures of cached root fields whose value references `key`
    pub fn lists_referencing(&self, key: &EntityKey) -> Vec<String> {
        let target = key.to_string();
        let mut found: Vec<String> = self
            .roots
            .iter()
            .filter(|r| contains_ref(r.value(), &target))
            .map(|r| r.key().clone())
            .collect();
        found.sort();
        found
    }

    // ─────────────────────────────────────────────────────────────
    // Eviction
    // ─────────────────────────────────────────────────────────────

    /// Drop root fields whose field name matches; returns evicted signatures
    pub fn evict_roots_where(&self, pred: impl Fn(&str) -> bool) -> Vec<String> {
        let doomed: Vec<String> = self
            .roots
            .iter()
            .filter(|r| pred(field_name(r.key())))
            .map(|r| r.key().clone())
            .collect();
        for sig in &doomed {
            self.roots.remove(sig);
        }
        doomed
    }

    /// Drop matching fields from every entity; returns how many were removed
    pub fn evict_entity_fields_where(&self, pred: impl Fn(&str) -> bool) -> usize {
        let mut removed = 0;
        for mut entity in self.entities.iter_mut() {
            let before = entity.len();
            entity.retain(|k, _| !pred(field_name(k)));
            removed += before - entity.len();
        }
        removed
    }

    /// Drop entities no root field can reach; returns how many were dropped
    pub fn gc(&self) -> usize {
        let mut reachable: HashSet<EntityKey> = HashSet::new();
        let mut queue: VecDeque<EntityKey> = VecDeque::new();

        for root in self.roots.iter() {
            collect_refs(root.value(), &mut queue);
        }
        while let Some(key) = queue.pop_front() {
            if !reachable.insert(key.clone()) {
                continue;
            }
            if let Some(entity) = self.entity(&key) {
                for value in entity.values() {
                    collect_refs(value, &mut queue);
                }
            }
        }

        let before = self.entities.len();
        self.entities.retain(|k, _| reachable.contains(k));
        before - self.entities.len()
    }

    pub fn clear(&self) {
        self.roots.clear();
        self.entities.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            roots: self.roots.len(),
            entities: self.entities.len(),
        }
    }
}

/// Field name part of a root signature or entity field key
fn field_name(signature: &str) -> &str {
    signature.split('(').next().unwrap_or(signature)
}

fn ref_key(map: &Map<String, Value>) -> Option<EntityKey> {
    if map.len() != 1 {
        return None;
    }
    map.get(REF_KEY).and_then(Value::as_str).and_then(EntityKey::parse_ref)
}

fn collect_refs(value: &Value, out: &mut VecDeque<EntityKey>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        Value::Object(map) => match ref_key(map) {
            Some(key) => out.push_back(key),
            None => map.values().for_each(|v| collect_refs(v, out)),
        },
        _ => {}
    }
}

fn contains_ref(value: &Value, target: &str) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|v| contains_ref(v, target)),
        Value::Object(map) => match map.get(REF_KEY).and_then(Value::as_str) {
            Some(r) => r == target,
            None => map.values().any(|v| contains_ref(v, target)),
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::DataPath;
    use serde_json::json;

    fn selection(paths: &[&str]) -> QueryStructure {
        let parsed: Vec<DataPath> = paths.iter().map(|p| DataPath::parse(p).unwrap()).collect();
        QueryStructure::from_paths(&parsed)
    }

    fn widgets_field() -> RootField {
        RootField::nested(
            "widgets",
            Some("limit: 2, offset: 0, order_by: {id: asc}".to_string()),
            selection(&["id", "name", "price", "category.name"]),
        )
    }

    fn seeded() -> (NormalizedCache, Schema) {
        let cache = NormalizedCache::new();
        let schema = Schema::default();
        cache.write_root(
            &widgets_field(),
            &json!([
                {"id": 1, "name": "Widget A", "price": 9, "category": {"id": 4, "name": "Tools"}},
                {"id": 2, "name": "Widget B", "price": 12.5, "category": {"id": 4, "name": "Tools"}}
            ]),
            &schema,
        );
        cache.write_root(
            &RootField::nested("widgets_aggregate", None, selection(&["aggregate.count"])),
            &json!({"aggregate": {"count": 2}}),
            &schema,
        );
        (cache, schema)
    }

    #[test]
    fn normalizes_entities_once() {
        let (cache, _) = seeded();
        assert_eq!(cache.stats(), CacheStats { roots: 2, entities: 3 });

        let category = cache.entity(&EntityKey::new("categories", "4")).unwrap();
        assert_eq!(category["name"], "Tools");

        let root = cache.root("widgets(limit: 2, offset: 0, order_by: {id: asc})").unwrap();
        assert_eq!(root[0], json!({"__ref": "widgets:1"}));
    }

    #[test]
    fn reads_back_requested_shape() {
        let (cache, _) = seeded();
        let value = cache.read_root(&widgets_field()).unwrap();
        assert_eq!(value[1]["name"], "Widget B");
        assert_eq!(value[1]["category"], json!({"name": "Tools"}));
    }

    #[test]
    fn missing_sub_field_is_a_miss() {
        let (cache, _) = seeded();
        let wider = RootField::nested(
            "widgets",
            Some("limit: 2, offset: 0, order_by: {id: asc}".to_string()),
            selection(&["id", "description"]),
        );
        assert!(cache.read_root(&wider).is_none());

        let other_page = RootField::nested(
            "widgets",
            Some("limit: 2, offset: 2, order_by: {id: asc}".to_string()),
            selection(&["id"]),
        );
        assert!(cache.read_root(&other_page).is_none());
    }

    #[test]
    fn patch_is_visible_through_lists_and_restorable() {
        let (cache, _) = seeded();
        let key = EntityKey::new("widgets", "2");
        let mut fields = Map::new();
        fields.insert("price".to_string(), json!(20));
        fields.insert("note".to_string(), json!("new"));

        let snapshot = cache.patch_entity(&key, &fields);
        assert_eq!(cache.read_root(&widgets_field()).unwrap()[1]["price"], 20);
        assert_eq!(
            cache.lists_referencing(&key),
            vec!["widgets(limit: 2, offset: 0, order_by: {id: asc})".to_string()]
        );

        cache.restore_entity(&key, &snapshot);
        let entity = cache.entity(&key).unwrap();
        assert_eq!(entity["price"], 12.5);
        assert!(!entity.contains_key("note"));
    }

    #[test]
    fn evicts_aggregates_and_collects_garbage() {
        let (cache, schema) = seeded();
        let evicted = cache.evict_roots_where(|name| schema.is_aggregate_field(name));
        assert_eq!(evicted, vec!["widgets_aggregate".to_string()]);

        cache.evict_roots_where(|name| name == "widgets");
        assert_eq!(cache.gc(), 3);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn evicts_nested_aggregate_fields() {
        let cache = NormalizedCache::new();
        let schema = Schema::default();
        cache.write_root(
            &RootField::nested("categories", None, selection(&["id", "widgets_aggregate.aggregate.count"])),
            &json!([{"id": 4, "widgets_aggregate": {"aggregate": {"count": 2}}}]),
            &schema,
        );
        assert_eq!(cache.evict_entity_fields_where(|f| schema.is_aggregate_field(f)), 1);
        assert!(!cache
            .entity(&EntityKey::new("categories", "4"))
            .unwrap()
            .contains_key("widgets_aggregate"));
    }

    #[test]
    fn explicit_typename_wins() {
        let cache = NormalizedCache::new();
        let schema = Schema::default();
        cache.write_object(&json!({"__typename": "gadgets", "id": "g1"}), "widgets", &schema);
        assert!(cache.contains_entity(&EntityKey::new("gadgets", "g1")));
    }

    #[test]
    fn same_type_under_two_roots_is_one_entity() {
        let cache = NormalizedCache::new();
        let schema = Schema::default();
        let mut shape = selection(&["id", "price"]);
        shape.add_typename();
        let widgets = RootField::nested("widgets", None, shape.clone());
        let featured = RootField::nested("featured", None, shape);
        cache.write_root(&widgets, &json!([{"__typename": "widgets", "id": 2, "price": 12.5}]), &schema);
        cache.write_root(&featured, &json!([{"__typename": "widgets", "id": 2, "price": 12.5}]), &schema);
        assert_eq!(cache.stats(), CacheStats { roots: 2, entities: 1 });

        let key = EntityKey::new("widgets", "2");
        let mut fields = Map::new();
        fields.insert("price".to_string(), json!(20));
        cache.patch_entity(&key, &fields);

        assert_eq!(cache.lists_referencing(&key).len(), 2);
        assert_eq!(cache.read_root(&featured).unwrap()[0]["price"], 20);
    }

    #[test]
    fn absent_typename_is_not_a_miss() {
        let (cache, _) = seeded();
        let mut shape = selection(&["id", "name", "category.name"]);
        shape.add_typename();
        let field = RootField::nested(
            "widgets",
            Some("limit: 2, offset: 0, order_by: {id: asc}".to_string()),
            shape,
        );
        let value = cache.read_root(&field).unwrap();
        assert_eq!(value[0], json!({"id": 1, "name": "Widget A", "category": {"name": "Tools"}}));
    }
}
