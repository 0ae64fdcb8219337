//! Cache consistency for writes
//!
//! ```text
//! update:      optimistic patch ─→ send mutation ─┬─ ok  → patch from echo → evict aggregates → gc
//!                                                 └─ err → roll back prior values → WriteFailure
//! invalidate:  force-network <type>_by_pk → evict aggregates + summaries → gc
//! ```
//!
//! Aggregates are derived server-side, so no local patch can keep them right.
//! They are always evicted and re-fetched by the next cycle that needs them.

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::binding::validate_field_name;
use crate::error::StencilError;
use crate::executor::{CachePolicy, QueryExecutor};
use crate::query::{literal, Operation, QueryDocument, QueryStructure, RootField};
use crate::store::{EntityKey, FieldSnapshot, NormalizedCache, REF_KEY};

pub const MUTATION_NAME: &str = "StencilMutation";
pub const INVALIDATE_NAME: &str = "StencilInvalidate";

/// A field-level update of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
    pub typename: String,
    pub id: Value,
    pub set: Map<String, Value>,
}

impl EntityUpdate {
    pub fn new(typename: impl Into<String>, id: Value) -> Self {
        Self {
            typename: typename.into(),
            id,
            set: Map::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set.insert(field.into(), value);
        self
    }

    fn id_text(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn failure(&self, reason: impl Into<String>) -> StencilError {
        StencilError::WriteFailure {
            typename: self.typename.clone(),
            id: self.id_text(),
            reason: reason.into(),
        }
    }
}

/// Prior state captured before an optimistic write
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticPatch {
    pub key: EntityKey,
    pub prior: FieldSnapshot,
    /// The entity did not exist before the patch
    pub created: bool,
}

/// Result of a confirmed write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub key: EntityKey,
    /// Entity fields after the server echo was applied
    pub entity: Map<String, Value>,
    /// Cached lists that reference the entity and now show the new values
    pub lists_touched: Vec<String>,
    /// Root signatures dropped because they held aggregates
    pub evicted: Vec<String>,
}

/// Result of a forced re-fetch
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidateOutcome {
    pub key: EntityKey,
    /// The server still has the entity
    pub found: bool,
    pub evicted: Vec<String>,
}

/// Keeps the normalized cache consistent with writes made through it
#[derive(Clone)]
pub struct ConsistencyLayer {
    executor: QueryExecutor,
}

impl ConsistencyLayer {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    fn cache(&self) -> &NormalizedCache {
        self.executor.cache()
    }

    /// Build the mutation for an update
    pub fn mutation_document(&self, update: &EntityUpdate) -> Result<QueryDocument, StencilError> {
        let schema = self.executor.schema();
        let key = EntityKey::from_id(update.typename.as_str(), &update.id)
            .ok_or_else(|| update.failure("id must be a string or a number"))?;
        if update.set.is_empty() {
            return Err(update.failure("no fields to update"));
        }
        validate_field_name(&update.typename).map_err(|e| update.failure(e.to_string()))?;
        for field in update.set.keys() {
            validate_field_name(field).map_err(|e| update.failure(e.to_string()))?;
        }

        let changed: Vec<String> = update.set.keys().cloned().collect();
        let arguments = format!(
            "pk_columns: {{{}: {}}}, _set: {}",
            schema.id_field,
            literal(&update.id),
            literal(&Value::Object(update.set.clone()))
        );
        let field = RootField::nested(
            format!("update_{}_by_pk", update.typename),
            Some(arguments),
            self.entity_selection(&key, &changed),
        );

        QueryDocument::new(Operation::Mutation, MUTATION_NAME, vec![field])
    }

    /// Id, the given fields, then every other field already cached for the entity
    fn entity_selection(&self, key: &EntityKey, fields: &[String]) -> QueryStructure {
        let schema = self.executor.schema();
        let mut selection = QueryStructure::new();
        selection.insert_names(&[schema.id_field.clone()]);
        for field in fields {
            selection.insert_names(&[field.clone()]);
        }

        if let Some(entity) = self.cache().entity(key) {
            for (name, value) in &entity {
                if name.starts_with("__") || schema.is_aggregate_field(name) {
                    continue;
                }
                match value {
                    Value::Object(map) if map.contains_key(REF_KEY) => {
                        if let Some(rel) = schema.relationship(name) {
                            selection.insert_names(&[name.clone(), schema.id_field.clone()]);
                            selection.insert_names(&[name.clone(), rel.display.clone()]);
                        }
                    }
                    Value::Object(_) | Value::Array(_) => {}
                    _ => selection.insert_names(&[name.clone()]),
                }
            }
        }
        selection
    }

    /// Patch the cache before the server confirms
    pub fn apply_optimistic(&self, key: &EntityKey, set: &Map<String, Value>) -> OptimisticPatch {
        let created = !self.cache().contains_entity(key);
        let prior = self.cache().patch_entity(key, set);
        debug!(entity = %key, fields = set.len(), created, "Optimistic patch applied");
        OptimisticPatch {
            key: key.clone(),
            prior,
            created,
        }
    }

    pub fn rollback(&self, patch: &OptimisticPatch) {
        if patch.created {
            self.cache().remove_entity(&patch.key);
        } else {
            self.cache().restore_entity(&patch.key, &patch.prior);
        }
        warn!(entity = %patch.key, "Optimistic patch rolled back");
    }

    /// Write an update through the server and reconcile the cache
    #[instrument(skip(self, update), fields(typename = %update.typename, id = %update.id_text()))]
    pub async fn update(&self, update: &EntityUpdate) -> Result<WriteOutcome, StencilError> {
        let doc = self.mutation_document(update)?;
        let root_name = doc.root_fields[0].name.clone();
        let key = EntityKey::from_id(update.typename.as_str(), &update.id)
            .ok_or_else(|| update.failure("id must be a string or a number"))?;

        let patch = self.apply_optimistic(&key, &update.set);

        let echo = match self.executor.send(&doc).await {
            Ok(data) => data.get(root_name.as_str()).cloned().unwrap_or(Value::Null),
            Err(e) => {
                self.rollback(&patch);
                return Err(update.failure(e.to_string()));
            }
        };
        if !echo.is_object() {
            self.rollback(&patch);
            return Err(update.failure("entity not found"));
        }

        let schema = self.executor.schema();
        let mut confirmed = Map::new();
        for field in update.set.keys() {
            if let Some(value) = echo.get(field.as_str()) {
                confirmed.insert(field.clone(), self.cache().write_object(value, field, schema));
            }
        }
        self.cache().patch_entity(&key, &confirmed);

        let entity = self.cache().entity(&key).unwrap_or_default();
        let lists_touched = self.cache().lists_referencing(&key);
        let evicted = self.cache().evict_roots_where(|name| schema.is_aggregate_field(name));
        self.cache()
            .evict_entity_fields_where(|name| schema.is_aggregate_field(name));
        let collected = self.cache().gc();

        info!(
            entity = %key,
            lists = lists_touched.len(),
            evicted = evicted.len(),
            collected,
            "Update confirmed"
        );

        Ok(WriteOutcome {
            key,
            entity,
            lists_touched,
            evicted,
        })
    }

    /// Re-fetch one entity and drop everything derived from it
    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn invalidate(&self, typename: &str, id: &Value) -> Result<InvalidateOutcome, StencilError> {
        let schema = self.executor.schema();
        let failure = |reason: String| StencilError::InvalidateFailure {
            typename: typename.to_string(),
            id: id.to_string(),
            reason,
        };

        let key = EntityKey::from_id(typename, id)
            .ok_or_else(|| failure("id must be a string or a number".to_string()))?;
        validate_field_name(typename).map_err(|e| failure(e.to_string()))?;

        let field = RootField::nested(
            format!("{}_by_pk", typename),
            Some(format!("{}: {}", schema.id_field, literal(id))),
            self.entity_selection(&key, &[]),
        );
        let root_name = field.name.clone();
        let doc = QueryDocument::new(Operation::Query, INVALIDATE_NAME, vec![field])
            .map_err(|e| failure(e.to_string()))?;

        let data = self
            .executor
            .try_execute(&doc, CachePolicy::ForceNetwork)
            .await
            .map_err(|e| failure(e.to_string()))?;

        let found = data.get(root_name.as_str()).is_some_and(Value::is_object);
        if !found {
            warn!(entity = %key, "Entity no longer exists on the server");
            self.cache().remove_entity(&key);
        }

        let evicted = self
            .cache()
            .evict_roots_where(|name| schema.is_aggregate_field(name) || schema.is_summary_field(name));
        self.cache()
            .evict_entity_fields_where(|name| schema.is_aggregate_field(name));
        let collected = self.cache().gc();

        info!(entity = %key, found, evicted = evicted.len(), collected, "Entity invalidated");

        Ok(InvalidateOutcome { key, found, evicted })
    }

    /// Drop every cached root and entity
    pub fn clear(&self) {
        self.cache().clear();
        debug!("Cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::DataPath;
    use crate::schema::Schema;
    use crate::transport::{GraphResponse, MockTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn widgets_doc() -> QueryDocument {
        let paths: Vec<DataPath> = ["id", "name", "price", "category.name"]
            .iter()
            .map(|p| DataPath::parse(p).unwrap())
            .collect();
        QueryDocument::new(
            Operation::Query,
            "Q",
            vec![
                RootField::nested(
                    "widgets",
                    Some("limit: 2, offset: 0, order_by: {id: asc}".to_string()),
                    QueryStructure::from_paths(&paths),
                ),
                RootField::nested(
                    "widgets_aggregate",
                    None,
                    QueryStructure::from_paths(&[DataPath::parse("aggregate.count").unwrap()]),
                ),
            ],
        )
        .unwrap()
    }

    async fn seeded(transport: Arc<MockTransport>) -> ConsistencyLayer {
        transport.queue_response(GraphResponse::data(json!({
            "widgets": [
                {"id": 1, "name": "Widget A", "price": 9, "category": {"id": 4, "name": "Tools"}},
                {"id": 2, "name": "Widget B", "price": 12.5, "category": {"id": 4, "name": "Tools"}}
            ],
            "widgets_aggregate": {"aggregate": {"count": 2}}
        })));
        let executor = QueryExecutor::new(transport, NormalizedCache::new(), Arc::new(Schema::default()));
        executor
            .try_execute(&widgets_doc(), CachePolicy::ForceNetwork)
            .await
            .unwrap();
        ConsistencyLayer::new(executor)
    }

    // ──────────────────────────────────────────────────────────────
    // Mutation text
    // ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn mutation_selects_cached_fields() {
        let layer = seeded(Arc::new(MockTransport::new())).await;
        let doc = layer
            .mutation_document(&EntityUpdate::new("widgets", json!(2)).set("price", json!(20)))
            .unwrap();

        assert_eq!(doc.operation, Operation::Mutation);
        assert_eq!(
            doc.root_fields[0].signature(),
            "update_widgets_by_pk(pk_columns: {id: 2}, _set: {price: 20})"
        );
        assert_eq!(
            doc.text(),
            "mutation StencilMutation {\n  update_widgets_by_pk(pk_columns: {id: 2}, _set: {price: 20}) {\n    id\n    price\n    category {\n      id\n      name\n    }\n    name\n  }\n}\n"
        );
    }

    #[test]
    fn rejects_bad_updates() {
        let executor = QueryExecutor::new(
            Arc::new(MockTransport::new()),
            NormalizedCache::new(),
            Arc::new(Schema::default()),
        );
        let layer = ConsistencyLayer::new(executor);

        let empty = EntityUpdate::new("widgets", json!(1));
        assert!(matches!(layer.mutation_document(&empty), Err(StencilError::WriteFailure { .. })));

        let bad_id = EntityUpdate::new("widgets", json!(null)).set("price", json!(1));
        assert!(layer.mutation_document(&bad_id).is_err());

        let bad_field = EntityUpdate::new("widgets", json!(1)).set("in-stock", json!(true));
        assert!(layer.mutation_document(&bad_field).is_err());
    }

    // ──────────────────────────────────────────────────────────────
    // Update
    // ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn confirmed_update_patches_and_evicts_aggregates() {
        let transport = Arc::new(MockTransport::new());
        let layer = seeded(transport.clone()).await;
        transport.queue_response(GraphResponse::data(json!({
            "update_widgets_by_pk": {"id": 2, "price": 19.99, "name": "Widget B",
                                     "category": {"id": 4, "name": "Tools"}}
        })));

        let outcome = layer
            .update(&EntityUpdate::new("widgets", json!(2)).set("price", json!(20)))
            .await
            .unwrap();

        assert_eq!(outcome.entity["price"], 19.99);
        assert_eq!(
            outcome.lists_touched,
            vec!["widgets(limit: 2, offset: 0, order_by: {id: asc})".to_string()]
        );
        assert_eq!(outcome.evicted, vec!["widgets_aggregate".to_string()]);

        let cache = layer.cache();
        assert!(cache.root("widgets_aggregate").is_none());
        let list = cache.read_root(&widgets_doc().root_fields[0]).unwrap();
        assert_eq!(list[1]["price"], 19.99);
    }

    #[tokio::test]
    async fn rejected_update_rolls_back() {
        let transport = Arc::new(MockTransport::new());
        let layer = seeded(transport.clone()).await;
        transport.queue_response(GraphResponse::error("permission denied"));

        let err = layer
            .update(&EntityUpdate::new("widgets", json!(2)).set("price", json!(20)))
            .await
            .unwrap_err();

        assert!(err.is_user_visible());
        assert!(err.to_string().contains("permission denied"));
        let entity = layer.cache().entity(&EntityKey::new("widgets", "2")).unwrap();
        assert_eq!(entity["price"], 12.5);
        assert!(layer.cache().root("widgets_aggregate").is_some());
    }

    #[tokio::test]
    async fn rolled_back_new_entity_is_removed() {
        let transport = Arc::new(MockTransport::new());
        let layer = seeded(transport.clone()).await;
        transport.queue_failure("connection reset");

        let result = layer
            .update(&EntityUpdate::new("widgets", json!(99)).set("price", json!(1)))
            .await;

        assert!(result.is_err());
        assert!(!layer.cache().contains_entity(&EntityKey::new("widgets", "99")));
    }

    #[tokio::test]
    async fn null_echo_is_a_failure() {
        let transport = Arc::new(MockTransport::new());
        let layer = seeded(transport.clone()).await;
        transport.queue_response(GraphResponse::data(json!({"update_widgets_by_pk": null})));

        let err = layer
            .update(&EntityUpdate::new("widgets", json!(1)).set("price", json!(5)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("entity not found"));
        assert_eq!(layer.cache().entity(&EntityKey::new("widgets", "1")).unwrap()["price"], 9);
    }

    // ──────────────────────────────────────────────────────────────
    // Invalidate / clear
    // ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalidate_refetches_and_evicts() {
        let transport = Arc::new(MockTransport::new());
        let layer = seeded(transport.clone()).await;
        transport.queue_response(GraphResponse::data(json!({
            "widgets_by_pk": {"id": 1, "name": "Widget A+", "price": 10,
                              "category": {"id": 4, "name": "Tools"}}
        })));

        let outcome = layer.invalidate("widgets", &json!(1)).await.unwrap();

        assert!(outcome.found);
        assert_eq!(outcome.evicted, vec!["widgets_aggregate".to_string()]);
        let request = transport.last_request().unwrap();
        assert!(request.query.contains("widgets_by_pk(id: 1) {"));
        assert_eq!(
            layer.cache().entity(&EntityKey::new("widgets", "1")).unwrap()["name"],
            "Widget A+"
        );
    }

    #[tokio::test]
    async fn invalidate_failure_is_reported() {
        let transport = Arc::new(MockTransport::new());
        let layer = seeded(transport.clone()).await;
        transport.queue_failure("timeout");

        let err = layer.invalidate("widgets", &json!(1)).await.unwrap_err();
        assert!(matches!(err, StencilError::InvalidateFailure { .. }));
        assert!(!err.is_user_visible());
    }

    #[tokio::test]
    async fn clear_empties_cache() {
        let layer = seeded(Arc::new(MockTransport::new())).await;
        layer.clear();
        assert_eq!(layer.cache().stats().entities, 0);
        assert_eq!(layer.cache().stats().roots, 0);
    }
}
