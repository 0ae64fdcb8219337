//! Stencil engine - one pipeline over one document
//!
//! ```text
//! run:       scan → synthesize → execute(prefer-cache) → reconcile
//! refresh:          synthesize → execute(force-network) → reconcile
//! dispatch:  Refresh          → clear cache → refresh
//!            Paginate(dir)    → move offset → refresh
//! ```
//!
//! The engine owns its document, cursor and last binding table. Every
//! action takes `&mut self`, so cycles on one engine never interleave.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument};

use crate::binding::{scan, BindingTable};
use crate::command::Command;
use crate::config::StencilConfig;
use crate::consistency::{ConsistencyLayer, EntityUpdate, InvalidateOutcome, WriteOutcome};
use crate::dom::{Document, NodeId};
use crate::error::StencilError;
use crate::executor::{CachePolicy, QueryExecutor};
use crate::pagination::Pagination;
use crate::query::{synthesize, QueryDocument};
use crate::reconcile::{reconcile, RenderReport};
use crate::schema::Schema;
use crate::store::NormalizedCache;
use crate::transport::{HttpTransport, Transport};

/// How one pipeline cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing in the document needs data
    NoQuery,
    /// The generated query was rejected before sending
    SynthesisFailed,
    /// Transport or server failure; the document was left as is
    ExecutionFailed,
    Rendered {
        scalars: usize,
        replicas: usize,
        placeholders: usize,
    },
}

impl CycleOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, CycleOutcome::Rendered { .. })
    }
}

impl From<RenderReport> for CycleOutcome {
    fn from(report: RenderReport) -> Self {
        CycleOutcome::Rendered {
            scalars: report.scalars,
            replicas: report.replicas,
            placeholders: report.placeholders,
        }
    }
}

pub struct Stencil {
    document: Document,
    schema: Arc<Schema>,
    executor: QueryExecutor,
    consistency: ConsistencyLayer,
    pagination: Pagination,
    table: BindingTable,
}

impl Stencil {
    pub fn new(document: Document, transport: Arc<dyn Transport>, schema: Schema) -> Self {
        let schema = Arc::new(schema);
        let executor = QueryExecutor::new(transport, NormalizedCache::new(), schema.clone());
        let consistency = ConsistencyLayer::new(executor.clone());

        Self {
            document,
            schema,
            executor,
            consistency,
            pagination: Pagination::new(),
            table: BindingTable::default(),
        }
    }

    /// Engine talking HTTP to the configured endpoint
    pub fn from_config(document: Document, config: &StencilConfig) -> Result<Self, StencilError> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(document, Arc::new(transport), config.schema.clone()))
    }

    // ─────────────────────────────────────────────────────────────
    // Pipeline
    // ─────────────────────────────────────────────────────────────

    /// Rebuild the binding table from the current document
    pub fn scan(&mut self) -> &BindingTable {
        self.table = scan(&self.document, &self.schema);
        &self.table
    }

    /// Query that the next cycle would send, if any
    pub fn query(&self) -> Result<Option<QueryDocument>, StencilError> {
        synthesize(&self.table, &self.pagination, &self.schema)
    }

    /// Full pipeline, answering from the cache when possible
    #[instrument(skip(self), fields(offset = self.pagination.offset()))]
    pub async fn run(&mut self) -> CycleOutcome {
        self.scan();
        self.cycle(CachePolicy::PreferCache).await
    }

    /// Re-query the current bindings from the network
    #[instrument(skip(self), fields(offset = self.pagination.offset()))]
    pub async fn refresh(&mut self) -> CycleOutcome {
        self.cycle(CachePolicy::ForceNetwork).await
    }

    /// Re-render the current bindings from whatever the cache holds
    pub async fn rerender(&mut self) -> CycleOutcome {
        self.cycle(CachePolicy::PreferCache).await
    }

    async fn cycle(&mut self, policy: CachePolicy) -> CycleOutcome {
        let doc = match self.query() {
            Ok(Some(doc)) => doc,
            Ok(None) => return CycleOutcome::NoQuery,
            Err(e) => {
                error!(error = %e, "Query synthesis failed");
                return CycleOutcome::SynthesisFailed;
            }
        };

        let Some(data) = self.executor.execute(&doc, policy).await else {
            return CycleOutcome::ExecutionFailed;
        };

        let report = self.render(&data);
        info!(
            policy = %policy,
            scalars = report.scalars,
            replicas = report.replicas,
            placeholders = report.placeholders,
            "Cycle rendered"
        );
        report.into()
    }

    fn render(&mut self, data: &Value) -> RenderReport {
        let page_size = self.page_size();
        reconcile(
            &mut self.document,
            &self.table.bindings,
            &self.table.loops,
            data,
            &self.pagination,
            page_size,
            &self.schema,
        )
    }

    // ─────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn dispatch(&mut self, command: Command) -> CycleOutcome {
        match command {
            Command::Refresh => {
                self.consistency.clear();
            }
            Command::Paginate(direction) => {
                let page_size = self.page_size();
                if !self.pagination.advance(direction, page_size) {
                    info!(offset = self.pagination.offset(), "Already at the first page");
                }
            }
        }
        self.refresh().await
    }

    /// Run the command bound to a control node; `None` if the node has none
    pub async fn activate(&mut self, node: NodeId) -> Option<CycleOutcome> {
        let command = self.table.command_for(node)?;
        Some(self.dispatch(command).await)
    }

    // ─────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────

    /// Write an entity update and re-render from the reconciled cache
    ///
    /// The error is the one failure meant for the person who triggered it.
    pub async fn update_entity(&mut self, update: &EntityUpdate) -> Result<WriteOutcome, StencilError> {
        let outcome = self.consistency.update(update).await?;
        self.rerender().await;
        Ok(outcome)
    }

    pub async fn invalidate_entity(&mut self, typename: &str, id: &Value) -> Result<InvalidateOutcome, StencilError> {
        let outcome = self.consistency.invalidate(typename, id).await?;
        self.rerender().await;
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn table(&self) -> &BindingTable {
        &self.table
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    /// Page size of the shared cursor (first loop wins)
    pub fn page_size(&self) -> usize {
        self.table.page_size(self.schema.default_page_size)
    }

    pub fn cache(&self) -> &NormalizedCache {
        self.executor.cache()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}
