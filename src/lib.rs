//! Stencil - declarative DOM-to-graph-query binding engine
//!
//! Pages declare what data a node wants with `data-gql-*` attributes; the
//! engine scans them, synthesizes one query, executes it under a cache policy
//! and writes the result back, replicating loop templates per array element.

pub mod binding;
pub mod command;
pub mod config;
pub mod consistency;
pub mod dom;
pub mod engine;
pub mod error;
pub mod executor;
pub mod pagination;
pub mod path;
pub mod query;
pub mod reconcile;
pub mod schema;
pub mod store;
pub mod transport;

pub use binding::{scan, BindingTable};
pub use command::{Command, Direction};
pub use config::StencilConfig;
pub use consistency::{ConsistencyLayer, EntityUpdate, InvalidateOutcome, WriteOutcome};
pub use dom::{Document, NodeId};
pub use engine::{CycleOutcome, Stencil};
pub use error::{FixSuggestion, StencilError};
pub use executor::{CachePolicy, QueryExecutor};
pub use pagination::Pagination;
pub use query::{synthesize, QueryDocument};
pub use schema::Schema;
pub use store::NormalizedCache;
pub use transport::{GraphRequest, GraphResponse, HttpTransport, MockTransport, Transport};
