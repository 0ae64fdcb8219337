//! Store Module - client-side cache state
//!
//! Thread-safe normalized storage for query results.
//! Uses DashMap for lock-free concurrent access.
//!
//! Key types:
//! - `NormalizedCache`: entity records plus normalized root fields
//! - `EntityKey`: `typename:id` identity of one entity
//! - `CacheStats`: sizes reported by the CLI

mod cache;

// Re-export all public types
pub use cache::{CacheStats, EntityKey, FieldSnapshot, NormalizedCache, REF_KEY};
