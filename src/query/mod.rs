//! Query synthesis
//!
//! Turns a [`BindingTable`](crate::binding::BindingTable) into query text:
//! - `structure`: de-duplicated field-selection tree
//! - `document`: operation assembly, loop fragments, literals
//! - `syntax`: grammar check run on every generated document
//!
//! ```text
//! BindingTable → QueryStructure (scalars) ┐
//!              → loop fragments           ┴→ QueryDocument → text
//! ```

mod document;
mod structure;
pub mod syntax;

pub use document::{
    literal, loop_selection, synthesize, Operation, QueryDocument, RootField, GENERATED_QUERY_NAME,
};
pub use structure::{QueryStructure, Selection};
