//! Binding Module - declarations read from the host document
//!
//! Handles the `data-gql-*` attribute system:
//! - `scan`: walks the tree and builds an immutable [`BindingTable`]
//! - `validate`: field name checks shared with query synthesis
//!
//! Declarative attributes:
//! ```html
//! <span data-gql-field="category.name"></span>       <!-- scalar binding -->
//! <span data-gql-field="widgets.0.name"></span>      <!-- indexed form -->
//! <span data-gql-field="current_page"></span>        <!-- pagination pseudo-field -->
//! <ul data-gql-loop="widgets" data-gql-limit="5">    <!-- loop container -->
//!   <li data-gql-template>
//!     <span data-gql-field="name"></span>            <!-- item-scoped binding -->
//!   </li>
//! </ul>
//! <button data-gql-refresh></button>
//! <button data-gql-paginate="next"></button>
//! ```
//!
//! Data flow:
//! ```text
//! Document → scan → BindingTable (snapshot)
//!                        ↓
//!             query synthesis / reconciliation
//! ```

mod scan;
mod validate;

pub use scan::{
    scan, BindingDeclaration, BindingPath, BindingTable, Control, LoopDeclaration, ScanWarning,
};
pub use validate::validate_field_name;

/// Attribute names read and written by the engine
pub mod attr {
    pub const FIELD: &str = "data-gql-field";
    pub const LOOP: &str = "data-gql-loop";
    pub const LIMIT: &str = "data-gql-limit";
    pub const TEMPLATE: &str = "data-gql-template";
    pub const REPLICATED: &str = "data-gql-replicated";
    pub const REFRESH: &str = "data-gql-refresh";
    pub const PAGINATE: &str = "data-gql-paginate";
}

/// Pseudo-field computed from the pagination cursor instead of queried
pub const CURRENT_PAGE: &str = "current_page";
