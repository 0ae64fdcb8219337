//! Error types with fix suggestions
//!
//! Only `WriteFailure` is meant to reach a user. Every other variant is
//! logged by the pipeline and the cycle is abandoned quietly so a partially
//! bound page still renders whatever it can.

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum StencilError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Document errors (STN-010)
    // ─────────────────────────────────────────────────────────────

    #[error("STN-010: Failed to parse HTML: {details}")]
    Html { details: String },

    // ─────────────────────────────────────────────────────────────
    // Synthesis errors (STN-020 to STN-022)
    // ─────────────────────────────────────────────────────────────

    #[error("STN-020: Query synthesis failed: {details}")]
    Synthesis { details: String },

    #[error("STN-021: Generated query is invalid at position {position}: {details}")]
    QueryParse { position: usize, details: String },

    #[error("STN-022: Invalid binding path '{path}'")]
    InvalidPath { path: String },

    // ─────────────────────────────────────────────────────────────
    // Execution errors (STN-030 to STN-031)
    // ─────────────────────────────────────────────────────────────

    #[error("STN-030: Query execution failed: {details}")]
    Execution { details: String },

    #[error("STN-031: Transport error: {0}")]
    Transport(String),

    // ─────────────────────────────────────────────────────────────
    // Write errors (STN-040 to STN-041)
    // ─────────────────────────────────────────────────────────────

    #[error("STN-040: Update of {typename}:{id} was rejected: {reason}")]
    WriteFailure {
        typename: String,
        id: String,
        reason: String,
    },

    #[error("STN-041: Entity {typename}:{id} could not be re-fetched: {reason}")]
    InvalidateFailure {
        typename: String,
        id: String,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Configuration errors (STN-050)
    // ─────────────────────────────────────────────────────────────

    #[error("STN-050: Configuration error: {reason}")]
    Config { reason: String },
}

impl StencilError {
    /// Whether this error is meant to be shown to the person who triggered it
    pub fn is_user_visible(&self) -> bool {
        matches!(self, StencilError::WriteFailure { .. })
    }
}

impl FixSuggestion for StencilError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            StencilError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            StencilError::Json(_) => Some("Values must be valid JSON (quote strings: name='\"Widget\"')"),
            StencilError::Io(_) => Some("Check file path and permissions"),
            StencilError::Html { .. } => Some("Check the page is well-formed UTF-8 HTML"),
            StencilError::Synthesis { .. } => {
                Some("Add data-gql-field or data-gql-loop attributes to the page")
            }
            StencilError::QueryParse { .. } => {
                Some("Binding paths must be dotted field names like category.name")
            }
            StencilError::InvalidPath { .. } => Some("Use format: field.subfield"),
            StencilError::Execution { .. } => Some("Check the endpoint is reachable and the fields exist"),
            StencilError::Transport(_) => Some("Check STENCIL_ENDPOINT and network connectivity"),
            StencilError::WriteFailure { .. } => {
                Some("The previous value was restored; check the new value and permissions")
            }
            StencilError::InvalidateFailure { .. } => {
                Some("Verify the entity still exists on the server")
            }
            StencilError::Config { .. } => Some("Check stencil.yaml and STENCIL_* environment variables"),
        }
    }
}
