//! Field name validation
//!
//! Names emitted into a query must be graph-query names:
//! - Start with a letter or underscore
//! - Contain only ASCII letters, digits, underscores
//!
//! Dots are path separators and never part of a name.

use crate::error::StencilError;

/// Validate a single field name without regex overhead
///
/// Valid names:
/// - `widgets`, `in_stock`, `_id`, `widgets_aggregate`
///
/// Invalid names:
/// - Dashes: `in-stock`
/// - Leading digits: `2widgets`
/// - Dots: `category.name` (that is a path, not a name)
pub fn validate_field_name(name: &str) -> Result<(), StencilError> {
    let Some(&first) = name.as_bytes().first() else {
        return Err(StencilError::InvalidPath {
            path: name.to_string(),
        });
    };

    if !first.is_ascii_alphabetic() && first != b'_' {
        return Err(StencilError::InvalidPath {
            path: name.to_string(),
        });
    }

    for &byte in &name.as_bytes()[1..] {
        if !byte.is_ascii_alphanumeric() && byte != b'_' {
            return Err(StencilError::InvalidPath {
                path: name.to_string(),
            });
        }
    }

    Ok(())
}
