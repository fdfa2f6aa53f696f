//! Error types for the entity model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised synchronously by attribute and registry operations.
///
/// These indicate local misuse (bad path, wrong value shape, unknown field)
/// and are always surfaced to the caller.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The path's first segment does not name a declared field.
    #[error("field '{field}' does not exist on type '{type_name}'")]
    FieldNotFound { type_name: String, field: String },

    /// A nested path continues below a value that is not a mapping.
    #[error("invalid path '{path}': value must be a dictionary")]
    StructuralType { path: String },

    /// The new value does not satisfy the field's declared kind or references
    /// a nonexistent object.
    #[error("validation failed for '{path}': {reason}")]
    Validation { path: String, reason: String },

    /// An object with the same type and name is already registered.
    #[error("object '{name}' of type '{type_name}' already exists")]
    DuplicateObject { type_name: String, name: String },

    /// The type is not registered.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// The path string could not be parsed.
    #[error(transparent)]
    InvalidPath(#[from] vigil_types::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
