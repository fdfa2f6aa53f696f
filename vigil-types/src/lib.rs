//! Core type definitions for Vigil.
//!
//! This crate defines the vocabulary shared by every layer of the
//! runtime-state replication core:
//! - [`AttributePath`] — dotted paths addressing a leaf inside an attribute
//! - [`AttributeClass`] — bitmask of attribute access classes (config, state)
//! - [`Origin`] — provenance of an inbound mutation (sending endpoint + zone)
//! - [`timestamp`] — wall-clock helpers using fractional Unix seconds
//!
//! Entity kinds, the overlay and the registry live in `vigil-model`.

mod class;
mod origin;
mod path;
pub mod timestamp;

pub use class::AttributeClass;
pub use origin::Origin;
pub use path::AttributePath;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid attribute path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("unknown attribute class: {0}")]
    UnknownClass(String),
}
