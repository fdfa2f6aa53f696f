//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Protocol error (invalid envelope or parameters).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The envelope names a method this node does not know.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model error raised while applying a mutation.
    #[error("model error: {0}")]
    Model(#[from] vigil_model::ModelError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] vigil_storage::StorageError),

    /// Endpoint is unknown or not connected.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// Invalid zone or endpoint configuration.
    #[error("zone configuration error: {0}")]
    Config(String),

    /// A command could not be executed.
    #[error("command error: {0}")]
    Command(String),
}
