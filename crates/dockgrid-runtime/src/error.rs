//! Error types for the runtime client.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors returned by a container engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("cannot connect to container engine: {0}")]
    Connect(String),

    #[error("container engine error: {0}")]
    Engine(String),

    #[error("failed to pull image {image}: {reason}")]
    Pull { image: String, reason: String },

    #[error("failed to create container {name}: {reason}")]
    Create { name: String, reason: String },

    #[error("failed to remove container {id}: {reason}")]
    Remove { id: String, reason: String },

    #[error("volume {name}: {reason}")]
    Volume { name: String, reason: String },
}
