//! Controller error types.

use thiserror::Error;

use dockgrid_core::CoreError;
use dockgrid_runtime::RuntimeError;
use dockgrid_state::StateError;

/// Errors that can occur while reconciling.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Aborts the current tick.
    #[error("state store error: {0}")]
    State(#[from] StateError),

    /// Skips the affected volume or service.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("invalid controller configuration: {0}")]
    Config(#[from] CoreError),
}

pub type ControllerResult<T> = Result<T, ControllerError>;
