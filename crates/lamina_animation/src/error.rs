//! Animation error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnimationError {
    /// A worker thread of the task pool could not be started
    #[error("Failed to spawn scheduler worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The scheduler has been shut down and accepts no new tasks
    #[error("Task scheduler is shut down")]
    ShutDown,
}

/// Result type for animation operations
pub type Result<T> = std::result::Result<T, AnimationError>;
