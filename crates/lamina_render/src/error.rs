//! Render error types

use lamina_core::ObjectId;
use thiserror::Error;

/// Errors surfaced to the embedding application
#[derive(Error, Debug)]
pub enum RenderError {
    /// View mutation was attempted while an animation owns the view
    #[error("View input is suspended while an animation runs")]
    InputSuspended,

    /// Invalid view or configuration
    #[error(transparent)]
    Core(#[from] lamina_core::Error),

    /// Raster allocation or export failed
    #[error("Paint error: {0}")]
    Paint(#[from] lamina_paint::PaintError),

    /// The animation scheduler refused the task
    #[error("Animation error: {0}")]
    Animation(#[from] lamina_animation::AnimationError),

    /// Failed to start the repaint dispatcher thread
    #[error("Failed to spawn repaint dispatcher: {0}")]
    Spawn(#[source] std::io::Error),

    /// The spatial index does not know the object
    #[error("Unknown object {0}")]
    UnknownObject(ObjectId),
}

/// Result type for render operations
pub type Result<T> = std::result::Result<T, RenderError>;

/// Accelerated surface failures
///
/// None of these reach the application: the presenter retries on
/// [`SurfaceError::ContentLost`] and draws directly on the others.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The platform reclaimed the surface contents; redraw and retry
    #[error("Surface contents lost")]
    ContentLost,

    /// The surface can no longer be used at all
    #[error("Surface unusable: {0}")]
    Unusable(String),

    /// Backing buffers could not be allocated
    #[error("Failed to allocate a {width}x{height} surface")]
    Allocation { width: u32, height: u32 },
}

/// Result type for surface operations
pub type SurfaceResult<T> = std::result::Result<T, SurfaceError>;
