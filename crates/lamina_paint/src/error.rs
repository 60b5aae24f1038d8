//! Paint error types

use thiserror::Error;

/// Errors raised by raster allocation and export
#[derive(Error, Debug)]
pub enum PaintError {
    /// The allocator could not provide the pixel buffer
    #[error("Failed to allocate {bytes} bytes for a {width}x{height} raster")]
    Allocation { width: u32, height: u32, bytes: usize },

    /// Pixel data does not match the declared dimensions
    #[error("Pixel buffer has {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Image export failed
    #[error("Export failed: {0}")]
    Export(#[from] std::io::Error),
}

/// Result type for paint operations
pub type Result<T> = std::result::Result<T, PaintError>;
