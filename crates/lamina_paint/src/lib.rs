//! Lamina Paint
//!
//! CPU drawing layer of the rendering pipeline.
//!
//! # Features
//!
//! - Straight-alpha RGBA8 and 8-bit gray rasters with fail-soft allocation
//! - World-transformed fills, strokes and image blits with anti-aliasing
//! - Blend modes for ghost layers (normal, add, subtract, multiply, difference)
//! - Live filters: contrast stretch, invert, CLAHE local contrast
//! - Frame comparison helpers and optional PNG export

pub mod blend;
pub mod color;
pub mod error;
#[cfg(feature = "png")]
pub mod export;
pub mod filters;
pub mod painter;
pub mod raster;

pub use blend::blend_pixel;
pub use color::Color;
pub use error::{PaintError, Result};
pub use filters::apply_chain;
pub use painter::{ImagePaint, Painter, StrokeStyle};
pub use raster::{GrayRaster, Raster};
