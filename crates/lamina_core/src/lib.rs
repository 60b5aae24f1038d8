//! Lamina Core
//!
//! Shared vocabulary of the incremental layer-rendering pipeline:
//!
//! - **Geometry**: world rectangles, screen rectangles and the view transform
//! - **View snapshots**: the immutable [`ViewState`] every composite reads
//! - **Repaint requests**: coalescing rules for pending redraws
//! - **Configuration**: [`CanvasConfig`] loaded from TOML
//!
//! # Example
//!
//! ```rust
//! use lamina_core::{LayerId, LayerSetId, Rect, ViewState};
//!
//! let view = ViewState::new(
//!     LayerSetId::new(1),
//!     LayerId::new(1),
//!     Rect::new(0.0, 0.0, 1000.0, 1000.0),
//!     0.5,
//! );
//! assert!(view.validate().is_ok());
//! assert_eq!(view.pixel_size().width, 500);
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod ids;
pub mod mode;
pub mod repaint;
pub mod view;

pub use channel::ChannelMask;
pub use config::CanvasConfig;
pub use error::{Error, Result};
pub use filter::{ContrastStretch, LiveFilter, LiveFilterChain, LocalContrast};
pub use geometry::{PixelSize, Point, Rect, ScreenRect, Size, ViewTransform, SCREEN_COORD_LIMIT};
pub use ids::{LayerId, LayerSetId, ObjectId, ObjectKind};
pub use mode::{BlendMode, CompositeMode, ContextLayer, LayerBlend, ResolvedBlend, ResolvedMode};
pub use repaint::{RepaintRegion, RepaintRequest};
pub use view::ViewState;
