//! Lamina Renderer
//!
//! Incremental re-rendering of a layer viewer: the expensive composite of a
//! layer's objects is cached as a [`Screenshot`] keyed by everything that
//! determines its pixels, and only the cheap live overlay is redrawn on
//! every frame.
//!
//! # Pipeline
//!
//! - **Dispatcher**: coalesces repaint requests from any thread into one
//!   pending slot drained by a single thread per canvas
//! - **Compositor**: single-layer, multi-layer (depth cue) and RGB
//!   strategies, consulting the [`ScreenshotCache`] first
//! - **Presenter**: double-buffered presentation with content-loss retry and
//!   a direct-drawing fallback
//! - **Canvas**: owns all of the above plus the animator, and exposes the
//!   view mutators to the embedding application

pub mod cache;
pub mod canvas;
pub mod compositor;
pub mod dispatcher;
pub mod error;
pub mod key;
pub mod memory;
pub mod overlay;
pub mod presenter;
pub mod source;
mod strategy;
pub mod surface;

pub use cache::{CacheStats, ScreenshotCache};
pub use canvas::{AnimationTarget, Canvas, CanvasBuilder, FrameStatus, ScreenshotHandle};
pub use compositor::{CompositeOutcome, Compositor, CompositorSettings};
pub use dispatcher::{FrameCallback, FrameEvent, RepaintDispatcher, RepaintQueue};
pub use error::{RenderError, Result, SurfaceError, SurfaceResult};
pub use key::{Screenshot, ScreenshotKey};
pub use memory::{ImageTile, MemoryScene, ShapeObject};
pub use overlay::{Decoration, LiveOverlay, OverlayStyle};
pub use presenter::{PresentFrame, PresentPath, PresentReport, Presenter};
pub use source::{DrawContext, Drawable, NoResources, ResourceManager, SpatialIndex};
pub use surface::{NullScreen, Screen, SoftwareSurface, Surface, SurfaceLoss, SurfaceStatus};
