//! Collaborator interfaces
//!
//! The renderer owns no annotation data. It asks a [`SpatialIndex`] for the
//! [`Drawable`]s intersecting a rectangle and a [`ResourceManager`] for tile
//! pixels and memory. Both are shared across threads and consulted from the
//! dispatcher thread while compositing.

use lamina_core::{
    BlendMode, ChannelMask, LayerId, LayerSetId, ObjectId, ObjectKind, Rect, ViewTransform,
};
use lamina_paint::{Color, ImagePaint, Painter, Raster, StrokeStyle};
use std::sync::Arc;

/// Finds drawable objects by location
pub trait SpatialIndex: Send + Sync {
    /// Objects of `layer` intersecting `rect`, back to front.
    ///
    /// With `include_context` the index also returns objects that only
    /// reach into `layer` from neighbouring layers, drawn for depth cueing.
    fn find_intersecting(
        &self,
        layer: LayerId,
        rect: &Rect,
        include_context: bool,
    ) -> Vec<Arc<dyn Drawable>>;

    /// Look up a single object by id
    fn find_object(&self, id: ObjectId) -> Option<Arc<dyn Drawable>>;

    /// World extent of a layer set; views reaching outside it are filled
    /// with the out-of-bounds color
    fn world_bounds(&self, _layer_set: LayerSetId) -> Option<Rect> {
        None
    }
}

/// An object the compositor can paint
pub trait Drawable: Send + Sync {
    fn id(&self) -> ObjectId;

    fn kind(&self) -> ObjectKind;

    /// Stacking position within its layer; higher is drawn later
    fn z_order(&self) -> u32;

    /// World-space bounding box
    fn bounds(&self) -> Rect;

    fn draw(&self, ctx: &mut DrawContext<'_, '_>);
}

/// Memory and tile pixel provider
pub trait ResourceManager: Send + Sync {
    /// Best-effort request to free `bytes` before a large allocation.
    /// Returns `false` when the manager could not make room.
    fn release_to_fit(&self, bytes: usize) -> bool;

    /// Pixels of an image tile at the given scale. May block on loading.
    fn fetch_tile(&self, tile: ObjectId, scale: f64) -> Option<Arc<Raster>>;
}

/// Resource manager with nothing to release and no tiles
#[derive(Clone, Copy, Debug, Default)]
pub struct NoResources;

impl ResourceManager for NoResources {
    fn release_to_fit(&self, _bytes: usize) -> bool {
        true
    }

    fn fetch_tile(&self, _tile: ObjectId, _scale: f64) -> Option<Arc<Raster>> {
        None
    }
}

/// What a [`Drawable`] draws with: the painter in the current view
/// transform, the channel mask, the layer alpha and tile access.
pub struct DrawContext<'p, 'r> {
    painter: &'p mut Painter<'r>,
    resources: &'p dyn ResourceManager,
    mask: ChannelMask,
    alpha: f32,
}

impl<'p, 'r> DrawContext<'p, 'r> {
    pub fn new(
        painter: &'p mut Painter<'r>,
        resources: &'p dyn ResourceManager,
        mask: ChannelMask,
        alpha: f32,
    ) -> Self {
        Self {
            painter,
            resources,
            mask,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    pub fn painter(&mut self) -> &mut Painter<'r> {
        self.painter
    }

    pub fn transform(&self) -> ViewTransform {
        self.painter.transform()
    }

    pub fn scale(&self) -> f64 {
        self.painter.transform().scale
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn channel_mask(&self) -> &ChannelMask {
        &self.mask
    }

    pub fn fetch_tile(&self, tile: ObjectId) -> Option<Arc<Raster>> {
        self.resources.fetch_tile(tile, self.scale())
    }

    /// Draw tile pixels over `dest` through the channel mask
    pub fn draw_tile(&mut self, image: &Raster, dest: &Rect) {
        self.painter.draw_image(
            image,
            dest,
            ImagePaint {
                mask: &self.mask,
                mode: BlendMode::Normal,
                opacity: self.alpha,
            },
        );
    }

    pub fn fill_rect(&mut self, rect: &Rect, color: Color) {
        let color = color.with_alpha(color.a * self.alpha);
        self.painter.fill_rect(rect, color);
    }

    pub fn stroke_rect(&mut self, rect: &Rect, style: StrokeStyle) {
        let color = style.color.with_alpha(style.color.a * self.alpha);
        self.painter
            .stroke_rect(rect, StrokeStyle::new(color, style.width));
    }
}
