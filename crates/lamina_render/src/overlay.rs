//! Live overlay
//!
//! Drawn fresh on every present, on top of the cached composite and in the
//! current view transform: the live-edited object at full quality, any
//! selected objects the composite did not bake in, selection outlines and
//! handles, the highlight ellipse and application decorations such as tool
//! cursors or grids.

use crate::key::Screenshot;
use crate::source::{DrawContext, ResourceManager, SpatialIndex};
use lamina_animation::Highlight;
use lamina_core::{ObjectId, Rect, ScreenRect, ViewState};
use lamina_paint::{Color, Painter, StrokeStyle};
use std::sync::Arc;

/// Application drawing on the live overlay
pub trait Decoration: Send + Sync {
    fn draw(&self, painter: &mut Painter<'_>, view: &ViewState);
}

/// Colors and sizes of overlay chrome
#[derive(Clone, Copy, Debug)]
pub struct OverlayStyle {
    pub selection: StrokeStyle,
    pub active: StrokeStyle,
    pub highlight: StrokeStyle,
    /// Side of the square corner handles, in screen pixels
    pub handle_size: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            selection: StrokeStyle::new(Color::from_rgba8(255, 200, 0, 255), 1.0),
            active: StrokeStyle::new(Color::from_rgba8(255, 80, 0, 255), 1.0),
            highlight: StrokeStyle::new(Color::YELLOW, 2.0),
            handle_size: 6,
        }
    }
}

pub struct LiveOverlay {
    spatial: Arc<dyn SpatialIndex>,
    resources: Arc<dyn ResourceManager>,
    style: OverlayStyle,
}

impl LiveOverlay {
    pub fn new(spatial: Arc<dyn SpatialIndex>, resources: Arc<dyn ResourceManager>) -> Self {
        Self {
            spatial,
            resources,
            style: OverlayStyle::default(),
        }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Draw the overlay for `view` over `base`, the composite on screen
    pub fn draw(
        &self,
        painter: &mut Painter<'_>,
        view: &ViewState,
        base: Option<&Screenshot>,
        highlight: Option<&Highlight>,
        decorations: &[Arc<dyn Decoration>],
    ) {
        let pending = match base {
            Some(shot) => shot.overlay_objects(view),
            None => view.top_objects(),
        };
        for id in &pending {
            self.draw_object(painter, view, *id);
        }

        for id in view.top_objects() {
            let Some(object) = self.spatial.find_object(id) else {
                continue;
            };
            let style = if Some(id) == view.active_object {
                self.style.active
            } else {
                self.style.selection
            };
            self.draw_handles(painter, &object.bounds(), style);
        }

        if let Some(highlight) = highlight {
            painter.stroke_ellipse(&highlight.ellipse(), self.style.highlight);
        }

        for decoration in decorations {
            decoration.draw(painter, view);
        }
    }

    fn draw_object(&self, painter: &mut Painter<'_>, view: &ViewState, id: ObjectId) {
        let Some(object) = self.spatial.find_object(id) else {
            tracing::trace!(object = %id, "overlay object not found");
            return;
        };
        // Overlay painters anti-alias whatever quality the composite used
        let mut ctx = DrawContext::new(painter, &*self.resources, view.channel_mask, 1.0);
        object.draw(&mut ctx);
    }

    fn draw_handles(&self, painter: &mut Painter<'_>, bounds: &Rect, style: StrokeStyle) {
        painter.stroke_rect(bounds, style);
        let screen = painter.transform().rect_to_screen_bounds(bounds);
        let half = self.style.handle_size / 2;
        for (x, y) in [
            (screen.x, screen.y),
            (screen.max_x(), screen.y),
            (screen.x, screen.max_y()),
            (screen.max_x(), screen.max_y()),
        ] {
            let size = self.style.handle_size;
            painter.fill_screen_rect(
                ScreenRect::new(x.saturating_sub(half), y.saturating_sub(half), size, size),
                style.color,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use lamina_core::{LayerId, LayerSetId, PixelSize};
    use lamina_paint::Raster;

    fn setup() -> (Arc<MemoryScene>, LiveOverlay, ViewState) {
        let scene = Arc::new(MemoryScene::new());
        scene.add_rect(
            LayerId::new(1),
            ObjectId::new(1),
            Rect::new(10.0, 10.0, 20.0, 20.0),
            Color::BLUE,
        );
        let overlay = LiveOverlay::new(scene.clone(), scene.clone());
        let view = ViewState::new(
            LayerSetId::new(1),
            LayerId::new(1),
            Rect::new(0.0, 0.0, 40.0, 40.0),
            1.0,
        );
        (scene, overlay, view)
    }

    #[test]
    fn test_unbaked_selection_is_drawn_with_handles() {
        let (_scene, overlay, view) = setup();
        let view = view.with_selection([ObjectId::new(1)]);
        let mut raster = Raster::try_new(PixelSize::new(40, 40)).unwrap();
        let mut painter = Painter::new(&mut raster, view.transform());
        overlay.draw(&mut painter, &view, None, None, &[]);

        assert_eq!(raster.get_pixel(20, 20), Some([0, 0, 255, 255]));
        // Corner handle centered on (10, 10)
        assert_eq!(raster.get_pixel(8, 8), Some([255, 200, 0, 255]));
        assert_eq!(raster.get_pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_decorations_draw_last() {
        struct Cross;
        impl Decoration for Cross {
            fn draw(&self, painter: &mut Painter<'_>, _view: &ViewState) {
                painter.fill_rect(&Rect::new(15.0, 15.0, 10.0, 10.0), Color::WHITE);
            }
        }
        let (_scene, overlay, view) = setup();
        let view = view.with_active_object(Some(ObjectId::new(1)));
        let mut raster = Raster::try_new(PixelSize::new(40, 40)).unwrap();
        let mut painter = Painter::new(&mut raster, view.transform());
        let decorations: Vec<Arc<dyn Decoration>> = vec![Arc::new(Cross)];
        overlay.draw(&mut painter, &view, None, None, &decorations);

        assert_eq!(raster.get_pixel(20, 20), Some([255, 255, 255, 255]));
        assert_eq!(raster.get_pixel(20, 12), Some([0, 0, 255, 255]));
    }
}
