//! Offscreen compositor
//!
//! Turns a [`ViewState`] snapshot into a [`Screenshot`]:
//!
//! 1. Derive the [`ScreenshotKey`] and return a cached screenshot on a hit.
//! 2. On a miss, ask the spatial index for the visible objects, leaving the
//!    live-edited object for the overlay.
//! 3. Run the strategy for the view's compositing mode.
//! 4. Apply the live filter chain (stretch, invert, local contrast).
//! 5. Fill screen areas outside the layer set's world bounds.
//! 6. Store the screenshot in the cache.
//!
//! Allocation is preceded by a release hint to the resource manager. When a
//! raster still cannot be allocated the cache is reclaimed and the composite
//! retried once; after that the outcome is [`CompositeOutcome::Degraded`] and
//! whatever was displayed before stays up.
//!
//! Clones share one in-flight lock: at most one composite runs at a time no
//! matter which thread asks for it.

use crate::cache::ScreenshotCache;
use crate::key::{Screenshot, ScreenshotKey};
use crate::source::{ResourceManager, SpatialIndex};
use crate::strategy::{self, Frame};
use lamina_core::{CanvasConfig, ObjectId, ObjectKind, Rect, ScreenRect, ViewState};
use lamina_paint::{apply_chain, PaintError, Raster};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Compositor tunables taken from [`CanvasConfig`]
#[derive(Clone, Debug, PartialEq)]
pub struct CompositorSettings {
    pub out_of_bounds: [u8; 4],
    pub multi_layer_kinds: SmallVec<[ObjectKind; 3]>,
}

impl CompositorSettings {
    pub fn from_config(config: &CanvasConfig) -> Self {
        Self {
            out_of_bounds: config.out_of_bounds,
            multi_layer_kinds: config.multi_layer_kinds.iter().copied().collect(),
        }
    }
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self::from_config(&CanvasConfig::default())
    }
}

/// Result of [`Compositor::composite`]
#[derive(Debug)]
pub enum CompositeOutcome {
    /// Served from the cache
    Cached(Arc<Screenshot>),
    /// Freshly composited and stored
    Rendered(Arc<Screenshot>),
    /// No raster could be produced; keep showing the previous one
    Degraded(PaintError),
}

impl CompositeOutcome {
    pub fn screenshot(&self) -> Option<&Arc<Screenshot>> {
        match self {
            CompositeOutcome::Cached(shot) | CompositeOutcome::Rendered(shot) => Some(shot),
            CompositeOutcome::Degraded(_) => None,
        }
    }

    pub fn into_screenshot(self) -> Option<Arc<Screenshot>> {
        match self {
            CompositeOutcome::Cached(shot) | CompositeOutcome::Rendered(shot) => Some(shot),
            CompositeOutcome::Degraded(_) => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, CompositeOutcome::Cached(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, CompositeOutcome::Degraded(_))
    }
}

/// Composites views through a shared cache. Cheap to clone.
#[derive(Clone)]
pub struct Compositor {
    spatial: Arc<dyn SpatialIndex>,
    resources: Arc<dyn ResourceManager>,
    cache: Arc<ScreenshotCache>,
    settings: Arc<CompositorSettings>,
    rendered: Arc<AtomicU64>,
    in_flight: Arc<Mutex<()>>,
}

impl Compositor {
    pub fn new(
        spatial: Arc<dyn SpatialIndex>,
        resources: Arc<dyn ResourceManager>,
        cache: Arc<ScreenshotCache>,
        settings: CompositorSettings,
    ) -> Self {
        Self {
            spatial,
            resources,
            cache,
            settings: Arc::new(settings),
            rendered: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn spatial(&self) -> &Arc<dyn SpatialIndex> {
        &self.spatial
    }

    pub fn resources(&self) -> &Arc<dyn ResourceManager> {
        &self.resources
    }

    pub fn cache(&self) -> &Arc<ScreenshotCache> {
        &self.cache
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    /// Composites actually rendered (cache hits excluded)
    pub fn rendered_count(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }

    /// Cached screenshot for `view`, or a fresh composite stored in the cache
    pub fn composite(&self, view: &ViewState) -> CompositeOutcome {
        let key = ScreenshotKey::from_view(view);
        if let Some(shot) = self.cache.get(&key) {
            tracing::trace!(layer = %key.layer, mode = key.mode.name(), "screenshot cache hit");
            return CompositeOutcome::Cached(shot);
        }
        let _in_flight = self.in_flight.lock();
        // The composite we waited on may have produced this very key
        if let Some(shot) = self.cache.get(&key) {
            tracing::trace!(layer = %key.layer, "screenshot stored while waiting");
            return CompositeOutcome::Cached(shot);
        }
        self.render_and_store(view)
    }

    /// Composite `view` without consulting the cache, replacing any entry
    pub fn recomposite(&self, view: &ViewState) -> CompositeOutcome {
        let _in_flight = self.in_flight.lock();
        self.render_and_store(view)
    }

    /// Caller holds `in_flight`
    fn render_and_store(&self, view: &ViewState) -> CompositeOutcome {
        match self.render_locked(view) {
            Ok(shot) => CompositeOutcome::Rendered(self.cache.put(shot)),
            Err(e) => {
                tracing::warn!(layer = %view.active_layer, "composite degraded: {e}");
                CompositeOutcome::Degraded(e)
            }
        }
    }

    /// Composite `view` into a new screenshot; the cache is neither read
    /// nor written, though it may be reclaimed to make room
    pub fn render(&self, view: &ViewState) -> lamina_paint::Result<Screenshot> {
        let _in_flight = self.in_flight.lock();
        self.render_locked(view)
    }

    fn render_locked(&self, view: &ViewState) -> lamina_paint::Result<Screenshot> {
        let started = Instant::now();
        let key = ScreenshotKey::from_view(view);
        let needed = strategy::estimate_bytes(&key.mode, key.pixels);
        if !self.resources.release_to_fit(needed) {
            self.cache.reclaim(needed);
        }

        let (raster, painted) = match self.paint(view, &key) {
            Err(PaintError::Allocation { bytes, .. }) => {
                tracing::debug!(bytes, needed, "composite allocation failed; reclaiming");
                self.cache.reclaim(needed);
                self.resources.release_to_fit(needed);
                self.paint(view, &key)?
            }
            other => other?,
        };

        let baked: SmallVec<[ObjectId; 4]> = view
            .selection
            .iter()
            .copied()
            .filter(|id| Some(*id) != view.active_object && painted.contains(id))
            .collect();
        self.rendered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            layer = %key.layer,
            mode = key.mode.name(),
            width = key.pixels.width,
            height = key.pixels.height,
            objects = painted.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "composited view"
        );
        Ok(Screenshot::new(key, raster, baked))
    }

    fn paint(
        &self,
        view: &ViewState,
        key: &ScreenshotKey,
    ) -> lamina_paint::Result<(Raster, FxHashSet<ObjectId>)> {
        let mut frame = Frame::new(
            view,
            &*self.spatial,
            &*self.resources,
            &self.settings.multi_layer_kinds,
        );
        let mut raster = strategy::render(&key.mode, &mut frame)?;
        apply_chain(&mut raster, &view.live_filters);
        if let Some(bounds) = self.spatial.world_bounds(view.layer_set) {
            fill_out_of_bounds(&mut raster, view, &bounds, self.settings.out_of_bounds);
        }
        tracing::trace!(queries = frame.queries, "spatial queries for composite");
        Ok((raster, frame.painted))
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .field("rendered", &self.rendered_count())
            .finish_non_exhaustive()
    }
}

/// Paint every pixel whose world position lies outside `bounds`
fn fill_out_of_bounds(raster: &mut Raster, view: &ViewState, bounds: &Rect, rgba: [u8; 4]) {
    let w = i32::try_from(raster.width()).unwrap_or(i32::MAX);
    let h = i32::try_from(raster.height()).unwrap_or(i32::MAX);
    let (x0, y0, x1, y1) = view.transform().rect_to_screen(bounds);
    let clamp = |v: f64, max: i32| v.clamp(0.0, max as f64) as i32;
    let left = clamp(x0.floor(), w);
    let top = clamp(y0.floor(), h);
    let right = clamp(x1.ceil(), w).max(left);
    let bottom = clamp(y1.ceil(), h).max(top);

    for band in [
        ScreenRect::new(0, 0, w, top),
        ScreenRect::new(0, bottom, w, h - bottom),
        ScreenRect::new(0, top, left, bottom - top),
        ScreenRect::new(right, top, w - right, bottom - top),
    ] {
        if !band.is_empty() {
            raster.fill_rect(band, rgba);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use lamina_core::{LayerId, LayerSetId, PixelSize};
    use lamina_paint::Color;

    fn view() -> ViewState {
        ViewState::new(
            LayerSetId::new(1),
            LayerId::new(1),
            Rect::new(0.0, 0.0, 20.0, 20.0),
            1.0,
        )
    }

    fn compositor(scene: &Arc<MemoryScene>) -> Compositor {
        Compositor::new(
            Arc::clone(scene) as Arc<dyn SpatialIndex>,
            Arc::clone(scene) as Arc<dyn ResourceManager>,
            Arc::new(ScreenshotCache::new(16)),
            CompositorSettings::default(),
        )
    }

    #[test]
    fn test_second_composite_is_cached() {
        let scene = Arc::new(MemoryScene::new());
        scene.add_rect(LayerId::new(1), ObjectId::new(1), Rect::new(2.0, 2.0, 4.0, 4.0), Color::RED);
        let compositor = compositor(&scene);

        let first = compositor.composite(&view());
        assert!(matches!(first, CompositeOutcome::Rendered(_)));
        let second = compositor.composite(&view());
        assert!(second.is_cached());
        assert_eq!(scene.query_count(), 1);
        assert_eq!(compositor.rendered_count(), 1);
    }

    #[test]
    fn test_live_object_is_left_out() {
        let scene = Arc::new(MemoryScene::new());
        scene.add_rect(LayerId::new(1), ObjectId::new(1), Rect::new(0.0, 0.0, 10.0, 10.0), Color::RED);
        let compositor = compositor(&scene);

        let live = view().with_active_object(Some(ObjectId::new(1)));
        let shot = compositor.composite(&live).into_screenshot().unwrap();
        assert_eq!(shot.raster().get_pixel(5, 5), Some([0, 0, 0, 0]));
        assert_eq!(shot.overlay_objects(&live).as_slice(), &[ObjectId::new(1)]);
    }

    #[test]
    fn test_selection_is_baked_when_painted() {
        let scene = Arc::new(MemoryScene::new());
        scene.add_rect(LayerId::new(1), ObjectId::new(1), Rect::new(0.0, 0.0, 10.0, 10.0), Color::RED);
        let compositor = compositor(&scene);

        let selected = view().with_selection([ObjectId::new(1), ObjectId::new(99)]);
        let shot = compositor.composite(&selected).into_screenshot().unwrap();
        assert_eq!(shot.baked_top_objects(), &[ObjectId::new(1)]);
        assert_eq!(shot.overlay_objects(&selected).as_slice(), &[ObjectId::new(99)]);
    }

    #[test]
    fn test_out_of_bounds_area_is_filled() {
        let scene = Arc::new(MemoryScene::new());
        scene.set_world_bounds(LayerSetId::new(1), Rect::new(0.0, 0.0, 10.0, 20.0));
        let compositor = compositor(&scene);

        let shot = compositor.composite(&view()).into_screenshot().unwrap();
        assert_eq!(shot.raster().get_pixel(5, 5), Some([0, 0, 0, 0]));
        assert_eq!(shot.raster().get_pixel(15, 5), Some([128, 128, 128, 255]));
    }

    #[test]
    fn test_unallocatable_view_degrades() {
        let scene = Arc::new(MemoryScene::new());
        let compositor = compositor(&scene);
        let huge = view().with_view(Rect::new(0.0, 0.0, 1.0e10, 1.0e10), 1.0);
        assert_eq!(huge.pixel_size(), PixelSize::new(u32::MAX, u32::MAX));

        let outcome = compositor.composite(&huge);
        assert!(outcome.is_degraded());
        assert!(compositor.cache().is_empty());
    }
}
