//! In-memory scene
//!
//! A [`SpatialIndex`] and [`ResourceManager`] over plain vectors, with
//! ready-made image tile and shape drawables. Meant for headless rendering,
//! examples and tests; real viewers plug in their own index and loader.
//! Query and release calls are counted so callers can observe cache hits.

use crate::source::{DrawContext, Drawable, ResourceManager, SpatialIndex};
use lamina_core::{LayerId, LayerSetId, ObjectId, ObjectKind, Rect};
use lamina_paint::{Color, Raster, StrokeStyle};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Image patch whose pixels come from the resource manager
#[derive(Clone, Debug)]
pub struct ImageTile {
    pub id: ObjectId,
    pub bounds: Rect,
    pub z_order: u32,
}

impl Drawable for ImageTile {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Tile
    }

    fn z_order(&self) -> u32 {
        self.z_order
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn draw(&self, ctx: &mut DrawContext<'_, '_>) {
        match ctx.fetch_tile(self.id) {
            Some(pixels) => ctx.draw_tile(&pixels, &self.bounds),
            None => tracing::trace!(tile = %self.id, "tile pixels unavailable"),
        }
    }
}

/// Filled and/or outlined rectangle
#[derive(Clone, Debug)]
pub struct ShapeObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub bounds: Rect,
    pub z_order: u32,
    pub fill: Option<Color>,
    pub stroke: Option<StrokeStyle>,
}

impl Drawable for ShapeObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn z_order(&self) -> u32 {
        self.z_order
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn draw(&self, ctx: &mut DrawContext<'_, '_>) {
        if let Some(fill) = self.fill {
            ctx.fill_rect(&self.bounds, fill);
        }
        if let Some(stroke) = self.stroke {
            ctx.stroke_rect(&self.bounds, stroke);
        }
    }
}

#[derive(Default)]
struct SceneData {
    layers: FxHashMap<LayerId, Vec<Arc<dyn Drawable>>>,
    tiles: FxHashMap<ObjectId, Arc<Raster>>,
    bounds: FxHashMap<LayerSetId, Rect>,
    next_z: u32,
}

#[derive(Default)]
pub struct MemoryScene {
    data: RwLock<SceneData>,
    queries: AtomicUsize,
    releases: AtomicUsize,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object on top of everything inserted so far
    pub fn insert(&self, layer: LayerId, object: Arc<dyn Drawable>) {
        self.data.write().layers.entry(layer).or_default().push(object);
    }

    fn next_z(&self) -> u32 {
        let mut data = self.data.write();
        data.next_z += 1;
        data.next_z
    }

    /// Add an image tile and its pixels
    pub fn add_tile(&self, layer: LayerId, id: ObjectId, bounds: Rect, pixels: Raster) {
        let z_order = self.next_z();
        self.data.write().tiles.insert(id, Arc::new(pixels));
        self.insert(layer, Arc::new(ImageTile { id, bounds, z_order }));
    }

    /// Add a tile filled with one color
    pub fn add_solid_tile(&self, layer: LayerId, id: ObjectId, bounds: Rect, rgba: [u8; 4]) {
        let pixels = Raster::from_rgba(1, 1, rgba.to_vec());
        match pixels {
            Ok(pixels) => self.add_tile(layer, id, bounds, pixels),
            Err(e) => tracing::warn!("solid tile rejected: {e}"),
        }
    }

    /// Add a filled vector rectangle
    pub fn add_rect(&self, layer: LayerId, id: ObjectId, bounds: Rect, fill: Color) {
        let z_order = self.next_z();
        self.insert(
            layer,
            Arc::new(ShapeObject {
                id,
                kind: ObjectKind::Vector,
                bounds,
                z_order,
                fill: Some(fill),
                stroke: None,
            }),
        );
    }

    /// Remove an object from every layer; returns its bounds if found
    pub fn remove(&self, id: ObjectId) -> Option<Rect> {
        let mut data = self.data.write();
        data.tiles.remove(&id);
        let mut bounds = None;
        for objects in data.layers.values_mut() {
            if let Some(pos) = objects.iter().position(|o| o.id() == id) {
                bounds = Some(objects.remove(pos).bounds());
            }
        }
        bounds
    }

    pub fn set_world_bounds(&self, layer_set: LayerSetId, bounds: Rect) {
        self.data.write().bounds.insert(layer_set, bounds);
    }

    /// Calls to [`SpatialIndex::find_intersecting`] so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Calls to [`ResourceManager::release_to_fit`] so far
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl SpatialIndex for MemoryScene {
    fn find_intersecting(
        &self,
        layer: LayerId,
        rect: &Rect,
        _include_context: bool,
    ) -> Vec<Arc<dyn Drawable>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let data = self.data.read();
        let mut found: Vec<Arc<dyn Drawable>> = data
            .layers
            .get(&layer)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|o| o.bounds().intersects(rect))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by_key(|o| o.z_order());
        found
    }

    fn find_object(&self, id: ObjectId) -> Option<Arc<dyn Drawable>> {
        self.data
            .read()
            .layers
            .values()
            .flat_map(|objects| objects.iter())
            .find(|o| o.id() == id)
            .cloned()
    }

    fn world_bounds(&self, layer_set: LayerSetId) -> Option<Rect> {
        self.data.read().bounds.get(&layer_set).copied()
    }
}

impl ResourceManager for MemoryScene {
    fn release_to_fit(&self, _bytes: usize) -> bool {
        self.releases.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn fetch_tile(&self, tile: ObjectId, _scale: f64) -> Option<Arc<Raster>> {
        self.data.read().tiles.get(&tile).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_intersecting_orders_back_to_front() {
        let scene = MemoryScene::new();
        let layer = LayerId::new(1);
        scene.add_rect(layer, ObjectId::new(2), Rect::new(0.0, 0.0, 5.0, 5.0), Color::RED);
        scene.add_solid_tile(layer, ObjectId::new(1), Rect::new(0.0, 0.0, 5.0, 5.0), [1, 2, 3, 255]);
        scene.add_rect(layer, ObjectId::new(3), Rect::new(50.0, 50.0, 5.0, 5.0), Color::RED);

        let found = scene.find_intersecting(layer, &Rect::new(0.0, 0.0, 10.0, 10.0), false);
        let ids: Vec<ObjectId> = found.iter().map(|o| o.id()).collect();
        assert_eq!(ids, vec![ObjectId::new(2), ObjectId::new(1)]);
        assert_eq!(scene.query_count(), 1);
    }

    #[test]
    fn test_remove_returns_bounds() {
        let scene = MemoryScene::new();
        let bounds = Rect::new(1.0, 2.0, 3.0, 4.0);
        scene.add_solid_tile(LayerId::new(1), ObjectId::new(7), bounds, [0, 0, 0, 255]);
        assert!(scene.find_object(ObjectId::new(7)).is_some());
        assert_eq!(scene.remove(ObjectId::new(7)), Some(bounds));
        assert!(scene.find_object(ObjectId::new(7)).is_none());
        assert!(scene.fetch_tile(ObjectId::new(7), 1.0).is_none());
    }
}
