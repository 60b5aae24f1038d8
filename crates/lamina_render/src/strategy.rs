//! Compositing strategies
//!
//! One strategy per [`ResolvedMode`]:
//!
//! - **Single**: tiles then vector and label objects of the active layer,
//!   back to front, in one pass.
//! - **Multi-layer**: active tiles, then each ghost layer's eligible objects
//!   rendered apart and blended on with that layer's mode and opacity, then
//!   the active layer's vector and label objects unblended on top.
//! - **RGB**: up to three layers rendered to gray planes and recombined as
//!   the red, green and blue channels. Unassigned channels stay zero.
//!
//! Layers are independent: an object listed by two layers is drawn once per
//! layer, and a layer without objects contributes transparent pixels.

use crate::source::{DrawContext, Drawable, ResourceManager, SpatialIndex};
use lamina_core::{
    LayerId, ObjectId, ObjectKind, PixelSize, ResolvedBlend, ResolvedMode, ViewState,
};
use lamina_paint::{GrayRaster, Painter, Raster, Result};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Objects of one layer split the way every strategy paints them
struct LayerObjects {
    tiles: Vec<Arc<dyn Drawable>>,
    shapes: Vec<Arc<dyn Drawable>>,
}

impl LayerObjects {
    fn all(&self) -> impl Iterator<Item = &Arc<dyn Drawable>> {
        self.tiles.iter().chain(self.shapes.iter())
    }
}

/// Inputs and bookkeeping of one composite
pub(crate) struct Frame<'a> {
    pub view: &'a ViewState,
    pub size: PixelSize,
    pub spatial: &'a dyn SpatialIndex,
    pub resources: &'a dyn ResourceManager,
    /// Object classes ghost layers may show
    pub eligible: &'a [ObjectKind],
    /// Ids painted for the active layer or an RGB channel
    pub painted: FxHashSet<ObjectId>,
    pub queries: usize,
}

impl<'a> Frame<'a> {
    pub fn new(
        view: &'a ViewState,
        spatial: &'a dyn SpatialIndex,
        resources: &'a dyn ResourceManager,
        eligible: &'a [ObjectKind],
    ) -> Self {
        Self {
            view,
            size: view.pixel_size(),
            spatial,
            resources,
            eligible,
            painted: FxHashSet::default(),
            queries: 0,
        }
    }

    /// Intersecting objects of `layer` minus the live-edited one, stably
    /// ordered back to front and partitioned into tiles and the rest
    fn objects(&mut self, layer: LayerId, include_context: bool) -> LayerObjects {
        self.queries += 1;
        let mut found = self
            .spatial
            .find_intersecting(layer, &self.view.world_rect, include_context);
        if let Some(live) = self.view.active_object {
            found.retain(|object| object.id() != live);
        }
        found.sort_by_key(|object| object.z_order());
        let (tiles, shapes) = found
            .into_iter()
            .partition(|object| object.kind() == ObjectKind::Tile);
        LayerObjects { tiles, shapes }
    }

    fn paint<'o>(
        &mut self,
        raster: &mut Raster,
        objects: impl IntoIterator<Item = &'o Arc<dyn Drawable>>,
        record: bool,
    ) {
        let resources = self.resources;
        let mask = self.view.channel_mask;
        let mut painter = Painter::new(raster, self.view.transform());
        for object in objects {
            let mut ctx = DrawContext::new(&mut painter, resources, mask, 1.0);
            object.draw(&mut ctx);
            if record {
                self.painted.insert(object.id());
            }
        }
    }
}

/// Bytes the strategy for `mode` allocates at `size`
pub(crate) fn estimate_bytes(mode: &ResolvedMode, size: PixelSize) -> usize {
    let rgba = size.rgba_bytes();
    match mode {
        ResolvedMode::Single => rgba,
        ResolvedMode::MultiLayer(blends) if blends.is_empty() => rgba,
        ResolvedMode::MultiLayer(_) => rgba.saturating_mul(2),
        ResolvedMode::Rgb { .. } => rgba
            .saturating_mul(2)
            .saturating_add(size.pixel_count().saturating_mul(3)),
    }
}

/// Run the strategy for `mode`
pub(crate) fn render(mode: &ResolvedMode, frame: &mut Frame<'_>) -> Result<Raster> {
    match mode {
        ResolvedMode::Single => single(frame),
        ResolvedMode::MultiLayer(blends) => multi_layer(frame, blends),
        ResolvedMode::Rgb { red, green, blue } => rgb(frame, [*red, *green, *blue]),
    }
}

fn single(frame: &mut Frame<'_>) -> Result<Raster> {
    let mut raster = Raster::try_new(frame.size)?;
    let objects = frame.objects(frame.view.active_layer, frame.view.depth_cue);
    frame.paint(&mut raster, objects.all(), true);
    Ok(raster)
}

fn multi_layer(frame: &mut Frame<'_>, blends: &[ResolvedBlend]) -> Result<Raster> {
    let mut acc = Raster::try_new(frame.size)?;
    let active = frame.objects(frame.view.active_layer, frame.view.depth_cue);
    frame.paint(&mut acc, &active.tiles, true);

    if !blends.is_empty() {
        let mut ghost = Raster::try_new(frame.size)?;
        for blend in blends {
            ghost.fill([0, 0, 0, 0]);
            let objects = frame.objects(blend.layer, false);
            let eligible: Vec<&Arc<dyn Drawable>> = objects
                .all()
                .filter(|object| frame.eligible.contains(&object.kind()))
                .collect();
            let count = eligible.len();
            frame.paint(&mut ghost, eligible, false);
            acc.composite(&ghost, blend.blend.mode, blend.blend.opacity);
            tracing::trace!(
                layer = %blend.layer,
                offset = blend.offset,
                mode = ?blend.blend.mode,
                objects = count,
                "blended ghost layer"
            );
        }
    }

    frame.paint(&mut acc, &active.shapes, true);
    Ok(acc)
}

fn rgb(frame: &mut Frame<'_>, channels: [Option<LayerId>; 3]) -> Result<Raster> {
    let mut planes: [Option<GrayRaster>; 3] = [None, None, None];
    for (plane, layer) in planes.iter_mut().zip(channels) {
        let Some(layer) = layer else {
            continue;
        };
        let mut raster = Raster::try_new(frame.size)?;
        let objects = frame.objects(layer, false);
        frame.paint(&mut raster, objects.all(), true);
        *plane = Some(raster.to_gray()?);
    }
    Raster::from_channels(
        frame.size,
        [planes[0].as_ref(), planes[1].as_ref(), planes[2].as_ref()],
    )
}
