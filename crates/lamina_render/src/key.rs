//! Screenshot keys and cached screenshots

use lamina_core::{
    ChannelMask, LayerId, LayerSetId, LiveFilterChain, ObjectId, PixelSize, Rect, ResolvedMode,
    ViewState,
};
use lamina_paint::Raster;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;

/// The parts of a [`ViewState`] that determine the pixels of a composite.
///
/// Equality is exact: floating point fields compare by bit pattern and
/// there is no tolerance. The order in which context layers are listed is
/// normalized away, everything else that reaches the raster is included.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScreenshotKey {
    pub layer_set: LayerSetId,
    pub layer: LayerId,
    world_rect: [u64; 4],
    scale: u64,
    pub pixels: PixelSize,
    pub channel_mask: ChannelMask,
    pub mode: ResolvedMode,
    pub filters: LiveFilterChain,
    pub depth_cue: bool,
    /// Object left out of the raster and drawn on the live overlay
    pub live_object: Option<ObjectId>,
}

impl ScreenshotKey {
    pub fn from_view(view: &ViewState) -> Self {
        Self {
            layer_set: view.layer_set,
            layer: view.active_layer,
            world_rect: view.world_rect.to_bits(),
            scale: view.scale.to_bits(),
            pixels: view.pixel_size(),
            channel_mask: view.channel_mask,
            mode: view.resolved_mode(),
            filters: view.live_filters,
            depth_cue: view.depth_cue,
            live_object: view.active_object,
        }
    }

    pub fn world_rect(&self) -> Rect {
        let [x, y, w, h] = self.world_rect.map(f64::from_bits);
        Rect::new(x, y, w, h)
    }

    pub fn scale(&self) -> f64 {
        f64::from_bits(self.scale)
    }

    /// True when content of `layer` reaches the raster, as the active layer,
    /// a ghost layer or an RGB channel
    pub fn involves_layer(&self, layer: LayerId) -> bool {
        if self.layer == layer {
            return true;
        }
        match &self.mode {
            ResolvedMode::Single => false,
            ResolvedMode::MultiLayer(blends) => blends.iter().any(|b| b.layer == layer),
            ResolvedMode::Rgb { red, green, blue } => {
                [red, green, blue].iter().any(|c| **c == Some(layer))
            }
        }
    }
}

/// A composited raster and the key it was produced for. Never modified
/// after creation; a newer composite replaces it.
#[derive(Debug)]
pub struct Screenshot {
    key: ScreenshotKey,
    raster: Arc<Raster>,
    created_at: Instant,
    baked_top_objects: SmallVec<[ObjectId; 4]>,
}

impl Screenshot {
    pub fn new(
        key: ScreenshotKey,
        raster: Raster,
        baked_top_objects: impl IntoIterator<Item = ObjectId>,
    ) -> Self {
        Self {
            key,
            raster: Arc::new(raster),
            created_at: Instant::now(),
            baked_top_objects: baked_top_objects.into_iter().collect(),
        }
    }

    pub fn key(&self) -> &ScreenshotKey {
        &self.key
    }

    pub fn raster(&self) -> &Arc<Raster> {
        &self.raster
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Selected objects that were painted into the raster
    pub fn baked_top_objects(&self) -> &[ObjectId] {
        &self.baked_top_objects
    }

    pub fn is_baked(&self, id: ObjectId) -> bool {
        self.baked_top_objects.contains(&id)
    }

    pub fn byte_len(&self) -> usize {
        self.raster.byte_len()
    }

    /// Top objects of `view` the live overlay still has to draw itself
    pub fn overlay_objects(&self, view: &ViewState) -> SmallVec<[ObjectId; 4]> {
        view.top_objects()
            .into_iter()
            .filter(|id| !self.is_baked(*id))
            .collect()
    }
}
