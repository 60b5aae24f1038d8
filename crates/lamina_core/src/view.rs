//! View snapshots
//!
//! A [`ViewState`] describes everything that determines what the canvas shows.
//! Snapshots are immutable once published: every mutator below consumes a
//! snapshot and returns a new one, and the canvas swaps the shared
//! `Arc<ViewState>` atomically. Workers holding an older `Arc` keep a
//! consistent picture for the whole of their composite.

use crate::channel::ChannelMask;
use crate::error::{Error, Result};
use crate::filter::LiveFilterChain;
use crate::geometry::{PixelSize, Point, Rect, ViewTransform};
use crate::ids::{LayerId, LayerSetId, ObjectId};
use crate::mode::{CompositeMode, ContextLayer, ResolvedMode};
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    pub layer_set: LayerSetId,
    /// Visible world rectangle
    pub world_rect: Rect,
    /// Screen pixels per world unit, always > 0
    pub scale: f64,
    pub active_layer: LayerId,
    /// Neighbouring layers for depth cueing, in no particular order
    pub context_layers: SmallVec<[ContextLayer; 4]>,
    /// The object being live-edited; never baked into cached rasters
    pub active_object: Option<ObjectId>,
    /// Selected ("top") objects whose handles are drawn on the overlay
    pub selection: SmallVec<[ObjectId; 4]>,
    pub channel_mask: ChannelMask,
    pub live_filters: LiveFilterChain,
    pub mode: CompositeMode,
    /// Ask the spatial collaborator for objects of context layers as well
    pub depth_cue: bool,
}

impl ViewState {
    pub fn new(layer_set: LayerSetId, active_layer: LayerId, world_rect: Rect, scale: f64) -> Self {
        Self {
            layer_set,
            world_rect,
            scale,
            active_layer,
            context_layers: SmallVec::new(),
            active_object: None,
            selection: SmallVec::new(),
            channel_mask: ChannelMask::default(),
            live_filters: LiveFilterChain::default(),
            mode: CompositeMode::default(),
            depth_cue: true,
        }
    }

    /// Check the invariants every published snapshot must hold
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::InvalidView(format!(
                "scale must be finite and positive, got {}",
                self.scale
            )));
        }
        let r = &self.world_rect;
        let finite = [r.x(), r.y(), r.width(), r.height()]
            .iter()
            .all(|v| v.is_finite());
        if !finite || r.width() < 0.0 || r.height() < 0.0 {
            return Err(Error::InvalidView(format!("bad world rect {r:?}")));
        }
        Ok(())
    }

    pub fn transform(&self) -> ViewTransform {
        ViewTransform::new(self.world_rect.origin, self.scale)
    }

    /// Viewport size implied by the world rect and scale
    pub fn pixel_size(&self) -> PixelSize {
        PixelSize::new(
            (self.world_rect.width() * self.scale).ceil().max(0.0) as u32,
            (self.world_rect.height() * self.scale).ceil().max(0.0) as u32,
        )
    }

    pub fn resolved_mode(&self) -> ResolvedMode {
        ResolvedMode::resolve(self.mode, self.active_layer, &self.context_layers)
    }

    pub fn with_view(mut self, world_rect: Rect, scale: f64) -> Self {
        self.world_rect = world_rect;
        self.scale = scale;
        self
    }

    /// Re-center the visible rect on `center`, keeping its size
    pub fn centered_on(mut self, center: Point) -> Self {
        self.world_rect = Rect::from_center(center, self.world_rect.size);
        self
    }

    pub fn with_active_layer(mut self, layer: LayerId) -> Self {
        self.active_layer = layer;
        self
    }

    pub fn with_context_layers(mut self, context: impl IntoIterator<Item = ContextLayer>) -> Self {
        self.context_layers = context.into_iter().collect();
        self
    }

    pub fn with_active_object(mut self, object: Option<ObjectId>) -> Self {
        self.active_object = object;
        self
    }

    pub fn with_selection(mut self, selection: impl IntoIterator<Item = ObjectId>) -> Self {
        self.selection = selection.into_iter().collect();
        self
    }

    pub fn with_channel_mask(mut self, mask: ChannelMask) -> Self {
        self.channel_mask = mask;
        self
    }

    pub fn with_live_filters(mut self, chain: LiveFilterChain) -> Self {
        self.live_filters = chain;
        self
    }

    pub fn with_mode(mut self, mode: CompositeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_depth_cue(mut self, depth_cue: bool) -> Self {
        self.depth_cue = depth_cue;
        self
    }

    /// Objects that belong on the live overlay: the active object and the selection
    pub fn top_objects(&self) -> SmallVec<[ObjectId; 4]> {
        let mut top: SmallVec<[ObjectId; 4]> = SmallVec::new();
        if let Some(active) = self.active_object {
            top.push(active);
        }
        for id in &self.selection {
            if !top.contains(id) {
                top.push(*id);
            }
        }
        top
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ViewState {
        ViewState::new(
            LayerSetId::new(1),
            LayerId::new(1),
            Rect::new(0.0, 0.0, 100.0, 50.0),
            2.0,
        )
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        assert!(view().validate().is_ok());
        assert!(view().with_view(Rect::new(0.0, 0.0, 1.0, 1.0), 0.0).validate().is_err());
        assert!(view()
            .with_view(Rect::new(0.0, 0.0, 1.0, 1.0), f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_pixel_size_from_rect_and_scale() {
        assert_eq!(view().pixel_size(), PixelSize::new(200, 100));
    }

    #[test]
    fn test_mutators_return_new_snapshots() {
        let original = view();
        let moved = original.clone().centered_on(Point::new(500.0, 500.0));
        assert_eq!(original.world_rect.origin, Point::new(0.0, 0.0));
        assert_eq!(moved.world_rect, Rect::new(450.0, 475.0, 100.0, 50.0));
    }

    #[test]
    fn test_top_objects_dedups_active() {
        let v = view()
            .with_active_object(Some(ObjectId::new(3)))
            .with_selection([ObjectId::new(3), ObjectId::new(4)]);
        assert_eq!(v.top_objects().as_slice(), &[ObjectId::new(3), ObjectId::new(4)]);
    }
}
