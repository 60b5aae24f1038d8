//! Compositing modes and per-layer blending
//!
//! A [`CompositeMode`] is what the user picked; a [`ResolvedMode`] is what the
//! compositor will actually do for a given view, with contributing layers
//! filtered and sorted. Only the resolved form takes part in screenshot keys,
//! so two views that differ only in how their context list happens to be
//! ordered resolve to the same key.

use crate::ids::LayerId;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};

/// How a ghost layer is combined onto the accumulated raster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Straight alpha over
    #[default]
    Normal,
    Add,
    Subtract,
    Multiply,
    Difference,
}

/// Blend mode and opacity of one contributing layer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerBlend {
    pub mode: BlendMode,
    pub opacity: f32,
}

impl LayerBlend {
    pub const fn new(mode: BlendMode, opacity: f32) -> Self {
        Self { mode, opacity }
    }
}

impl Default for LayerBlend {
    fn default() -> Self {
        Self {
            mode: BlendMode::Normal,
            opacity: 1.0,
        }
    }
}

impl Eq for LayerBlend {}

impl Hash for LayerBlend {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.mode.hash(state);
        self.opacity.to_bits().hash(state);
    }
}

/// A neighbouring layer rendered for depth cueing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextLayer {
    pub layer: LayerId,
    /// Signed distance from the active layer in the layer stack
    pub offset: i32,
    pub blend: LayerBlend,
}

impl ContextLayer {
    pub fn new(layer: LayerId, offset: i32) -> Self {
        Self {
            layer,
            offset,
            blend: LayerBlend::default(),
        }
    }

    pub fn with_blend(mut self, blend: LayerBlend) -> Self {
        self.blend = blend;
        self
    }
}

/// Requested compositing strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompositeMode {
    /// Paint only the active layer
    #[default]
    Single,
    /// Blend the view's context layers onto the active layer
    MultiLayer,
    /// False-color composite of up to three layers
    Rgb {
        red: Option<LayerId>,
        green: Option<LayerId>,
        blue: Option<LayerId>,
    },
}

impl CompositeMode {
    /// RGB mode with the active layer in green, as the convention goes
    pub fn rgb_around(active: LayerId, red: Option<LayerId>, blue: Option<LayerId>) -> Self {
        CompositeMode::Rgb {
            red,
            green: Some(active),
            blue,
        }
    }
}

/// One layer to blend in multi-layer mode, after resolution
pub type ResolvedBlend = ContextLayer;

/// The compositing work a view actually implies
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResolvedMode {
    Single,
    /// Contributors nearest-first: sorted by `(|offset|, offset)`
    MultiLayer(SmallVec<[ResolvedBlend; 4]>),
    Rgb {
        red: Option<LayerId>,
        green: Option<LayerId>,
        blue: Option<LayerId>,
    },
}

impl ResolvedMode {
    /// Resolve `mode` against the active layer and its context list.
    ///
    /// Context layers that are the active layer itself, or that would be
    /// blended at zero opacity, contribute nothing and are dropped.
    pub fn resolve(mode: CompositeMode, active: LayerId, context: &[ContextLayer]) -> Self {
        match mode {
            CompositeMode::Single => ResolvedMode::Single,
            CompositeMode::MultiLayer => {
                let mut blends: SmallVec<[ResolvedBlend; 4]> = context
                    .iter()
                    .filter(|c| c.layer != active && c.blend.opacity > 0.0)
                    .copied()
                    .collect();
                blends.sort_by_key(|c| (c.offset.unsigned_abs(), c.offset, c.layer));
                blends.dedup_by_key(|c| c.layer);
                ResolvedMode::MultiLayer(blends)
            }
            CompositeMode::Rgb { red, green, blue } => ResolvedMode::Rgb { red, green, blue },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResolvedMode::Single => "single",
            ResolvedMode::MultiLayer(_) => "multi-layer",
            ResolvedMode::Rgb { .. } => "rgb",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: u64, offset: i32) -> ContextLayer {
        ContextLayer::new(LayerId::new(id), offset)
    }

    #[test]
    fn test_context_order_does_not_change_resolution() {
        let active = LayerId::new(10);
        let a = [ctx(9, -1), ctx(12, 2), ctx(11, 1)];
        let b = [ctx(12, 2), ctx(11, 1), ctx(9, -1)];
        let ra = ResolvedMode::resolve(CompositeMode::MultiLayer, active, &a);
        let rb = ResolvedMode::resolve(CompositeMode::MultiLayer, active, &b);
        assert_eq!(ra, rb);

        let ResolvedMode::MultiLayer(blends) = ra else {
            panic!("expected multi-layer resolution");
        };
        let order: Vec<i32> = blends.iter().map(|c| c.offset).collect();
        assert_eq!(order, vec![-1, 1, 2]);
    }

    #[test]
    fn test_active_and_invisible_layers_are_dropped() {
        let active = LayerId::new(1);
        let context = [
            ctx(1, 0),
            ctx(2, 1).with_blend(LayerBlend::new(BlendMode::Add, 0.0)),
            ctx(3, 2),
        ];
        let resolved = ResolvedMode::resolve(CompositeMode::MultiLayer, active, &context);
        let ResolvedMode::MultiLayer(blends) = resolved else {
            panic!("expected multi-layer resolution");
        };
        assert_eq!(blends.len(), 1);
        assert_eq!(blends[0].layer, LayerId::new(3));
    }

    #[test]
    fn test_rgb_convention_puts_active_in_green() {
        let mode = CompositeMode::rgb_around(LayerId::new(5), Some(LayerId::new(4)), None);
        assert_eq!(
            mode,
            CompositeMode::Rgb {
                red: Some(LayerId::new(4)),
                green: Some(LayerId::new(5)),
                blue: None,
            }
        );
    }
}
