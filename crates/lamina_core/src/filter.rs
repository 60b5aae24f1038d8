//! Live filter chain applied to every composited raster
//!
//! The chain always runs in the fixed order contrast stretch, invert, local
//! contrast enhancement. A stage that is `None` (or `invert == false`) is
//! skipped. Parameters are part of the screenshot key, so equality is bitwise
//! on the float parameters.

use std::hash::{Hash, Hasher};

/// Histogram stretch that saturates a percentage of samples at both ends
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContrastStretch {
    /// Percent of samples allowed outside the stretched range
    pub saturated: f32,
}

impl Default for ContrastStretch {
    fn default() -> Self {
        Self { saturated: 0.4 }
    }
}

/// Contrast-limited adaptive histogram equalization parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalContrast {
    pub block_radius: u32,
    pub bins: u16,
    /// Maximum slope of the mapping; values <= 1.0 disable clipping
    pub slope: f32,
}

impl Default for LocalContrast {
    fn default() -> Self {
        Self {
            block_radius: 63,
            bins: 255,
            slope: 3.0,
        }
    }
}

/// One stage of the chain, as yielded by [`LiveFilterChain::stages`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LiveFilter {
    ContrastStretch(ContrastStretch),
    Invert,
    LocalContrast(LocalContrast),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LiveFilterChain {
    pub contrast_stretch: Option<ContrastStretch>,
    pub invert: bool,
    pub local_contrast: Option<LocalContrast>,
}

impl LiveFilterChain {
    pub const NONE: LiveFilterChain = LiveFilterChain {
        contrast_stretch: None,
        invert: false,
        local_contrast: None,
    };

    pub fn with_contrast_stretch(mut self, stretch: ContrastStretch) -> Self {
        self.contrast_stretch = Some(stretch);
        self
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn with_local_contrast(mut self, clahe: LocalContrast) -> Self {
        self.local_contrast = Some(clahe);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.contrast_stretch.is_none() && !self.invert && self.local_contrast.is_none()
    }

    /// Enabled stages in application order
    pub fn stages(&self) -> impl Iterator<Item = LiveFilter> + '_ {
        let stretch = self.contrast_stretch.map(LiveFilter::ContrastStretch);
        let invert = self.invert.then_some(LiveFilter::Invert);
        let clahe = self.local_contrast.map(LiveFilter::LocalContrast);
        stretch.into_iter().chain(invert).chain(clahe)
    }
}

impl Eq for LiveFilterChain {}

impl Hash for LiveFilterChain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.contrast_stretch
            .map(|s| s.saturated.to_bits())
            .hash(state);
        self.invert.hash(state);
        self.local_contrast
            .map(|c| (c.block_radius, c.bins, c.slope.to_bits()))
            .hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_fixed() {
        let chain = LiveFilterChain::NONE
            .with_local_contrast(LocalContrast::default())
            .with_invert(true)
            .with_contrast_stretch(ContrastStretch::default());

        let stages: Vec<_> = chain.stages().collect();
        assert_eq!(stages.len(), 3);
        assert!(matches!(stages[0], LiveFilter::ContrastStretch(_)));
        assert_eq!(stages[1], LiveFilter::Invert);
        assert!(matches!(stages[2], LiveFilter::LocalContrast(_)));
    }

    #[test]
    fn test_empty_chain_has_no_stages() {
        assert!(LiveFilterChain::default().is_empty());
        assert_eq!(LiveFilterChain::default().stages().count(), 0);
    }
}
