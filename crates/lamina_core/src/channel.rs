//! Per-channel visibility of tile pixels
//!
//! Four channels (red, green, blue, alpha) each carry an 8-bit opacity and an
//! enabled flag. The whole mask packs into one `u32` of opacities plus a
//! nibble of flags, so it hashes and compares exactly.

/// Maximum number of channels a mask describes
pub const MAX_CHANNELS: usize = 4;

/// Channel indices
pub const RED: usize = 0;
pub const GREEN: usize = 1;
pub const BLUE: usize = 2;
pub const ALPHA: usize = 3;

/// Per-channel opacity and enable flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelMask {
    opacities: u32,
    enabled: u8,
}

impl ChannelMask {
    /// All channels enabled at full opacity; drawing through it is the identity.
    pub const OPAQUE: ChannelMask = ChannelMask {
        opacities: u32::MAX,
        enabled: 0b1111,
    };

    /// Build a mask from up to four opacities in `0.0..=1.0`.
    ///
    /// Missing trailing channels default to fully opaque and enabled.
    pub fn from_opacities(opacities: &[f32]) -> Self {
        let mut mask = Self::OPAQUE;
        for (channel, opacity) in opacities.iter().take(MAX_CHANNELS).enumerate() {
            mask = mask.with_opacity(channel, *opacity);
        }
        mask
    }

    /// Opacity of `channel` as an 8-bit value, zero when disabled
    pub fn alpha8(&self, channel: usize) -> u8 {
        if channel >= MAX_CHANNELS || !self.is_enabled(channel) {
            return 0;
        }
        ((self.opacities >> (channel * 8)) & 0xFF) as u8
    }

    /// Effective opacity of `channel` in `0.0..=1.0`
    pub fn opacity(&self, channel: usize) -> f32 {
        self.alpha8(channel) as f32 / 255.0
    }

    pub fn is_enabled(&self, channel: usize) -> bool {
        channel < MAX_CHANNELS && self.enabled & (1 << channel) != 0
    }

    pub fn with_opacity(self, channel: usize, opacity: f32) -> Self {
        if channel >= MAX_CHANNELS {
            return self;
        }
        let value = (opacity.clamp(0.0, 1.0) * 255.0).round() as u32;
        let shift = channel * 8;
        Self {
            opacities: (self.opacities & !(0xFF << shift)) | (value << shift),
            enabled: self.enabled,
        }
    }

    pub fn with_enabled(self, channel: usize, enabled: bool) -> Self {
        if channel >= MAX_CHANNELS {
            return self;
        }
        let bit = 1u8 << channel;
        Self {
            opacities: self.opacities,
            enabled: if enabled {
                self.enabled | bit
            } else {
                self.enabled & !bit
            },
        }
    }

    /// True when drawing through the mask leaves pixels untouched
    pub fn is_identity(&self) -> bool {
        *self == Self::OPAQUE
    }

    /// Apply the mask to one straight-alpha RGBA sample
    pub fn apply(&self, pixel: [u8; 4]) -> [u8; 4] {
        if self.is_identity() {
            return pixel;
        }
        let mut out = [0u8; 4];
        for (channel, value) in pixel.iter().enumerate() {
            out[channel] = ((*value as u32 * self.alpha8(channel) as u32 + 127) / 255) as u8;
        }
        out
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        Self::OPAQUE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let mask = ChannelMask::default();
        assert!(mask.is_identity());
        assert_eq!(mask.apply([12, 34, 56, 78]), [12, 34, 56, 78]);
    }

    #[test]
    fn test_disabled_channel_is_zero() {
        let mask = ChannelMask::default().with_enabled(GREEN, false);
        assert_eq!(mask.opacity(GREEN), 0.0);
        assert_eq!(mask.apply([200, 200, 200, 255]), [200, 0, 200, 255]);
    }

    #[test]
    fn test_opacity_scales_channel() {
        let mask = ChannelMask::from_opacities(&[0.5]);
        assert_eq!(mask.alpha8(RED), 128);
        assert_eq!(mask.alpha8(BLUE), 255);
        assert_eq!(mask.apply([255, 10, 10, 255])[RED], 128);
    }

    #[test]
    fn test_masks_compare_exactly() {
        let a = ChannelMask::from_opacities(&[1.0, 0.25]);
        let b = ChannelMask::default().with_opacity(GREEN, 0.25);
        assert_eq!(a, b);
        assert_ne!(a, a.with_enabled(ALPHA, false));
    }
}
