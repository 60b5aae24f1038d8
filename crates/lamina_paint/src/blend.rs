//! Per-pixel compositing of straight-alpha RGBA8 samples
//!
//! Separable blend modes follow the usual two-step form: the source color is
//! first mixed with `B(backdrop, source)` by the backdrop's alpha, then the
//! result is composited source-over.

use lamina_core::BlendMode;

#[inline]
fn unit(v: u8) -> f32 {
    v as f32 / 255.0
}

#[inline]
fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
fn mix(mode: BlendMode, backdrop: f32, source: f32) -> f32 {
    match mode {
        BlendMode::Normal => source,
        BlendMode::Add => (backdrop + source).min(1.0),
        BlendMode::Subtract => (backdrop - source).max(0.0),
        BlendMode::Multiply => backdrop * source,
        BlendMode::Difference => (backdrop - source).abs(),
    }
}

/// Composite `src` onto `dst` with `mode`, scaling the source alpha by `opacity`
pub fn blend_pixel(dst: [u8; 4], src: [u8; 4], mode: BlendMode, opacity: f32) -> [u8; 4] {
    let sa = unit(src[3]) * opacity.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    let da = unit(dst[3]);
    if mode == BlendMode::Normal && sa >= 1.0 {
        return [src[0], src[1], src[2], 255];
    }

    let out_a = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let cs = unit(src[c]);
        let cb = unit(dst[c]);
        let mixed = (1.0 - da) * cs + da * mix(mode, cb, cs);
        let premul = mixed * sa + cb * da * (1.0 - sa);
        out[c] = quantize(premul / out_a);
    }
    out[3] = quantize(out_a);
    out
}
