//! Live filters run over a composited raster
//!
//! All three stages operate on straight RGB and leave alpha untouched.
//! Fully transparent pixels do not contribute to histograms.

use crate::raster::{luminance, Raster};
use lamina_core::{ContrastStretch, LiveFilter, LiveFilterChain, LocalContrast};

/// Run every enabled stage of `chain`, in chain order
pub fn apply_chain(raster: &mut Raster, chain: &LiveFilterChain) {
    for stage in chain.stages() {
        match stage {
            LiveFilter::ContrastStretch(stretch) => contrast_stretch(raster, stretch),
            LiveFilter::Invert => invert(raster),
            LiveFilter::LocalContrast(params) => local_contrast(raster, params),
        }
    }
}

fn luminance_histogram(raster: &Raster) -> ([u32; 256], u32) {
    let mut hist = [0u32; 256];
    let mut total = 0;
    for px in raster.data().chunks_exact(4) {
        if px[3] == 0 {
            continue;
        }
        hist[luminance([px[0], px[1], px[2], px[3]]) as usize] += 1;
        total += 1;
    }
    (hist, total)
}

/// Linear stretch that lets `saturated` percent of samples clip, half at each end
pub fn contrast_stretch(raster: &mut Raster, params: ContrastStretch) {
    let (hist, total) = luminance_histogram(raster);
    if total == 0 {
        return;
    }
    let threshold = (total as f64 * params.saturated.max(0.0) as f64 / 200.0) as u64;

    let mut low = 0usize;
    let mut count = 0u64;
    for (level, n) in hist.iter().enumerate() {
        count += *n as u64;
        if count > threshold {
            low = level;
            break;
        }
    }
    let mut high = 255usize;
    count = 0;
    for (level, n) in hist.iter().enumerate().rev() {
        count += *n as u64;
        if count > threshold {
            high = level;
            break;
        }
    }
    if high <= low {
        return;
    }

    let range = (high - low) as f32;
    let lut: [u8; 256] = std::array::from_fn(|v| {
        ((v as f32 - low as f32) * 255.0 / range).round().clamp(0.0, 255.0) as u8
    });
    for px in raster.data_mut().chunks_exact_mut(4) {
        px[0] = lut[px[0] as usize];
        px[1] = lut[px[1] as usize];
        px[2] = lut[px[2] as usize];
    }
}

pub fn invert(raster: &mut Raster) {
    for px in raster.data_mut().chunks_exact_mut(4) {
        px[0] = 255 - px[0];
        px[1] = 255 - px[1];
        px[2] = 255 - px[2];
    }
}

/// Clipped, normalized cumulative mapping of one tile's histogram
fn tile_mapping(hist: &[u32], total: u32, slope: f32) -> Vec<u8> {
    let bins = hist.len();
    let mut clipped: Vec<f32> = hist.iter().map(|&n| n as f32).collect();

    if slope > 1.0 {
        let limit = (slope * total as f32 / bins as f32).max(1.0);
        // Redistribute what the clip removes until it settles
        for _ in 0..8 {
            let excess: f32 = clipped.iter().map(|&n| (n - limit).max(0.0)).sum();
            if excess < 1.0 {
                break;
            }
            let share = excess / bins as f32;
            for n in clipped.iter_mut() {
                *n = n.min(limit) + share;
            }
        }
    }

    let sum: f32 = clipped.iter().sum::<f32>().max(1.0);
    let mut acc = 0.0f32;
    clipped
        .iter()
        .map(|n| {
            acc += n;
            (acc / sum * 255.0).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Contrast-limited adaptive histogram equalization of luminance.
///
/// The image is split into square tiles of `2 * block_radius + 1` pixels; each
/// tile gets its own clipped equalization curve and every pixel is mapped by
/// bilinear interpolation between the curves of the four nearest tile
/// centers. Colors are scaled by the ratio of new to old luminance.
pub fn local_contrast(raster: &mut Raster, params: LocalContrast) {
    let (width, height) = (raster.width() as usize, raster.height() as usize);
    if width == 0 || height == 0 {
        return;
    }
    let bins = (params.bins.max(2)) as usize;
    let block = (2 * params.block_radius as usize + 1).max(2);
    let tiles_x = width.div_ceil(block);
    let tiles_y = height.div_ceil(block);

    let lum: Vec<u8> = raster
        .data()
        .chunks_exact(4)
        .map(|px| luminance([px[0], px[1], px[2], px[3]]))
        .collect();
    let bin_of = |v: u8| v as usize * bins / 256;

    let mut mappings = Vec::with_capacity(tiles_x * tiles_y);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = vec![0u32; bins];
            let mut total = 0u32;
            for y in ty * block..((ty + 1) * block).min(height) {
                for x in tx * block..((tx + 1) * block).min(width) {
                    if raster.data()[(y * width + x) * 4 + 3] == 0 {
                        continue;
                    }
                    hist[bin_of(lum[y * width + x])] += 1;
                    total += 1;
                }
            }
            mappings.push(tile_mapping(&hist, total, params.slope));
        }
    }

    // Tile coordinate of a pixel, measured between tile centers
    let locate = |p: usize, tiles: usize| -> (usize, usize, f32) {
        let t = (p as f32 + 0.5) / block as f32 - 0.5;
        if t <= 0.0 {
            return (0, 0, 0.0);
        }
        let i0 = (t.floor() as usize).min(tiles - 1);
        let i1 = (i0 + 1).min(tiles - 1);
        (i0, i1, t - i0 as f32)
    };

    let data = raster.data_mut();
    for y in 0..height {
        let (ty0, ty1, fy) = locate(y, tiles_y);
        for x in 0..width {
            let i = y * width + x;
            if data[i * 4 + 3] == 0 {
                continue;
            }
            let (tx0, tx1, fx) = locate(x, tiles_x);
            let bin = bin_of(lum[i]);
            let m = |tx: usize, ty: usize| mappings[ty * tiles_x + tx][bin] as f32;
            let top = m(tx0, ty0) * (1.0 - fx) + m(tx1, ty0) * fx;
            let bottom = m(tx0, ty1) * (1.0 - fx) + m(tx1, ty1) * fx;
            let mapped = top * (1.0 - fy) + bottom * fy;

            let old = lum[i] as f32;
            for c in 0..3 {
                let v = if old > 0.0 {
                    data[i * 4 + c] as f32 * mapped / old
                } else {
                    mapped
                };
                data[i * 4 + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_core::PixelSize;

    fn gradient(width: u32, lo: u8) -> Raster {
        let mut r = Raster::try_new(PixelSize::new(width, 8)).unwrap();
        for y in 0..8 {
            for x in 0..width {
                let v = lo + x as u8;
                r.put_pixel(x, y, [v, v, v, 255]);
            }
        }
        r
    }

    fn range(r: &Raster) -> (u8, u8) {
        let values = r.data().chunks_exact(4).map(|px| px[0]);
        (values.clone().min().unwrap(), values.max().unwrap())
    }

    #[test]
    fn test_stretch_expands_to_full_range() {
        let mut r = gradient(32, 100);
        contrast_stretch(&mut r, ContrastStretch { saturated: 0.0 });
        assert_eq!(range(&r), (0, 255));
    }

    #[test]
    fn test_invert_keeps_alpha() {
        let mut r = Raster::try_filled(PixelSize::new(1, 1), [10, 20, 30, 40]).unwrap();
        invert(&mut r);
        assert_eq!(r.get_pixel(0, 0), Some([245, 235, 225, 40]));
    }

    #[test]
    fn test_local_contrast_widens_flat_gradient() {
        let mut r = gradient(32, 100);
        local_contrast(&mut r, LocalContrast::default());
        let (lo, hi) = range(&r);
        assert!(hi - lo > 60, "range {lo}..{hi}");
    }

    #[test]
    fn test_uniform_image_stays_uniform() {
        let mut r = Raster::try_filled(PixelSize::new(16, 16), [90, 90, 90, 255]).unwrap();
        local_contrast(&mut r, LocalContrast::default());
        let (lo, hi) = range(&r);
        assert_eq!(lo, hi);
    }

    #[test]
    fn test_chain_order_stretch_then_invert() {
        let mut r = gradient(32, 100);
        let chain = LiveFilterChain::NONE
            .with_invert(true)
            .with_contrast_stretch(ContrastStretch { saturated: 0.0 });
        apply_chain(&mut r, &chain);
        assert_eq!(r.get_pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(r.get_pixel(31, 0), Some([0, 0, 0, 255]));
    }
}
