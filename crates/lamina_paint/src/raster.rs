//! CPU pixel buffers
//!
//! [`Raster`] holds straight-alpha RGBA8 rows without padding. [`GrayRaster`]
//! holds one 8-bit sample per pixel and is what RGB compositing renders each
//! channel layer into. Both allocate through `try_reserve_exact` so that an
//! oversized request surfaces as [`PaintError::Allocation`] instead of
//! aborting the process.

use crate::blend::blend_pixel;
use crate::error::{PaintError, Result};
use lamina_core::{BlendMode, PixelSize, ScreenRect};

fn try_alloc(width: u32, height: u32, bytes: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(bytes)
        .map_err(|_| PaintError::Allocation {
            width,
            height,
            bytes,
        })?;
    data.resize(bytes, 0);
    Ok(data)
}

/// Rec. 601 luma of an RGB sample
#[inline]
pub fn luminance(px: [u8; 4]) -> u8 {
    ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114 + 500) / 1000) as u8
}

/// Straight-alpha RGBA8 image
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Default for Raster {
    /// A 0x0 raster; owns no pixels
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }
}

impl Raster {
    /// Allocate a fully transparent raster
    pub fn try_new(size: PixelSize) -> Result<Self> {
        let data = try_alloc(size.width, size.height, size.rgba_bytes())?;
        Ok(Self {
            width: size.width,
            height: size.height,
            data,
        })
    }

    /// Allocate a raster filled with one color
    pub fn try_filled(size: PixelSize, rgba: [u8; 4]) -> Result<Self> {
        let mut raster = Self::try_new(size)?;
        raster.fill(rgba);
        Ok(raster)
    }

    /// Wrap existing RGBA8 data
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = PixelSize::new(width, height).rgba_bytes();
        if data.len() != expected {
            return Err(PaintError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> PixelSize {
        PixelSize::new(self.width, self.height)
    }

    /// Bytes held by the pixel buffer
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    /// Composite one sample onto the pixel at (x, y)
    #[inline]
    pub fn blend_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4], mode: BlendMode, opacity: f32) {
        if let Some(dst) = self.get_pixel(x, y) {
            self.put_pixel(x, y, blend_pixel(dst, rgba, mode, opacity));
        }
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Overwrite the pixels of `rect` (clipped to the raster) with `rgba`
    pub fn fill_rect(&mut self, rect: ScreenRect, rgba: [u8; 4]) {
        let Some(rect) = rect.clip_to(self.size()) else {
            return;
        };
        for y in rect.y..rect.max_y() {
            let start = self.index(rect.x as u32, y as u32);
            let end = start + rect.width as usize * 4;
            for px in self.data[start..end].chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
    }

    /// Copy `rect` of `src` into the same position of `self`
    pub fn copy_rect_from(&mut self, src: &Raster, rect: ScreenRect) {
        let Some(rect) = rect
            .clip_to(self.size())
            .and_then(|r| r.clip_to(src.size()))
        else {
            return;
        };
        for y in rect.y..rect.max_y() {
            let s = src.index(rect.x as u32, y as u32);
            let d = self.index(rect.x as u32, y as u32);
            let n = rect.width as usize * 4;
            self.data[d..d + n].copy_from_slice(&src.data[s..s + n]);
        }
    }

    /// Composite a same-sized raster on top of this one
    pub fn composite(&mut self, top: &Raster, mode: BlendMode, opacity: f32) {
        if top.size() != self.size() || opacity <= 0.0 {
            return;
        }
        for (dst, src) in self.data.chunks_exact_mut(4).zip(top.data.chunks_exact(4)) {
            let out = blend_pixel(
                [dst[0], dst[1], dst[2], dst[3]],
                [src[0], src[1], src[2], src[3]],
                mode,
                opacity,
            );
            dst.copy_from_slice(&out);
        }
    }

    /// Luminance of every pixel composited over opaque black, so partial
    /// coverage darkens the sample in proportion to its alpha
    pub fn to_gray(&self) -> Result<GrayRaster> {
        let mut gray = GrayRaster::try_new(self.size())?;
        for (g, px) in gray.data.iter_mut().zip(self.data.chunks_exact(4)) {
            let luma = luminance([px[0], px[1], px[2], px[3]]) as u32;
            *g = ((luma * px[3] as u32 + 127) / 255) as u8;
        }
        Ok(gray)
    }

    /// Assemble an opaque raster from three gray planes; absent planes are zero
    pub fn from_channels(size: PixelSize, channels: [Option<&GrayRaster>; 3]) -> Result<Raster> {
        let mut raster = Raster::try_new(size)?;
        for (i, px) in raster.data.chunks_exact_mut(4).enumerate() {
            for (c, plane) in channels.iter().enumerate() {
                px[c] = plane
                    .filter(|p| p.size() == size)
                    .map_or(0, |p| p.data[i]);
            }
            px[3] = 255;
        }
        Ok(raster)
    }

    /// Number of pixels that differ from `other`
    pub fn diff_pixel_count(&self, other: &Raster) -> usize {
        if self.size() != other.size() {
            return self.size().pixel_count().max(other.size().pixel_count());
        }
        self.data
            .chunks_exact(4)
            .zip(other.data.chunks_exact(4))
            .filter(|(a, b)| a != b)
            .count()
    }

    pub fn is_identical_to(&self, other: &Raster) -> bool {
        self.size() == other.size() && self.data == other.data
    }

    /// Percentage of pixels that differ from `other`
    pub fn diff_percentage(&self, other: &Raster) -> f32 {
        let total = self.size().pixel_count().max(1) as f32;
        self.diff_pixel_count(other) as f32 / total * 100.0
    }
}

/// 8-bit single channel image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayRaster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl GrayRaster {
    pub fn try_new(size: PixelSize) -> Result<Self> {
        let data = try_alloc(size.width, size.height, size.pixel_count())?;
        Ok(Self {
            width: size.width,
            height: size.height,
            data,
        })
    }

    pub fn size(&self) -> PixelSize {
        PixelSize::new(self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        (x < self.width && y < self.height)
            .then(|| self.data[y as usize * self.width as usize + x as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(w: u32, h: u32, rgba: [u8; 4]) -> Raster {
        Raster::try_filled(PixelSize::new(w, h), rgba).unwrap()
    }

    #[test]
    fn test_new_raster_is_transparent() {
        let r = Raster::try_new(PixelSize::new(4, 3)).unwrap();
        assert_eq!(r.byte_len(), 48);
        assert_eq!(r.get_pixel(3, 2), Some([0, 0, 0, 0]));
        assert_eq!(r.get_pixel(4, 0), None);
    }

    #[test]
    fn test_oversized_allocation_fails_soft() {
        let err = Raster::try_new(PixelSize::new(u32::MAX, u32::MAX)).unwrap_err();
        assert!(matches!(err, PaintError::Allocation { .. }));
    }

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(Raster::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(Raster::from_rgba(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut r = raster(4, 4, [0, 0, 0, 255]);
        r.fill_rect(ScreenRect::new(2, 2, 10, 10), [255, 0, 0, 255]);
        assert_eq!(r.get_pixel(1, 1), Some([0, 0, 0, 255]));
        assert_eq!(r.get_pixel(3, 3), Some([255, 0, 0, 255]));
        assert_eq!(r.diff_pixel_count(&raster(4, 4, [0, 0, 0, 255])), 4);
    }

    #[test]
    fn test_copy_rect_from() {
        let src = raster(4, 4, [9, 9, 9, 255]);
        let mut dst = raster(4, 4, [0, 0, 0, 0]);
        dst.copy_rect_from(&src, ScreenRect::new(0, 0, 2, 4));
        assert_eq!(dst.get_pixel(1, 3), Some([9, 9, 9, 255]));
        assert_eq!(dst.get_pixel(2, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_from_channels_zeroes_absent_planes() {
        let size = PixelSize::new(2, 1);
        let mut red = GrayRaster::try_new(size).unwrap();
        red.data_mut().fill(200);
        let rgb = Raster::from_channels(size, [Some(&red), None, None]).unwrap();
        assert_eq!(rgb.get_pixel(1, 0), Some([200, 0, 0, 255]));
    }

    #[test]
    fn test_diff_helpers() {
        let a = raster(10, 10, [255, 0, 0, 255]);
        let b = raster(10, 10, [0, 255, 0, 255]);
        assert!(a.is_identical_to(&a.clone()));
        assert_eq!(a.diff_pixel_count(&b), 100);
        assert_eq!(a.diff_percentage(&b), 100.0);
    }

    #[test]
    fn test_to_gray_uses_luma() {
        let r = raster(1, 1, [255, 255, 255, 255]);
        assert_eq!(r.to_gray().unwrap().get(0, 0), Some(255));
    }

    #[test]
    fn test_to_gray_composites_over_black() {
        let half = raster(1, 1, [255, 255, 255, 128]);
        assert_eq!(half.to_gray().unwrap().get(0, 0), Some(128));
        let clear = raster(1, 1, [255, 255, 255, 0]);
        assert_eq!(clear.to_gray().unwrap().get(0, 0), Some(0));
    }
}
