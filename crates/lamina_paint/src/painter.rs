//! Painter - immediate-mode drawing onto a [`Raster`]
//!
//! Shapes are given in world coordinates and mapped through the current
//! [`ViewTransform`]. Drawing is clipped to the top of the clip stack. With
//! anti-aliasing enabled, edge pixels are blended by their fractional
//! coverage; without it a pixel is painted when its center is inside.

use crate::color::Color;
use crate::raster::Raster;
use lamina_core::{BlendMode, ChannelMask, Point, Rect, ScreenRect, ViewTransform};
use smallvec::SmallVec;

/// Stroke style
#[derive(Clone, Copy, Debug)]
pub struct StrokeStyle {
    pub color: Color,
    /// Width in screen pixels
    pub width: f32,
}

impl StrokeStyle {
    pub const fn new(color: Color, width: f32) -> Self {
        Self { color, width }
    }
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: 1.0,
        }
    }
}

/// How an image is composited by [`Painter::draw_image`]
#[derive(Clone, Copy, Debug)]
pub struct ImagePaint<'m> {
    pub mask: &'m ChannelMask,
    pub mode: BlendMode,
    pub opacity: f32,
}

impl Default for ImagePaint<'static> {
    fn default() -> Self {
        Self {
            mask: &ChannelMask::OPAQUE,
            mode: BlendMode::Normal,
            opacity: 1.0,
        }
    }
}

/// Overlap of the pixel span `[p, p + 1)` with `[lo, hi)`
#[inline]
fn span_coverage(p: f64, lo: f64, hi: f64) -> f64 {
    ((p + 1.0).min(hi) - p.max(lo)).clamp(0.0, 1.0)
}

pub struct Painter<'a> {
    target: &'a mut Raster,
    transform: ViewTransform,
    transform_stack: SmallVec<[ViewTransform; 2]>,
    clip_stack: SmallVec<[ScreenRect; 4]>,
    antialias: bool,
}

impl<'a> Painter<'a> {
    pub fn new(target: &'a mut Raster, transform: ViewTransform) -> Self {
        let bounds = target.size().to_rect();
        let mut clip_stack = SmallVec::new();
        clip_stack.push(bounds);
        Self {
            target,
            transform,
            transform_stack: SmallVec::new(),
            clip_stack,
            antialias: true,
        }
    }

    pub fn with_antialias(mut self, antialias: bool) -> Self {
        self.antialias = antialias;
        self
    }

    pub fn antialias(&self) -> bool {
        self.antialias
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub fn target(&self) -> &Raster {
        &*self.target
    }

    /// Current clip rectangle, `None` when everything is clipped away
    pub fn clip(&self) -> Option<ScreenRect> {
        self.clip_stack.last().copied().filter(|r| !r.is_empty())
    }

    // === Clipping ===

    /// Intersect the clip with `rect`
    pub fn push_clip(&mut self, rect: ScreenRect) {
        let current = self.clip_stack.last().copied().unwrap_or_default();
        let clipped = current
            .intersection(&rect)
            .unwrap_or(ScreenRect::new(0, 0, 0, 0));
        self.clip_stack.push(clipped);
    }

    pub fn pop_clip(&mut self) {
        if self.clip_stack.len() > 1 {
            self.clip_stack.pop();
        }
    }

    // === Transforms ===

    pub fn push_transform(&mut self, transform: ViewTransform) {
        self.transform_stack.push(self.transform);
        self.transform = transform;
    }

    pub fn pop_transform(&mut self) {
        if let Some(previous) = self.transform_stack.pop() {
            self.transform = previous;
        }
    }

    /// Pixel bounds of a fractional screen rect, clipped.
    ///
    /// Clipping happens on the fractional edges, so a shape reaching far past
    /// the viewport still covers it.
    fn pixel_bounds(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> Option<ScreenRect> {
        let clip = self.clip()?;
        let x0 = x0.max(clip.x as f64);
        let y0 = y0.max(clip.y as f64);
        let x1 = x1.min(clip.max_x() as f64);
        let y1 = y1.min(clip.max_y() as f64);
        if !(x1 > x0 && y1 > y0) {
            return None;
        }
        clip.intersection(&ScreenRect::from_edges(x0, y0, x1, y1))
    }

    #[inline]
    fn plot(&mut self, x: i32, y: i32, rgba: [u8; 4], mode: BlendMode, coverage: f32) {
        if coverage <= 0.0 {
            return;
        }
        self.target
            .blend_pixel(x as u32, y as u32, rgba, mode, coverage);
    }

    /// Coverage of a pixel inside `[x0, x1) x [y0, y1)`
    #[inline]
    fn rect_coverage(&self, px: f64, py: f64, x0: f64, y0: f64, x1: f64, y1: f64) -> f32 {
        if self.antialias {
            (span_coverage(px, x0, x1) * span_coverage(py, y0, y1)) as f32
        } else {
            let (cx, cy) = (px + 0.5, py + 0.5);
            if cx >= x0 && cx < x1 && cy >= y0 && cy < y1 {
                1.0
            } else {
                0.0
            }
        }
    }

    // === Shape drawing ===

    /// Fill a world-space rectangle
    pub fn fill_rect(&mut self, rect: &Rect, color: Color) {
        let (x0, y0, x1, y1) = self.transform.rect_to_screen(rect);
        self.fill_screen(x0, y0, x1, y1, color);
    }

    /// Fill a rectangle already in screen pixels
    pub fn fill_screen_rect(&mut self, rect: ScreenRect, color: Color) {
        self.fill_screen(
            rect.x as f64,
            rect.y as f64,
            rect.max_x() as f64,
            rect.max_y() as f64,
            color,
        );
    }

    fn fill_screen(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Color) {
        let Some(bounds) = self.pixel_bounds(x0, y0, x1, y1) else {
            return;
        };
        let rgba = color.to_rgba8();
        for y in bounds.y..bounds.max_y() {
            for x in bounds.x..bounds.max_x() {
                let coverage = self.rect_coverage(x as f64, y as f64, x0, y0, x1, y1);
                self.plot(x, y, rgba, BlendMode::Normal, coverage);
            }
        }
    }

    /// Outline a world-space rectangle; the stroke straddles its edges
    pub fn stroke_rect(&mut self, rect: &Rect, style: StrokeStyle) {
        let (x0, y0, x1, y1) = self.transform.rect_to_screen(rect);
        let h = (style.width as f64 / 2.0).max(0.0);
        let color = style.color;
        self.fill_screen(x0 - h, y0 - h, x1 + h, y0 + h, color);
        self.fill_screen(x0 - h, y1 - h, x1 + h, y1 + h, color);
        self.fill_screen(x0 - h, y0 + h, x0 + h, y1 - h, color);
        self.fill_screen(x1 - h, y0 + h, x1 + h, y1 - h, color);
    }

    /// Straight line between two world points
    pub fn draw_line(&mut self, from: Point, to: Point, style: StrokeStyle) {
        let (ax, ay) = self.transform.to_screen(from);
        let (bx, by) = self.transform.to_screen(to);
        let h = (style.width as f64 / 2.0).max(0.5);
        let Some(bounds) = self.pixel_bounds(
            ax.min(bx) - h - 1.0,
            ay.min(by) - h - 1.0,
            ax.max(bx) + h + 1.0,
            ay.max(by) + h + 1.0,
        ) else {
            return;
        };
        let rgba = style.color.to_rgba8();
        let (dx, dy) = (bx - ax, by - ay);
        let len2 = dx * dx + dy * dy;
        for y in bounds.y..bounds.max_y() {
            for x in bounds.x..bounds.max_x() {
                let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
                let t = if len2 > 0.0 {
                    (((cx - ax) * dx + (cy - ay) * dy) / len2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let (qx, qy) = (ax + t * dx, ay + t * dy);
                let dist = ((cx - qx).powi(2) + (cy - qy).powi(2)).sqrt();
                let coverage = self.distance_coverage(dist, h);
                self.plot(x, y, rgba, BlendMode::Normal, coverage);
            }
        }
    }

    /// Outline of an axis-aligned ellipse inscribed in a world rectangle
    pub fn stroke_ellipse(&mut self, bounds: &Rect, style: StrokeStyle) {
        let (x0, y0, x1, y1) = self.transform.rect_to_screen(bounds);
        let (cx, cy) = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);
        let (rx, ry) = (((x1 - x0) / 2.0).abs(), ((y1 - y0) / 2.0).abs());
        if rx <= 0.0 || ry <= 0.0 {
            return;
        }
        let h = (style.width as f64 / 2.0).max(0.5);
        let Some(pixels) = self.pixel_bounds(
            cx - rx - h - 1.0,
            cy - ry - h - 1.0,
            cx + rx + h + 1.0,
            cy + ry + h + 1.0,
        ) else {
            return;
        };
        let rgba = style.color.to_rgba8();
        let r_min = rx.min(ry);
        for y in pixels.y..pixels.max_y() {
            for x in pixels.x..pixels.max_x() {
                let nx = (x as f64 + 0.5 - cx) / rx;
                let ny = (y as f64 + 0.5 - cy) / ry;
                let dist = ((nx * nx + ny * ny).sqrt() - 1.0).abs() * r_min;
                let coverage = self.distance_coverage(dist, h);
                self.plot(x, y, rgba, BlendMode::Normal, coverage);
            }
        }
    }

    #[inline]
    fn distance_coverage(&self, dist: f64, half_width: f64) -> f32 {
        if self.antialias {
            (half_width + 0.5 - dist).clamp(0.0, 1.0) as f32
        } else if dist <= half_width {
            1.0
        } else {
            0.0
        }
    }

    // === Images ===

    /// Draw `image` stretched over the world rectangle `dest`.
    ///
    /// Samples are taken nearest-neighbour at pixel centers, passed through
    /// the channel mask and composited with the paint's blend mode.
    pub fn draw_image(&mut self, image: &Raster, dest: &Rect, paint: ImagePaint<'_>) {
        if image.width() == 0 || image.height() == 0 || paint.opacity <= 0.0 {
            return;
        }
        let (x0, y0, x1, y1) = self.transform.rect_to_screen(dest);
        let (w, h) = (x1 - x0, y1 - y0);
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let Some(bounds) = self.pixel_bounds(x0, y0, x1, y1) else {
            return;
        };
        let sx = image.width() as f64 / w;
        let sy = image.height() as f64 / h;
        for y in bounds.y..bounds.max_y() {
            let v = ((y as f64 + 0.5 - y0) * sy).floor().clamp(0.0, image.height() as f64 - 1.0) as u32;
            for x in bounds.x..bounds.max_x() {
                let coverage = self.rect_coverage(x as f64, y as f64, x0, y0, x1, y1);
                if coverage <= 0.0 {
                    continue;
                }
                let u = ((x as f64 + 0.5 - x0) * sx).floor().clamp(0.0, image.width() as f64 - 1.0) as u32;
                let Some(sample) = image.get_pixel(u, v) else {
                    continue;
                };
                let sample = paint.mask.apply(sample);
                self.plot(x, y, sample, paint.mode, coverage * paint.opacity);
            }
        }
    }
}
