//! Presentation surfaces
//!
//! A [`Surface`] is the accelerated, double-buffered image the presenter
//! draws each frame into before it reaches the [`Screen`]. Platforms may
//! reclaim its contents at any moment; the presenter validates the surface
//! with [`Surface::ensure_size`] before drawing and checks
//! [`Surface::is_content_lost`] after, redrawing until a frame survives.
//!
//! [`SoftwareSurface`] keeps the two buffers in CPU rasters and exposes a
//! [`SurfaceLoss`] handle through which the embedder (or a test) signals
//! that the contents were reclaimed.

use crate::error::{SurfaceError, SurfaceResult};
use lamina_core::{PixelSize, Rect, ScreenRect, ViewTransform};
use lamina_paint::{ImagePaint, Painter, Raster};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The window or widget frames finally appear on
pub trait Screen: Send {
    /// Show the `region` of `frame`
    fn show(&mut self, frame: &Raster, region: ScreenRect);
}

/// Screen that discards frames, for headless use
#[derive(Clone, Copy, Debug, Default)]
pub struct NullScreen;

impl Screen for NullScreen {
    fn show(&mut self, _frame: &Raster, _region: ScreenRect) {}
}

/// State of the surface after validation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// Contents from the previous frame are intact
    Ready,
    /// Contents were lost and must be redrawn entirely
    Restored,
    /// Buffers were (re)created and must be redrawn entirely
    Recreated,
}

impl SurfaceStatus {
    pub fn needs_full_redraw(self) -> bool {
        self != SurfaceStatus::Ready
    }
}

pub trait Surface: Send {
    fn size(&self) -> PixelSize;

    /// Validate the surface for a frame of `size`, recreating it if it is
    /// missing or the wrong size
    fn ensure_size(&mut self, size: PixelSize) -> SurfaceResult<SurfaceStatus>;

    /// Prepare the back buffer for drawing
    fn begin_frame(&mut self) -> SurfaceResult<()>;

    /// The buffer being drawn
    fn back_buffer(&mut self) -> &mut Raster;

    /// Draw `raster` over the back buffer within `region`
    fn blit(&mut self, raster: &Raster, region: ScreenRect) {
        let size = raster.size();
        let mut painter = Painter::new(self.back_buffer(), ViewTransform::IDENTITY)
            .with_antialias(false);
        painter.push_clip(region);
        painter.draw_image(
            raster,
            &Rect::new(0.0, 0.0, size.width as f64, size.height as f64),
            ImagePaint::default(),
        );
    }

    /// True when the platform reclaimed the contents since validation
    fn is_content_lost(&self) -> bool;

    /// Show `region` of the finished back buffer on `screen` and swap
    fn end_frame(&mut self, screen: &mut dyn Screen, region: ScreenRect) -> SurfaceResult<()>;

    /// Free the buffers; the next frame recreates them
    fn release(&mut self);
}

/// Signals content loss to a [`SoftwareSurface`] from any thread
#[derive(Clone, Debug, Default)]
pub struct SurfaceLoss {
    lost: Arc<AtomicBool>,
    unusable: Arc<AtomicBool>,
}

impl SurfaceLoss {
    /// The platform reclaimed the surface contents
    pub fn invalidate(&self) {
        self.lost.store(true, Ordering::Release);
    }

    /// The surface can never be used again
    pub fn disable(&self) {
        self.unusable.store(true, Ordering::Release);
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn take_lost(&self) -> bool {
        self.lost.swap(false, Ordering::AcqRel)
    }

    fn is_unusable(&self) -> bool {
        self.unusable.load(Ordering::Acquire)
    }
}

/// Double-buffered CPU surface
pub struct SoftwareSurface {
    buffers: Vec<Raster>,
    write_index: usize,
    size: PixelSize,
    loss: SurfaceLoss,
    recreations: u64,
}

impl SoftwareSurface {
    pub fn new() -> Self {
        Self {
            buffers: Vec::new(),
            write_index: 0,
            size: PixelSize::default(),
            loss: SurfaceLoss::default(),
            recreations: 0,
        }
    }

    pub fn loss_handle(&self) -> SurfaceLoss {
        self.loss.clone()
    }

    /// Times the buffers were allocated
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// The last frame shown on screen
    pub fn front_buffer(&self) -> Option<&Raster> {
        let count = self.buffers.len();
        if count == 0 {
            return None;
        }
        self.buffers.get((self.write_index + count - 1) % count)
    }

    fn recreate(&mut self, size: PixelSize) -> SurfaceResult<()> {
        self.buffers.clear();
        for _ in 0..2 {
            let buffer = Raster::try_new(size).map_err(|_| SurfaceError::Allocation {
                width: size.width,
                height: size.height,
            })?;
            self.buffers.push(buffer);
        }
        self.write_index = 0;
        self.size = size;
        self.recreations += 1;
        Ok(())
    }

    /// Swap buffers, then bring the new back buffer up to date with the
    /// frame just shown so a clipped redraw starts from current contents
    fn swap(&mut self, region: ScreenRect) {
        let shown = self.write_index;
        self.write_index = (self.write_index + 1) % self.buffers.len();
        let (a, b) = self.buffers.split_at_mut(1);
        let (front, back) = if shown == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        };
        back.copy_rect_from(front, region);
    }
}

impl Default for SoftwareSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for SoftwareSurface {
    fn size(&self) -> PixelSize {
        self.size
    }

    fn ensure_size(&mut self, size: PixelSize) -> SurfaceResult<SurfaceStatus> {
        if self.loss.is_unusable() {
            return Err(SurfaceError::Unusable("surface disabled by platform".into()));
        }
        if self.buffers.len() != 2 || self.size != size {
            self.loss.take_lost();
            self.recreate(size)?;
            tracing::debug!(width = size.width, height = size.height, "surface recreated");
            return Ok(SurfaceStatus::Recreated);
        }
        if self.loss.take_lost() {
            return Ok(SurfaceStatus::Restored);
        }
        Ok(SurfaceStatus::Ready)
    }

    fn begin_frame(&mut self) -> SurfaceResult<()> {
        if self.buffers.len() != 2 {
            return Err(SurfaceError::Unusable("surface not validated".into()));
        }
        Ok(())
    }

    fn back_buffer(&mut self) -> &mut Raster {
        if self.buffers.is_empty() {
            // Zero-sized placeholder until the surface is validated
            self.buffers.push(Raster::default());
        }
        let index = self.write_index % self.buffers.len();
        &mut self.buffers[index]
    }

    fn is_content_lost(&self) -> bool {
        self.loss.is_lost()
    }

    fn end_frame(&mut self, screen: &mut dyn Screen, region: ScreenRect) -> SurfaceResult<()> {
        if self.loss.is_lost() {
            return Err(SurfaceError::ContentLost);
        }
        if self.buffers.len() != 2 {
            return Err(SurfaceError::Unusable("surface not validated".into()));
        }
        screen.show(&self.buffers[self.write_index], region);
        self.swap(region);
        Ok(())
    }

    fn release(&mut self) {
        self.buffers.clear();
        self.write_index = 0;
        self.size = PixelSize::default();
        tracing::debug!("surface released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<Raster>);

    impl Screen for Recorder {
        fn show(&mut self, frame: &Raster, _region: ScreenRect) {
            self.0.push(frame.clone());
        }
    }

    #[test]
    fn test_ensure_size_recreates_then_is_ready() {
        let mut surface = SoftwareSurface::new();
        let size = PixelSize::new(4, 4);
        assert_eq!(surface.ensure_size(size).unwrap(), SurfaceStatus::Recreated);
        assert_eq!(surface.ensure_size(size).unwrap(), SurfaceStatus::Ready);
        assert_eq!(
            surface.ensure_size(PixelSize::new(8, 4)).unwrap(),
            SurfaceStatus::Recreated
        );
        assert_eq!(surface.recreations(), 2);
    }

    #[test]
    fn test_loss_is_reported_then_restored() {
        let mut surface = SoftwareSurface::new();
        let size = PixelSize::new(2, 2);
        surface.ensure_size(size).unwrap();
        let loss = surface.loss_handle();
        loss.invalidate();
        assert!(surface.is_content_lost());
        let mut screen = Recorder(Vec::new());
        assert_eq!(
            surface.end_frame(&mut screen, size.to_rect()),
            Err(SurfaceError::ContentLost)
        );
        assert_eq!(surface.ensure_size(size).unwrap(), SurfaceStatus::Restored);
        assert!(!surface.is_content_lost());

        loss.disable();
        assert!(matches!(surface.ensure_size(size), Err(SurfaceError::Unusable(_))));
    }

    #[test]
    fn test_clipped_frames_stay_in_sync_across_swaps() {
        let mut surface = SoftwareSurface::new();
        let size = PixelSize::new(4, 1);
        let mut screen = Recorder(Vec::new());
        surface.ensure_size(size).unwrap();

        surface.back_buffer().fill([9, 9, 9, 255]);
        surface.end_frame(&mut screen, size.to_rect()).unwrap();

        // Only pixel 0 is redrawn; the rest must carry over from frame one
        surface.back_buffer().put_pixel(0, 0, [1, 1, 1, 255]);
        surface.end_frame(&mut screen, ScreenRect::new(0, 0, 1, 1)).unwrap();

        let last = surface.front_buffer().unwrap();
        assert_eq!(last.get_pixel(0, 0), Some([1, 1, 1, 255]));
        assert_eq!(last.get_pixel(3, 0), Some([9, 9, 9, 255]));
        assert_eq!(screen.0.len(), 2);
    }
}
