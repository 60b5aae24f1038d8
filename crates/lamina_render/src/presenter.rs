//! Double-buffered presenter
//!
//! Runs on the UI thread. Each [`Presenter::present`] validates the surface,
//! clears the region to redraw, blits the latest composite, lets the live
//! overlay draw over it in the view transform and hands the result to the
//! screen. Content loss restarts the frame; it is expected under memory
//! pressure, not an error. Once the surface is unusable, or a frame keeps
//! getting lost past the attempt bound, frames are drawn directly into a
//! plain raster instead.

use crate::error::SurfaceError;
use crate::surface::{SoftwareSurface, Screen, Surface};
use lamina_core::{PixelSize, Rect, ScreenRect, ViewTransform};
use lamina_paint::{ImagePaint, Painter, Raster};

/// Everything the presenter needs for one frame besides the overlay
#[derive(Clone, Copy, Debug)]
pub struct PresentFrame<'a> {
    /// Latest composite, if any
    pub raster: Option<&'a Raster>,
    /// Viewport size
    pub size: PixelSize,
    pub transform: ViewTransform,
    /// Region to redraw; `None` for the whole viewport
    pub clip: Option<ScreenRect>,
}

/// How a frame reached the screen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentPath {
    Accelerated,
    /// Drawn without the surface
    Direct,
    /// Nothing could be drawn; the screen keeps its last frame
    Skipped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentReport {
    /// Times the frame was drawn into the surface
    pub attempts: u32,
    pub path: PresentPath,
    /// Region actually redrawn
    pub region: ScreenRect,
    /// Whether the surface had been recreated or restored
    pub full_redraw: bool,
}

pub struct Presenter {
    surface: Option<Box<dyn Surface>>,
    screen: Box<dyn Screen>,
    background: [u8; 4],
    max_attempts: u32,
    direct: Option<Raster>,
}

impl Presenter {
    pub fn new(surface: Box<dyn Surface>, screen: Box<dyn Screen>) -> Self {
        Self {
            surface: Some(surface),
            screen,
            background: [0, 0, 0, 255],
            max_attempts: 16,
            direct: None,
        }
    }

    /// Presenter over a fresh [`SoftwareSurface`]
    pub fn software(screen: Box<dyn Screen>) -> Self {
        Self::new(Box::new(SoftwareSurface::new()), screen)
    }

    pub fn with_background(mut self, rgba: [u8; 4]) -> Self {
        self.background = rgba;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn is_accelerated(&self) -> bool {
        self.surface.is_some()
    }

    /// Draw one frame. `overlay` runs once per attempt, so it may run again
    /// when the surface loses its contents mid-frame.
    pub fn present<F>(&mut self, frame: PresentFrame<'_>, mut overlay: F) -> PresentReport
    where
        F: FnMut(&mut Painter<'_>),
    {
        let full = frame.size.to_rect();
        let requested = frame
            .clip
            .and_then(|clip| clip.clip_to(frame.size))
            .unwrap_or(full);

        let mut attempts = 0;
        while let Some(surface) = self.surface.as_mut() {
            if attempts >= self.max_attempts {
                tracing::warn!(attempts, "surface keeps losing contents; drawing directly");
                break;
            }
            attempts += 1;

            let status = match surface.ensure_size(frame.size) {
                Ok(status) => status,
                Err(e) => {
                    self.disable_surface(&e);
                    break;
                }
            };
            let region = if status.needs_full_redraw() {
                full
            } else {
                requested
            };
            if let Err(e) = surface.begin_frame() {
                self.disable_surface(&e);
                break;
            }

            surface.back_buffer().fill_rect(region, self.background);
            if let Some(raster) = frame.raster {
                surface.blit(raster, region);
            }
            draw_overlay(surface.back_buffer(), frame.transform, region, &mut overlay);

            if surface.is_content_lost() {
                tracing::debug!(attempt = attempts, "surface contents lost; redrawing");
                continue;
            }
            match surface.end_frame(self.screen.as_mut(), region) {
                Ok(()) => {
                    return PresentReport {
                        attempts,
                        path: PresentPath::Accelerated,
                        region,
                        full_redraw: status.needs_full_redraw(),
                    };
                }
                Err(SurfaceError::ContentLost) => {
                    tracing::debug!(attempt = attempts, "contents lost at end of frame");
                }
                Err(e) => {
                    self.disable_surface(&e);
                    break;
                }
            }
        }

        self.present_direct(frame, attempts, overlay)
    }

    fn disable_surface(&mut self, error: &SurfaceError) {
        tracing::warn!("accelerated surface unusable ({error}); drawing directly");
        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
    }

    fn present_direct<F>(
        &mut self,
        frame: PresentFrame<'_>,
        attempts: u32,
        mut overlay: F,
    ) -> PresentReport
    where
        F: FnMut(&mut Painter<'_>),
    {
        let full = frame.size.to_rect();
        let skipped = PresentReport {
            attempts,
            path: PresentPath::Skipped,
            region: full,
            full_redraw: true,
        };

        if self.direct.as_ref().map_or(true, |r| r.size() != frame.size) {
            match Raster::try_new(frame.size) {
                Ok(raster) => self.direct = Some(raster),
                Err(e) => {
                    tracing::warn!("direct frame allocation failed: {e}");
                    self.direct = None;
                    return skipped;
                }
            }
        }
        let Some(target) = self.direct.as_mut() else {
            return skipped;
        };

        target.fill(self.background);
        if let Some(raster) = frame.raster {
            blit(target, raster, full);
        }
        draw_overlay(target, frame.transform, full, &mut overlay);
        self.screen.show(target, full);
        PresentReport {
            attempts,
            path: PresentPath::Direct,
            region: full,
            full_redraw: true,
        }
    }

    /// Free the surface buffers; they are recreated on the next frame
    pub fn release(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.release();
        }
        self.direct = None;
    }
}

/// Source-over copy of `raster` at the origin, limited to `region`
fn blit(target: &mut Raster, raster: &Raster, region: ScreenRect) {
    let size = raster.size();
    let mut painter = Painter::new(target, ViewTransform::IDENTITY).with_antialias(false);
    painter.push_clip(region);
    painter.draw_image(
        raster,
        &Rect::new(0.0, 0.0, size.width as f64, size.height as f64),
        ImagePaint::default(),
    );
}

fn draw_overlay<F>(target: &mut Raster, transform: ViewTransform, region: ScreenRect, overlay: &mut F)
where
    F: FnMut(&mut Painter<'_>),
{
    let mut painter = Painter::new(target, transform);
    painter.push_clip(region);
    overlay(&mut painter);
}
