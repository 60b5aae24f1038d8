//! Presenter behavior over misbehaving surfaces

use lamina_core::{PixelSize, Rect, ScreenRect, ViewTransform};
use lamina_paint::{Color, Raster};
use lamina_render::{
    PresentFrame, PresentPath, Presenter, Screen, SoftwareSurface, Surface, SurfaceError,
    SurfaceResult, SurfaceStatus,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Keeps the last frame shown and counts them
#[derive(Clone, Default)]
struct RecordingScreen {
    last: Arc<Mutex<Option<(Raster, ScreenRect)>>>,
    shown: Arc<AtomicU32>,
}

impl Screen for RecordingScreen {
    fn show(&mut self, frame: &Raster, region: ScreenRect) {
        *self.last.lock() = Some((frame.clone(), region));
        self.shown.fetch_add(1, Ordering::SeqCst);
    }
}

/// Software surface that reports its contents lost a set number of times
struct LossySurface {
    inner: SoftwareSurface,
    losses: Arc<AtomicU32>,
    frames: Arc<AtomicU32>,
}

impl LossySurface {
    fn new(losses: u32) -> (Self, Arc<AtomicU32>) {
        let frames = Arc::new(AtomicU32::new(0));
        let surface = Self {
            inner: SoftwareSurface::new(),
            losses: Arc::new(AtomicU32::new(losses)),
            frames: Arc::clone(&frames),
        };
        (surface, frames)
    }
}

impl Surface for LossySurface {
    fn size(&self) -> PixelSize {
        self.inner.size()
    }

    fn ensure_size(&mut self, size: PixelSize) -> SurfaceResult<SurfaceStatus> {
        self.inner.ensure_size(size)
    }

    fn begin_frame(&mut self) -> SurfaceResult<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        self.inner.begin_frame()
    }

    fn back_buffer(&mut self) -> &mut Raster {
        self.inner.back_buffer()
    }

    fn is_content_lost(&self) -> bool {
        self.losses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn end_frame(&mut self, screen: &mut dyn Screen, region: ScreenRect) -> SurfaceResult<()> {
        self.inner.end_frame(screen, region)
    }

    fn release(&mut self) {
        self.inner.release()
    }
}

/// Surface that can never be validated
struct BrokenSurface {
    attempts: Arc<AtomicU32>,
}

impl Surface for BrokenSurface {
    fn size(&self) -> PixelSize {
        PixelSize::default()
    }

    fn ensure_size(&mut self, _size: PixelSize) -> SurfaceResult<SurfaceStatus> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SurfaceError::Unusable("device removed".into()))
    }

    fn begin_frame(&mut self) -> SurfaceResult<()> {
        Err(SurfaceError::Unusable("device removed".into()))
    }

    fn back_buffer(&mut self) -> &mut Raster {
        unreachable!("never validated")
    }

    fn is_content_lost(&self) -> bool {
        true
    }

    fn end_frame(&mut self, _screen: &mut dyn Screen, _region: ScreenRect) -> SurfaceResult<()> {
        Err(SurfaceError::ContentLost)
    }

    fn release(&mut self) {}
}

fn frame(raster: Option<&Raster>) -> PresentFrame<'_> {
    PresentFrame {
        raster,
        size: PixelSize::new(8, 8),
        transform: ViewTransform::IDENTITY,
        clip: None,
    }
}

#[test]
fn test_content_loss_retries_until_success() {
    for losses in [0, 1, 3, 7] {
        let (surface, frames) = LossySurface::new(losses);
        let screen = RecordingScreen::default();
        let mut presenter = Presenter::new(Box::new(surface), Box::new(screen.clone()));
        let mut overlay_runs = 0;

        let report = presenter.present(frame(None), |_| overlay_runs += 1);

        assert_eq!(report.attempts, losses + 1);
        assert_eq!(frames.load(Ordering::SeqCst), losses + 1);
        assert_eq!(overlay_runs, losses + 1);
        assert_eq!(report.path, PresentPath::Accelerated);
        assert_eq!(screen.shown.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_endless_loss_falls_back_to_direct_drawing() {
    let (surface, frames) = LossySurface::new(u32::MAX);
    let screen = RecordingScreen::default();
    let mut presenter =
        Presenter::new(Box::new(surface), Box::new(screen.clone())).with_max_attempts(5);
    let base = Raster::try_filled(PixelSize::new(8, 8), [10, 20, 30, 255]).unwrap();

    let report = presenter.present(frame(Some(&base)), |_| {});

    assert_eq!(report.attempts, 5);
    assert_eq!(frames.load(Ordering::SeqCst), 5);
    assert_eq!(report.path, PresentPath::Direct);
    let (shown, region) = screen.last.lock().clone().unwrap();
    assert_eq!(region, ScreenRect::new(0, 0, 8, 8));
    assert_eq!(shown.get_pixel(4, 4), Some([10, 20, 30, 255]));
    // The surface stays in use for later frames
    assert!(presenter.is_accelerated());
}

#[test]
fn test_unusable_surface_is_abandoned() {
    let attempts = Arc::new(AtomicU32::new(0));
    let screen = RecordingScreen::default();
    let mut presenter = Presenter::new(
        Box::new(BrokenSurface {
            attempts: Arc::clone(&attempts),
        }),
        Box::new(screen.clone()),
    );

    let first = presenter.present(frame(None), |painter| {
        painter.fill_rect(&Rect::new(0.0, 0.0, 2.0, 2.0), Color::WHITE)
    });
    let second = presenter.present(frame(None), |_| {});

    assert_eq!(first.path, PresentPath::Direct);
    assert_eq!(second.path, PresentPath::Direct);
    assert_eq!(second.attempts, 0);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(!presenter.is_accelerated());
    assert_eq!(screen.shown.load(Ordering::SeqCst), 2);
}

#[test]
fn test_restored_surface_redraws_everything() {
    let surface = SoftwareSurface::new();
    let loss = surface.loss_handle();
    let screen = RecordingScreen::default();
    let mut presenter = Presenter::new(Box::new(surface), Box::new(screen.clone()));
    presenter.present(frame(None), |_| {});

    let mut clipped = frame(None);
    clipped.clip = Some(ScreenRect::new(2, 2, 2, 2));
    let report = presenter.present(clipped, |_| {});
    assert_eq!(report.region, ScreenRect::new(2, 2, 2, 2));

    // Lost between frames: the next clipped frame becomes a full one
    loss.invalidate();
    let report = presenter.present(clipped, |_| {});
    assert!(report.full_redraw);
    assert_eq!(report.region, ScreenRect::new(0, 0, 8, 8));
    assert_eq!(report.attempts, 1);
}

#[test]
fn test_resize_recreates_surface() {
    let screen = RecordingScreen::default();
    let mut presenter = Presenter::software(Box::new(screen.clone()));
    presenter.present(frame(None), |_| {});

    let mut larger = frame(None);
    larger.size = PixelSize::new(16, 4);
    larger.clip = Some(ScreenRect::new(0, 0, 1, 1));
    let report = presenter.present(larger, |_| {});

    assert!(report.full_redraw);
    let (shown, _) = screen.last.lock().clone().unwrap();
    assert_eq!(shown.size(), PixelSize::new(16, 4));
}
