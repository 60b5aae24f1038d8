//! Headless render of a small montage
//!
//! Two image tiles side by side with a vector rectangle on top, composited
//! by a canvas, presented with the selection overlay and written out as PNG.
//!
//! Run with: cargo run -p lamina_render --example render_scene --features png [out.png]

use lamina_core::{CanvasConfig, LayerId, LayerSetId, ObjectId, Rect, ScreenRect, ViewState};
use lamina_paint::{export::save_png, Color, Raster};
use lamina_render::{CanvasBuilder, FrameEvent, MemoryScene, Screen};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Keeps the last presented frame
#[derive(Clone, Default)]
struct FrameGrab(Arc<Mutex<Option<Raster>>>);

impl Screen for FrameGrab {
    fn show(&mut self, frame: &Raster, _region: ScreenRect) {
        *self.0.lock() = Some(frame.clone());
    }
}

fn main() -> lamina_render::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let out = std::env::args().nth(1).unwrap_or_else(|| "render_scene.png".to_string());
    let layer = LayerId::new(1);
    let scene = Arc::new(MemoryScene::new());
    scene.add_solid_tile(layer, ObjectId::new(1), Rect::new(0.0, 0.0, 500.0, 500.0), [200, 60, 40, 255]);
    scene.add_solid_tile(layer, ObjectId::new(2), Rect::new(500.0, 0.0, 500.0, 500.0), [40, 90, 200, 255]);
    scene.add_rect(layer, ObjectId::new(3), Rect::new(100.0, 100.0, 50.0, 50.0), Color::GREEN);

    let view = ViewState::new(LayerSetId::new(1), layer, Rect::new(0.0, 0.0, 1000.0, 1000.0), 1.0)
        .with_selection([ObjectId::new(3)]);
    let grab = FrameGrab::default();
    let canvas = CanvasBuilder::new(view, scene.clone())
        .resources(scene.clone())
        .config(CanvasConfig::default())
        .screen(Box::new(grab.clone()))
        .on_frame(|event| match event {
            FrameEvent::Ready { recomposited, .. } => tracing::info!(recomposited, "frame ready"),
            FrameEvent::Degraded => tracing::warn!("frame degraded"),
        })
        .build()?;

    if !canvas.wait_idle(Duration::from_secs(10)) {
        tracing::warn!("dispatcher still busy; presenting what is there");
    }
    let report = canvas.present();
    tracing::info!(path = ?report.path, attempts = report.attempts, "presented");

    match grab.0.lock().as_ref() {
        Some(frame) => {
            save_png(frame, &out)?;
            tracing::info!(path = %out, "wrote frame");
        }
        None => tracing::warn!("nothing was presented"),
    }
    Ok(())
}
