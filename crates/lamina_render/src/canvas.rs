//! Canvas
//!
//! The embedding application owns a [`Canvas`]; the canvas owns its repaint
//! dispatcher, screenshot cache, presenter and animator. Collaborators come
//! in through [`SpatialIndex`] and [`ResourceManager`] and are never handed
//! anything back.
//!
//! Threads: the UI thread calls [`Canvas::present`] and the view mutators.
//! The dispatcher thread composites. Animation and highlight ticks run on the
//! periodic-task pool. They share only the published `Arc<ViewState>`, the
//! cache, and the small frame record the dispatcher fills in.
//!
//! # Example
//!
//! ```rust
//! use lamina_core::{LayerId, LayerSetId, ObjectId, Rect, ViewState};
//! use lamina_render::{CanvasBuilder, MemoryScene};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let scene = Arc::new(MemoryScene::new());
//! let layer = LayerId::new(1);
//! scene.add_solid_tile(layer, ObjectId::new(1), Rect::new(0.0, 0.0, 64.0, 64.0), [255, 0, 0, 255]);
//!
//! let view = ViewState::new(LayerSetId::new(1), layer, Rect::new(0.0, 0.0, 64.0, 64.0), 1.0);
//! let canvas = CanvasBuilder::new(view, scene.clone())
//!     .resources(scene)
//!     .build()
//!     .unwrap();
//! assert!(canvas.wait_idle(Duration::from_secs(5)));
//! assert!(canvas.latest_screenshot().is_some());
//! ```

use crate::cache::ScreenshotCache;
use crate::compositor::{CompositeOutcome, Compositor, CompositorSettings};
use crate::dispatcher::{FrameCallback, FrameEvent, RepaintDispatcher, RepaintQueue};
use crate::error::{RenderError, Result};
use crate::key::{Screenshot, ScreenshotKey};
use crate::overlay::{Decoration, LiveOverlay, OverlayStyle};
use crate::presenter::{PresentFrame, PresentReport, Presenter};
use crate::source::{NoResources, ResourceManager, SpatialIndex};
use crate::surface::{NullScreen, Screen, SoftwareSurface, Surface};
use arc_swap::{ArcSwap, Guard};
use lamina_animation::{
    AnimationHandle, AnimationState, Animator, Browse, Easing, Highlight, InputGate, TaskControl,
    TaskId, TaskScheduler, ViewSink, WatcherTiming, ZoomTo,
};
use lamina_core::{
    CanvasConfig, ChannelMask, CompositeMode, ContextLayer, LayerId, LiveFilterChain, ObjectId,
    Point, Rect, RepaintRegion, RepaintRequest, ViewState,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Screen pixels added around highlight damage to cover the stroke
const HIGHLIGHT_MARGIN: i32 = 3;

/// What [`Canvas::animate_to`] should bring into view
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimationTarget {
    Rect(Rect),
    Object(ObjectId),
}

/// State of the frame the presenter would show next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Nothing composited yet, or flushed
    Empty,
    Ready,
    /// The last composite failed; the previous raster is still shown
    Degraded,
}

struct FrameState {
    latest: Option<Arc<Screenshot>>,
    /// Union of clips not yet presented
    damage: Option<RepaintRegion>,
    status: FrameStatus,
}

impl FrameState {
    fn new() -> Self {
        Self {
            latest: None,
            damage: None,
            status: FrameStatus::Empty,
        }
    }

    fn add_damage(&mut self, region: RepaintRegion) {
        self.damage = Some(match self.damage {
            Some(damage) => damage.union(region),
            None => region,
        });
    }
}

/// State shared with the dispatcher thread and the periodic tasks
struct CanvasShared {
    view: ArcSwap<ViewState>,
    compositor: Compositor,
    queue: RepaintQueue,
    frame: Mutex<FrameState>,
    highlight: Mutex<Option<Highlight>>,
    on_frame: Option<FrameCallback>,
}

impl CanvasShared {
    /// Publish a new snapshot derived from the current one
    fn update<F>(&self, f: F) -> Arc<ViewState>
    where
        F: Fn(&ViewState) -> ViewState,
    {
        self.view.rcu(|current| Arc::new(f(current)));
        self.view.load_full()
    }

    fn emit(&self, event: FrameEvent) {
        if let Some(callback) = &self.on_frame {
            callback(event);
        }
    }

    /// Body of the dispatcher thread
    fn handle_repaint(&self, request: RepaintRequest) {
        let view = self.view.load_full();
        let key = ScreenshotKey::from_view(&view);
        let current = self
            .frame
            .lock()
            .latest
            .as_ref()
            .map_or(false, |shot| shot.key() == &key);

        if current && !request.must_recomposite {
            // Only the overlay changed
            self.frame.lock().add_damage(request.region);
            self.emit(FrameEvent::Ready {
                clip: request.region.clip(),
                recomposited: false,
            });
            return;
        }

        let outcome = if request.must_recomposite {
            self.compositor.recomposite(&view)
        } else {
            self.compositor.composite(&view)
        };
        match outcome {
            CompositeOutcome::Degraded(e) => {
                tracing::warn!(layer = %view.active_layer, "keeping previous frame: {e}");
                self.frame.lock().status = FrameStatus::Degraded;
                self.emit(FrameEvent::Degraded);
            }
            outcome => {
                let cached = outcome.is_cached();
                let shot = outcome.into_screenshot();
                {
                    let mut frame = self.frame.lock();
                    frame.latest = shot;
                    frame.status = FrameStatus::Ready;
                    frame.add_damage(RepaintRegion::WholeView);
                }
                tracing::trace!(cached, "frame ready");
                self.emit(FrameEvent::Ready {
                    clip: None,
                    recomposited: true,
                });
            }
        }
    }

    /// One highlight tick: shrink the ellipse and damage old and new bounds
    fn tick_highlight(&self) -> TaskControl {
        let transform = self.view.load().transform();
        let mut slot = self.highlight.lock();
        let Some(highlight) = slot.as_mut() else {
            return TaskControl::Stop;
        };
        let before = transform.rect_to_screen_bounds(&highlight.ellipse());
        let running = highlight.advance();
        let after = transform.rect_to_screen_bounds(&highlight.ellipse());
        if !running {
            *slot = None;
        }
        drop(slot);

        let damage = before.union(&after).inflate(HIGHLIGHT_MARGIN);
        self.queue.request_repaint(RepaintRequest::dirty(damage, false));
        if running {
            TaskControl::Continue
        } else {
            TaskControl::Stop
        }
    }
}

impl ViewSink for CanvasShared {
    fn current_view(&self) -> Arc<ViewState> {
        self.view.load_full()
    }

    fn publish_animated(&self, view: ViewState) {
        // Animations own only the geometry; keep concurrent edits to the rest
        self.update(|current| current.clone().with_view(view.world_rect, view.scale));
        self.queue.request_repaint(RepaintRequest::whole_view(false));
    }
}

/// Builder for [`Canvas`]
pub struct CanvasBuilder {
    view: ViewState,
    config: CanvasConfig,
    spatial: Arc<dyn SpatialIndex>,
    resources: Arc<dyn ResourceManager>,
    surface: Option<Box<dyn Surface>>,
    screen: Option<Box<dyn Screen>>,
    on_frame: Option<FrameCallback>,
    overlay_style: OverlayStyle,
    thread_name: String,
}

impl CanvasBuilder {
    pub fn new(view: ViewState, spatial: Arc<dyn SpatialIndex>) -> Self {
        Self {
            view,
            config: CanvasConfig::default(),
            spatial,
            resources: Arc::new(NoResources),
            surface: None,
            screen: None,
            on_frame: None,
            overlay_style: OverlayStyle::default(),
            thread_name: "lamina-repaint".to_string(),
        }
    }

    pub fn config(mut self, config: CanvasConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resources(mut self, resources: Arc<dyn ResourceManager>) -> Self {
        self.resources = resources;
        self
    }

    /// Accelerated surface; defaults to a [`SoftwareSurface`]
    pub fn surface(mut self, surface: Box<dyn Surface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Where presented frames go; defaults to [`NullScreen`]
    pub fn screen(mut self, screen: Box<dyn Screen>) -> Self {
        self.screen = Some(screen);
        self
    }

    /// Called on the dispatcher thread whenever a frame is ready to present
    pub fn on_frame<F>(mut self, callback: F) -> Self
    where
        F: Fn(FrameEvent) + Send + Sync + 'static,
    {
        self.on_frame = Some(Arc::new(callback));
        self
    }

    pub fn overlay_style(mut self, style: OverlayStyle) -> Self {
        self.overlay_style = style;
        self
    }

    /// Name of the dispatcher thread
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Validate, start the dispatcher and scheduler and request the first frame
    pub fn build(self) -> Result<Canvas> {
        let config = self.config;
        config.validate()?;
        let mut view = self.view;
        if !config.depth_cue {
            view.depth_cue = false;
        }
        view.validate()?;

        let cache = Arc::new(ScreenshotCache::new(config.max_screenshots_per_layer_set));
        let compositor = Compositor::new(
            Arc::clone(&self.spatial),
            Arc::clone(&self.resources),
            cache,
            CompositorSettings::from_config(&config),
        );
        let queue = RepaintQueue::new();
        let shared = Arc::new(CanvasShared {
            view: ArcSwap::from_pointee(view),
            compositor,
            queue: queue.clone(),
            frame: Mutex::new(FrameState::new()),
            highlight: Mutex::new(None),
            on_frame: self.on_frame,
        });

        let handler = Arc::clone(&shared);
        let dispatcher = RepaintDispatcher::spawn(&self.thread_name, queue, move |request| {
            handler.handle_repaint(request)
        })?;

        let scheduler = Arc::new(TaskScheduler::new(config.scheduler_threads)?);
        let gate = Arc::new(InputGate::new());
        let sink: Arc<dyn ViewSink> = shared.clone();
        let animator = Animator::new(
            Arc::clone(&scheduler),
            sink,
            Arc::clone(&gate),
            WatcherTiming {
                initial_delay: config.watcher_initial_delay(),
                period: config.watcher_period(),
            },
        );

        let surface = self
            .surface
            .unwrap_or_else(|| Box::new(SoftwareSurface::new()));
        let screen = self.screen.unwrap_or_else(|| Box::new(NullScreen));
        let presenter = Presenter::new(surface, screen)
            .with_background(config.background)
            .with_max_attempts(config.max_present_attempts);
        let overlay = LiveOverlay::new(self.spatial, self.resources).with_style(self.overlay_style);

        tracing::info!(thread = %self.thread_name, "canvas created");
        dispatcher.request_repaint(RepaintRequest::whole_view(false));

        Ok(Canvas {
            shared,
            config,
            gate,
            animator,
            scheduler,
            presenter: Mutex::new(presenter),
            overlay,
            decorations: Mutex::new(Vec::new()),
            highlight_task: Mutex::new(None),
            dispatcher,
        })
    }
}

/// Incrementally re-rendered view of one layer stack
pub struct Canvas {
    shared: Arc<CanvasShared>,
    config: CanvasConfig,
    gate: Arc<InputGate>,
    animator: Animator,
    scheduler: Arc<TaskScheduler>,
    presenter: Mutex<Presenter>,
    overlay: LiveOverlay,
    decorations: Mutex<Vec<Arc<dyn Decoration>>>,
    highlight_task: Mutex<Option<TaskId>>,
    dispatcher: RepaintDispatcher,
}

impl Canvas {
    /// The latest published view snapshot
    pub fn view(&self) -> Arc<ViewState> {
        self.shared.view.load_full()
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ScreenshotCache> {
        self.shared.compositor.cache()
    }

    pub fn compositor(&self) -> &Compositor {
        &self.shared.compositor
    }

    pub fn input_gate(&self) -> &Arc<InputGate> {
        &self.gate
    }

    /// False while an animation owns the view
    pub fn can_mutate_view(&self) -> bool {
        self.gate.can_mutate_view()
    }

    fn ensure_input(&self) -> Result<()> {
        if self.gate.can_mutate_view() {
            Ok(())
        } else {
            Err(RenderError::InputSuspended)
        }
    }

    fn publish<F>(&self, request: RepaintRequest, f: F) -> Arc<ViewState>
    where
        F: Fn(&ViewState) -> ViewState,
    {
        let view = self.shared.update(f);
        self.dispatcher.request_repaint(request);
        view
    }

    /// Like [`Canvas::publish`] for edits the input gate guards. The gate is
    /// checked again on every swap attempt, so an animation that starts while
    /// the edit is computed wins and the edit is refused.
    fn publish_gated<F>(&self, request: RepaintRequest, f: F) -> Result<Arc<ViewState>>
    where
        F: Fn(&ViewState) -> ViewState,
    {
        let slot = &self.shared.view;
        let mut current = slot.load_full();
        loop {
            self.ensure_input()?;
            let next = Arc::new(f(&current));
            let previous = slot.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                self.dispatcher.request_repaint(request);
                return Ok(next);
            }
            current = Guard::into_inner(previous);
        }
    }

    /// Pan or zoom to show `world_rect` at `scale`. Refused while an
    /// animation runs.
    pub fn set_view(&self, world_rect: Rect, scale: f64) -> Result<()> {
        self.ensure_input()?;
        self.view().as_ref().clone().with_view(world_rect, scale).validate()?;
        self.publish_gated(RepaintRequest::whole_view(false), |view| {
            view.clone().with_view(world_rect, scale)
        })?;
        Ok(())
    }

    /// Show another layer of the stack. Refused while an animation runs.
    pub fn set_active_layer(&self, layer: LayerId) -> Result<()> {
        self.publish_gated(RepaintRequest::whole_view(false), |view| {
            view.clone().with_active_layer(layer)
        })?;
        Ok(())
    }

    /// Ask for a repaint; never blocks
    pub fn request_repaint(&self, region: RepaintRegion, must_recomposite: bool) {
        self.dispatcher.request_repaint(RepaintRequest {
            region,
            must_recomposite,
        });
    }

    /// Mark `object` as live-edited, or none. Its pixels leave the
    /// composite and are drawn on the overlay instead.
    pub fn set_active_object(&self, object: Option<ObjectId>) {
        self.publish(RepaintRequest::whole_view(false), |view| {
            view.clone().with_active_object(object)
        });
    }

    pub fn set_selection(&self, selection: &[ObjectId]) {
        self.publish(RepaintRequest::whole_view(false), |view| {
            view.clone().with_selection(selection.iter().copied())
        });
    }

    pub fn set_channel_mask(&self, mask: ChannelMask) {
        self.publish(RepaintRequest::whole_view(false), |view| {
            view.clone().with_channel_mask(mask)
        });
    }

    pub fn set_live_filter_chain(&self, chain: LiveFilterChain) {
        self.publish(RepaintRequest::whole_view(false), |view| {
            view.clone().with_live_filters(chain)
        });
    }

    pub fn set_mode(&self, mode: CompositeMode) {
        self.publish(RepaintRequest::whole_view(false), |view| {
            view.clone().with_mode(mode)
        });
    }

    pub fn set_context_layers(&self, context: &[ContextLayer]) {
        self.publish(RepaintRequest::whole_view(false), |view| {
            view.clone().with_context_layers(context.iter().copied())
        });
    }

    pub fn set_depth_cue(&self, depth_cue: bool) {
        self.publish(RepaintRequest::whole_view(false), |view| {
            view.clone().with_depth_cue(depth_cue)
        });
    }

    /// Glide or zoom until `target` is in view.
    ///
    /// A target that is already fully visible only gets a highlight and
    /// `None` is returned. Otherwise the view is eased there over roughly
    /// `duration`, zooming out if the target does not fit.
    pub fn animate_to(
        &self,
        target: AnimationTarget,
        duration: Duration,
    ) -> Result<Option<AnimationHandle>> {
        let view = self.view();
        let rect = match target {
            AnimationTarget::Rect(rect) => rect,
            AnimationTarget::Object(id) => self
                .shared
                .compositor
                .spatial()
                .find_object(id)
                .ok_or(RenderError::UnknownObject(id))?
                .bounds(),
        };
        if view.world_rect.contains_rect(&rect) {
            self.highlight(rect)?;
            return Ok(None);
        }

        let (center, scale) = ZoomTo::fit(&view, &rect, view.pixel_size());
        let period = self.config.animation_period();
        let ticks = (duration.as_millis() / period.as_millis().max(1)).clamp(1, u32::MAX as u128);
        let zoom = ZoomTo::new(center, scale, ticks as u32, Easing::default());
        tracing::debug!(?center, scale, ticks, "animating to target");
        Ok(Some(self.animator.animate("animate-to", zoom, period)?))
    }

    /// Pan by `(dx, dy)` world units at the configured browse speed
    pub fn pan_animated(&self, dx: f64, dy: f64) -> Result<AnimationHandle> {
        let step = self.browse_step();
        Ok(self
            .animator
            .animate("pan", Browse::pan_by(dx, dy, step), self.config.animation_period())?)
    }

    /// Glide until the view is centered on `center`
    pub fn browse_to(&self, center: Point) -> Result<AnimationHandle> {
        let step = self.browse_step();
        Ok(self
            .animator
            .animate("browse", Browse::browse_to(center, step), self.config.animation_period())?)
    }

    fn browse_step(&self) -> f64 {
        self.config.browse_step_px / self.view().scale
    }

    /// Cancel the running animation; input is resumed once it unwinds
    pub fn cancel_animation(&self) -> bool {
        self.animator.cancel()
    }

    pub fn animation_state(&self) -> AnimationState {
        self.animator.state()
    }

    /// Play a shrinking ellipse around `target` on the overlay, replacing
    /// any highlight already playing
    pub fn highlight(&self, target: Rect) -> Result<()> {
        let mut task = self.highlight_task.lock();
        if let Some(previous) = task.take() {
            self.scheduler.cancel(previous);
        }

        let highlight = Highlight::new(target, Highlight::DEFAULT_TICKS);
        let initial = self.view().transform().rect_to_screen_bounds(&highlight.ellipse());
        *self.shared.highlight.lock() = Some(highlight);
        self.dispatcher
            .request_repaint(RepaintRequest::dirty(initial.inflate(HIGHLIGHT_MARGIN), false));

        let shared = Arc::clone(&self.shared);
        let period = self.config.highlight_period();
        *task = Some(self.scheduler.schedule_with_fixed_delay(
            "highlight",
            period,
            period,
            move || shared.tick_highlight(),
        )?);
        Ok(())
    }

    /// Handle to the composite of `layer` under the current view, for
    /// warming the cache ahead of layer scrolling
    pub fn create_screenshot(&self, layer: LayerId) -> ScreenshotHandle {
        let view = self.view().as_ref().clone().with_active_layer(layer);
        ScreenshotHandle {
            key: ScreenshotKey::from_view(&view),
            view,
            compositor: self.shared.compositor.clone(),
        }
    }

    /// The contents of `layer` changed
    pub fn layer_changed(&self, layer: LayerId) {
        let evicted = self.cache().invalidate(layer);
        let involved = ScreenshotKey::from_view(&self.view()).involves_layer(layer);
        tracing::debug!(%layer, evicted, involved, "layer changed");
        self.publish(RepaintRequest::whole_view(involved), |view| view.clone());
    }

    /// `layer` is gone; it is dropped from the context layers and RGB channels
    pub fn layer_removed(&self, layer: LayerId) {
        let evicted = self.cache().invalidate(layer);
        tracing::debug!(%layer, evicted, "layer removed");
        self.publish(RepaintRequest::whole_view(true), |view| {
            let mut next = view.clone();
            next.context_layers.retain(|context| context.layer != layer);
            if let CompositeMode::Rgb { red, green, blue } = &mut next.mode {
                for channel in [red, green, blue] {
                    if *channel == Some(layer) {
                        *channel = None;
                    }
                }
            }
            next
        });
    }

    /// An object whose world bounds are `bounds` changed, possibly across layers
    pub fn object_changed(&self, bounds: Rect) {
        let view = self.view();
        let evicted = self.cache().invalidate_intersecting(view.layer_set, &bounds);
        let visible = view.world_rect.intersects(&bounds);
        tracing::trace!(evicted, visible, "object changed");
        self.publish(RepaintRequest::whole_view(visible), |view| view.clone());
    }

    /// Drop every cached raster and release the surface
    pub fn flush(&self) {
        self.cache().flush();
        self.presenter.lock().release();
        let mut frame = self.shared.frame.lock();
        frame.latest = None;
        frame.status = FrameStatus::Empty;
        frame.damage = Some(RepaintRegion::WholeView);
        tracing::debug!("canvas flushed");
    }

    /// Draw the latest composite and the live overlay. UI thread only.
    pub fn present(&self) -> PresentReport {
        let view = self.view();
        let (shot, damage) = {
            let mut frame = self.shared.frame.lock();
            (frame.latest.clone(), frame.damage.take())
        };
        let highlight = self.shared.highlight.lock().clone();
        let decorations = self.decorations.lock().clone();

        let frame = PresentFrame {
            raster: shot.as_ref().map(|shot| &**shot.raster()),
            size: view.pixel_size(),
            transform: view.transform(),
            clip: damage.and_then(|region| region.clip()),
        };
        self.presenter.lock().present(frame, |painter| {
            self.overlay.draw(
                painter,
                &view,
                shot.as_deref(),
                highlight.as_ref(),
                &decorations,
            )
        })
    }

    pub fn frame_status(&self) -> FrameStatus {
        self.shared.frame.lock().status
    }

    /// The composite the next present will show
    pub fn latest_screenshot(&self) -> Option<Arc<Screenshot>> {
        self.shared.frame.lock().latest.clone()
    }

    pub fn add_decoration(&self, decoration: Arc<dyn Decoration>) {
        self.decorations.lock().push(decoration);
        self.dispatcher.request_repaint(RepaintRequest::whole_view(false));
    }

    pub fn clear_decorations(&self) {
        self.decorations.lock().clear();
        self.dispatcher.request_repaint(RepaintRequest::whole_view(false));
    }

    /// Block until the dispatcher has nothing pending. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }
}

impl Drop for Canvas {
    fn drop(&mut self) {
        self.animator.cancel();
        if let Some(task) = self.highlight_task.get_mut().take() {
            self.scheduler.cancel(task);
        }
        tracing::debug!("canvas dropped");
    }
}

/// Pre-warmable composite of one layer under a fixed view
#[derive(Clone)]
pub struct ScreenshotHandle {
    key: ScreenshotKey,
    view: ViewState,
    compositor: Compositor,
}

impl ScreenshotHandle {
    pub fn key(&self) -> &ScreenshotKey {
        &self.key
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn is_cached(&self) -> bool {
        self.compositor.cache().contains(&self.key)
    }

    /// Composite on the calling thread unless the cache already has it.
    /// Blocks while the canvas has another composite in flight.
    pub fn render(&self) -> CompositeOutcome {
        self.compositor.composite(&self.view)
    }
}

impl std::fmt::Debug for ScreenshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenshotHandle")
            .field("key", &self.key)
            .finish()
    }
}
