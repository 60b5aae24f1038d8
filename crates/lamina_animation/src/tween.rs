//! View tweens driven by the [`Animator`](crate::Animator)
//!
//! Each tween captures its starting view on the first tick, so it can be
//! built before the animation is started and always moves from wherever the
//! view actually is at that moment.

use crate::animator::{StepOutcome, ViewStep};
use crate::easing::Easing;
use lamina_core::{PixelSize, Point, Rect, Size, ViewState};

/// Resize the visible rect around `center` so the viewport stays `pixels`
fn view_at(view: &ViewState, center: Point, scale: f64, pixels: PixelSize) -> ViewState {
    let size = Size::new(pixels.width as f64 / scale, pixels.height as f64 / scale);
    view.clone()
        .with_view(Rect::from_center(center, size), scale)
}

/// Constant-speed glide of the view center toward a target
#[derive(Clone, Debug)]
pub struct Browse {
    target: Option<Point>,
    offset: Option<(f64, f64)>,
    /// World units moved per tick
    step: f64,
}

impl Browse {
    /// Move by `(dx, dy)` world units relative to the view at the first tick
    pub fn pan_by(dx: f64, dy: f64, step: f64) -> Self {
        Self {
            target: None,
            offset: Some((dx, dy)),
            step,
        }
    }

    /// Move until the view is centered on `target`
    pub fn browse_to(target: Point, step: f64) -> Self {
        Self {
            target: Some(target),
            offset: None,
            step,
        }
    }
}

impl ViewStep for Browse {
    fn step(&mut self, view: &ViewState) -> StepOutcome {
        let center = view.world_rect.center();
        let target = match (self.target, self.offset.take()) {
            (Some(target), _) => target,
            (None, Some((dx, dy))) => {
                let target = Point::new(center.x + dx, center.y + dy);
                self.target = Some(target);
                target
            }
            (None, None) => return StepOutcome::Stop,
        };

        let remaining = center.distance(target);
        // Tolerate rounding so the last partial step does not become two
        if self.step.is_nan() || self.step <= 0.0 || remaining <= self.step * (1.0 + 1e-9) {
            return StepOutcome::Finish(view.clone().centered_on(target));
        }
        let next = center.lerp(target, self.step / remaining);
        StepOutcome::Continue(view.clone().centered_on(next))
    }
}

/// Eased interpolation of view center and log-scale over a fixed number of ticks
#[derive(Clone, Debug)]
pub struct ZoomTo {
    to_center: Point,
    to_scale: f64,
    ticks: u32,
    tick: u32,
    easing: Easing,
    /// Start center, start scale and the viewport size held constant throughout
    from: Option<(Point, f64, PixelSize)>,
}

impl ZoomTo {
    pub fn new(to_center: Point, to_scale: f64, ticks: u32, easing: Easing) -> Self {
        Self {
            to_center,
            to_scale,
            ticks: ticks.max(1),
            tick: 0,
            easing,
            from: None,
        }
    }

    /// Target center and scale that bring `target` into a viewport of
    /// `pixels`. The scale only ever decreases: a target that fits at the
    /// current scale is panned to, a larger one is zoomed out to.
    pub fn fit(view: &ViewState, target: &Rect, pixels: PixelSize) -> (Point, f64) {
        let mut scale = view.scale;
        if target.width() > 0.0 && target.height() > 0.0 {
            let fit = (pixels.width as f64 / target.width()).min(pixels.height as f64 / target.height());
            if fit < scale {
                scale = fit;
            }
        }
        (target.center(), scale)
    }
}

impl ViewStep for ZoomTo {
    fn step(&mut self, view: &ViewState) -> StepOutcome {
        let (from_center, from_scale, pixels) = *self
            .from
            .get_or_insert_with(|| (view.world_rect.center(), view.scale, view.pixel_size()));

        self.tick += 1;
        if self.tick >= self.ticks {
            return StepOutcome::Finish(view_at(view, self.to_center, self.to_scale, pixels));
        }

        let t = self.easing.apply(self.tick as f64 / self.ticks as f64);
        let center = from_center.lerp(self.to_center, t);
        let log_scale = from_scale.ln() + (self.to_scale.ln() - from_scale.ln()) * t;
        StepOutcome::Continue(view_at(view, center, log_scale.exp(), pixels))
    }
}

/// Shrinking ellipse drawn around a region to draw the eye to it.
///
/// The highlight is not a view animation: it does not suspend input and only
/// changes what the live overlay draws.
#[derive(Clone, Debug, PartialEq)]
pub struct Highlight {
    target: Rect,
    ticks: u32,
    tick: u32,
}

impl Highlight {
    /// Number of ticks a highlight lasts
    pub const DEFAULT_TICKS: u32 = 10;

    pub fn new(target: Rect, ticks: u32) -> Self {
        Self {
            target,
            ticks: ticks.max(1),
            tick: 0,
        }
    }

    pub fn target(&self) -> &Rect {
        &self.target
    }

    pub fn is_finished(&self) -> bool {
        self.tick >= self.ticks
    }

    /// Ellipse bounds at the current tick: three times the target's size at
    /// the start, shrinking linearly onto the target itself
    pub fn ellipse(&self) -> Rect {
        let remaining = 1.0 - self.tick.min(self.ticks) as f64 / self.ticks as f64;
        let grow = 1.0 + 2.0 * remaining;
        let size = Size::new(self.target.width() * grow, self.target.height() * grow);
        Rect::from_center(self.target.center(), size)
    }

    /// Advance one tick; returns `false` once finished
    pub fn advance(&mut self) -> bool {
        if self.tick < self.ticks {
            self.tick += 1;
        }
        !self.is_finished()
    }
}
