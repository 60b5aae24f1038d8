//! Easing curves for view tweens

/// Progress curve of a [`ZoomTo`](crate::ZoomTo)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Easing {
    Linear,
    /// Slow start and end
    #[default]
    EaseInOutCubic,
}

impl Easing {
    /// Map linear progress in `0.0..=1.0` to eased progress.
    ///
    /// Input outside the unit interval is clamped, so the first and last
    /// tick of an animation land exactly on its endpoints.
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (2.0 - 2.0 * t).powi(3) / 2.0
                }
            }
        }
    }
}
