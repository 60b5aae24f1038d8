//! Lamina Animation
//!
//! Smooth pan and zoom for the canvas.
//!
//! # Features
//!
//! - **Task scheduler**: a fixed-delay periodic task pool
//! - **Animator**: one exclusive view animation at a time, suspending user
//!   input and restoring it exactly once however the animation ends
//! - **Tweens**: constant-speed browsing, eased zoom-to-target, highlights

pub mod animator;
pub mod easing;
pub mod error;
pub mod scheduler;
pub mod tween;

pub use animator::{
    AnimationHandle, AnimationState, Animator, InputGate, StepOutcome, ViewSink, ViewStep,
    WatcherTiming,
};
pub use easing::Easing;
pub use error::{AnimationError, Result};
pub use scheduler::{SchedulerHandle, TaskControl, TaskId, TaskScheduler};
pub use tween::{Browse, Highlight, ZoomTo};
