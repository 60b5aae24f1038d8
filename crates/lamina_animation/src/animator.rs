//! Exclusive view animations
//!
//! An [`Animator`] runs at most one view animation at a time. Starting one
//! suspends user-driven view mutation through the shared [`InputGate`];
//! finishing it (by completion or cancellation, from any thread) resumes
//! input exactly once. A companion watcher task notices when the main tick
//! task disappears without going through [`AnimationHandle::cancel`] (for
//! example when someone cancels it directly on the scheduler) and performs
//! the same cleanup.
//!
//! Lifecycle: `Idle -> Running -> {Completed, Canceled} -> Idle`.

use crate::error::Result;
use crate::scheduler::{SchedulerHandle, TaskControl, TaskId, TaskScheduler};
use lamina_core::ViewState;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where animated views go; implemented by the canvas
pub trait ViewSink: Send + Sync + 'static {
    /// The latest published view
    fn current_view(&self) -> Arc<ViewState>;

    /// Publish a view computed by an animation tick and request a repaint
    fn publish_animated(&self, view: ViewState);
}

/// Result of one animation tick
#[derive(Clone, Debug)]
pub enum StepOutcome {
    /// Publish the view and keep going
    Continue(ViewState),
    /// Publish the view and finish
    Finish(ViewState),
    /// Finish without publishing anything
    Stop,
}

/// Computes successive views of an animation
pub trait ViewStep: Send + 'static {
    fn step(&mut self, view: &ViewState) -> StepOutcome;
}

impl<F> ViewStep for F
where
    F: FnMut(&ViewState) -> StepOutcome + Send + 'static,
{
    fn step(&mut self, view: &ViewState) -> StepOutcome {
        self(view)
    }
}

/// Observable phase of the animator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationState {
    Idle,
    Running,
    Completed,
    Canceled,
}

impl AnimationState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => AnimationState::Running,
            2 => AnimationState::Completed,
            3 => AnimationState::Canceled,
            _ => AnimationState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            AnimationState::Idle => 0,
            AnimationState::Running => 1,
            AnimationState::Completed => 2,
            AnimationState::Canceled => 3,
        }
    }
}

/// Whether user input may mutate the view
#[derive(Debug)]
pub struct InputGate {
    can_mutate: AtomicBool,
    resumes: AtomicUsize,
}

impl InputGate {
    pub fn new() -> Self {
        Self {
            can_mutate: AtomicBool::new(true),
            resumes: AtomicUsize::new(0),
        }
    }

    pub fn can_mutate_view(&self) -> bool {
        self.can_mutate.load(Ordering::Acquire)
    }

    fn suspend(&self) {
        self.can_mutate.store(false, Ordering::Release);
    }

    fn resume(&self) {
        self.can_mutate.store(true, Ordering::Release);
        self.resumes.fetch_add(1, Ordering::AcqRel);
    }

    /// How many times input has been resumed since creation
    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::Acquire)
    }
}

impl Default for InputGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared record of one animation run
struct Run {
    serial: u64,
    name: &'static str,
    state: AtomicU8,
    restored: AtomicBool,
    gate: Arc<InputGate>,
    scheduler: SchedulerHandle,
    main: Mutex<Option<TaskId>>,
    watcher: Mutex<Option<TaskId>>,
    started: Instant,
}

impl Run {
    fn state(&self) -> AnimationState {
        AnimationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `Running -> to`. Only the first caller wins; every caller then
    /// runs the idempotent cleanup.
    fn finish(&self, to: AnimationState) -> bool {
        let won = self
            .state
            .compare_exchange(
                AnimationState::Running.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            tracing::debug!(
                animation = self.name,
                serial = self.serial,
                state = ?to,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "animation finished"
            );
        }
        self.cleanup();
        won
    }

    fn cleanup(&self) {
        if let Some(id) = self.main.lock().take() {
            self.scheduler.cancel(id);
        }
        if let Some(id) = self.watcher.lock().take() {
            self.scheduler.cancel(id);
        }
        if !self.restored.swap(true, Ordering::AcqRel) {
            self.gate.resume();
        }
    }
}

/// Handle to a started animation
#[derive(Clone)]
pub struct AnimationHandle {
    run: Arc<Run>,
}

impl AnimationHandle {
    /// Cancel the animation. Safe to call from any thread, any number of
    /// times; returns `true` only for the call that actually canceled it.
    pub fn cancel(&self) -> bool {
        self.run.finish(AnimationState::Canceled)
    }

    /// Cancel and wait for a tick in progress to return
    pub fn cancel_and_wait(&self) -> bool {
        let main = *self.run.main.lock();
        let canceled = self.cancel();
        if let Some(id) = main {
            self.run.scheduler.cancel_and_wait(id);
        }
        canceled
    }

    pub fn state(&self) -> AnimationState {
        self.run.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == AnimationState::Running
    }

    /// The main tick task, for callers that manage the scheduler directly
    pub fn task_id(&self) -> Option<TaskId> {
        *self.run.main.lock()
    }

    /// Block until the animation leaves `Running` or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> AnimationState {
        let deadline = Instant::now() + timeout;
        while self.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.state()
    }
}

impl std::fmt::Debug for AnimationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationHandle")
            .field("name", &self.run.name)
            .field("serial", &self.run.serial)
            .field("state", &self.state())
            .finish()
    }
}

/// Watcher timing
#[derive(Clone, Copy, Debug)]
pub struct WatcherTiming {
    pub initial_delay: Duration,
    pub period: Duration,
}

impl Default for WatcherTiming {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            period: Duration::from_millis(700),
        }
    }
}

/// Runs exclusive view animations for one canvas
pub struct Animator {
    scheduler: Arc<TaskScheduler>,
    sink: Arc<dyn ViewSink>,
    gate: Arc<InputGate>,
    current: Mutex<Option<AnimationHandle>>,
    watcher: WatcherTiming,
    serial: AtomicU64,
}

impl Animator {
    pub fn new(
        scheduler: Arc<TaskScheduler>,
        sink: Arc<dyn ViewSink>,
        gate: Arc<InputGate>,
        watcher: WatcherTiming,
    ) -> Self {
        Self {
            scheduler,
            sink,
            gate,
            current: Mutex::new(None),
            watcher,
            serial: AtomicU64::new(0),
        }
    }

    pub fn gate(&self) -> &Arc<InputGate> {
        &self.gate
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    /// State of the most recent animation, `Idle` once it has finished
    pub fn state(&self) -> AnimationState {
        match self.current.lock().as_ref() {
            Some(handle) if handle.is_running() => AnimationState::Running,
            _ => AnimationState::Idle,
        }
    }

    /// Start an animation ticking every `period`.
    ///
    /// A running animation is canceled and fully unwound first, so input is
    /// resumed for it before being suspended again for the new one.
    pub fn animate<S: ViewStep>(
        &self,
        name: &'static str,
        step: S,
        period: Duration,
    ) -> Result<AnimationHandle> {
        let mut current = self.current.lock();
        if let Some(previous) = current.take() {
            if previous.cancel_and_wait() {
                tracing::debug!(animation = previous.run.name, "superseded by {name}");
            }
        }

        self.gate.suspend();
        let run = Arc::new(Run {
            serial: self.serial.fetch_add(1, Ordering::Relaxed) + 1,
            name,
            state: AtomicU8::new(AnimationState::Running.as_u8()),
            restored: AtomicBool::new(false),
            gate: Arc::clone(&self.gate),
            scheduler: self.scheduler.handle(),
            main: Mutex::new(None),
            watcher: Mutex::new(None),
            started: Instant::now(),
        });
        let handle = AnimationHandle {
            run: Arc::clone(&run),
        };

        // Hold the slot lock so a first tick that finishes immediately
        // cannot race the id being recorded
        let mut main_slot = run.main.lock();
        let tick_run = Arc::clone(&run);
        let sink = Arc::clone(&self.sink);
        let mut step = step;
        let main = self.scheduler.schedule_with_fixed_delay(
            name,
            Duration::ZERO,
            period,
            move || {
                if tick_run.state() != AnimationState::Running {
                    return TaskControl::Stop;
                }
                let view = sink.current_view();
                match step.step(&view) {
                    StepOutcome::Continue(next) => {
                        sink.publish_animated(next);
                        TaskControl::Continue
                    }
                    StepOutcome::Finish(next) => {
                        sink.publish_animated(next);
                        tick_run.finish(AnimationState::Completed);
                        TaskControl::Stop
                    }
                    StepOutcome::Stop => {
                        tick_run.finish(AnimationState::Completed);
                        TaskControl::Stop
                    }
                }
            },
        );
        let main = match main {
            Ok(id) => id,
            Err(e) => {
                drop(main_slot);
                run.finish(AnimationState::Canceled);
                return Err(e);
            }
        };
        *main_slot = Some(main);
        drop(main_slot);

        let watch_run = Arc::clone(&run);
        let scheduler = self.scheduler.handle();
        let watcher = self.scheduler.schedule_with_fixed_delay(
            "animation-watcher",
            self.watcher.initial_delay,
            self.watcher.period,
            move || {
                if watch_run.state() != AnimationState::Running {
                    watch_run.cleanup();
                    return TaskControl::Stop;
                }
                if !scheduler.is_active(main) {
                    tracing::debug!(animation = watch_run.name, "main task gone; cleaning up");
                    watch_run.finish(AnimationState::Canceled);
                    return TaskControl::Stop;
                }
                TaskControl::Continue
            },
        );
        match watcher {
            Ok(id) => {
                let mut slot = run.watcher.lock();
                if run.state() == AnimationState::Running {
                    *slot = Some(id);
                } else {
                    drop(slot);
                    self.scheduler.cancel(id);
                }
            }
            Err(e) => {
                run.finish(AnimationState::Canceled);
                return Err(e);
            }
        }

        tracing::debug!(animation = name, serial = run.serial, ?period, "animation started");
        *current = Some(handle.clone());
        Ok(handle)
    }

    /// Cancel the running animation, if any
    pub fn cancel(&self) -> bool {
        let handle = self.current.lock().clone();
        handle.is_some_and(|h| h.cancel())
    }
}

impl Drop for Animator {
    fn drop(&mut self) {
        if let Some(handle) = self.current.get_mut().take() {
            handle.cancel();
        }
    }
}
