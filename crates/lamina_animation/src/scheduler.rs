//! Periodic task scheduler
//!
//! A small pool of worker threads running fixed-delay tasks: the next run of
//! a task is scheduled `period` after its previous run *finished*, so a slow
//! tick never causes a burst of catch-up ticks. A task runs on at most one
//! worker at a time. Cancellation is cooperative: a running tick is never
//! interrupted, it just is not rescheduled.

use crate::error::{AnimationError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use slotmap::{new_key_type, SlotMap};
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

new_key_type! {
    pub struct TaskId;
}

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// What a task wants after one tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskControl {
    Continue,
    Stop,
}

type Job = Box<dyn FnMut() -> TaskControl + Send>;

struct Task {
    name: &'static str,
    /// `None` while a worker is running the job
    job: Option<Job>,
    next_run: Instant,
    period: Duration,
    canceled: bool,
}

#[derive(Default)]
struct Queue {
    tasks: SlotMap<TaskId, Task>,
    shutdown: bool,
}

impl Queue {
    /// Earliest idle task and when it is due
    fn next_due(&self) -> Option<(TaskId, Instant)> {
        self.tasks
            .iter()
            .filter(|(_, t)| t.job.is_some() && !t.canceled)
            .min_by_key(|(_, t)| t.next_run)
            .map(|(id, t)| (id, t.next_run))
    }
}

struct Shared {
    queue: Mutex<Queue>,
    /// Signaled when a task is added, canceled or the pool shuts down
    wake: Condvar,
    /// Signaled whenever a tick finishes
    tick_done: Condvar,
}

/// Cloneable access to the task queue without ownership of the workers.
///
/// Tasks that need to schedule or cancel other tasks hold one of these
/// rather than the [`TaskScheduler`], so the pool is never dropped (and
/// joined) from one of its own worker threads.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Run `job` after `initial_delay`, then again `period` after each run
    /// finishes, until it returns [`TaskControl::Stop`] or is canceled.
    pub fn schedule_with_fixed_delay<F>(
        &self,
        name: &'static str,
        initial_delay: Duration,
        period: Duration,
        job: F,
    ) -> Result<TaskId>
    where
        F: FnMut() -> TaskControl + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return Err(AnimationError::ShutDown);
        }
        let id = queue.tasks.insert(Task {
            name,
            job: Some(Box::new(job)),
            next_run: Instant::now() + initial_delay,
            period,
            canceled: false,
        });
        drop(queue);
        self.shared.wake.notify_all();
        tracing::trace!(task = name, ?period, "scheduled periodic task");
        Ok(id)
    }

    /// Stop rescheduling a task. Returns `false` if it already finished or was
    /// canceled. A tick that is running right now completes normally.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut queue = self.shared.queue.lock();
        let Some(task) = queue.tasks.get_mut(id) else {
            return false;
        };
        if task.canceled {
            return false;
        }
        task.canceled = true;
        let name = task.name;
        let idle = task.job.is_some();
        let removed = if idle { queue.tasks.remove(id) } else { None };
        drop(queue);
        // Dropping the job may release captured state; do it unlocked
        drop(removed);
        self.shared.wake.notify_all();
        tracing::trace!(task = name, "canceled periodic task");
        true
    }

    /// Cancel a task and block until any tick of it in progress has returned.
    ///
    /// Called from inside the task itself this only cancels, since waiting
    /// would deadlock.
    pub fn cancel_and_wait(&self, id: TaskId) -> bool {
        let canceled = self.cancel(id);
        if CURRENT_TASK.with(Cell::get) == Some(id) {
            return canceled;
        }
        let mut queue = self.shared.queue.lock();
        while queue.tasks.contains_key(id) {
            self.shared.tick_done.wait(&mut queue);
        }
        canceled
    }

    /// True while the task is scheduled and not canceled
    pub fn is_active(&self, id: TaskId) -> bool {
        self.shared
            .queue
            .lock()
            .tasks
            .get(id)
            .is_some_and(|t| !t.canceled)
    }

    /// Tasks known to the pool, including canceled ones still finishing a tick
    pub fn len(&self) -> usize {
        self.shared.queue.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The periodic-task pool; dropping it stops and joins the workers
pub struct TaskScheduler {
    handle: SchedulerHandle,
    workers: Vec<JoinHandle<()>>,
}

impl TaskScheduler {
    /// Start a pool of `threads` workers (at least one)
    pub fn new(threads: usize) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
            tick_done: Condvar::new(),
        });

        let mut scheduler = Self {
            handle: SchedulerHandle { shared },
            workers: Vec::with_capacity(threads.max(1)),
        };
        for index in 0..threads.max(1) {
            let shared = Arc::clone(&scheduler.handle.shared);
            let spawned = std::thread::Builder::new()
                .name(format!("lamina-scheduler-{index}"))
                .spawn(move || worker_loop(shared));
            // On failure, dropping `scheduler` stops the workers already started
            scheduler.workers.push(spawned?);
        }
        tracing::debug!(threads = scheduler.workers.len(), "task scheduler started");
        Ok(scheduler)
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// The task whose tick is executing on this thread, if any
    pub fn current_task() -> Option<TaskId> {
        CURRENT_TASK.with(Cell::get)
    }
}

impl std::ops::Deref for TaskScheduler {
    type Target = SchedulerHandle;

    fn deref(&self) -> &SchedulerHandle {
        &self.handle
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.handle.shared.queue.lock().shutdown = true;
        self.handle.shared.wake.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("scheduler worker panicked during shutdown");
            }
        }
        // Release jobs (and whatever they captured) left in the queue
        let leftover = std::mem::take(&mut self.handle.shared.queue.lock().tasks);
        drop(leftover);
        tracing::debug!("task scheduler stopped");
    }
}

fn run_tick(
    queue: &mut MutexGuard<'_, Queue>,
    id: TaskId,
    mut job: Job,
    name: &'static str,
) -> (Job, TaskControl) {
    let control = MutexGuard::unlocked(queue, || {
        CURRENT_TASK.with(|c| c.set(Some(id)));
        let result = catch_unwind(AssertUnwindSafe(&mut job));
        CURRENT_TASK.with(|c| c.set(None));
        result.unwrap_or_else(|_| {
            tracing::warn!(task = name, "periodic task panicked; stopping it");
            TaskControl::Stop
        })
    });
    (job, control)
}

fn worker_loop(shared: Arc<Shared>) {
    let mut queue = shared.queue.lock();
    loop {
        if queue.shutdown {
            break;
        }
        let Some((id, due)) = queue.next_due() else {
            shared.wake.wait(&mut queue);
            continue;
        };
        if due > Instant::now() {
            shared.wake.wait_until(&mut queue, due);
            continue;
        }

        let Some(task) = queue.tasks.get_mut(id) else {
            continue;
        };
        let name = task.name;
        let Some(job) = task.job.take() else {
            continue;
        };

        let (job, control) = run_tick(&mut queue, id, job, name);

        let reschedule = match queue.tasks.get_mut(id) {
            Some(task) if !task.canceled && control == TaskControl::Continue => {
                task.job = Some(job);
                task.next_run = Instant::now() + task.period;
                true
            }
            _ => false,
        };
        if !reschedule {
            let finished = queue.tasks.remove(id);
            MutexGuard::unlocked(&mut queue, || drop(finished));
            tracing::trace!(task = name, "periodic task finished");
        }
        shared.tick_done.notify_all();
        // Another worker may be sleeping on a deadline that is now stale
        shared.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_task_runs_until_stop() {
        let scheduler = TaskScheduler::new(2).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = scheduler
            .schedule_with_fixed_delay("count", Duration::ZERO, Duration::from_millis(1), move || {
                if c.fetch_add(1, Ordering::SeqCst) + 1 >= 5 {
                    TaskControl::Stop
                } else {
                    TaskControl::Continue
                }
            })
            .unwrap();
        assert!(wait_for(|| !scheduler.is_active(id)));
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancel_stops_rescheduling() {
        let scheduler = TaskScheduler::new(1).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = scheduler
            .schedule_with_fixed_delay("forever", Duration::ZERO, Duration::from_millis(1), move || {
                c.fetch_add(1, Ordering::SeqCst);
                TaskControl::Continue
            })
            .unwrap();
        assert!(wait_for(|| count.load(Ordering::SeqCst) > 2));
        assert!(scheduler.cancel_and_wait(id));
        let frozen = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), frozen);
        assert!(!scheduler.cancel(id));
    }

    #[test]
    fn test_initial_delay_is_honored() {
        let scheduler = TaskScheduler::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        scheduler
            .schedule_with_fixed_delay("late", Duration::from_millis(200), Duration::from_secs(1), move || {
                r.fetch_add(1, Ordering::SeqCst);
                TaskControl::Stop
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(wait_for(|| ran.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_panicking_task_is_dropped() {
        let scheduler = TaskScheduler::new(1).unwrap();
        let id = scheduler
            .schedule_with_fixed_delay("boom", Duration::ZERO, Duration::from_millis(1), || {
                panic!("tick failed")
            })
            .unwrap();
        assert!(wait_for(|| !scheduler.is_active(id)));

        // The worker survives and keeps serving
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        scheduler
            .schedule_with_fixed_delay("after", Duration::ZERO, Duration::from_millis(1), move || {
                r.fetch_add(1, Ordering::SeqCst);
                TaskControl::Stop
            })
            .unwrap();
        assert!(wait_for(|| ran.load(Ordering::SeqCst) == 1));
    }
}
