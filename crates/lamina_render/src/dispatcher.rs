//! Repaint dispatcher
//!
//! One pending [`RepaintRequest`] slot per canvas and one named thread that
//! drains it. [`RepaintQueue::request_repaint`] never waits for work: it
//! merges the new request into the slot (union of regions, OR of
//! `must_recomposite`) and wakes the thread. Requests that arrive while a
//! repaint is being handled accumulate in the slot and are handled together
//! afterwards. Nothing in flight is interrupted, and no request is lost,
//! though intermediate states are skipped.

use crate::error::{RenderError, Result};
use lamina_core::{RepaintRequest, ScreenRect};
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// What the dispatcher reports after handling a request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    /// A frame is ready to present; `clip` is `None` for the whole view
    Ready {
        clip: Option<ScreenRect>,
        recomposited: bool,
    },
    /// Compositing failed soft; the last good frame stays up
    Degraded,
}

/// Receives frame events on the dispatcher thread
pub type FrameCallback = Arc<dyn Fn(FrameEvent) + Send + Sync>;

#[derive(Default)]
struct Slot {
    pending: Option<RepaintRequest>,
    busy: bool,
    shutdown: bool,
    handled: u64,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    /// Signaled when a request is stored or on shutdown
    wake: Condvar,
    /// Signaled when the thread finishes a request
    idle: Condvar,
}

/// Cloneable producer side of the pending slot
#[derive(Clone, Default)]
pub struct RepaintQueue {
    shared: Arc<Shared>,
}

impl RepaintQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `request` into the pending slot. Callable from any thread.
    pub fn request_repaint(&self, request: RepaintRequest) {
        let mut slot = self.shared.slot.lock();
        if slot.shutdown {
            return;
        }
        slot.pending = Some(match slot.pending {
            Some(pending) => pending.coalesce(request),
            None => request,
        });
        drop(slot);
        self.shared.wake.notify_one();
    }

    /// The request waiting to be handled, if any
    pub fn pending(&self) -> Option<RepaintRequest> {
        self.shared.slot.lock().pending
    }

    /// Requests handled so far; coalesced requests count once
    pub fn handled(&self) -> u64 {
        self.shared.slot.lock().handled
    }

    /// Block until nothing is pending or running. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        while (slot.pending.is_some() || slot.busy) && !slot.shutdown {
            if self.shared.idle.wait_until(&mut slot, deadline).timed_out() {
                return slot.pending.is_none() && !slot.busy;
            }
        }
        true
    }
}

/// Owns the dispatcher thread; dropping it stops and joins the thread
pub struct RepaintDispatcher {
    queue: RepaintQueue,
    worker: Option<JoinHandle<()>>,
}

impl RepaintDispatcher {
    /// Start a dispatcher with its own queue
    pub fn start<H>(name: &str, handler: H) -> Result<Self>
    where
        H: FnMut(RepaintRequest) + Send + 'static,
    {
        Self::spawn(name, RepaintQueue::new(), handler)
    }

    /// Start a dispatcher draining `queue`, so producers can hold the
    /// queue before the handler exists
    pub fn spawn<H>(name: &str, queue: RepaintQueue, handler: H) -> Result<Self>
    where
        H: FnMut(RepaintRequest) + Send + 'static,
    {
        let shared = Arc::clone(&queue.shared);
        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || dispatch_loop(shared, handler))
            .map_err(RenderError::Spawn)?;
        tracing::debug!(thread = name, "repaint dispatcher started");
        Ok(Self {
            queue,
            worker: Some(worker),
        })
    }

    pub fn queue(&self) -> &RepaintQueue {
        &self.queue
    }
}

impl std::ops::Deref for RepaintDispatcher {
    type Target = RepaintQueue;

    fn deref(&self) -> &RepaintQueue {
        &self.queue
    }
}

impl Drop for RepaintDispatcher {
    fn drop(&mut self) {
        {
            let mut slot = self.queue.shared.slot.lock();
            slot.shutdown = true;
            slot.pending = None;
        }
        self.queue.shared.wake.notify_all();
        self.queue.shared.idle.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == std::thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::warn!("repaint dispatcher panicked during shutdown");
            }
        }
        tracing::debug!("repaint dispatcher stopped");
    }
}

fn dispatch_loop<H>(shared: Arc<Shared>, mut handler: H)
where
    H: FnMut(RepaintRequest),
{
    let mut slot = shared.slot.lock();
    loop {
        if slot.shutdown {
            break;
        }
        let Some(request) = slot.pending.take() else {
            shared.wake.wait(&mut slot);
            continue;
        };
        slot.busy = true;
        drop(slot);

        tracing::trace!(?request, "dispatching repaint");
        if catch_unwind(AssertUnwindSafe(|| handler(request))).is_err() {
            tracing::warn!("repaint handler panicked; request dropped");
        }

        slot = shared.slot.lock();
        slot.busy = false;
        slot.handled += 1;
        shared.idle.notify_all();
    }
}
