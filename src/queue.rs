//! Job queue and scheduler.
//!
//! Reconciles the API's submission-ordered, optionally serialized execution
//! contract with the fire-and-continue protocol client underneath. Units of
//! work are accepted in submission order and drained eagerly against the set
//! of operations currently in flight on the shared stream.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tracing::{trace, warn};

pub(crate) type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One deferred action plus its isolation tag. Consumed exactly once.
pub(crate) struct Job {
    exclusive: bool,
    action: Box<dyn FnOnce() -> JobFuture + Send + 'static>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    in_flight: usize,
    exclusive_running: bool,
}

/// FIFO of not-yet-started jobs plus in-flight accounting.
///
/// Drain rule: an exclusive job only starts when nothing is in flight, and
/// while it is queued at the front or running it gates every job behind it.
/// A non-exclusive front job always starts immediately, so non-exclusive
/// jobs never block each other. Enqueueing returns immediately; actions run
/// on spawned tasks, so completions never run inside the registering call.
pub(crate) struct JobQueue {
    runtime: Handle,
    state: Mutex<QueueState>,
}

impl JobQueue {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Append a unit of work and run a drain pass.
    pub(crate) fn enqueue<F>(self: &Arc<Self>, exclusive: bool, action: F)
    where
        F: FnOnce() -> JobFuture + Send + 'static,
    {
        let mut state = self.lock();
        state.pending.push_back(Job {
            exclusive,
            action: Box::new(action),
        });
        trace!(exclusive, pending = state.pending.len(), "job enqueued");
        self.drain(state);
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            // A panicking user callback must not wedge the queue.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Scan from the front, starting every eligible job. The state lock is
    /// released before any action runs, because completions (and the user
    /// callbacks inside them) are free to enqueue new jobs mid-drain.
    fn drain(self: &Arc<Self>, mut state: MutexGuard<'_, QueueState>) {
        let mut started = Vec::new();
        loop {
            if state.exclusive_running {
                break;
            }
            let eligible = match state.pending.front() {
                Some(job) => !job.exclusive || state.in_flight == 0,
                None => break,
            };
            if !eligible {
                break;
            }
            let Some(job) = state.pending.pop_front() else {
                break;
            };
            state.in_flight += 1;
            if job.exclusive {
                state.exclusive_running = true;
            }
            let stop = job.exclusive;
            started.push(job);
            if stop {
                // Nothing may overlap an exclusive job.
                break;
            }
        }
        drop(state);

        for job in started {
            let queue = Arc::clone(self);
            let exclusive = job.exclusive;
            trace!(exclusive, "job started");
            let task = self.runtime.spawn((job.action)());
            // The slot is freed through the join handle so even a panicking
            // callback cannot wedge the queue.
            self.runtime.spawn(async move {
                if task.await.is_err() {
                    warn!("unit of work panicked");
                }
                queue.complete(exclusive);
            });
        }
    }

    /// Free an in-flight slot and re-drain. Success and failure are
    /// indistinguishable here; the outcome was already settled by the job.
    fn complete(self: &Arc<Self>, exclusive: bool) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if exclusive {
            state.exclusive_running = false;
        }
        trace!(
            exclusive,
            in_flight = state.in_flight,
            pending = state.pending.len(),
            "job completed"
        );
        self.drain(state);
    }
}
