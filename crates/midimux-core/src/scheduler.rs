//! Cancellable deferred work.
//!
//! The only deferred work in the engine is the test-message Note-Off. It is
//! modelled as an explicit scheduled task with a cancellation token tied to
//! track teardown, so a disconnect before the timer fires skips the job
//! instead of racing it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct TaskState {
    cancelled: AtomicBool,
    done: AtomicBool,
}

/// Handle to a scheduled job. Cancelling after the job ran is a no-op.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// True once the job ran (or was skipped due to cancellation).
    pub fn is_done(&self) -> bool {
        self.state.done.load(Ordering::SeqCst)
    }

    fn mark_done(&self) {
        self.state.done.store(true, Ordering::SeqCst);
    }
}

pub trait Scheduler: Send + Sync {
    /// Run `job` after `delay` unless the returned handle is cancelled first.
    fn schedule(&self, delay: Duration, job: Job) -> TaskHandle;
}

/// Production scheduler: one short-lived thread per task.
#[derive(Debug, Default)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> TaskHandle {
        let handle = TaskHandle::new();
        let task = handle.clone();
        thread::Builder::new()
            .name("midimux-timer".to_string())
            .spawn(move || {
                thread::sleep(delay);
                if !task.is_cancelled() {
                    job();
                }
                task.mark_done();
            })
            .expect("failed to spawn timer thread");
        handle
    }
}

/// Deterministic scheduler: jobs queue until [`ManualScheduler::run_pending`]
/// executes the uncancelled ones. Used by tests to assert that a cancelled
/// Note-Off is skipped rather than racing a real timer.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(Duration, TaskHandle, Job)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run all queued, uncancelled jobs in schedule order; returns how many
    /// actually ran.
    pub fn run_pending(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut ran = 0;
        for (_, handle, job) in pending {
            if !handle.is_cancelled() {
                job();
                ran += 1;
            }
            handle.mark_done();
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> TaskHandle {
        let handle = TaskHandle::new();
        self.pending.lock().push((delay, handle.clone(), job));
        handle
    }
}
