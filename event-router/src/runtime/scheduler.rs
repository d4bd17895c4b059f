//! Deferred work on an explicitly owned tokio runtime handle.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::{AbortHandle, JoinHandle};

/// Schedules timers and background tasks for one router instance.
///
/// Each router, link and filter receives the scheduler it should use instead
/// of reaching for a process-wide one, so independent routers (and tests) do
/// not share timer state.
#[derive(Clone, Debug)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// A scheduler on the runtime driving the caller.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }

    /// Runs `task` once after `delay` unless cancelled first.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> ScheduledTask
    where
        F: FnOnce() + Send + 'static,
    {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });

        ScheduledTask {
            abort: join.abort_handle(),
        }
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

/// Handle to a pending [`Scheduler::schedule`] call. Dropping it leaves the
/// timer armed.
#[derive(Debug)]
pub struct ScheduledTask {
    abort: AbortHandle,
}

impl ScheduledTask {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}
