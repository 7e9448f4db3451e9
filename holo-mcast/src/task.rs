//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::time::Duration;

use tokio::task;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;

/// Handle of a task created by [`Task::spawn`].
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
}

/// Handle of a periodic task created by [`IntervalTask::new`].
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct IntervalTask {
    _task: Task<()>,
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
        }
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Spawns a new task that calls the provided async closure once the
    /// initial delay expires, and then on every interval tick.
    ///
    /// A run that outlasts the interval delays the following ticks instead
    /// of triggering a burst of runs.
    pub fn new<F, Fut>(
        initial_delay: Duration,
        interval: Duration,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let task = Task::spawn(
            async move {
                let start = Instant::now() + initial_delay;
                let mut ticker = time::interval_at(start, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    ticker.tick().await;
                    (cb)().await;
                }
            }
            .in_current_span(),
        );

        IntervalTask { _task: task }
    }
}
