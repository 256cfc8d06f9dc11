//! Idempotent wrapper around the periodic scheduler task.
//!
//! Start and stop both report whether they changed anything, so calling
//! either twice is harmless. Dropping the wrapper tears the task down.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::debug;

struct RunningTask {
    shutdown: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

/// Owns at most one running periodic task.
pub(crate) struct EventLoop {
    task: Mutex<Option<RunningTask>>,
}

impl EventLoop {
    pub(crate) fn new() -> Self {
        Self { task: Mutex::new(None) }
    }

    /// Spawns the periodic task. Returns `false` when one is already
    /// running. Must be called within a tokio runtime.
    pub(crate) fn start<F>(&self, period: Duration, tick: F) -> bool
    where
        F: Fn() + Send + 'static,
    {
        let mut slot = self.task.lock();
        if slot.is_some() {
            return false;
        }

        let (shutdown, mut shutdown_rx) = broadcast::channel(1);
        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => tick(),
                    _ = shutdown_rx.recv() => {
                        debug!("event loop shutting down");
                        break;
                    }
                }
            }
        });

        *slot = Some(RunningTask { shutdown, join });
        true
    }

    /// Stops the running task. Returns `false` when none is running.
    pub(crate) fn stop(&self) -> bool {
        let Some(task) = self.task.lock().take() else {
            return false;
        };
        // The signal lets an in-progress tick finish; abort covers the case
        // where the runtime already dropped the receiver.
        let _ = task.shutdown.send(());
        task.join.abort();
        true
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            let _ = task.shutdown.send(());
            task.join.abort();
        }
    }
}
