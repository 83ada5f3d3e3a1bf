//! Progress driver.
//!
//! One dedicated thread per worker. Loop:
//! 1. `drive_once()`: drain submissions, advance the transport, resolve
//!    requests, run listener callbacks.
//! 2. If that did nothing, `wait_for_activity()` until the idle deadline.
//!
//! A final `drive_once()` after shutdown flushes anything submitted while
//! the flag was being raised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tagrelay_core::error::{Error, Result};
use tagrelay_core::Notifier;

/// Something a progress thread can drive.
pub trait Progress: Send + Sync + 'static {
    /// One tick. Returns true if any work was done.
    fn drive_once(&self) -> bool;

    /// Block until activity is signalled or `deadline` passes.
    fn wait_for_activity(&self, deadline: Option<Instant>) -> bool;
}

/// Handle to a running progress thread.
pub(crate) struct ProgressThread {
    shutdown: Arc<AtomicBool>,
    wake: Arc<dyn Notifier>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ProgressThread {
    /// `wake` must be the notifier `target` waits on, so shutdown can
    /// interrupt an idle wait.
    pub(crate) fn start<P: Progress>(
        target: Arc<P>,
        wake: Arc<dyn Notifier>,
        name: &str,
        idle_wait: Duration,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || progress_loop(target, &flag, idle_wait))
            .map_err(|e| Error::Resource(format!("failed to spawn progress thread: {}", e)))?;
        Ok(Self { shutdown, wake, thread: Some(thread) })
    }

    pub(crate) fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.wake.notify();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn progress_loop<P: Progress>(target: Arc<P>, shutdown: &AtomicBool, idle_wait: Duration) {
    tracing::debug!(idle_us = idle_wait.as_micros() as u64, "progress thread started");
    let mut ticks = 0u64;
    let mut idle = 0u64;

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        ticks += 1;
        if target.drive_once() {
            continue;
        }

        idle += 1;
        target.wait_for_activity(Some(Instant::now() + idle_wait));
    }

    // Final drain
    target.drive_once();
    tracing::debug!(ticks, idle, "progress thread stopped");
}
