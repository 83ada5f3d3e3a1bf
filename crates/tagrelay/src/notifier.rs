//! Request notifier thread.
//!
//! The progress thread must not run executor code. When the notifier
//! thread is running, wakers of resolved requests are queued here and
//! woken from the notifier thread instead. When it is not running, they
//! are woken inline.
//!
//! ```text
//!  progress tick ──push(waker)──► SegQueue ──► notifier thread: wake()
//!        └────────notify()───────► signal ──┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Waker;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use tagrelay_core::error::{Error, Result};
use tagrelay_core::Notifier;

pub(crate) struct RequestNotifier {
    wakers: SegQueue<Waker>,
    signal: Arc<dyn Notifier>,
    running: AtomicBool,
}

impl RequestNotifier {
    pub(crate) fn new(signal: Arc<dyn Notifier>) -> Self {
        Self {
            wakers: SegQueue::new(),
            signal,
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wake `waker`, through the notifier thread if one is running.
    pub(crate) fn dispatch(&self, waker: Waker) {
        if !self.is_running() {
            waker.wake();
            return;
        }
        self.wakers.push(waker);
        if let Err(e) = self.signal.notify() {
            tracing::warn!(error = %e, "request notifier signal failed");
        }
        // The thread may have stopped between the check and the push.
        if !self.is_running() {
            self.drain();
        }
    }

    /// Wake everything queued. Returns how many were woken.
    pub(crate) fn drain(&self) -> usize {
        let mut n = 0;
        while let Some(w) = self.wakers.pop() {
            w.wake();
            n += 1;
        }
        n
    }
}

/// Handle to a running notifier thread.
pub(crate) struct NotifierThread {
    target: Arc<RequestNotifier>,
    thread: Option<thread::JoinHandle<()>>,
}

impl NotifierThread {
    pub(crate) fn start(target: Arc<RequestNotifier>, name: &str, max_wait: Duration) -> Result<Self> {
        target.running.store(true, Ordering::Release);
        let t = Arc::clone(&target);
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || notifier_loop(t, max_wait));
        let thread = match spawned {
            Ok(h) => h,
            Err(e) => {
                target.running.store(false, Ordering::Release);
                return Err(Error::Resource(format!("failed to spawn notifier thread: {}", e)));
            }
        };
        Ok(Self { target, thread: Some(thread) })
    }

    pub(crate) fn shutdown(&mut self) {
        self.target.running.store(false, Ordering::Release);
        let _ = self.target.signal.notify();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.target.drain();
    }
}

impl Drop for NotifierThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn notifier_loop(target: Arc<RequestNotifier>, max_wait: Duration) {
    tracing::debug!("notifier thread started");
    let mut woken = 0usize;
    while target.is_running() {
        if let Err(e) = target.signal.wait(Some(Instant::now() + max_wait)) {
            tracing::warn!(error = %e, "notifier wait failed");
            thread::sleep(max_wait);
        }
        woken += target.drain();
    }
    woken += target.drain();
    tracing::debug!(woken, "notifier thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::task::Wake;
    use tagrelay_module::CondvarNotifier;

    struct CountingWaker {
        woken: AtomicUsize,
        thread: parking_lot::Mutex<Option<String>>,
    }

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.woken.fetch_add(1, Ordering::SeqCst);
            *self.thread.lock() = thread::current().name().map(str::to_string);
        }
    }

    fn counting() -> (Arc<CountingWaker>, Waker) {
        let c = Arc::new(CountingWaker { woken: AtomicUsize::new(0), thread: parking_lot::Mutex::new(None) });
        let w = Waker::from(Arc::clone(&c));
        (c, w)
    }

    #[test]
    fn test_inline_when_stopped() {
        let n = RequestNotifier::new(Arc::new(CondvarNotifier::new()));
        let (c, w) = counting();
        n.dispatch(w);
        assert_eq!(c.woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_woken_on_notifier_thread() {
        let n = Arc::new(RequestNotifier::new(Arc::new(CondvarNotifier::new())));
        let mut t = NotifierThread::start(Arc::clone(&n), "test-notifier", Duration::from_millis(50)).unwrap();
        let (c, w) = counting();
        n.dispatch(w);

        let deadline = Instant::now() + Duration::from_secs(5);
        while c.woken.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(c.woken.load(Ordering::SeqCst), 1);
        assert_eq!(c.thread.lock().as_deref(), Some("test-notifier"));
        t.shutdown();
        assert!(!n.is_running());
    }
}
