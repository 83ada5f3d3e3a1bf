//! Request: handle to one in-flight operation.
//!
//! The progress thread resolves a `RequestSlot` exactly once. The
//! application side observes it through `Request`, either by polling
//! (`is_ready`/`status`), blocking (`wait`/`wait_timeout`) or awaiting.
//!
//! ```text
//!  Pending ──resolve(Ok)──► Ready
//!     │
//!     └────resolve(Err)───► Errored        (terminal states are sticky)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tagrelay_core::error::{Error, Result};
use tagrelay_core::Tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Ready,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    TagSend,
    TagRecv,
    StreamSend,
    StreamRecv,
    Close,
}

/// What a successful request yields: the buffer handed back, and how many
/// of its bytes are meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub buffer: Vec<u8>,
    pub len: usize,
}

impl Completion {
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.len.min(self.buffer.len())]
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

struct SlotState {
    status: RequestStatus,
    outcome: Option<Result<Completion>>,
    waker: Option<Waker>,
}

/// Shared resolution cell between the progress thread and a `Request`.
pub(crate) struct RequestSlot {
    kind: RequestKind,
    tag: Option<Tag>,
    state: Mutex<SlotState>,
    cond: Condvar,
}

impl RequestSlot {
    pub(crate) fn new(kind: RequestKind, tag: Option<Tag>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            tag,
            state: Mutex::new(SlotState { status: RequestStatus::Pending, outcome: None, waker: None }),
            cond: Condvar::new(),
        })
    }

    pub(crate) fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Move to a terminal state. Only the first call has any effect.
    ///
    /// Returns the waker of a pending `poll`, which the caller must wake
    /// (directly or through the notifier thread).
    pub(crate) fn resolve(&self, outcome: Result<Completion>) -> Option<Waker> {
        let mut st = self.state.lock();
        if st.status != RequestStatus::Pending {
            return None;
        }
        st.status = match outcome {
            Ok(_) => RequestStatus::Ready,
            Err(_) => RequestStatus::Errored,
        };
        st.outcome = Some(outcome);
        self.cond.notify_all();
        st.waker.take()
    }
}

/// Handle to one outstanding tagged send/receive, stream operation or close.
pub struct Request {
    slot: Arc<RequestSlot>,
}

impl Request {
    pub(crate) fn new(slot: Arc<RequestSlot>) -> Self {
        Self { slot }
    }

    /// A request that failed before reaching the transport.
    pub(crate) fn failed(kind: RequestKind, tag: Option<Tag>, err: Error) -> Self {
        let slot = RequestSlot::new(kind, tag);
        slot.resolve(Err(err));
        Self { slot }
    }

    pub fn kind(&self) -> RequestKind {
        self.slot.kind
    }

    /// Tag as handed to the transport (after salting). `None` for stream
    /// and close requests.
    pub fn tag(&self) -> Option<Tag> {
        self.slot.tag
    }

    pub fn status(&self) -> RequestStatus {
        self.slot.state.lock().status
    }

    /// Non-blocking: true once the request is terminal, success or error.
    pub fn is_ready(&self) -> bool {
        self.status() != RequestStatus::Pending
    }

    /// Block the calling thread until the request resolves.
    pub fn wait(self) -> Result<Completion> {
        let mut st = self.slot.state.lock();
        while st.status == RequestStatus::Pending {
            self.slot.cond.wait(&mut st);
        }
        take_outcome(&mut st)
    }

    /// Like `wait`, but give up after `timeout` with `Error::Timeout`.
    ///
    /// The operation itself is not cancelled; its buffer stays with the
    /// transport until it completes or the worker is torn down.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Completion> {
        let deadline = Instant::now() + timeout;
        let mut st = self.slot.state.lock();
        while st.status == RequestStatus::Pending {
            if self.slot.cond.wait_until(&mut st, deadline).timed_out()
                && st.status == RequestStatus::Pending
            {
                return Err(Error::Timeout);
            }
        }
        take_outcome(&mut st)
    }
}

fn take_outcome(st: &mut SlotState) -> Result<Completion> {
    match st.outcome.take() {
        Some(out) => out,
        None => panic!("Request polled after completion"),
    }
}

impl Future for Request {
    type Output = Result<Completion>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut st = self.slot.state.lock();
        if let Some(out) = st.outcome.take() {
            return Poll::Ready(out);
        }
        if st.status != RequestStatus::Pending {
            panic!("Request polled after completion");
        }
        match &st.waker {
            Some(w) if w.will_wake(cx.waker()) => {}
            _ => st.waker = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("kind", &self.slot.kind)
            .field("tag", &self.slot.tag)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ok(n: usize) -> Result<Completion> {
        Ok(Completion { buffer: vec![7; n], len: n })
    }

    #[test]
    fn test_single_resolution() {
        let slot = RequestSlot::new(RequestKind::TagRecv, Some(Tag(1)));
        let req = Request::new(Arc::clone(&slot));
        assert_eq!(req.status(), RequestStatus::Pending);
        assert!(!req.is_ready());

        slot.resolve(ok(3));
        slot.resolve(Err(Error::Timeout));
        assert_eq!(req.status(), RequestStatus::Ready);
        assert_eq!(req.status(), RequestStatus::Ready);
        assert_eq!(req.wait().unwrap().data(), &[7, 7, 7]);
    }

    #[test]
    fn test_failed_is_errored() {
        let req = Request::failed(RequestKind::TagSend, None, Error::EndpointClosed);
        assert!(req.is_ready());
        assert_eq!(req.status(), RequestStatus::Errored);
        assert_eq!(req.wait(), Err(Error::EndpointClosed));
    }

    #[test]
    fn test_wait_across_threads() {
        let slot = RequestSlot::new(RequestKind::TagSend, None);
        let req = Request::new(Arc::clone(&slot));
        let h = thread::spawn(move || req.wait());
        thread::sleep(Duration::from_millis(20));
        slot.resolve(ok(1));
        assert_eq!(h.join().unwrap().unwrap().len, 1);
    }

    #[test]
    fn test_wait_timeout() {
        let slot = RequestSlot::new(RequestKind::TagRecv, None);
        let req = Request::new(Arc::clone(&slot));
        let start = Instant::now();
        assert_eq!(req.wait_timeout(Duration::from_millis(30)), Err(Error::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(25));
        // A late resolution after abandonment is harmless.
        assert!(slot.resolve(ok(1)).is_none());
    }

    #[test]
    fn test_wait_timeout_leaves_slot_pending() {
        let slot = RequestSlot::new(RequestKind::TagRecv, Some(Tag(4)));
        let req = Request::new(Arc::clone(&slot));
        assert_eq!(req.wait_timeout(Duration::from_millis(10)), Err(Error::Timeout));

        // The operation is still live: a second handle sees it pending and
        // then sees the transport's eventual outcome.
        let again = Request::new(Arc::clone(&slot));
        assert_eq!(again.status(), RequestStatus::Pending);
        slot.resolve(ok(4));
        assert_eq!(again.status(), RequestStatus::Ready);
        assert_eq!(again.wait().unwrap().data(), &[7, 7, 7, 7]);
    }

    #[tokio::test]
    async fn test_await_resolved_elsewhere() {
        let slot = RequestSlot::new(RequestKind::TagRecv, None);
        let req = Request::new(Arc::clone(&slot));
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            if let Some(w) = slot.resolve(ok(2)) {
                w.wake();
            }
        });
        let c = tokio::time::timeout(Duration::from_secs(5), req).await.unwrap().unwrap();
        assert_eq!(c.len, 2);
        h.join().unwrap();
    }

    #[tokio::test]
    async fn test_await_already_terminal() {
        let req = Request::failed(RequestKind::Close, None, Error::WorkerClosed);
        assert_eq!(req.await, Err(Error::WorkerClosed));
    }
}
