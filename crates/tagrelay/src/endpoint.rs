//! Endpoint: one logical connection.
//!
//! Lifecycle: open → closing (after `close()` or drop) → closed (close
//! completed, or worker torn down). Once closing, every new operation
//! fails immediately with `Error::EndpointClosed`.
//!
//! Endpoints accepted through a listener (and their dialers) share a salt.
//! Unless `force_tag` is set, tags are folded with that salt so that
//! independent connections on one worker get independent tag spaces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tagrelay_core::error::Error;
use tagrelay_core::transport::EpHandle;
use tagrelay_core::{Tag, WorkerAddress};

use crate::request::{Request, RequestKind};
use crate::worker::{OpAction, WorkerShared};

pub(crate) struct EndpointShared {
    handle: EpHandle,
    worker: Weak<WorkerShared>,
    error_handling: bool,
    salt: Option<u64>,
    remote: Option<WorkerAddress>,
    alive: AtomicBool,
    failed: AtomicBool,
    peer_closed: AtomicBool,
    closing: AtomicBool,
}

impl EndpointShared {
    pub(crate) fn new(
        handle: EpHandle,
        worker: Weak<WorkerShared>,
        error_handling: bool,
        salt: Option<u64>,
        remote: Option<WorkerAddress>,
    ) -> Self {
        Self {
            handle,
            worker,
            error_handling,
            salt,
            remote,
            alive: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            peer_closed: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        }
    }

    pub(crate) fn handle(&self) -> EpHandle {
        self.handle
    }

    pub(crate) fn error_handling(&self) -> bool {
        self.error_handling
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn peer_closed(&self) -> bool {
        self.peer_closed.load(Ordering::Acquire)
    }

    /// The remote side closed gracefully. Returns true the first time only.
    pub(crate) fn mark_peer_closed(&self) -> bool {
        self.mark_dead();
        !self.peer_closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Returns true the first time only.
    pub(crate) fn mark_failed(&self) -> bool {
        self.mark_dead();
        !self.failed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_closed(&self) {
        self.closing.store(true, Ordering::Release);
        self.mark_dead();
    }

    fn effective_tag(&self, tag: Tag, force_tag: bool) -> Tag {
        match self.salt {
            Some(salt) if !force_tag => tag.salted(salt),
            _ => tag,
        }
    }

    fn submit(&self, kind: RequestKind, tag: Option<Tag>, action: impl FnOnce(EpHandle) -> OpAction) -> Request {
        if self.is_closing() {
            return Request::failed(kind, tag, Error::EndpointClosed);
        }
        match self.worker.upgrade() {
            Some(w) => w.submit(kind, tag, action(self.handle)),
            None => Request::failed(kind, tag, Error::WorkerClosed),
        }
    }

    fn begin_close(&self) -> Option<Request> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return None;
        }
        let req = match self.worker.upgrade() {
            Some(w) => w.submit(RequestKind::Close, None, OpAction::CloseEndpoint { ep: self.handle }),
            None => Request::failed(RequestKind::Close, None, Error::WorkerClosed),
        };
        Some(req)
    }
}

/// One logical connection on a `Worker`.
pub struct Endpoint {
    shared: Arc<EndpointShared>,
}

impl Endpoint {
    pub(crate) fn from_shared(shared: Arc<EndpointShared>) -> Self {
        Self { shared }
    }

    /// Send `buffer` with `tag`. The buffer comes back in the `Completion`.
    pub fn tag_send(&self, buffer: Vec<u8>, tag: Tag, force_tag: bool) -> Request {
        let tag = self.shared.effective_tag(tag, force_tag);
        self.shared.submit(RequestKind::TagSend, Some(tag), |ep| OpAction::TagSend {
            ep: Some(ep),
            tag,
            data: buffer,
        })
    }

    /// Receive the next message with `tag` into `buffer`.
    ///
    /// Matching happens on the worker: a message with the same effective
    /// tag from any peer satisfies it.
    pub fn tag_recv(&self, buffer: Vec<u8>, tag: Tag, force_tag: bool) -> Request {
        let tag = self.shared.effective_tag(tag, force_tag);
        self.shared.submit(RequestKind::TagRecv, Some(tag), |ep| OpAction::TagRecv {
            ep: Some(ep),
            tag,
            buffer,
        })
    }

    /// Append `buffer` to the connection's byte stream.
    pub fn stream_send(&self, buffer: Vec<u8>) -> Request {
        self.shared.submit(RequestKind::StreamSend, None, |ep| OpAction::StreamSend { ep, data: buffer })
    }

    /// Fill all of `buffer` from the connection's byte stream.
    pub fn stream_recv(&self, buffer: Vec<u8>) -> Request {
        self.shared.submit(RequestKind::StreamRecv, None, |ep| OpAction::StreamRecv { ep, buffer })
    }

    /// Graceful close. Pending receives on this endpoint fail with
    /// `Error::EndpointClosed`; calling `close()` twice fails the second
    /// request the same way.
    pub fn close(&self) -> Request {
        match self.shared.begin_close() {
            Some(req) => req,
            None => Request::failed(RequestKind::Close, None, Error::EndpointClosed),
        }
    }

    /// Peer reachable as far as the last completion knows, and not closed.
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire) && !self.shared.is_closing()
    }

    pub fn error_handling_enabled(&self) -> bool {
        self.shared.error_handling
    }

    /// Address of the remote worker, when known.
    pub fn remote_address(&self) -> Option<&WorkerAddress> {
        self.shared.remote.as_ref()
    }

    /// True if tags on this endpoint are folded with a connection salt.
    pub fn is_salted(&self) -> bool {
        self.shared.salt.is_some()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        // Fire-and-forget close; nobody waits for the request.
        let _ = self.shared.begin_close();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("handle", &self.shared.handle.0)
            .field("alive", &self.is_alive())
            .field("error_handling", &self.shared.error_handling)
            .finish()
    }
}
