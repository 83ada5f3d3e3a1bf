//! # Worker: owner of one transport worker
//!
//! A `Worker` exclusively owns a `TransportWorker`. All transport mutation
//! happens under `WorkerShared::core`, which the progress tick holds for its
//! whole duration. Application threads never touch the transport for data
//! operations: they push a `Submission` onto a lock-free queue and signal
//! the activity notifier.
//!
//! ```text
//!  app thread                          progress tick (core locked)
//!  ──────────                          ───────────────────────────
//!  Endpoint::tag_send ─► SegQueue ───► 1. submissions → transport
//!                        notify() ───► 2. transport.progress()
//!                                      3. poll_events → resolve slots,
//!                                         listener callbacks, peer loss
//!                                      4. (unlocked) dispatch wakers
//! ```
//!
//! Peer loss on an endpoint with error handling fails that endpoint's
//! requests with `Error::Connection`. Without error handling the whole
//! worker is poisoned: every in-flight request fails with
//! `Error::WorkerPoisoned`, later operations fail the same way, and
//! `check_fatal()` reports the cause. A graceful close by the peer fails
//! the endpoint's requests with `Error::Connection` in either mode and
//! never poisons.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::task::Waker;
use std::time::Instant;

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use tagrelay_core::error::{Error, Result};
use tagrelay_core::transport::{
    EndpointInfo, EpHandle, ListenerHandle, OpId, TransportContext, TransportEvent, TransportStatus,
    TransportWorker,
};
use tagrelay_core::{Notifier, Tag, WorkerAddress};

use crate::config::{EndpointOptions, WorkerConfig};
use crate::endpoint::{Endpoint, EndpointShared};
use crate::listener::{ConnectionRequest, Listener, ListenerCallback};
use crate::notifier::{NotifierThread, RequestNotifier};
use crate::progress::{Progress, ProgressThread};
use crate::request::{Completion, Request, RequestKind, RequestSlot};

/// A data operation waiting to be handed to the transport.
pub(crate) enum OpAction {
    TagSend { ep: Option<EpHandle>, tag: Tag, data: Vec<u8> },
    TagRecv { ep: Option<EpHandle>, tag: Tag, buffer: Vec<u8> },
    StreamSend { ep: EpHandle, data: Vec<u8> },
    StreamRecv { ep: EpHandle, buffer: Vec<u8> },
    CloseEndpoint { ep: EpHandle },
}

impl OpAction {
    fn ep(&self) -> Option<EpHandle> {
        match self {
            Self::TagSend { ep, .. } | Self::TagRecv { ep, .. } => *ep,
            Self::StreamSend { ep, .. } | Self::StreamRecv { ep, .. } | Self::CloseEndpoint { ep } => {
                Some(*ep)
            }
        }
    }
}

pub(crate) enum Submission {
    Op { op: OpId, slot: Arc<RequestSlot>, action: OpAction },
    CloseListener(ListenerHandle),
}

struct Inflight {
    slot: Arc<RequestSlot>,
    ep: Option<EpHandle>,
}

/// Everything guarded by the core lock.
pub(crate) struct WorkerCore {
    transport: Option<Box<dyn TransportWorker>>,
    inflight: HashMap<OpId, Inflight>,
    endpoints: HashMap<EpHandle, Arc<EndpointShared>>,
    /// `None` while the callback is running.
    listeners: HashMap<ListenerHandle, Option<ListenerCallback>>,
    events: Vec<TransportEvent>,
}

impl WorkerCore {
    pub(crate) fn transport_mut(&mut self) -> Result<&mut (dyn TransportWorker + 'static)> {
        self.transport.as_deref_mut().ok_or(Error::WorkerClosed)
    }

    pub(crate) fn register_endpoint(
        &mut self,
        worker: &Weak<WorkerShared>,
        info: EndpointInfo,
        error_handling: bool,
        remote: Option<WorkerAddress>,
    ) -> Endpoint {
        let shared = Arc::new(EndpointShared::new(info.handle, worker.clone(), error_handling, info.salt, remote));
        self.endpoints.insert(info.handle, Arc::clone(&shared));
        tracing::debug!(
            ep = info.handle.0,
            salted = info.salt.is_some(),
            error_handling,
            "endpoint created"
        );
        Endpoint::from_shared(shared)
    }

    /// Fail every in-flight request matching `filter`.
    fn fail_inflight<F>(&mut self, err: &Error, wakers: &mut Vec<Waker>, mut filter: F) -> usize
    where
        F: FnMut(&Inflight) -> bool,
    {
        let ops: Vec<OpId> = self.inflight.iter().filter(|(_, i)| filter(i)).map(|(op, _)| *op).collect();
        for op in &ops {
            if let Some(i) = self.inflight.remove(op) {
                wakers.extend(i.slot.resolve(Err(err.clone())));
            }
        }
        ops.len()
    }
}

pub(crate) struct WorkerShared {
    me: Weak<WorkerShared>,
    core: Mutex<WorkerCore>,
    submissions: SegQueue<Submission>,
    activity: Arc<dyn Notifier>,
    requests: Arc<RequestNotifier>,
    address: WorkerAddress,
    fatal: OnceLock<Error>,
    closed: AtomicBool,
    next_op: AtomicU64,
    config: WorkerConfig,
}

impl WorkerShared {
    fn next_op(&self) -> OpId {
        OpId(self.next_op.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn check_usable(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::WorkerClosed);
        }
        if let Some(fatal) = self.fatal.get() {
            return Err(Error::WorkerPoisoned(fatal.to_string()));
        }
        Ok(())
    }

    fn wake(&self) {
        if let Err(e) = self.activity.notify() {
            tracing::warn!(error = %e, "activity notify failed");
        }
    }

    /// Queue a data operation for the next progress tick.
    pub(crate) fn submit(&self, kind: RequestKind, tag: Option<Tag>, action: OpAction) -> Request {
        if let Err(e) = self.check_usable() {
            return Request::failed(kind, tag, e);
        }
        let op = self.next_op();
        let slot = RequestSlot::new(kind, tag);
        tracing::trace!(op = op.0, ?kind, ?tag, "submit");
        self.submissions.push(Submission::Op { op, slot: Arc::clone(&slot), action });

        // Teardown may have drained the queue between the check and the push.
        if self.closed.load(Ordering::Acquire) {
            self.fail_submissions(&Error::WorkerClosed);
        } else {
            self.wake();
        }
        Request::new(slot)
    }

    pub(crate) fn submit_close_listener(&self, listener: ListenerHandle) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.submissions.push(Submission::CloseListener(listener));
        self.wake();
    }

    fn fail_submissions(&self, err: &Error) {
        while let Some(sub) = self.submissions.pop() {
            if let Submission::Op { slot, .. } = sub {
                if let Some(w) = slot.resolve(Err(err.clone())) {
                    self.requests.dispatch(w);
                }
            }
        }
    }

    fn poison(&self, core: &mut WorkerCore, ep: EpHandle, wakers: &mut Vec<Waker>) {
        if self.fatal.set(Error::PeerUnreachable).is_err() {
            return;
        }
        let reason = format!("peer unreachable on endpoint {}", ep.0);
        tracing::warn!(ep = ep.0, "peer lost on endpoint without error handling, worker poisoned");
        let n = core.fail_inflight(&Error::WorkerPoisoned(reason), wakers, |_| true);
        tracing::debug!(failed = n, "in-flight requests failed by poisoning");
    }

    /// One progress tick. See module docs.
    fn tick(&self) -> bool {
        let mut wakers = Vec::new();
        let did_work = {
            let mut core = self.core.lock();
            if core.transport.is_none() {
                return false;
            }
            self.tick_locked(&mut core, &mut wakers)
        };
        for w in wakers {
            self.requests.dispatch(w);
        }
        did_work
    }

    fn tick_locked(&self, core: &mut WorkerCore, wakers: &mut Vec<Waker>) -> bool {
        let mut did_work = false;

        // ── Step 1: submissions → transport ──
        for _ in 0..self.config.max_batch {
            let Some(sub) = self.submissions.pop() else {
                break;
            };
            did_work = true;
            self.apply(core, sub, wakers);
        }

        // ── Step 2: advance the transport ──
        let mut events = std::mem::take(&mut core.events);
        if let Some(t) = core.transport.as_deref_mut() {
            t.progress();
            t.poll_events(&mut events, self.config.max_events);
        }

        // ── Step 3: handle events ──
        if !events.is_empty() {
            did_work = true;
        }
        for ev in events.drain(..) {
            self.handle_event(core, ev, wakers);
        }
        core.events = events;

        did_work
    }

    fn apply(&self, core: &mut WorkerCore, sub: Submission, wakers: &mut Vec<Waker>) {
        let (op, slot, action) = match sub {
            Submission::Op { op, slot, action } => (op, slot, action),
            Submission::CloseListener(listener) => {
                core.listeners.remove(&listener);
                if let Ok(t) = core.transport_mut() {
                    t.close_listener(listener);
                }
                tracing::debug!(listener = listener.0, "listener closed");
                return;
            }
        };

        if let Some(fatal) = self.fatal.get() {
            wakers.extend(slot.resolve(Err(Error::WorkerPoisoned(fatal.to_string()))));
            return;
        }
        let Some(t) = core.transport.as_deref_mut() else {
            wakers.extend(slot.resolve(Err(Error::WorkerClosed)));
            return;
        };

        core.inflight.insert(op, Inflight { slot, ep: action.ep() });
        match action {
            OpAction::TagSend { ep, tag, data } => t.tag_send(op, ep, tag, data),
            OpAction::TagRecv { ep, tag, buffer } => t.tag_recv(op, ep, tag, buffer),
            OpAction::StreamSend { ep, data } => t.stream_send(op, ep, data),
            OpAction::StreamRecv { ep, buffer } => t.stream_recv(op, ep, buffer),
            OpAction::CloseEndpoint { ep } => t.close_endpoint(op, ep),
        }
    }

    fn handle_event(&self, core: &mut WorkerCore, ev: TransportEvent, wakers: &mut Vec<Waker>) {
        match ev {
            TransportEvent::Completed { op, buffer, result } => {
                let Some(inflight) = core.inflight.remove(&op) else {
                    // Abandoned by poisoning or peer loss.
                    return;
                };
                let endpoint = inflight.ep.and_then(|ep| core.endpoints.get(&ep).cloned());
                if inflight.slot.kind() == RequestKind::Close {
                    if let Some(ep) = inflight.ep {
                        if let Some(e) = core.endpoints.remove(&ep) {
                            e.mark_dead();
                        }
                    }
                }
                let outcome = match result {
                    Ok(len) => Ok(Completion { buffer, len }),
                    // Already gone from the transport after a peer failure.
                    Err(TransportStatus::InvalidHandle) if inflight.slot.kind() == RequestKind::Close => {
                        Ok(Completion { buffer, len: 0 })
                    }
                    Err(status) => Err(map_status(status, endpoint.as_deref())),
                };
                wakers.extend(inflight.slot.resolve(outcome));
            }
            TransportEvent::ConnectionRequest { listener, conn, peer } => {
                let cb = core.listeners.get_mut(&listener).and_then(Option::take);
                let Some(mut cb) = cb else {
                    tracing::debug!(listener = listener.0, "connection request for unknown listener, rejecting");
                    if let Ok(t) = core.transport_mut() {
                        t.reject(conn);
                    }
                    return;
                };
                tracing::debug!(listener = listener.0, peer = %peer, "connection request");
                cb(ConnectionRequest::new(core, &self.me, conn, peer, self.config.error_handling));
                if let Some(slot) = core.listeners.get_mut(&listener) {
                    *slot = Some(cb);
                }
            }
            TransportEvent::PeerFailure { ep } => {
                let Some(endpoint) = core.endpoints.get(&ep).cloned() else {
                    return;
                };
                if !endpoint.mark_failed() {
                    return;
                }
                if endpoint.error_handling() {
                    let err = Error::Connection(format!("peer failure on endpoint {}", ep.0));
                    let n = core.fail_inflight(&err, wakers, |i| i.ep == Some(ep));
                    tracing::debug!(ep = ep.0, failed = n, "peer failure");
                    // Cancel whatever the transport still holds for this endpoint.
                    let cleanup = self.next_op();
                    if let Ok(t) = core.transport_mut() {
                        t.close_endpoint(cleanup, ep);
                    }
                } else {
                    self.poison(core, ep, wakers);
                }
            }
            TransportEvent::PeerClosed { ep } => {
                let Some(endpoint) = core.endpoints.get(&ep).cloned() else {
                    return;
                };
                if !endpoint.mark_peer_closed() {
                    return;
                }
                // A graceful close never poisons, whatever the mode.
                let err = if endpoint.is_closing() {
                    Error::EndpointClosed
                } else {
                    Error::Connection(format!("peer closed endpoint {}", ep.0))
                };
                let n = core.fail_inflight(&err, wakers, |i| {
                    i.ep == Some(ep) && i.slot.kind() != RequestKind::Close
                });
                tracing::debug!(ep = ep.0, failed = n, "peer closed");
                let cleanup = self.next_op();
                if let Ok(t) = core.transport_mut() {
                    t.close_endpoint(cleanup, ep);
                }
            }
        }
    }

    /// Tear everything down. Idempotent.
    fn teardown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut wakers = Vec::new();
        let transport = {
            let mut core = self.core.lock();
            while let Some(sub) = self.submissions.pop() {
                if let Submission::Op { slot, .. } = sub {
                    wakers.extend(slot.resolve(Err(Error::WorkerClosed)));
                }
            }
            let n = core.fail_inflight(&Error::WorkerClosed, &mut wakers, |_| true);
            for (_, e) in core.endpoints.drain() {
                e.mark_closed();
            }
            core.listeners.clear();
            tracing::debug!(failed = n, "worker teardown");
            core.transport.take()
        };
        for w in wakers {
            self.requests.dispatch(w);
        }
        // Dropping the transport notifies peers; do it outside the lock.
        drop(transport);
    }
}

/// Map a transport failure status to the caller-visible error.
fn map_status(status: TransportStatus, endpoint: Option<&EndpointShared>) -> Error {
    if let Some(e) = endpoint {
        if e.has_failed() && e.error_handling() && !e.is_closing() {
            return Error::Connection(format!("peer failure on endpoint {}", e.handle().0));
        }
        if e.peer_closed() && !e.is_closing() {
            return Error::Connection(format!("peer closed endpoint {}", e.handle().0));
        }
    }
    match status {
        TransportStatus::Canceled if endpoint.map_or(true, |e| e.is_closing()) => Error::EndpointClosed,
        TransportStatus::PeerUnreachable => match endpoint {
            Some(e) if e.error_handling() => Error::Connection("peer unreachable".into()),
            _ => Error::PeerUnreachable,
        },
        other => Error::Transport(other),
    }
}

impl Progress for WorkerShared {
    fn drive_once(&self) -> bool {
        self.tick()
    }

    fn wait_for_activity(&self, deadline: Option<Instant>) -> bool {
        match self.activity.wait(deadline) {
            Ok(woke) => woke,
            Err(e) => {
                tracing::warn!(error = %e, "activity wait failed");
                false
            }
        }
    }
}

/// One transport worker plus its progress and notifier threads.
pub struct Worker {
    shared: Arc<WorkerShared>,
    progress: Mutex<Option<ProgressThread>>,
    notifier: Mutex<Option<NotifierThread>>,
}

impl Worker {
    /// Create a worker on `context` with configuration from the environment.
    pub fn create(context: &dyn TransportContext) -> Result<Self> {
        Self::with_config(context, WorkerConfig::from_env())
    }

    pub fn with_config(context: &dyn TransportContext, config: WorkerConfig) -> Result<Self> {
        config.validate()?;
        let activity = tagrelay_module::new_notifier();
        let transport = context.create_worker(Arc::clone(&activity))?;
        let address = transport.address().clone();
        let requests = Arc::new(RequestNotifier::new(tagrelay_module::new_notifier()));

        let shared = Arc::new_cyclic(|me| WorkerShared {
            me: me.clone(),
            core: Mutex::new(WorkerCore {
                transport: Some(transport),
                inflight: HashMap::new(),
                endpoints: HashMap::new(),
                listeners: HashMap::new(),
                events: Vec::with_capacity(config.max_events),
            }),
            submissions: SegQueue::new(),
            activity,
            requests,
            address,
            fatal: OnceLock::new(),
            closed: AtomicBool::new(false),
            next_op: AtomicU64::new(1),
            config,
        });
        tracing::debug!(transport = context.name(), address = %shared.address, "worker created");

        Ok(Self {
            shared,
            progress: Mutex::new(None),
            notifier: Mutex::new(None),
        })
    }

    /// This worker's address. Cached at creation.
    pub fn address(&self) -> &WorkerAddress {
        &self.shared.address
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.shared.config
    }

    /// Start the progress thread. No-op if already running.
    pub fn start_progress(&self) -> Result<()> {
        self.shared.check_usable()?;
        let mut slot = self.progress.lock();
        if slot.is_none() {
            *slot = Some(ProgressThread::start(
                Arc::clone(&self.shared),
                Arc::clone(&self.shared.activity),
                &self.shared.config.progress_thread_name,
                self.shared.config.idle_wait,
            )?);
        }
        Ok(())
    }

    /// Stop the progress thread. No-op if not running.
    pub fn stop_progress(&self) {
        if let Some(mut t) = self.progress.lock().take() {
            t.shutdown();
        }
    }

    pub fn is_progress_running(&self) -> bool {
        self.progress.lock().is_some()
    }

    /// Start the request notifier thread. No-op if already running.
    pub fn start_notifier(&self) -> Result<()> {
        self.shared.check_usable()?;
        let mut slot = self.notifier.lock();
        if slot.is_none() {
            *slot = Some(NotifierThread::start(
                Arc::clone(&self.shared.requests),
                &self.shared.config.notifier_thread_name,
                self.shared.config.notifier_wait,
            )?);
        }
        Ok(())
    }

    /// Stop the request notifier thread. Queued wakers are woken first.
    pub fn stop_notifier(&self) {
        if let Some(mut t) = self.notifier.lock().take() {
            t.shutdown();
        }
    }

    pub fn is_notifier_running(&self) -> bool {
        self.shared.requests.is_running()
    }

    /// One manual progress tick. Returns true if any work was done.
    pub fn progress(&self) -> bool {
        self.shared.tick()
    }

    /// Dial a listener at `addr`. Options left unset take this worker's
    /// config.
    pub fn create_endpoint(&self, addr: SocketAddr, opts: EndpointOptions) -> Result<Endpoint> {
        self.shared.check_usable()?;
        let error_handling = opts.resolve_error_handling(self.shared.config.error_handling);
        let mut core = self.shared.core.lock();
        let info = core.transport_mut()?.connect(addr)?;
        Ok(core.register_endpoint(&self.shared.me, info, error_handling, None))
    }

    /// Dial a worker directly by its address. Options left unset take this
    /// worker's config.
    pub fn create_endpoint_from_worker_address(
        &self,
        addr: &WorkerAddress,
        opts: EndpointOptions,
    ) -> Result<Endpoint> {
        self.shared.check_usable()?;
        if addr.is_empty() {
            return Err(Error::Connection("empty worker address".into()));
        }
        let error_handling = opts.resolve_error_handling(self.shared.config.error_handling);
        let mut core = self.shared.core.lock();
        let info = core.transport_mut()?.connect_to_worker(addr)?;
        Ok(core.register_endpoint(&self.shared.me, info, error_handling, Some(addr.clone())))
    }

    /// Bind a listener on `port` (0 = ephemeral).
    ///
    /// `callback` runs on the progress thread, inside the tick. It may
    /// accept the request and issue operations on the new endpoint, but
    /// must not call back into this `Worker`'s endpoint/listener creation.
    pub fn create_listener<F>(&self, port: u16, callback: F) -> Result<Listener>
    where
        F: FnMut(ConnectionRequest<'_>) + Send + 'static,
    {
        self.shared.check_usable()?;
        let mut core = self.shared.core.lock();
        let (handle, addr) = core.transport_mut()?.listen(port)?;
        core.listeners.insert(handle, Some(Box::new(callback)));
        tracing::debug!(listener = handle.0, %addr, "listener bound");
        Ok(Listener::new(handle, addr, self.shared.me.clone()))
    }

    /// Worker-level send: delivered to this worker itself.
    pub fn tag_send(&self, buffer: Vec<u8>, tag: Tag) -> Request {
        self.shared.submit(RequestKind::TagSend, Some(tag), OpAction::TagSend { ep: None, tag, data: buffer })
    }

    /// Worker-level receive: matches any message to this worker with `tag`.
    pub fn tag_recv(&self, buffer: Vec<u8>, tag: Tag) -> Request {
        self.shared.submit(RequestKind::TagRecv, Some(tag), OpAction::TagRecv { ep: None, tag, buffer })
    }

    /// `Err` with the fatal cause if an endpoint without error handling
    /// lost its peer.
    pub fn check_fatal(&self) -> Result<()> {
        match self.shared.fatal.get() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop both threads, fail everything in flight with
    /// `Error::WorkerClosed` and release the transport.
    pub fn close(&self) {
        self.stop_progress();
        self.stop_notifier();
        self.shared.teardown();
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("address", &self.shared.address)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tagrelay_module::LoopbackFabric;

    fn worker(fabric: &LoopbackFabric) -> Worker {
        Worker::with_config(fabric, WorkerConfig::new()).unwrap()
    }

    fn spin(worker: &Worker, req: &Request) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !req.is_ready() {
            assert!(Instant::now() < deadline, "request never resolved");
            worker.progress();
        }
    }

    #[test]
    fn test_address_is_cached() {
        let fabric = LoopbackFabric::new();
        let w = worker(&fabric);
        let a = w.address().as_bytes().as_ptr();
        assert_eq!(w.address().as_bytes().as_ptr(), a);
        assert!(!w.address().is_empty());
    }

    #[test]
    fn test_manual_progress_self_send() {
        let fabric = LoopbackFabric::new();
        let w = worker(&fabric);

        let recv = w.tag_recv(vec![0; 4], Tag(9));
        let send = w.tag_send(vec![1, 2, 3, 4], Tag(9));
        assert!(!recv.is_ready());

        spin(&w, &recv);
        spin(&w, &send);
        assert_eq!(recv.wait().unwrap().data(), &[1, 2, 3, 4]);
        assert_eq!(send.wait().unwrap().len, 4);
    }

    #[test]
    fn test_nothing_resolves_without_progress() {
        let fabric = LoopbackFabric::new();
        let w = worker(&fabric);
        let send = w.tag_send(vec![1], Tag(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!send.is_ready());
        w.progress();
        assert!(send.is_ready());
    }

    #[test]
    fn test_start_stop_idempotent() {
        let fabric = LoopbackFabric::new();
        let w = worker(&fabric);
        w.start_progress().unwrap();
        w.start_progress().unwrap();
        assert!(w.is_progress_running());
        w.start_notifier().unwrap();
        w.start_notifier().unwrap();
        assert!(w.is_notifier_running());
        w.stop_notifier();
        w.stop_notifier();
        w.stop_progress();
        w.stop_progress();
        assert!(!w.is_progress_running());
        assert!(!w.is_notifier_running());
    }

    #[test]
    fn test_closed_worker_rejects_operations() {
        let fabric = LoopbackFabric::new();
        let w = worker(&fabric);
        w.close();
        w.close();
        assert!(w.is_closed());
        assert_eq!(w.tag_send(vec![1], Tag(1)).wait(), Err(Error::WorkerClosed));
        assert!(matches!(w.create_listener(0, |_| {}), Err(Error::WorkerClosed)));
        assert!(w.start_progress().is_err());
    }

    #[test]
    fn test_endpoint_options_fall_back_to_worker_config() {
        let fabric = LoopbackFabric::new();
        let server = worker(&fabric);
        let w = Worker::with_config(&fabric, WorkerConfig::new().error_handling(false)).unwrap();

        let inherited = w.create_endpoint_from_worker_address(server.address(), EndpointOptions::default()).unwrap();
        assert!(!inherited.error_handling_enabled());
        let explicit = w
            .create_endpoint_from_worker_address(server.address(), EndpointOptions::default().error_handling(true))
            .unwrap();
        assert!(explicit.error_handling_enabled());

        let on = worker(&fabric);
        let ep = on.create_endpoint_from_worker_address(server.address(), EndpointOptions::default()).unwrap();
        assert!(ep.error_handling_enabled());
    }

    #[test]
    fn test_map_status_after_peer_closed() {
        let e = EndpointShared::new(EpHandle(3), Weak::new(), false, None, None);
        e.mark_peer_closed();
        assert!(matches!(map_status(TransportStatus::InvalidHandle, Some(&e)), Error::Connection(_)));
        e.mark_closed();
        assert_eq!(map_status(TransportStatus::Canceled, Some(&e)), Error::EndpointClosed);
    }

    #[test]
    fn test_map_status() {
        assert_eq!(map_status(TransportStatus::Canceled, None), Error::EndpointClosed);
        assert_eq!(map_status(TransportStatus::PeerUnreachable, None), Error::PeerUnreachable);
        let t = TransportStatus::Truncated { capacity: 1, received: 2 };
        assert_eq!(map_status(t, None), Error::Transport(t));
    }
}
