//! Listener and ConnectionRequest.
//!
//! Each inbound attempt on a bound port runs the listener's callback on
//! the progress tick with a `ConnectionRequest`. The request borrows the
//! worker core for the duration of the callback only, so it cannot
//! outlive it. Accept turns it into an `Endpoint`; dropping it rejects the
//! attempt and the dialer sees a peer failure.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use tagrelay_core::error::Result;
use tagrelay_core::transport::{ConnId, ListenerHandle};
use tagrelay_core::WorkerAddress;

use crate::config::EndpointOptions;
use crate::endpoint::Endpoint;
use crate::worker::{WorkerCore, WorkerShared};

pub(crate) type ListenerCallback = Box<dyn FnMut(ConnectionRequest<'_>) + Send + 'static>;

/// Inbound connection attempt, valid only inside the listener callback.
pub struct ConnectionRequest<'a> {
    core: &'a mut WorkerCore,
    worker: &'a Weak<WorkerShared>,
    conn: ConnId,
    peer: WorkerAddress,
    /// The worker's `WorkerConfig::error_handling`.
    worker_error_handling: bool,
    resolved: bool,
}

impl<'a> ConnectionRequest<'a> {
    pub(crate) fn new(
        core: &'a mut WorkerCore,
        worker: &'a Weak<WorkerShared>,
        conn: ConnId,
        peer: WorkerAddress,
        worker_error_handling: bool,
    ) -> Self {
        Self { core, worker, conn, peer, worker_error_handling, resolved: false }
    }

    /// Address of the dialing worker.
    pub fn peer(&self) -> &WorkerAddress {
        &self.peer
    }

    /// Endpoint options the worker's config would pick.
    pub fn default_options(&self) -> EndpointOptions {
        EndpointOptions::default().error_handling(self.worker_error_handling)
    }

    /// Accept the attempt. The endpoint shares the dialer's salt. Unset
    /// options fall back to the worker's config.
    pub fn accept(mut self, opts: EndpointOptions) -> Result<Endpoint> {
        self.resolved = true;
        let info = self.core.transport_mut()?.accept(self.conn)?;
        let peer = self.peer.clone();
        let error_handling = opts.resolve_error_handling(self.worker_error_handling);
        Ok(self.core.register_endpoint(self.worker, info, error_handling, Some(peer)))
    }

    /// Refuse the attempt explicitly. Same as dropping it.
    pub fn reject(self) {}
}

impl Drop for ConnectionRequest<'_> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        tracing::debug!(peer = %self.peer, "connection request lapsed, rejecting");
        if let Ok(t) = self.core.transport_mut() {
            t.reject(self.conn);
        }
    }
}

/// A bound port. Closing or dropping it unbinds the port.
pub struct Listener {
    handle: ListenerHandle,
    addr: SocketAddr,
    worker: Weak<WorkerShared>,
    closed: AtomicBool,
}

impl Listener {
    pub(crate) fn new(handle: ListenerHandle, addr: SocketAddr, worker: Weak<WorkerShared>) -> Self {
        Self { handle, addr, worker, closed: AtomicBool::new(false) }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Unbind. Takes effect on the next progress tick. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(w) = self.worker.upgrade() {
            w.submit_close_listener(self.handle);
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("addr", &self.addr).finish()
    }
}
