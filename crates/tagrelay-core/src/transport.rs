//! Transport capability.
//!
//! The transport is the engine that actually moves bytes. tagrelay treats
//! it as an external collaborator reached through two traits:
//!
//! - `TransportContext`: process-level resource, creates workers.
//! - `TransportWorker`: one polling engine. Owned exclusively by a single
//!   `tagrelay::Worker` and only ever driven from that worker's progress
//!   tick.
//!
//! # Operation model
//!
//! Data operations (`tag_send`, `tag_recv`, `stream_*`, `close_endpoint`)
//! are submitted with an `OpId` and never fail synchronously. Their
//! outcome arrives later as a `TransportEvent::Completed` carrying the same
//! `OpId` and the buffer that was handed in. Between submission and that
//! event the transport owns the buffer.
//!
//! Setup operations (`connect*`, `listen`, `accept`) return `Result`
//! because their failure is reported to the caller immediately.
//!
//! # Implementors
//!
//! - `LoopbackFabric` (tagrelay-module): in-process fabric. Workers created
//!   from the same fabric can reach each other by worker address or by
//!   listener port.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::address::WorkerAddress;
use crate::error::Result;
use crate::notifier::Notifier;
use crate::tag::Tag;

/// Identifies one submitted data operation. Chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct OpId(pub u64);

/// Transport-level endpoint handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EpHandle(pub u64);

/// Transport-level listener handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ListenerHandle(pub u64);

/// Identifies one inbound connection attempt until it is accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ConnId(pub u64);

/// What a successful connect/accept hands back.
#[derive(Debug, Clone, Copy)]
pub struct EndpointInfo {
    pub handle: EpHandle,
    /// Shared by both ends of a listener-accepted connection.
    /// `None` for endpoints dialed by worker address.
    pub salt: Option<u64>,
}

/// Failure status of a data operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// Incoming message larger than the posted receive buffer.
    Truncated { capacity: usize, received: usize },
    /// The remote worker is gone.
    PeerUnreachable,
    /// Cancelled by an endpoint close or worker teardown.
    Canceled,
    /// Stream operation on an endpoint without a connection.
    NotConnected,
    /// Unknown endpoint handle.
    InvalidHandle,
}

impl std::fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { capacity, received } => {
                write!(f, "message truncated: {} bytes into {} byte buffer", received, capacity)
            }
            Self::PeerUnreachable => write!(f, "peer unreachable"),
            Self::Canceled => write!(f, "canceled"),
            Self::NotConnected => write!(f, "endpoint not connected"),
            Self::InvalidHandle => write!(f, "invalid endpoint handle"),
        }
    }
}

/// Everything a worker's progress tick can observe.
#[derive(Debug)]
pub enum TransportEvent {
    /// A data operation finished. `result` is the number of meaningful
    /// bytes in `buffer` on success.
    Completed {
        op: OpId,
        buffer: Vec<u8>,
        result: std::result::Result<usize, TransportStatus>,
    },
    /// Someone dialed a listener owned by this worker.
    ConnectionRequest {
        listener: ListenerHandle,
        conn: ConnId,
        peer: WorkerAddress,
    },
    /// The remote side of `ep` failed (worker torn down, attempt rejected).
    PeerFailure { ep: EpHandle },
    /// The remote side of `ep` closed its endpoint gracefully.
    PeerClosed { ep: EpHandle },
}

/// Process-level transport resource.
pub trait TransportContext: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Create one polling engine.
    ///
    /// `activity` must be signalled whenever something arrives for this
    /// worker from outside its own progress tick, so an idle progress
    /// thread wakes up.
    fn create_worker(&self, activity: Arc<dyn Notifier>) -> Result<Box<dyn TransportWorker>>;
}

/// One polling engine.
///
/// **Contract:** no method blocks. Data operations hand their buffer to
/// the transport and report back exactly once through `poll_events`.
pub trait TransportWorker: Send {
    /// This worker's address. Stable for its lifetime.
    fn address(&self) -> &WorkerAddress;

    /// Dial a listener by network address.
    fn connect(&mut self, addr: SocketAddr) -> Result<EndpointInfo>;

    /// Dial a worker directly by its address.
    fn connect_to_worker(&mut self, addr: &WorkerAddress) -> Result<EndpointInfo>;

    /// Bind a listener. Port 0 picks an unused port.
    fn listen(&mut self, port: u16) -> Result<(ListenerHandle, SocketAddr)>;

    /// Unbind a listener. Pending attempts on it are rejected.
    fn close_listener(&mut self, listener: ListenerHandle);

    /// Turn a pending connection attempt into an endpoint.
    fn accept(&mut self, conn: ConnId) -> Result<EndpointInfo>;

    /// Refuse a pending connection attempt. The dialer sees `PeerFailure`.
    fn reject(&mut self, conn: ConnId);

    /// Send `data` with `tag`. `ep = None` targets this worker itself.
    fn tag_send(&mut self, op: OpId, ep: Option<EpHandle>, tag: Tag, data: Vec<u8>);

    /// Receive into `buffer` the next message carrying exactly `tag`.
    /// `ep` only scopes cancellation; matching is worker-wide.
    fn tag_recv(&mut self, op: OpId, ep: Option<EpHandle>, tag: Tag, buffer: Vec<u8>);

    /// Append `data` to the connection's byte stream.
    fn stream_send(&mut self, op: OpId, ep: EpHandle, data: Vec<u8>);

    /// Fill all of `buffer` from the connection's byte stream.
    fn stream_recv(&mut self, op: OpId, ep: EpHandle, buffer: Vec<u8>);

    /// Close `ep`. Receives scoped to it complete with `Canceled`, then
    /// `op` completes.
    fn close_endpoint(&mut self, op: OpId, ep: EpHandle);

    /// Advance internal state. Returns true if events may be pending.
    fn progress(&mut self) -> bool;

    /// Drain up to `max` pending events into `out`. Returns the count.
    fn poll_events(&mut self, out: &mut Vec<TransportEvent>, max: usize) -> usize;
}
