//! `LoopbackFabric`: in-process `TransportContext`.
//!
//! Workers created from one fabric share a registry of worker addresses
//! and a table of listener ports. Delivery is eager: the sending worker's
//! progress tick copies the payload straight into the receiver's mailbox
//! and, if a matching receive is already posted, completes it there.
//!
//! ```text
//!  sender tick                       receiver mailbox
//!  ───────────                       ────────────────
//!  tag_send(op, ep, tag, data) ──►  posted recv with tag? ─► inbox: Completed
//!        │                                   │ no
//!        ▼                                   ▼
//!  local: Completed(op, data)        unexpected queue
//! ```
//!
//! Connection ids: every endpoint owns a local `ConnId` key. Endpoints
//! created through a listener also know the other side's key, which is
//! how peer loss and stream bytes reach the right endpoint.

mod mailbox;

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tagrelay_core::error::{Error, Result};
use tagrelay_core::transport::{
    ConnId, EndpointInfo, EpHandle, ListenerHandle, OpId, TransportContext, TransportEvent,
    TransportStatus, TransportWorker,
};
use tagrelay_core::{Notifier, Tag, WorkerAddress};

use mailbox::{complete_recv, Inbound, Mailbox, PendingConn, PostedRecv, StreamRecv};

/// First port handed out for `listen(0)`.
pub const EPHEMERAL_PORT_START: u16 = 49152;

struct ListenerEntry {
    owner: Weak<Mailbox>,
    handle: ListenerHandle,
}

struct Fabric {
    name: String,
    workers: Mutex<HashMap<WorkerAddress, Weak<Mailbox>>>,
    listeners: Mutex<HashMap<u16, ListenerEntry>>,
    next_id: AtomicU64,
    next_port: AtomicU64,
}

impl Fabric {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lookup_worker(&self, addr: &WorkerAddress) -> Option<Arc<Mailbox>> {
        self.workers.lock().get(addr).and_then(Weak::upgrade)
    }
}

/// In-process transport. Cloning shares the fabric.
#[derive(Clone)]
pub struct LoopbackFabric {
    inner: Arc<Fabric>,
}

impl LoopbackFabric {
    pub fn new() -> Self {
        Self::named("loopback")
    }

    pub fn named(name: &str) -> Self {
        Self {
            inner: Arc::new(Fabric {
                name: name.to_string(),
                workers: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                next_port: AtomicU64::new(0),
            }),
        }
    }

    /// Number of live workers registered on this fabric.
    pub fn worker_count(&self) -> usize {
        self.inner.workers.lock().values().filter(|w| w.strong_count() > 0).count()
    }
}

impl Default for LoopbackFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportContext for LoopbackFabric {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn create_worker(&self, activity: Arc<dyn Notifier>) -> Result<Box<dyn TransportWorker>> {
        let id = self.inner.next_id();
        let nonce: u64 = rand::random();
        let address =
            WorkerAddress::from(format!("{}://worker/{}/{:016x}", self.inner.name, id, nonce).into_bytes());

        let mailbox = Arc::new(Mailbox::new(address.clone(), activity));
        self.inner.workers.lock().insert(address.clone(), Arc::downgrade(&mailbox));
        tracing::debug!(fabric = %self.inner.name, worker = %address, "loopback worker created");

        Ok(Box::new(LoopbackWorker {
            fabric: Arc::clone(&self.inner),
            mailbox,
            routes: HashMap::new(),
            by_conn: HashMap::new(),
            listeners: HashMap::new(),
            events: VecDeque::new(),
        }))
    }
}

struct Route {
    remote: Weak<Mailbox>,
    local: ConnId,
    /// Remote key; `None` when dialed by worker address.
    peer: Option<ConnId>,
}

pub struct LoopbackWorker {
    fabric: Arc<Fabric>,
    mailbox: Arc<Mailbox>,
    routes: HashMap<EpHandle, Route>,
    by_conn: HashMap<ConnId, EpHandle>,
    listeners: HashMap<ListenerHandle, u16>,
    events: VecDeque<TransportEvent>,
}

impl LoopbackWorker {
    fn complete(&mut self, op: OpId, buffer: Vec<u8>, result: std::result::Result<usize, TransportStatus>) {
        self.events.push_back(TransportEvent::Completed { op, buffer, result });
    }

    fn add_route(&mut self, route: Route) -> EpHandle {
        let handle = EpHandle(self.fabric.next_id());
        self.by_conn.insert(route.local, handle);
        self.routes.insert(handle, route);
        handle
    }

    /// Resolve the live remote mailbox of `ep`, or complete `op` with the
    /// failure and hand the buffer back.
    fn resolve(&mut self, op: OpId, ep: EpHandle, buffer: Vec<u8>) -> std::result::Result<(Arc<Mailbox>, Vec<u8>), ()> {
        let Some(route) = self.routes.get(&ep) else {
            self.complete(op, buffer, Err(TransportStatus::InvalidHandle));
            return Err(());
        };
        match route.remote.upgrade() {
            Some(mb) => Ok((mb, buffer)),
            None => {
                self.peer_unreachable(op, ep, buffer);
                Err(())
            }
        }
    }

    fn peer_unreachable(&mut self, op: OpId, ep: EpHandle, buffer: Vec<u8>) {
        tracing::debug!(ep = ep.0, "loopback: peer unreachable");
        self.complete(op, buffer, Err(TransportStatus::PeerUnreachable));
        self.events.push_back(TransportEvent::PeerFailure { ep });
    }

    fn drain_inbox(&mut self) {
        let inbound: Vec<Inbound> = self.mailbox.state.lock().inbox.drain(..).collect();
        for item in inbound {
            match item {
                Inbound::Event(ev) => self.events.push_back(ev),
                Inbound::PeerGone { conn, graceful } => {
                    let Some(&ep) = self.by_conn.get(&conn) else {
                        continue;
                    };
                    if let Some(route) = self.routes.get_mut(&ep) {
                        route.remote = Weak::new();
                    }
                    self.events.push_back(if graceful {
                        TransportEvent::PeerClosed { ep }
                    } else {
                        TransportEvent::PeerFailure { ep }
                    });
                }
            }
        }
    }

    /// Claim `port` (0 = next free ephemeral port) for `handle`.
    fn bind_port(&self, port: u16, handle: ListenerHandle) -> Result<u16> {
        let mut table = self.fabric.listeners.lock();
        let taken = |t: &HashMap<u16, ListenerEntry>, p: u16| {
            t.get(&p).is_some_and(|e| e.owner.strong_count() > 0)
        };
        let port = if port != 0 {
            if taken(&table, port) {
                return Err(Error::Resource(format!("port {} already in use", port)));
            }
            port
        } else {
            let span = (u16::MAX - EPHEMERAL_PORT_START) as u64 + 1;
            let free = (0..span)
                .map(|_| {
                    let offset = self.fabric.next_port.fetch_add(1, Ordering::Relaxed) % span;
                    EPHEMERAL_PORT_START + offset as u16
                })
                .find(|&p| !taken(&table, p));
            match free {
                Some(p) => p,
                None => return Err(Error::Resource("no ephemeral ports left".into())),
            }
        };
        table.insert(port, ListenerEntry { owner: Arc::downgrade(&self.mailbox), handle });
        Ok(port)
    }
}

impl TransportWorker for LoopbackWorker {
    fn address(&self) -> &WorkerAddress {
        &self.mailbox.address
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<EndpointInfo> {
        let entry = {
            let table = self.fabric.listeners.lock();
            table.get(&addr.port()).and_then(|e| e.owner.upgrade().map(|mb| (mb, e.handle)))
        };
        let Some((server, listener)) = entry else {
            return Err(Error::Connection(format!("connection refused: {}", addr)));
        };

        let client_conn = ConnId(self.fabric.next_id());
        let server_conn = ConnId(self.fabric.next_id());
        let salt: u64 = rand::random();
        {
            let mut st = server.state.lock();
            if !st.open {
                return Err(Error::Connection(format!("connection refused: {}", addr)));
            }
            st.pending_conns.insert(
                server_conn,
                PendingConn {
                    listener,
                    client: Arc::downgrade(&self.mailbox),
                    client_conn,
                    salt,
                },
            );
            st.inbox.push_back(Inbound::Event(TransportEvent::ConnectionRequest {
                listener,
                conn: server_conn,
                peer: self.mailbox.address.clone(),
            }));
        }
        server.wake();

        let handle = self.add_route(Route {
            remote: Arc::downgrade(&server),
            local: client_conn,
            peer: Some(server_conn),
        });
        tracing::debug!(%addr, ep = handle.0, "loopback: connect");
        Ok(EndpointInfo { handle, salt: Some(salt) })
    }

    fn connect_to_worker(&mut self, addr: &WorkerAddress) -> Result<EndpointInfo> {
        let Some(remote) = self.fabric.lookup_worker(addr) else {
            return Err(Error::Connection(format!("unknown worker address {}", addr)));
        };
        let local = ConnId(self.fabric.next_id());
        {
            let mut st = remote.state.lock();
            if !st.open {
                return Err(Error::Connection(format!("worker {} is closed", addr)));
            }
            st.watchers.retain(|(w, _)| w.strong_count() > 0);
            st.watchers.push((Arc::downgrade(&self.mailbox), local));
        }
        let handle = self.add_route(Route { remote: Arc::downgrade(&remote), local, peer: None });
        Ok(EndpointInfo { handle, salt: None })
    }

    fn listen(&mut self, port: u16) -> Result<(ListenerHandle, SocketAddr)> {
        let handle = ListenerHandle(self.fabric.next_id());
        let port = self.bind_port(port, handle)?;
        self.listeners.insert(handle, port);
        Ok((handle, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)))
    }

    fn close_listener(&mut self, listener: ListenerHandle) {
        let Some(port) = self.listeners.remove(&listener) else {
            return;
        };
        {
            let mut table = self.fabric.listeners.lock();
            if table.get(&port).is_some_and(|e| e.handle == listener) {
                table.remove(&port);
            }
        }
        let orphaned: Vec<ConnId> = {
            let st = self.mailbox.state.lock();
            st.pending_conns
                .iter()
                .filter(|(_, p)| p.listener == listener)
                .map(|(c, _)| *c)
                .collect()
        };
        for conn in orphaned {
            self.reject(conn);
        }
    }

    fn accept(&mut self, conn: ConnId) -> Result<EndpointInfo> {
        let pending = self.mailbox.state.lock().pending_conns.remove(&conn);
        let Some(p) = pending else {
            return Err(Error::Connection("no such connection request".into()));
        };
        let handle = self.add_route(Route { remote: p.client, local: conn, peer: Some(p.client_conn) });
        Ok(EndpointInfo { handle, salt: Some(p.salt) })
    }

    fn reject(&mut self, conn: ConnId) {
        let pending = self.mailbox.state.lock().pending_conns.remove(&conn);
        let Some(p) = pending else {
            return;
        };
        if let Some(client) = p.client.upgrade() {
            client.push(Inbound::PeerGone { conn: p.client_conn, graceful: false });
        }
    }

    fn tag_send(&mut self, op: OpId, ep: Option<EpHandle>, tag: Tag, data: Vec<u8>) {
        let (target, data) = match ep {
            None => (Arc::clone(&self.mailbox), data),
            Some(ep) => match self.resolve(op, ep, data) {
                Ok(r) => r,
                Err(()) => return,
            },
        };
        if !target.deliver(tag, &data) {
            match ep {
                Some(ep) => self.peer_unreachable(op, ep, data),
                None => self.complete(op, data, Err(TransportStatus::Canceled)),
            }
            return;
        }
        let len = data.len();
        self.complete(op, data, Ok(len));
    }

    fn tag_recv(&mut self, op: OpId, ep: Option<EpHandle>, tag: Tag, buffer: Vec<u8>) {
        let mut st = self.mailbox.state.lock();
        match st.unexpected.iter().position(|m| m.tag == tag) {
            Some(idx) => {
                let msg = st.unexpected.remove(idx);
                drop(st);
                if let Some(msg) = msg {
                    let ev = complete_recv(op, buffer, &msg.data);
                    self.events.push_back(ev);
                }
            }
            None => st.posted.push_back(PostedRecv { op, ep, tag, buffer }),
        }
    }

    fn stream_send(&mut self, op: OpId, ep: EpHandle, data: Vec<u8>) {
        let peer = match self.routes.get(&ep) {
            Some(r) => r.peer,
            None => return self.complete(op, data, Err(TransportStatus::InvalidHandle)),
        };
        let Some(peer) = peer else {
            return self.complete(op, data, Err(TransportStatus::NotConnected));
        };
        let (target, data) = match self.resolve(op, ep, data) {
            Ok(r) => r,
            Err(()) => return,
        };
        if !target.deliver_stream(peer, &data) {
            return self.peer_unreachable(op, ep, data);
        }
        let len = data.len();
        self.complete(op, data, Ok(len));
    }

    fn stream_recv(&mut self, op: OpId, ep: EpHandle, buffer: Vec<u8>) {
        let local = match self.routes.get(&ep) {
            Some(r) if r.peer.is_some() => r.local,
            Some(_) => return self.complete(op, buffer, Err(TransportStatus::NotConnected)),
            None => return self.complete(op, buffer, Err(TransportStatus::InvalidHandle)),
        };
        let mut done = Vec::new();
        {
            let mut st = self.mailbox.state.lock();
            let stream = st.streams.entry(local).or_default();
            stream.waiting.push_back(StreamRecv { op, buffer, filled: 0 });
            stream.pump(&mut done);
        }
        self.events.extend(done);
    }

    fn close_endpoint(&mut self, op: OpId, ep: EpHandle) {
        let Some(route) = self.routes.remove(&ep) else {
            return self.complete(op, Vec::new(), Err(TransportStatus::InvalidHandle));
        };
        self.by_conn.remove(&route.local);

        let (recvs, streamed) = {
            let mut st = self.mailbox.state.lock();
            let (mine, rest): (VecDeque<_>, VecDeque<_>) =
                st.posted.drain(..).partition(|p| p.ep == Some(ep));
            st.posted = rest;
            let streamed = st.streams.remove(&route.local).map(|s| s.waiting).unwrap_or_default();
            (mine, streamed)
        };
        for r in recvs {
            self.complete(r.op, r.buffer, Err(TransportStatus::Canceled));
        }
        for s in streamed {
            self.complete(s.op, s.buffer, Err(TransportStatus::Canceled));
        }

        match (route.peer, route.remote.upgrade()) {
            (Some(peer), Some(remote)) => remote.push(Inbound::PeerGone { conn: peer, graceful: true }),
            // Dialed by worker address: stop watching the remote.
            (None, Some(remote)) => remote.state.lock().watchers.retain(|(_, c)| *c != route.local),
            _ => {}
        }
        self.complete(op, Vec::new(), Ok(0));
    }

    fn progress(&mut self) -> bool {
        self.drain_inbox();
        !self.events.is_empty()
    }

    fn poll_events(&mut self, out: &mut Vec<TransportEvent>, max: usize) -> usize {
        let n = max.min(self.events.len());
        out.extend(self.events.drain(..n));
        n
    }
}

impl Drop for LoopbackWorker {
    fn drop(&mut self) {
        let (pending, watchers) = {
            let mut st = self.mailbox.state.lock();
            st.open = false;
            st.posted.clear();
            st.unexpected.clear();
            st.streams.clear();
            st.inbox.clear();
            let pending: Vec<PendingConn> = st.pending_conns.drain().map(|(_, p)| p).collect();
            (pending, std::mem::take(&mut st.watchers))
        };

        self.fabric.workers.lock().remove(&self.mailbox.address);
        {
            let mut table = self.fabric.listeners.lock();
            for port in self.listeners.values() {
                table.remove(port);
            }
        }

        for p in pending {
            if let Some(client) = p.client.upgrade() {
                client.push(Inbound::PeerGone { conn: p.client_conn, graceful: false });
            }
        }
        for (watcher, conn) in watchers {
            if let Some(mb) = watcher.upgrade() {
                mb.push(Inbound::PeerGone { conn, graceful: false });
            }
        }
        for route in self.routes.values() {
            if let (Some(peer), Some(remote)) = (route.peer, route.remote.upgrade()) {
                remote.push(Inbound::PeerGone { conn: peer, graceful: false });
            }
        }
        tracing::debug!(worker = %self.mailbox.address, "loopback worker dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::CondvarNotifier;

    fn worker(fabric: &LoopbackFabric) -> Box<dyn TransportWorker> {
        fabric.create_worker(Arc::new(CondvarNotifier::new())).unwrap()
    }

    fn drain(w: &mut Box<dyn TransportWorker>) -> Vec<TransportEvent> {
        w.progress();
        let mut out = Vec::new();
        w.poll_events(&mut out, usize::MAX);
        out
    }

    fn completion(events: &[TransportEvent], want: OpId) -> Option<(&Vec<u8>, std::result::Result<usize, TransportStatus>)> {
        events.iter().find_map(|e| match e {
            TransportEvent::Completed { op, buffer, result } if *op == want => Some((buffer, *result)),
            _ => None,
        })
    }

    fn connect_pair(fabric: &LoopbackFabric) -> (Box<dyn TransportWorker>, EpHandle, Box<dyn TransportWorker>, EpHandle) {
        let mut server = worker(fabric);
        let mut client = worker(fabric);
        let (_l, addr) = server.listen(0).unwrap();
        let cinfo = client.connect(addr).unwrap();
        let conn = drain(&mut server)
            .into_iter()
            .find_map(|e| match e {
                TransportEvent::ConnectionRequest { conn, .. } => Some(conn),
                _ => None,
            })
            .unwrap();
        let sinfo = server.accept(conn).unwrap();
        assert_eq!(cinfo.salt, sinfo.salt);
        (server, sinfo.handle, client, cinfo.handle)
    }

    #[test]
    fn test_worker_addresses_unique() {
        let fabric = LoopbackFabric::new();
        let a = worker(&fabric);
        let b = worker(&fabric);
        assert_ne!(a.address(), b.address());
        assert_eq!(fabric.worker_count(), 2);
        drop(a);
        assert_eq!(fabric.worker_count(), 1);
    }

    #[test]
    fn test_worker_address_dials_do_not_leak_watchers() {
        let fabric = LoopbackFabric::new();
        let mut a = worker(&fabric);
        let b = worker(&fabric);
        let watchers = || fabric.inner.lookup_worker(b.address()).unwrap().state.lock().watchers.len();

        for op in 0..3 {
            let info = a.connect_to_worker(b.address()).unwrap();
            assert_eq!(watchers(), 1);
            a.close_endpoint(OpId(op), info.handle);
            assert_eq!(watchers(), 0);
        }

        // A dialer that vanishes without closing is pruned by the next dial.
        for _ in 0..3 {
            let mut c = worker(&fabric);
            c.connect_to_worker(b.address()).unwrap();
        }
        let info = a.connect_to_worker(b.address()).unwrap();
        assert_eq!(watchers(), 1);
        a.close_endpoint(OpId(9), info.handle);
        assert_eq!(watchers(), 0);
    }

    #[test]
    fn test_send_by_worker_address() {
        let fabric = LoopbackFabric::new();
        let mut a = worker(&fabric);
        let mut b = worker(&fabric);

        b.tag_recv(OpId(1), None, Tag(7), vec![0; 16]);
        let info = a.connect_to_worker(b.address()).unwrap();
        assert!(info.salt.is_none());
        a.tag_send(OpId(2), Some(info.handle), Tag(7), b"hello".to_vec());

        let sent = drain(&mut a);
        assert_eq!(completion(&sent, OpId(2)).unwrap().1, Ok(5));
        let got = drain(&mut b);
        let (buf, res) = completion(&got, OpId(1)).unwrap();
        assert_eq!(res, Ok(5));
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn test_unexpected_message_matched_later() {
        let fabric = LoopbackFabric::new();
        let mut a = worker(&fabric);
        let mut b = worker(&fabric);
        let ep = a.connect_to_worker(b.address()).unwrap().handle;

        a.tag_send(OpId(1), Some(ep), Tag(3), vec![1, 2, 3]);
        b.tag_recv(OpId(2), None, Tag(3), vec![0; 3]);
        let got = drain(&mut b);
        assert_eq!(completion(&got, OpId(2)).unwrap().0, &vec![1, 2, 3]);
    }

    #[test]
    fn test_connect_refused() {
        let fabric = LoopbackFabric::new();
        let mut a = worker(&fabric);
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert!(matches!(a.connect(addr), Err(Error::Connection(_))));
    }

    #[test]
    fn test_listen_port_in_use() {
        let fabric = LoopbackFabric::new();
        let mut a = worker(&fabric);
        let mut b = worker(&fabric);
        let (_h, addr) = a.listen(0).unwrap();
        assert!(addr.port() >= EPHEMERAL_PORT_START);
        assert!(b.listen(addr.port()).is_err());
        let (_h2, other) = b.listen(0).unwrap();
        assert_ne!(addr.port(), other.port());
    }

    #[test]
    fn test_reject_reaches_client() {
        let fabric = LoopbackFabric::new();
        let mut server = worker(&fabric);
        let mut client = worker(&fabric);
        let (_l, addr) = server.listen(0).unwrap();
        let ep = client.connect(addr).unwrap().handle;
        let conn = drain(&mut server)
            .into_iter()
            .find_map(|e| match e {
                TransportEvent::ConnectionRequest { conn, .. } => Some(conn),
                _ => None,
            })
            .unwrap();
        server.reject(conn);

        let events = drain(&mut client);
        assert!(events.iter().any(|e| matches!(e, TransportEvent::PeerFailure { ep: x } if *x == ep)));
    }

    #[test]
    fn test_stream_roundtrip() {
        let fabric = LoopbackFabric::new();
        let (mut server, sep, mut client, cep) = connect_pair(&fabric);

        server.stream_recv(OpId(10), sep, vec![0; 6]);
        client.stream_send(OpId(11), cep, b"abc".to_vec());
        assert!(completion(&drain(&mut server), OpId(10)).is_none());
        client.stream_send(OpId(12), cep, b"def".to_vec());

        let got = drain(&mut server);
        let (buf, res) = completion(&got, OpId(10)).unwrap();
        assert_eq!(res, Ok(6));
        assert_eq!(buf, &b"abcdef".to_vec());
    }

    #[test]
    fn test_stream_needs_connection() {
        let fabric = LoopbackFabric::new();
        let mut a = worker(&fabric);
        let b = worker(&fabric);
        let ep = a.connect_to_worker(b.address()).unwrap().handle;
        a.stream_send(OpId(1), ep, vec![1]);
        assert_eq!(completion(&drain(&mut a), OpId(1)).unwrap().1, Err(TransportStatus::NotConnected));
    }

    #[test]
    fn test_close_cancels_and_notifies_peer() {
        let fabric = LoopbackFabric::new();
        let (mut server, sep, mut client, cep) = connect_pair(&fabric);

        server.tag_recv(OpId(1), Some(sep), Tag(99), vec![0; 4]);
        server.close_endpoint(OpId(2), sep);
        let events = drain(&mut server);
        assert_eq!(completion(&events, OpId(1)).unwrap().1, Err(TransportStatus::Canceled));
        assert_eq!(completion(&events, OpId(2)).unwrap().1, Ok(0));

        let events = drain(&mut client);
        assert!(events.iter().any(|e| matches!(e, TransportEvent::PeerClosed { ep } if *ep == cep)));
    }

    #[test]
    fn test_drop_fails_peers() {
        let fabric = LoopbackFabric::new();
        let (server, _sep, mut client, cep) = connect_pair(&fabric);
        let mut watcher = worker(&fabric);
        let wep = watcher.connect_to_worker(server.address()).unwrap().handle;
        drop(server);

        let events = drain(&mut client);
        assert!(events.iter().any(|e| matches!(e, TransportEvent::PeerFailure { ep } if *ep == cep)));
        let events = drain(&mut watcher);
        assert!(events.iter().any(|e| matches!(e, TransportEvent::PeerFailure { ep } if *ep == wep)));

        client.tag_send(OpId(5), Some(cep), Tag(1), vec![0]);
        assert_eq!(completion(&drain(&mut client), OpId(5)).unwrap().1, Err(TransportStatus::PeerUnreachable));
    }

    #[test]
    fn test_poll_events_respects_max() {
        let fabric = LoopbackFabric::new();
        let mut a = worker(&fabric);
        for i in 0..5 {
            a.tag_send(OpId(i), None, Tag(1), vec![0]);
        }
        let mut out = Vec::new();
        assert_eq!(a.poll_events(&mut out, 2), 2);
        assert_eq!(a.poll_events(&mut out, 10), 3);
    }
}
