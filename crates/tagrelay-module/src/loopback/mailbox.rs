//! Per-worker shared state of the loopback fabric.
//!
//! Everything another worker may touch lives here behind one mutex:
//! posted receives (so a sender can match them), unexpected messages,
//! inbound stream bytes, pending connection attempts and the inbox of
//! events waiting for the owner's next progress tick.
//!
//! Lock rule: at most one mailbox lock is held at a time.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tagrelay_core::transport::{ConnId, EpHandle, ListenerHandle, OpId, TransportEvent, TransportStatus};
use tagrelay_core::{Notifier, Tag, WorkerAddress};

pub(crate) struct PostedRecv {
    pub op: OpId,
    pub ep: Option<EpHandle>,
    pub tag: Tag,
    pub buffer: Vec<u8>,
}

pub(crate) struct Message {
    pub tag: Tag,
    pub data: Vec<u8>,
}

pub(crate) struct StreamRecv {
    pub op: OpId,
    pub buffer: Vec<u8>,
    pub filled: usize,
}

#[derive(Default)]
pub(crate) struct StreamState {
    pub bytes: VecDeque<u8>,
    pub waiting: VecDeque<StreamRecv>,
}

impl StreamState {
    /// Hand buffered bytes to waiting receives in order. Emits a completion
    /// for every receive whose buffer is now full.
    pub fn pump(&mut self, out: &mut Vec<TransportEvent>) {
        while let Some(front) = self.waiting.front_mut() {
            let want = front.buffer.len() - front.filled;
            let n = want.min(self.bytes.len());
            for (dst, src) in front.buffer[front.filled..front.filled + n]
                .iter_mut()
                .zip(self.bytes.drain(..n))
            {
                *dst = src;
            }
            front.filled += n;
            if front.filled < front.buffer.len() {
                break;
            }
            if let Some(done) = self.waiting.pop_front() {
                let len = done.buffer.len();
                out.push(TransportEvent::Completed { op: done.op, buffer: done.buffer, result: Ok(len) });
            }
        }
    }
}

pub(crate) struct PendingConn {
    pub listener: ListenerHandle,
    pub client: Weak<Mailbox>,
    pub client_conn: ConnId,
    pub salt: u64,
}

pub(crate) enum Inbound {
    Event(TransportEvent),
    /// The other end of the connection keyed `conn` on this side went away.
    PeerGone { conn: ConnId, graceful: bool },
}

pub(crate) struct MailboxState {
    pub open: bool,
    pub posted: VecDeque<PostedRecv>,
    pub unexpected: VecDeque<Message>,
    pub streams: HashMap<ConnId, StreamState>,
    pub pending_conns: HashMap<ConnId, PendingConn>,
    /// Workers that dialed us by address: (their mailbox, their key).
    pub watchers: Vec<(Weak<Mailbox>, ConnId)>,
    pub inbox: VecDeque<Inbound>,
}

pub(crate) struct Mailbox {
    pub address: WorkerAddress,
    pub activity: Arc<dyn Notifier>,
    pub state: Mutex<MailboxState>,
}

impl Mailbox {
    pub fn new(address: WorkerAddress, activity: Arc<dyn Notifier>) -> Self {
        Self {
            address,
            activity,
            state: Mutex::new(MailboxState {
                open: true,
                posted: VecDeque::new(),
                unexpected: VecDeque::new(),
                streams: HashMap::new(),
                pending_conns: HashMap::new(),
                watchers: Vec::new(),
                inbox: VecDeque::new(),
            }),
        }
    }

    /// Wake the owning worker's progress thread.
    pub fn wake(&self) {
        if let Err(e) = self.activity.notify() {
            tracing::warn!(error = %e, "loopback: activity notify failed");
        }
    }

    /// Deliver a tagged message into this mailbox.
    ///
    /// Matches the oldest posted receive with an equal tag, otherwise
    /// parks the message as unexpected. Returns false if the mailbox is
    /// closed.
    pub fn deliver(&self, tag: Tag, data: &[u8]) -> bool {
        {
            let mut st = self.state.lock();
            if !st.open {
                return false;
            }
            match st.posted.iter().position(|p| p.tag == tag) {
                Some(idx) => {
                    let Some(recv) = st.posted.remove(idx) else {
                        return true;
                    };
                    let event = complete_recv(recv.op, recv.buffer, data);
                    st.inbox.push_back(Inbound::Event(event));
                }
                None => {
                    st.unexpected.push_back(Message { tag, data: data.to_vec() });
                    return true;
                }
            }
        }
        self.wake();
        true
    }

    /// Append stream bytes for `conn`. Returns false if closed.
    pub fn deliver_stream(&self, conn: ConnId, data: &[u8]) -> bool {
        let mut done = Vec::new();
        {
            let mut st = self.state.lock();
            if !st.open {
                return false;
            }
            let stream = st.streams.entry(conn).or_default();
            stream.bytes.extend(data.iter().copied());
            stream.pump(&mut done);
            if done.is_empty() {
                return true;
            }
            st.inbox.extend(done.into_iter().map(Inbound::Event));
        }
        self.wake();
        true
    }

    /// Queue an inbound item and wake the owner. Dropped if closed.
    pub fn push(&self, item: Inbound) {
        {
            let mut st = self.state.lock();
            if !st.open {
                return;
            }
            st.inbox.push_back(item);
        }
        self.wake();
    }
}

/// Copy `data` into a posted receive buffer and build its completion.
///
/// An oversized message fills the buffer and completes as `Truncated`.
pub(crate) fn complete_recv(op: OpId, mut buffer: Vec<u8>, data: &[u8]) -> TransportEvent {
    let capacity = buffer.len();
    let n = data.len().min(capacity);
    buffer[..n].copy_from_slice(&data[..n]);
    let result = if data.len() > capacity {
        Err(TransportStatus::Truncated { capacity, received: data.len() })
    } else {
        Ok(data.len())
    };
    TransportEvent::Completed { op, buffer, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::CondvarNotifier;

    fn mailbox() -> Mailbox {
        Mailbox::new(WorkerAddress::from_bytes(b"mb"), Arc::new(CondvarNotifier::new()))
    }

    #[test]
    fn test_unexpected_then_matched_fifo() {
        let mb = mailbox();
        assert!(mb.deliver(Tag(1), b"first"));
        assert!(mb.deliver(Tag(1), b"second"));
        let st = mb.state.lock();
        assert_eq!(st.unexpected.len(), 2);
        assert_eq!(st.unexpected[0].data, b"first");
    }

    #[test]
    fn test_posted_match_is_exact_tag() {
        let mb = mailbox();
        mb.state.lock().posted.push_back(PostedRecv {
            op: OpId(1),
            ep: None,
            tag: Tag(5),
            buffer: vec![0; 8],
        });
        mb.deliver(Tag(6), b"nope");
        mb.deliver(Tag(5), b"yes");

        let st = mb.state.lock();
        assert!(st.posted.is_empty());
        assert_eq!(st.unexpected.len(), 1);
        match st.inbox.front() {
            Some(Inbound::Event(TransportEvent::Completed { op, buffer, result })) => {
                assert_eq!(*op, OpId(1));
                assert_eq!(*result, Ok(3));
                assert_eq!(&buffer[..3], b"yes");
            }
            _ => panic!("expected completion"),
        }
    }

    #[test]
    fn test_truncation() {
        match complete_recv(OpId(9), vec![0; 2], b"abcd") {
            TransportEvent::Completed { result, buffer, .. } => {
                assert_eq!(result, Err(TransportStatus::Truncated { capacity: 2, received: 4 }));
                assert_eq!(buffer, b"ab");
            }
            _ => panic!("expected completion"),
        }
    }

    #[test]
    fn test_stream_pump_fills_in_order() {
        let mut s = StreamState::default();
        s.waiting.push_back(StreamRecv { op: OpId(1), buffer: vec![0; 3], filled: 0 });
        s.waiting.push_back(StreamRecv { op: OpId(2), buffer: vec![0; 2], filled: 0 });
        let mut out = Vec::new();

        s.bytes.extend(b"ab".iter().copied());
        s.pump(&mut out);
        assert!(out.is_empty());

        s.bytes.extend(b"cde".iter().copied());
        s.pump(&mut out);
        assert_eq!(out.len(), 2);
        assert!(s.waiting.is_empty());
        match &out[1] {
            TransportEvent::Completed { op, buffer, .. } => {
                assert_eq!(*op, OpId(2));
                assert_eq!(buffer, b"de");
            }
            _ => panic!("expected completion"),
        }
    }

    #[test]
    fn test_closed_mailbox_refuses() {
        let mb = mailbox();
        mb.state.lock().open = false;
        assert!(!mb.deliver(Tag(1), b"x"));
        assert!(!mb.deliver_stream(ConnId(1), b"x"));
    }
}
