//! Address-exchange rendezvous.
//!
//! Many clients, one server, no prior handshake:
//!
//! ```text
//!  client i                                   server
//!  ────────                                   ──────
//!  ep = dial(server worker address)
//!  tags_i = ClientTags::random()
//!  send_frame(ep, my_addr, tags_i) ──tag 0──► gather_clients(worker, n)
//!                                              for each binding:
//!                                                ep_i = binding.connect()
//!  recv on tags_i.recv  ◄──────────────────── send on binding.tags.send
//!  send on tags_i.send  ──────────────────►   recv on binding.tags.recv
//! ```
//!
//! Also: the single-address exchange, an 8-byte little-endian length
//! followed by the address bytes, both on one tag.

use std::collections::HashSet;

use tagrelay_core::error::{Error, Result};
use tagrelay_core::frame::{self, FRAME_SIZE, MAX_ADDRESS_LEN};
use tagrelay_core::{ClientTags, ServerTags, Tag, WorkerAddress};

use crate::config::EndpointOptions;
use crate::endpoint::Endpoint;
use crate::request::Request;
use crate::worker::Worker;

/// The universally known tag frames travel on.
pub const RENDEZVOUS_TAG: Tag = Tag(0);

/// One client as seen by the server after gathering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientBinding {
    pub address: WorkerAddress,
    pub tags: ServerTags,
}

impl ClientBinding {
    /// Dial the client's worker. Tags on the result are used verbatim.
    pub fn connect(&self, worker: &Worker, opts: EndpointOptions) -> Result<Endpoint> {
        worker.create_endpoint_from_worker_address(&self.address, opts)
    }
}

/// Client side: announce `address` and `tags` on the rendezvous tag.
pub fn send_frame(ep: &Endpoint, address: &WorkerAddress, tags: ClientTags) -> Result<Request> {
    let frame = frame::encode(address.as_bytes(), tags)?;
    Ok(ep.tag_send(frame, RENDEZVOUS_TAG, true))
}

/// Server side: post one frame receive on the worker.
pub fn post_frame_recv(worker: &Worker) -> Request {
    worker.tag_recv(vec![0u8; FRAME_SIZE], RENDEZVOUS_TAG)
}

/// Server side: receive exactly `n` frames and decode them.
///
/// Fails with `Error::TagCollision` if two announced tags in this batch
/// are equal.
pub async fn gather_clients(worker: &Worker, n: usize) -> Result<Vec<ClientBinding>> {
    let pending: Vec<Request> = (0..n).map(|_| post_frame_recv(worker)).collect();
    let mut bindings = Vec::with_capacity(n);
    for req in pending {
        let c = req.await?;
        bindings.push(decode_binding(c.data())?);
    }
    check_collisions(&bindings)?;
    Ok(bindings)
}

/// Blocking form of `gather_clients`.
pub fn gather_clients_blocking(worker: &Worker, n: usize) -> Result<Vec<ClientBinding>> {
    let pending: Vec<Request> = (0..n).map(|_| post_frame_recv(worker)).collect();
    let mut bindings = Vec::with_capacity(n);
    for req in pending {
        let c = req.wait()?;
        bindings.push(decode_binding(c.data())?);
    }
    check_collisions(&bindings)?;
    Ok(bindings)
}

fn decode_binding(data: &[u8]) -> Result<ClientBinding> {
    let decoded = frame::decode(data)?;
    tracing::debug!(client = %decoded.address, recv = %decoded.tags.recv, send = %decoded.tags.send, "client frame");
    Ok(ClientBinding { address: decoded.address, tags: decoded.tags })
}

fn check_collisions(bindings: &[ClientBinding]) -> Result<()> {
    let mut seen = HashSet::with_capacity(bindings.len() * 2);
    for b in bindings {
        for t in [b.tags.recv, b.tags.send] {
            if !seen.insert(t) {
                return Err(Error::TagCollision(t));
            }
        }
    }
    Ok(())
}

/// Send `address` as length then bytes on `tag`, used verbatim.
pub fn send_address(ep: &Endpoint, address: &WorkerAddress, tag: Tag) -> [Request; 2] {
    let len = (address.len() as u64).to_le_bytes().to_vec();
    [ep.tag_send(len, tag, true), ep.tag_send(address.to_vec(), tag, true)]
}

/// Receive an address sent with `send_address` on this worker.
pub async fn recv_address(worker: &Worker, tag: Tag) -> Result<WorkerAddress> {
    let len = worker.tag_recv(vec![0u8; 8], tag).await?;
    let n = decode_len(len.data())?;
    let body = worker.tag_recv(vec![0u8; n], tag).await?;
    Ok(WorkerAddress::from_bytes(body.data()))
}

/// Blocking form of `recv_address`.
pub fn recv_address_blocking(worker: &Worker, tag: Tag) -> Result<WorkerAddress> {
    let len = worker.tag_recv(vec![0u8; 8], tag).wait()?;
    let n = decode_len(len.data())?;
    let body = worker.tag_recv(vec![0u8; n], tag).wait()?;
    Ok(WorkerAddress::from_bytes(body.data()))
}

/// Validate a peer-supplied address length before allocating for it.
fn decode_len(data: &[u8]) -> Result<usize> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| Error::Connection(format!("address length prefix is {} bytes", data.len())))?;
    let n = u64::from_le_bytes(bytes);
    if n == 0 || n > MAX_ADDRESS_LEN as u64 {
        return Err(Error::Connection(format!(
            "address length {} outside 1..={}",
            n, MAX_ADDRESS_LEN
        )));
    }
    Ok(n as usize)
}
