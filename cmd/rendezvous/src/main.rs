//! Rendezvous example
//!
//! One server, N client threads. Each client learns the server's worker
//! address over an in-process channel, announces its own address and a
//! random tag pair on tag 0, then swaps ten i64 values with the server on
//! the private tags.
//!
//! Usage: `rendezvous [clients]` (default 4)

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tagrelay::rendezvous;
use tagrelay::{ClientTags, EndpointOptions, Worker, WorkerAddress};
use tagrelay_module::LoopbackFabric;
use tracing_subscriber::EnvFilter;

const VALUES: usize = 10;
const DEADLINE: Duration = Duration::from_secs(10);

fn encode(values: &[i64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(bytes: &[u8]) -> Vec<i64> {
    bytes
        .chunks_exact(8)
        .map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            i64::from_le_bytes(b)
        })
        .collect()
}

fn client(fabric: LoopbackFabric, id: usize, bootstrap: mpsc::Receiver<WorkerAddress>) -> tagrelay::Result<()> {
    let worker = Worker::create(&fabric)?;
    worker.start_progress()?;

    let server = bootstrap.recv_timeout(DEADLINE).map_err(|_| tagrelay::Error::Timeout)?;
    let ep = worker.create_endpoint_from_worker_address(&server, EndpointOptions::default())?;

    let tags = ClientTags::random();
    let incoming = worker.tag_recv(vec![0u8; VALUES * 8], tags.recv);
    rendezvous::send_frame(&ep, worker.address(), tags)?.wait()?;

    let got = decode(incoming.wait_timeout(DEADLINE)?.data());
    tracing::info!(client = id, ?got, "received from server");

    let reply: Vec<i64> = (0..VALUES as i64).map(|v| (id as i64) * 1000 + v).collect();
    ep.tag_send(encode(&reply), tags.send, true).wait()?;

    // Linger until the server has read the reply.
    let _ = worker.tag_recv(vec![0u8; 1], tags.recv).wait_timeout(DEADLINE)?;
    Ok(())
}

// RUST_LOG=info cargo run -p tagrelay-rendezvous -- 8
fn main() -> tagrelay::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let clients: usize = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(4);
    println!("=== tagrelay Rendezvous Example ({} clients) ===\n", clients);

    let fabric = LoopbackFabric::new();
    let server = Worker::create(&fabric)?;
    server.start_progress()?;
    server.start_notifier()?;

    let mut handles = Vec::with_capacity(clients);
    for id in 0..clients {
        let (tx, rx) = mpsc::channel();
        let fabric = fabric.clone();
        handles.push(thread::spawn(move || client(fabric, id, rx)));
        tx.send(server.address().clone()).map_err(|_| tagrelay::Error::WorkerClosed)?;
    }

    let bindings = rendezvous::gather_clients_blocking(&server, clients)?;
    println!("gathered {} clients", bindings.len());

    let payload: Vec<i64> = (0..VALUES as i64).collect();
    let mut endpoints = Vec::with_capacity(bindings.len());
    let mut replies = Vec::with_capacity(bindings.len());
    for b in &bindings {
        let ep = b.connect(&server, EndpointOptions::default())?;
        replies.push(server.tag_recv(vec![0u8; VALUES * 8], b.tags.recv));
        ep.tag_send(encode(&payload), b.tags.send, true).wait()?;
        endpoints.push(ep);
    }

    for (b, r) in bindings.iter().zip(replies) {
        let values = decode(r.wait_timeout(DEADLINE)?.data());
        println!("{} -> {:?}", b.address, values);
    }

    // Release the clients.
    for (b, ep) in bindings.iter().zip(&endpoints) {
        ep.tag_send(vec![0], b.tags.send, true).wait()?;
    }

    for h in handles {
        match h.join() {
            Ok(r) => r?,
            Err(_) => tracing::warn!("client thread panicked"),
        }
    }
    println!("\n=== Example Complete ===");
    Ok(())
}
