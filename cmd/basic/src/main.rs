//! Basic tagrelay example
//!
//! Two workers on one in-process fabric, no background threads: the
//! caller drives progress itself and spins on `is_ready()`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG=debug` - log filter (error, warn, info, debug, trace)
//! - `TAGRELAY_*` - worker configuration, see `WorkerConfig::from_env`

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tagrelay::{Endpoint, EndpointOptions, Request, Tag, Worker};
use tagrelay_module::LoopbackFabric;
use tracing_subscriber::EnvFilter;

// RUST_LOG=debug cargo run -p tagrelay-basic
fn main() -> tagrelay::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    println!("=== tagrelay Basic Example ===\n");

    let fabric = LoopbackFabric::new();
    let server = Worker::create(&fabric)?;
    let client = Worker::create(&fabric)?;
    println!("server worker: {}", server.address());
    println!("client worker: {}", client.address());

    // The callback keeps accepted endpoints alive by stashing them.
    let accepted: Arc<Mutex<Vec<Endpoint>>> = Arc::new(Mutex::new(Vec::new()));
    let stash = Arc::clone(&accepted);
    let listener = server.create_listener(0, move |req| {
        tracing::info!(peer = %req.peer(), "accepting connection");
        let opts = req.default_options();
        match req.accept(opts) {
            Ok(ep) => stash.lock().unwrap_or_else(|e| e.into_inner()).push(ep),
            Err(e) => tracing::warn!(error = %e, "accept failed"),
        }
    })?;
    println!("listening on {}", listener.address());

    let ep = client.create_endpoint(listener.address(), EndpointOptions::default())?;
    let workers = [&server, &client];

    let deadline = Instant::now() + Duration::from_secs(10);
    while accepted.lock().unwrap_or_else(|e| e.into_inner()).is_empty() {
        if Instant::now() > deadline {
            println!("WARNING: Timeout waiting for accept!");
            return Err(tagrelay::Error::Timeout);
        }
        drive(&workers);
    }
    let server_ep = accepted.lock().unwrap_or_else(|e| e.into_inner()).remove(0);

    let recv = server_ep.tag_recv(vec![0u8; 3], Tag(0), false);
    let send = ep.tag_send(vec![1, 2, 3], Tag(0), false);
    spin(&workers, &send, deadline)?;
    spin(&workers, &recv, deadline)?;

    let sent = send.wait()?;
    let got = recv.wait()?;
    println!("sent {} bytes, received {:?}", sent.len, got.data());

    let close = ep.close();
    spin(&workers, &close, deadline)?;
    close.wait()?;
    println!("\n=== Example Complete ===");
    Ok(())
}

fn drive(workers: &[&Worker]) {
    for w in workers {
        w.progress();
    }
}

fn spin(workers: &[&Worker], req: &Request, deadline: Instant) -> tagrelay::Result<()> {
    while !req.is_ready() {
        if Instant::now() > deadline {
            return Err(tagrelay::Error::Timeout);
        }
        drive(workers);
    }
    Ok(())
}
