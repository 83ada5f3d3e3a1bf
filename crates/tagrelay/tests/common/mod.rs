#![allow(dead_code)]

use std::sync::mpsc;
use std::time::Duration;

use tagrelay::{Endpoint, EndpointOptions, Listener, Worker, WorkerConfig};
use tagrelay_module::LoopbackFabric;
use tracing_subscriber::EnvFilter;

pub const DEADLINE: Duration = Duration::from_secs(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn worker(fabric: &LoopbackFabric) -> Worker {
    let w = Worker::with_config(fabric, WorkerConfig::new()).expect("create worker");
    w.start_progress().expect("start progress");
    w
}

/// A server and a client connected through a listener.
pub struct Pair {
    pub client_ep: Endpoint,
    pub server_ep: Endpoint,
    pub listener: Listener,
    pub client: Worker,
    pub server: Worker,
    pub fabric: LoopbackFabric,
}

pub fn connect_pair(server_opts: EndpointOptions, client_opts: EndpointOptions) -> Pair {
    let fabric = LoopbackFabric::new();
    let server = worker(&fabric);
    let client = worker(&fabric);

    let (tx, rx) = mpsc::channel();
    let listener = server
        .create_listener(0, move |req| {
            let ep = req.accept(server_opts).expect("accept");
            let _ = tx.send(ep);
        })
        .expect("listen");

    let client_ep = client.create_endpoint(listener.address(), client_opts).expect("dial");
    let server_ep = rx.recv_timeout(DEADLINE).expect("listener never accepted");
    Pair { client_ep, server_ep, listener, client, server, fabric }
}

pub fn i64_bytes(values: &[i64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn bytes_i64(bytes: &[u8]) -> Vec<i64> {
    bytes
        .chunks_exact(8)
        .map(|c| i64::from_le_bytes(c.try_into().unwrap_or([0; 8])))
        .collect()
}
