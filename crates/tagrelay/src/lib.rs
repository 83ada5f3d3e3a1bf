//! # tagrelay: tag-matched async messaging runtime
//!
//! Bridges a transport that completes operations by polling into both a
//! blocking and an async (`Future`) programming model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── application ────────────────────────────┐
//! │  Endpoint::tag_send / tag_recv / stream_* / close  ──►  Request     │
//! │          │                                               │  ▲       │
//! │          ▼ SegQueue + activity notify                    │  │ wake  │
//! ├──────────────────────────────────────────────────────────┼──┼───────┤
//! │  progress thread: submissions → TransportWorker → events ┘  │       │
//! │  notifier thread: queued wakers ────────────────────────────┘       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::{Arc, Mutex};
//! use tagrelay::{Endpoint, EndpointOptions, Tag, Worker};
//! use tagrelay_module::LoopbackFabric;
//!
//! let fabric = LoopbackFabric::new();
//! let server = Worker::create(&fabric)?;
//! server.start_progress()?;
//! // Dropping an accepted endpoint closes it, so keep it somewhere.
//! let accepted: Arc<Mutex<Vec<Endpoint>>> = Arc::default();
//! let stash = Arc::clone(&accepted);
//! let listener = server.create_listener(0, move |req| {
//!     if let Ok(ep) = req.accept(EndpointOptions::default()) {
//!         stash.lock().unwrap().push(ep);
//!     }
//! })?;
//!
//! let client = Worker::create(&fabric)?;
//! client.start_progress()?;
//! let ep = client.create_endpoint(listener.address(), EndpointOptions::default())?;
//! ep.tag_send(vec![1, 2, 3], Tag(0), false).wait()?;
//! ```

pub mod config;
pub mod request;
pub mod progress;
mod notifier;
mod worker;
mod endpoint;
mod listener;
pub mod rendezvous;

pub use config::{EndpointOptions, WorkerConfig};
pub use endpoint::Endpoint;
pub use listener::{ConnectionRequest, Listener};
pub use progress::Progress;
pub use request::{Completion, Request, RequestKind, RequestStatus};
pub use worker::Worker;

pub use tagrelay_core::{ClientTags, Error, ErrorKind, Result, ServerTags, Tag, WorkerAddress, FRAME_SIZE};
