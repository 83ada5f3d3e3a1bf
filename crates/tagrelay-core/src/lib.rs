//! # tagrelay-core: Trait definitions and plain types for tagrelay
//!
//! This crate defines the boundaries every other tagrelay crate programs
//! against. It contains no threads and no platform code.
//!
//! ## Modules
//!
//! - `tag` - 64-bit matching tags, connection salting, random tag generation
//! - `address` - opaque worker address blob
//! - `frame` - the fixed-size address+tag rendezvous frame codec
//! - `transport` - the transport capability (`TransportContext`, `TransportWorker`)
//! - `notifier` - "activity may be pending" wake-up primitive
//! - `error` - error taxonomy shared by all crates
//! - `env` - environment variable helpers for configuration
//!
//! ## Design principle
//!
//! The transport is an external collaborator. The runtime in `tagrelay`
//! only ever sees `Box<dyn TransportWorker>`; swapping the transport is a
//! matter of passing a different `TransportContext` to `Worker::create`.

pub mod tag;
pub mod address;
pub mod frame;
pub mod transport;
pub mod notifier;
pub mod error;
pub mod env;

// Re-exports for convenience
pub use address::WorkerAddress;
pub use error::{Error, ErrorKind, Result};
pub use frame::{ClientTags, DecodedFrame, FrameError, ServerTags, FRAME_SIZE};
pub use notifier::Notifier;
pub use tag::Tag;
pub use transport::{
    ConnId, EndpointInfo, EpHandle, ListenerHandle, OpId, TransportContext, TransportEvent,
    TransportStatus, TransportWorker,
};
