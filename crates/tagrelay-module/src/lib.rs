//! # tagrelay-module: Default implementations
//!
//! One default implementation for every tagrelay-core trait.
//!
//! ## Default stack
//!
//! | Trait            | Default Impl       | Alternative                   |
//! |------------------|--------------------|-------------------------------|
//! | Notifier         | EventFdNotifier    | CondvarNotifier (non-Linux)   |
//! | TransportContext | LoopbackFabric     | (external transports)         |

pub mod notifier;
pub mod loopback;

pub use loopback::{LoopbackFabric, LoopbackWorker};
pub use notifier::{new_notifier, CondvarNotifier, PlatformNotifier};
