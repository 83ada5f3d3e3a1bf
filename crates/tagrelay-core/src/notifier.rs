//! Wake-up abstraction.
//!
//! A `Notifier` carries one bit of information: "something may be ready,
//! go look". It is used twice in tagrelay:
//!
//! - the worker's activity notifier wakes an idle progress thread when an
//!   operation is submitted or a peer delivers something;
//! - the request notifier wakes the notifier thread when the progress
//!   thread has resolved requests whose wakers must be fired.
//!
//! # Implementors
//!
//! - `EventFdNotifier` (Linux): eventfd counter, `poll(2)` to wait.
//! - `CondvarNotifier` (fallback): mutex + condition variable.

use std::time::Instant;

use crate::error::Result;

/// Coalescing wake-up signal.
///
/// **Contract:**
/// - `notify()` must NEVER block.
/// - Multiple `notify()` calls before a `wait()` are coalesced into one
///   wakeup.
/// - A `notify()` that happens before `wait()` is not lost: the next
///   `wait()` returns immediately.
pub trait Notifier: Send + Sync {
    /// Signal that there may be work.
    fn notify(&self) -> Result<()>;

    /// Block until signalled or until `deadline` passes.
    ///
    /// Returns `Ok(true)` if a signal was consumed, `Ok(false)` on timeout.
    /// `None` waits without a deadline.
    fn wait(&self, deadline: Option<Instant>) -> Result<bool>;
}
