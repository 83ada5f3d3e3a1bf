//! Platform notifiers.
//!
//! `PlatformNotifier` is the most efficient `Notifier` available on the
//! target: an eventfd on Linux, a mutex + condvar elsewhere.

use std::sync::Arc;

use tagrelay_core::Notifier;

mod condvar;
pub use condvar::CondvarNotifier;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod eventfd_linux;
        pub use eventfd_linux::EventFdNotifier;
        pub use eventfd_linux::EventFdNotifier as PlatformNotifier;
    } else {
        pub use condvar::CondvarNotifier as PlatformNotifier;
    }
}

/// Create a platform-appropriate notifier.
///
/// Falls back to `CondvarNotifier` if the platform primitive cannot be
/// created (e.g. fd exhaustion).
pub fn new_notifier() -> Arc<dyn Notifier> {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            match EventFdNotifier::create() {
                Ok(n) => Arc::new(n),
                Err(e) => {
                    tracing::warn!(error = %e, "eventfd unavailable, using condvar notifier");
                    Arc::new(CondvarNotifier::new())
                }
            }
        } else {
            Arc::new(CondvarNotifier::new())
        }
    }
}
