//! Library defaults for `WorkerConfig`.

/// Submissions moved from the queue to the transport per tick.
pub const MAX_BATCH: usize = 64;

/// Transport events handled per tick.
pub const MAX_EVENTS: usize = 128;

/// How long an idle progress thread waits on the activity notifier.
pub const IDLE_WAIT_US: u64 = 1000;

/// Upper bound on one notifier-thread wait between drains.
pub const NOTIFIER_WAIT_MS: u64 = 100;

/// Default error-handling mode of new endpoints.
pub const ERROR_HANDLING: bool = true;

pub const PROGRESS_THREAD_NAME: &str = "tagrelay-progress";
pub const NOTIFIER_THREAD_NAME: &str = "tagrelay-notifier";
