//! Worker configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! ```rust,ignore
//! use tagrelay::config::WorkerConfig;
//!
//! // Defaults with env overrides
//! let config = WorkerConfig::from_env();
//!
//! // Or customize programmatically
//! let config = WorkerConfig::from_env()
//!     .max_batch(16)
//!     .idle_wait(Duration::from_micros(200));
//! ```

pub mod defaults;

use std::time::Duration;

use tagrelay_core::env::{env_get, env_get_bool, env_get_duration_ms, env_get_duration_us, env_get_opt};
use tagrelay_core::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Submissions handed to the transport per progress tick
    pub max_batch: usize,
    /// Transport events handled per progress tick
    pub max_events: usize,
    /// Idle wait of the progress thread
    pub idle_wait: Duration,
    /// Notifier thread wait between drains
    pub notifier_wait: Duration,
    /// Error-handling mode for endpoints whose options leave it unset
    pub error_handling: bool,
    /// Progress thread name
    pub progress_thread_name: String,
    /// Notifier thread name
    pub notifier_thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl WorkerConfig {
    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `TAGRELAY_MAX_BATCH` - submissions per tick
    /// - `TAGRELAY_MAX_EVENTS` - events per tick
    /// - `TAGRELAY_IDLE_WAIT_US` - progress idle wait in microseconds
    /// - `TAGRELAY_NOTIFIER_WAIT_MS` - notifier wait in milliseconds
    /// - `TAGRELAY_ERROR_HANDLING` - default endpoint error handling (0/1)
    /// - `TAGRELAY_THREAD_PREFIX` - prefix for thread names
    pub fn from_env() -> Self {
        let prefix: Option<String> = env_get_opt("TAGRELAY_THREAD_PREFIX");
        let name = |suffix: &str, default: &str| match &prefix {
            Some(p) => format!("{}-{}", p, suffix),
            None => default.to_string(),
        };
        Self {
            max_batch: env_get("TAGRELAY_MAX_BATCH", defaults::MAX_BATCH),
            max_events: env_get("TAGRELAY_MAX_EVENTS", defaults::MAX_EVENTS),
            idle_wait: env_get_duration_us(
                "TAGRELAY_IDLE_WAIT_US",
                Duration::from_micros(defaults::IDLE_WAIT_US),
            ),
            notifier_wait: env_get_duration_ms(
                "TAGRELAY_NOTIFIER_WAIT_MS",
                Duration::from_millis(defaults::NOTIFIER_WAIT_MS),
            ),
            error_handling: env_get_bool("TAGRELAY_ERROR_HANDLING", defaults::ERROR_HANDLING),
            progress_thread_name: name("progress", defaults::PROGRESS_THREAD_NAME),
            notifier_thread_name: name("notifier", defaults::NOTIFIER_THREAD_NAME),
        }
    }

    /// Defaults only, no env override.
    pub fn new() -> Self {
        Self {
            max_batch: defaults::MAX_BATCH,
            max_events: defaults::MAX_EVENTS,
            idle_wait: Duration::from_micros(defaults::IDLE_WAIT_US),
            notifier_wait: Duration::from_millis(defaults::NOTIFIER_WAIT_MS),
            error_handling: defaults::ERROR_HANDLING,
            progress_thread_name: defaults::PROGRESS_THREAD_NAME.to_string(),
            notifier_thread_name: defaults::NOTIFIER_THREAD_NAME.to_string(),
        }
    }

    // Builder methods

    pub fn max_batch(mut self, n: usize) -> Self {
        self.max_batch = n;
        self
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    pub fn idle_wait(mut self, d: Duration) -> Self {
        self.idle_wait = d;
        self
    }

    pub fn notifier_wait(mut self, d: Duration) -> Self {
        self.notifier_wait = d;
        self
    }

    pub fn error_handling(mut self, enable: bool) -> Self {
        self.error_handling = enable;
        self
    }

    pub fn thread_prefix(mut self, prefix: &str) -> Self {
        self.progress_thread_name = format!("{}-progress", prefix);
        self.notifier_thread_name = format!("{}-notifier", prefix);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch == 0 {
            return Err(Error::Resource("max_batch must be > 0".into()));
        }
        if self.max_events == 0 {
            return Err(Error::Resource("max_events must be > 0".into()));
        }
        if self.notifier_wait.is_zero() {
            return Err(Error::Resource("notifier_wait must be > 0".into()));
        }
        Ok(())
    }

    /// Endpoint options with this config's error-handling mode filled in.
    pub fn endpoint_options(&self) -> EndpointOptions {
        EndpointOptions { error_handling: Some(self.error_handling) }
    }
}

/// Per-endpoint options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointOptions {
    /// `Some(true)`: peer loss fails only this endpoint's requests.
    /// `Some(false)`: peer loss poisons the whole worker.
    /// `None`: use the owning worker's `WorkerConfig::error_handling`.
    pub error_handling: Option<bool>,
}

impl EndpointOptions {
    pub fn error_handling(mut self, enable: bool) -> Self {
        self.error_handling = Some(enable);
        self
    }

    /// The error-handling mode, falling back to `worker_default` when unset.
    pub fn resolve_error_handling(&self, worker_default: bool) -> bool {
        self.error_handling.unwrap_or(worker_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = WorkerConfig::new();
        assert_eq!(c.max_batch, defaults::MAX_BATCH);
        assert_eq!(c.max_events, defaults::MAX_EVENTS);
        assert!(c.error_handling);
        assert_eq!(c.progress_thread_name, "tagrelay-progress");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let c = WorkerConfig::new()
            .max_batch(8)
            .idle_wait(Duration::from_micros(10))
            .error_handling(false)
            .thread_prefix("srv");
        assert_eq!(c.max_batch, 8);
        assert_eq!(c.idle_wait, Duration::from_micros(10));
        assert_eq!(c.endpoint_options().error_handling, Some(false));
        assert_eq!(c.notifier_thread_name, "srv-notifier");
    }

    #[test]
    fn test_endpoint_options_fall_back_to_worker() {
        let unset = EndpointOptions::default();
        assert_eq!(unset.error_handling, None);
        assert!(!unset.resolve_error_handling(false));
        assert!(unset.resolve_error_handling(true));

        let explicit = EndpointOptions::default().error_handling(true);
        assert!(explicit.resolve_error_handling(false));
        assert!(!EndpointOptions::default().error_handling(false).resolve_error_handling(true));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        assert!(WorkerConfig::new().max_batch(0).validate().is_err());
        assert!(WorkerConfig::new().max_events(0).validate().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        // Only this test touches these variables.
        std::env::set_var("TAGRELAY_MAX_EVENTS", "7");
        std::env::set_var("TAGRELAY_NOTIFIER_WAIT_MS", "3");
        let c = WorkerConfig::from_env();
        std::env::remove_var("TAGRELAY_MAX_EVENTS");
        std::env::remove_var("TAGRELAY_NOTIFIER_WAIT_MS");
        assert_eq!(c.max_events, 7);
        assert_eq!(c.notifier_wait, Duration::from_millis(3));
    }
}
