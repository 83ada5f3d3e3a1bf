//! Environment variable utilities
//!
//! Every tunable in tagrelay reads a `TAGRELAY_*` variable through these
//! helpers and falls back to a compiled-in default.
//!
//! ```ignore
//! use tagrelay_core::env::{env_get, env_get_bool, env_get_duration_us};
//!
//! let batch: usize = env_get("TAGRELAY_MAX_BATCH", 64);
//! let eh: bool = env_get_bool("TAGRELAY_ERROR_HANDLING", true);
//! let idle = env_get_duration_us("TAGRELAY_IDLE_WAIT_US", Duration::from_micros(500));
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as type T, or return default.
///
/// Unset and unparseable values both yield the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean.
///
/// "1", "true", "yes", "on" are true; "0", "false", "no", "off" are false
/// (case-insensitive). Anything else, including unset, returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses, `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Duration given in microseconds.
pub fn env_get_duration_us(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key).map(Duration::from_micros).unwrap_or(default)
}

/// Duration given in milliseconds.
pub fn env_get_duration_ms(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key).map(Duration::from_millis).unwrap_or(default)
}

// ============================================================================
// Tests
// ============================================================================
