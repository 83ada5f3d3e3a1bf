//! Condvar notifier (portable fallback)

use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tagrelay_core::error::Result;
use tagrelay_core::Notifier;

/// Mutex + condvar notifier. The flag is the pending wake.
pub struct CondvarNotifier {
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl CondvarNotifier {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }
}

impl Default for CondvarNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for CondvarNotifier {
    fn notify(&self) -> Result<()> {
        {
            let mut guard = self.pending.lock();
            *guard = true;
        }
        self.condvar.notify_one();
        Ok(())
    }

    fn wait(&self, deadline: Option<Instant>) -> Result<bool> {
        let mut guard = self.pending.lock();
        loop {
            if *guard {
                *guard = false;
                return Ok(true);
            }
            match deadline {
                Some(d) => {
                    if self.condvar.wait_until(&mut guard, d).timed_out() {
                        let woke = *guard;
                        *guard = false;
                        return Ok(woke);
                    }
                }
                None => self.condvar.wait(&mut guard),
            }
        }
    }
}
