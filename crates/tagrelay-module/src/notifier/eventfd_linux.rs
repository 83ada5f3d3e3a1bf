//! `EventFdNotifier`: default `Notifier` on Linux.
//!
//! Coalescing comes for free from eventfd counter semantics: any number of
//! `notify()` calls before a read collapse into one readable state, and one
//! read resets the counter to zero.

use std::os::unix::io::RawFd;
use std::time::Instant;

use nix::errno::Errno;
use tagrelay_core::error::{Error, Result};
use tagrelay_core::Notifier;

pub struct EventFdNotifier {
    fd: RawFd,
}

impl EventFdNotifier {
    /// Create a new non-blocking eventfd. Closed on Drop.
    pub fn create() -> Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(Error::Os(Errno::last() as i32));
        }
        Ok(Self { fd })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Consume the counter. `Ok(false)` if nothing was pending.
    fn drain(&self) -> Result<bool> {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd,
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            return match Errno::last() {
                Errno::EAGAIN => Ok(false),
                e => Err(Error::Os(e as i32)),
            };
        }
        Ok(true)
    }
}

impl Notifier for EventFdNotifier {
    fn notify(&self) -> Result<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let errno = Errno::last();
            // Counter would overflow: a signal is already pending.
            if errno == Errno::EAGAIN {
                return Ok(());
            }
            return Err(Error::Os(errno as i32));
        }
        Ok(())
    }

    fn wait(&self, deadline: Option<Instant>) -> Result<bool> {
        loop {
            if self.drain()? {
                return Ok(true);
            }

            let timeout_ms: libc::c_int = match deadline {
                None => -1,
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(false);
                    }
                    // Round up so a sub-millisecond remainder still sleeps.
                    let us = (d - now).as_micros();
                    us.div_ceil(1000).min(libc::c_int::MAX as u128) as libc::c_int
                }
            };

            let mut pfd = libc::pollfd { fd: self.fd, events: libc::POLLIN, revents: 0 };
            let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if ret < 0 {
                match Errno::last() {
                    Errno::EINTR => continue,
                    e => return Err(Error::Os(e as i32)),
                }
            }
            if ret == 0 {
                return self.drain();
            }
        }
    }
}

impl Drop for EventFdNotifier {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd); }
            self.fd = -1;
        }
    }
}
