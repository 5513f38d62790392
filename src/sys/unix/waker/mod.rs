//! A cross-thread wakeup source for the poller, backed by `eventfd` on
//! Linux/Android and a non-blocking self-pipe on the kqueue family.
//!
//! One internal type per backend, registered like any other descriptor,
//! read to quiescence on wakeup so it never falsely reports ready twice.

#[cfg(any(target_os = "linux", target_os = "android"))]
mod eventfd;
#[cfg(any(target_os = "linux", target_os = "android"))]
use self::eventfd::WakerInternal;

#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "ios",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd",
))]
mod pipe;
#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "ios",
    target_os = "macos",
    target_os = "netbsd",
    target_os = "openbsd",
))]
use self::pipe::WakerInternal;

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

#[derive(Debug)]
pub(crate) struct Waker {
    inner: WakerInternal,
}

impl Waker {
    pub(crate) fn new() -> io::Result<Waker> {
        Ok(Waker {
            inner: WakerInternal::new()?,
        })
    }

    pub(crate) fn wake(&self) -> io::Result<()> {
        self.inner.wake()
    }

    /// Called once the waker's descriptor is reported readable, to drain
    /// it back to empty so the next edge is reported again.
    pub(crate) fn ack(&self) -> io::Result<()> {
        self.inner.drain()
    }
}

impl AsRawFd for Waker {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}
