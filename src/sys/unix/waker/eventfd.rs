use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use super::super::cvt;

/// Waker backed by `eventfd`: an 8-byte native-endian counter, non-blocking
/// and close-on-exec.
#[derive(Debug)]
pub(crate) struct WakerInternal {
    fd: File,
}

impl WakerInternal {
    pub(crate) fn new() -> io::Result<WakerInternal> {
        let fd = cvt(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) })?;
        Ok(WakerInternal {
            fd: unsafe { File::from_raw_fd(fd) },
        })
    }

    pub(crate) fn wake(&self) -> io::Result<()> {
        let buf: [u8; 8] = 1u64.to_ne_bytes();
        match (&self.fd).write(&buf) {
            Ok(_) => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                self.drain()?;
                self.wake()
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) fn drain(&self) -> io::Result<()> {
        let mut buf = [0u8; 8];
        match (&self.fd).read(&mut buf) {
            Ok(_) => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl AsRawFd for WakerInternal {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
