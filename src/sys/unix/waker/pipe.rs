use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::UnixStream;

use super::super::cvt;

/// Waker backed by a connected, non-blocking pipe, for kqueue platforms
/// that have no `eventfd` equivalent.
#[derive(Debug)]
pub(crate) struct WakerInternal {
    reader: UnixStream,
    writer: UnixStream,
}

impl WakerInternal {
    pub(crate) fn new() -> io::Result<WakerInternal> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        set_cloexec(reader.as_raw_fd())?;
        set_cloexec(writer.as_raw_fd())?;
        Ok(WakerInternal { reader, writer })
    }

    pub(crate) fn wake(&self) -> io::Result<()> {
        match (&self.writer).write(&[1]) {
            Ok(_) => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn drain(&self) -> io::Result<()> {
        let mut buf = [0u8; 64];
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }
}

impl AsRawFd for WakerInternal {
    fn as_raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) })?;
    Ok(())
}
