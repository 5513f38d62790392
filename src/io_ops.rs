//! The read and write transfer attempts the event loop drives per tick.

use std::io;
use std::os::unix::io::RawFd;

use crate::buf::{with_mut_slice, SwapPool, SwapSlice};
use crate::error::WatcherError;
use crate::request::{ReqBuf, Request};

/// Outcome of one attempt to advance a request's transfer.
pub(crate) enum Attempt {
    /// Kernel reported `EAGAIN`/`EWOULDBLOCK`; caller should clear the
    /// readiness bit and wait for the next edge.
    WouldBlock,
    /// The request is finished — successfully, with an error, or via clean
    /// EOF. `swap` is set when a lent swap buffer backed this completion
    /// (reads only), which is the signal the event loop uses to flush the
    /// current batch immediately instead of letting a later read overwrite
    /// the buffer before the consumer has seen it.
    Done {
        n: usize,
        err: Option<WatcherError>,
        eof: bool,
        swap: Option<SwapSlice>,
    },
}

/// Selects a buffer (the request's own, or a lent swap buffer), reads in
/// a loop retrying on `EINTR`, and reports would-block / done.
pub(crate) fn try_read<Ctx>(ident: RawFd, req: &mut Request<Ctx>, pool: &mut SwapPool) -> Attempt {
    loop {
        let result = match &mut req.buf {
            ReqBuf::Owned(buf) => raw_read(ident, buf),
            ReqBuf::WantSwap => {
                let swap_buf = pool.current();
                let n = with_mut_slice(&swap_buf, |slice| raw_read(ident, slice));
                n.map(|n| (n, Some(swap_buf)))
            }
        };

        let (n, swap_buf) = match result {
            Ok((n, swap_buf)) => (n, swap_buf),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Attempt::WouldBlock,
            Err(e) => {
                return Attempt::Done {
                    n: 0,
                    err: Some(WatcherError::Io(e)),
                    eof: false,
                    swap: None,
                }
            }
        };

        if let Some(swap_buf) = swap_buf {
            pool.rotate();
            let slice = SwapSlice::new(swap_buf, n);
            return Attempt::Done {
                n,
                err: None,
                eof: n == 0,
                swap: Some(slice),
            };
        }

        return Attempt::Done {
            n,
            err: None,
            eof: n == 0,
            swap: None,
        };
    }
}

fn raw_read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Partial-safe write. Advances `req.progress` on every successful call;
/// only reports `Done` once the whole buffer has drained.
pub(crate) fn try_write<Ctx>(ident: RawFd, req: &mut Request<Ctx>) -> Attempt {
    let buf = match &req.buf {
        ReqBuf::Owned(buf) => buf,
        ReqBuf::WantSwap => unreachable!("Write always carries its own buffer"),
    };
    loop {
        let remaining = &buf[req.progress..];
        debug_assert!(!remaining.is_empty(), "empty buffer rejected at submission");
        let n = unsafe {
            libc::write(
                ident,
                remaining.as_ptr() as *const libc::c_void,
                remaining.len(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => Attempt::WouldBlock,
                _ => Attempt::Done {
                    n: req.progress,
                    err: Some(WatcherError::Io(err)),
                    eof: false,
                    swap: None,
                },
            };
        }
        req.progress += n as usize;
        if req.progress == buf.len() {
            return Attempt::Done {
                n: req.progress,
                err: None,
                eof: false,
                swap: None,
            };
        }
        // A successful but partial write returns "not yet" rather than
        // immediately retrying the syscall — the request waits for the next
        // writable edge even if the kernel might still accept more right now.
        return Attempt::WouldBlock;
    }
}
