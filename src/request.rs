//! Request records.

use std::time::Instant;

use crate::conn::WeakConn;

/// Operation kind a [`Request`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
    /// Synthetic request that releases a descriptor and cancels every
    /// request outstanding on it.
    Free,
}

/// Which per-descriptor FIFO a request belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Read,
    Write,
}

/// The buffer a request was submitted with.
pub(crate) enum ReqBuf {
    /// The caller's own buffer (always non-empty for `Write`; may be
    /// non-empty or absent for `Read`).
    Owned(Vec<u8>),
    /// A `Read` submitted with no buffer: the watcher lends a swap buffer
    /// at I/O time.
    WantSwap,
}

/// An immutable submission descriptor with the mutable progress fields
/// the loop needs layered on top.
///
/// `conn` is held weakly, not strongly: a `Request` sitting in a
/// per-descriptor FIFO must never be the reason a connection's last
/// reference fails to drop, or the GC sweep that is supposed to reclaim
/// forgotten connections with outstanding requests could never fire. See
/// `Conn`'s docs for the full reasoning.
pub(crate) struct Request<Ctx> {
    pub id: u64,
    pub op: Op,
    pub ctx: Option<Ctx>,
    pub conn: WeakConn,
    pub buf: ReqBuf,
    /// Bytes transferred so far; used by the partial-write algorithm and
    /// reported as the final byte count on completion.
    pub progress: usize,
    pub deadline: Option<Instant>,
}

impl<Ctx> Request<Ctx> {
    pub(crate) fn direction(&self) -> Direction {
        match self.op {
            Op::Read => Direction::Read,
            Op::Write => Direction::Write,
            Op::Free => unreachable!("Free requests never enter a per-descriptor FIFO"),
        }
    }
}
