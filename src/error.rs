use std::io;

/// Errors returned by the submission façade and by completions.
///
/// These are the six distinct, comparable error identities the watcher can
/// report: three rejected synchronously at submission time, and three
/// delivered as part of a completion.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// The connection handle does not expose a raw descriptor the watcher
    /// can duplicate.
    #[error("connection does not expose a raw descriptor")]
    Unsupported,

    /// The descriptor duplication syscall itself failed.
    #[error("failed to duplicate the connection's raw descriptor: {0}")]
    NoRawConn(#[source] io::Error),

    /// Submitted after `Watcher::close` was called, or delivered by
    /// `wait_io` once the loop has shut down.
    #[error("watcher is closed")]
    WatcherClosed,

    /// The descriptor was released (peer error, EOF, `Free`, or GC) before
    /// or while this request was outstanding.
    #[error("connection closed")]
    ConnClosed,

    /// The request's deadline elapsed before the transfer completed.
    #[error("deadline exceeded")]
    DeadlineError,

    /// `Write` was submitted with an empty buffer.
    #[error("write submitted with an empty buffer")]
    EmptyBuffer,

    /// A kernel I/O error surfaced while performing the transfer.
    #[error("io error: {0}")]
    Io(#[source] io::Error),
}

impl PartialEq for WatcherError {
    fn eq(&self, other: &Self) -> bool {
        use WatcherError::*;
        match (self, other) {
            (Unsupported, Unsupported)
            | (WatcherClosed, WatcherClosed)
            | (ConnClosed, ConnClosed)
            | (DeadlineError, DeadlineError)
            | (EmptyBuffer, EmptyBuffer) => true,
            (NoRawConn(a), NoRawConn(b)) => a.kind() == b.kind(),
            (Io(a), Io(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}

impl Eq for WatcherError {}

pub type Result<T> = std::result::Result<T, WatcherError>;
