//! Connection identity and the descriptor duplicator.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Weak};

use crate::error::WatcherError;
use crate::sys::Poller;

/// Object-safe stand-in for `AsRawFd` so `Conn` can hold any user socket
/// type behind one non-generic handle, erasing the concrete type behind a
/// trait object at the registration seam.
pub(crate) trait RawSource: Send + Sync {
    fn as_raw_fd(&self) -> RawFd;
}

impl<T: AsRawFd + Send + Sync> RawSource for T {
    fn as_raw_fd(&self) -> RawFd {
        AsRawFd::as_raw_fd(self)
    }
}

struct ConnState {
    source: Box<dyn RawSource>,
    gc_tx: Sender<usize>,
    poller: Arc<Poller>,
}

impl Drop for ConnState {
    fn drop(&mut self) {
        // `self` is still live memory at this point, so its address is a
        // stable stand-in for the identity that is about to vanish — the
        // Rust stand-in for a finalizer callback: the last strong `Conn`
        // going away posts this address to the loop's GC channel. The
        // channel alone doesn't do anything until the loop's blocking wait
        // wakes up to look at it, so this also pokes the waker the same way
        // a submission does.
        let id = self as *const ConnState as usize;
        let _ = self.gc_tx.send(id);
        let _ = self.poller.wake();
    }
}

/// A connection handle registered with a [`crate::Handle`].
///
/// `Conn` owns the user's socket for the rest of its lifetime: submitting
/// it hands the watcher sole authority over the descriptor, so the user's
/// original socket is no longer directly reachable — all I/O happens on a
/// duplicate made at registration time, and the caller interacts only
/// through this handle's pointer identity, which is exactly what
/// submissions and completions key on.
///
/// Cloning `Conn` is cheap and shares identity: all clones compare equal
/// under [`Conn::id`]. Only the user's own clones are strong; everywhere
/// the watcher's internal state needs to refer to a connection (a
/// descriptor's per-FIFO requests, the descriptor table itself) it holds a
/// [`WeakConn`] instead. That is deliberate: if the loop's own bookkeeping
/// kept a strong `Conn` alive, the user dropping every handle they hold
/// would never make the strong count reach zero, the `Drop` impl above
/// would never run, and a forgotten connection would keep its descriptor
/// open forever — precisely the failure mode the GC sweep exists to
/// prevent. `WeakConn::upgrade` is used to hand a live `Conn` back to the
/// user in a completion; if a connection was reclaimed in the same instant
/// its last transfer finished, the upgrade fails and that completion is
/// dropped instead of delivered, the same way a `Free`-cancelled request
/// is.
#[derive(Clone)]
pub struct Conn(pub(crate) Arc<ConnState>);

impl Conn {
    pub(crate) fn new<T>(source: T, gc_tx: Sender<usize>, poller: Arc<Poller>) -> Conn
    where
        T: AsRawFd + Send + Sync + 'static,
    {
        Conn(Arc::new(ConnState {
            source: Box::new(source),
            gc_tx,
            poller,
        }))
    }

    /// Stable pointer-identity key: the address of the shared inner state.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// A non-owning reference that does not keep the connection alive.
    pub(crate) fn downgrade(&self) -> WeakConn {
        WeakConn(Arc::downgrade(&self.0))
    }

    fn raw_fd(&self) -> RawFd {
        self.0.source.as_raw_fd()
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn").field("id", &self.id()).finish()
    }
}

impl PartialEq for Conn {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl Eq for Conn {}

impl std::hash::Hash for Conn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state)
    }
}

/// A non-owning reference to a [`Conn`], used everywhere internal watcher
/// state needs to track a connection's identity without keeping it alive.
/// See [`Conn`]'s docs for why holding a strong reference here would be a
/// bug.
#[derive(Clone)]
pub(crate) struct WeakConn(Weak<ConnState>);

impl WeakConn {
    /// Recovers a strong handle if at least one other `Conn` is still
    /// live.
    pub(crate) fn upgrade(&self) -> Option<Conn> {
        self.0.upgrade().map(Conn)
    }
}

/// Duplicates the connection's underlying descriptor into one the watcher
/// exclusively owns, and puts the duplicate in non-blocking mode.
///
/// Uses `F_DUPFD_CLOEXEC` rather than a bare `dup(2)` so the duplicate is
/// close-on-exec from the instant it is created, with no window for a
/// concurrent `fork` to leak it into a child process.
pub(crate) fn duplicate(conn: &Conn) -> Result<RawFd, WatcherError> {
    let fd = conn.raw_fd();
    // `AsRawFd` gives no static guarantee the returned value is an open
    // descriptor — a negative value means the handle doesn't actually
    // expose one to duplicate, which is the one case this crate's type
    // signature can't rule out at compile time.
    if fd < 0 {
        return Err(WatcherError::Unsupported);
    }
    let new_fd = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if new_fd == -1 {
        return Err(WatcherError::NoRawConn(io::Error::last_os_error()));
    }
    let flags = unsafe { libc::fcntl(new_fd, libc::F_GETFL) };
    if flags == -1 || unsafe { libc::fcntl(new_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1
    {
        let err = io::Error::last_os_error();
        unsafe { libc::close(new_fd) };
        return Err(WatcherError::NoRawConn(err));
    }
    Ok(new_fd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct NoFd;

    impl AsRawFd for NoFd {
        fn as_raw_fd(&self) -> RawFd {
            -1
        }
    }

    #[test]
    fn duplicate_rejects_a_handle_with_no_raw_descriptor() {
        let poller = Arc::new(crate::sys::Poller::open().expect("open poller"));
        let (gc_tx, _gc_rx) = mpsc::channel();
        let conn = Conn::new(NoFd, gc_tx, poller);

        let err = duplicate(&conn).unwrap_err();
        assert_eq!(err, WatcherError::Unsupported);
    }
}
