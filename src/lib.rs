//! A proactor-style asynchronous I/O watcher for stream sockets.
//!
//! A user submits read or write requests naming a connection, a buffer, an
//! opaque context value, and an optional deadline. A single background
//! event loop waits on the kernel's readiness facility (epoll on
//! Linux/Android, kqueue on the BSD/macOS family), performs the transfer
//! once the descriptor is ready, and delivers finished requests in batches
//! through [`Watcher::wait_io`]. Callers never see a raw descriptor, never
//! poll readiness themselves, and never retry a would-block condition —
//! that is the event loop's job.
//!
//! ```no_run
//! use proactor_watch::Watcher;
//! use std::net::TcpStream;
//!
//! # fn main() -> std::io::Result<()> {
//! let watcher: Watcher<u64> = Watcher::new(64 * 1024)?;
//! let handle = watcher.handle();
//!
//! let stream = TcpStream::connect("127.0.0.1:9000")?;
//! let conn = handle.wrap(stream);
//!
//! handle.read(1, &conn, None).expect("submit read");
//! let batch = watcher.wait_io().expect("watcher still open");
//! for completion in batch {
//!     println!("read {} bytes, err={:?}", completion.size, completion.err);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Only Unix kernels exposing epoll or kqueue are supported. File I/O,
//! datagram sockets, cross-process descriptor transfer, and fairness
//! guarantees between connections are out of scope.

mod batch;
mod buf;
mod channel;
mod conn;
mod error;
mod heap;
mod io_ops;
mod request;
mod state;
mod sys;
mod watcher;

pub use batch::{Batch, Completion, CompletionBuf};
pub use buf::SwapSlice;
pub use conn::Conn;
pub use error::{Result, WatcherError};
pub use request::Op;
pub use watcher::{Handle, Watcher, WatcherBuilder};
