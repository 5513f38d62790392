//! Swap-buffer pool.
//!
//! Exactly two equal-size buffers, cursor-selected. The count of 2 only
//! works because of the eager-flush rule the event loop enforces: at most
//! one swap-buffer completion is ever outstanding (un-consumed by the
//! caller) at a time, so the loop never needs a third buffer to keep
//! filling while two are "in flight".

use std::cell::UnsafeCell;
use std::sync::Arc;

struct Buffer {
    data: UnsafeCell<Box<[u8]>>,
}

// SAFETY: all mutation happens on the event-loop thread, serialized by the
// eager-flush rule before any `SwapSlice` referencing this buffer can
// become visible to another thread. The only reads of `SwapSlice`'s
// contents happen on the consumer thread strictly after the batch
// containing it has been sent (and, for a bounded channel, accepted) on
// the completion channel, at which point the loop has already flushed and
// will not touch this slot again until the consumer's next `wait_io` call
// has had a chance to return. Violating the eager-flush invariant would
// make this an actual data race; see the event loop for where that's
// enforced.
unsafe impl Sync for Buffer {}

pub(crate) struct SwapPool {
    buffers: [Arc<Buffer>; 2],
    cursor: usize,
}

impl SwapPool {
    pub(crate) fn new(bufsize: usize) -> SwapPool {
        let make = || {
            Arc::new(Buffer {
                data: UnsafeCell::new(vec![0u8; bufsize].into_boxed_slice()),
            })
        };
        SwapPool {
            buffers: [make(), make()],
            cursor: 0,
        }
    }

    /// Returns the buffer the next swap-backed read should use, without
    /// rotating the cursor — the cursor only rotates once that read
    /// actually completes successfully, not on every attempt.
    pub(crate) fn current(&self) -> Arc<Buffer> {
        Arc::clone(&self.buffers[self.cursor])
    }

    pub(crate) fn rotate(&mut self) {
        self.cursor = (self.cursor + 1) % self.buffers.len();
    }
}

/// A byte range lent out of the swap pool, handed back to the caller as
/// part of a completion.
///
/// The caller must consume this before the next call to `wait_io`.
/// Nothing in the type system enforces that (the buffer is shared,
/// mutable, loop-owned memory) — this type documents the contract rather
/// than making violating it impossible.
#[derive(Clone)]
pub struct SwapSlice {
    buf: Arc<Buffer>,
    len: usize,
}

impl SwapSlice {
    pub(crate) fn new(buf: Arc<Buffer>, len: usize) -> SwapSlice {
        SwapSlice { buf, len }
    }
}

impl std::ops::Deref for SwapSlice {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: see the `unsafe impl Sync for Buffer` note above.
        unsafe { &(*self.buf.data.get())[..self.len] }
    }
}

impl std::fmt::Debug for SwapSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapSlice").field("len", &self.len).finish()
    }
}

/// Writes into a swap buffer for the duration of `f`, returning whatever
/// `f` returns. Kept separate from `SwapSlice` so the event loop (the only
/// writer) never goes through the shared `Deref` path.
pub(crate) fn with_mut_slice<R>(buf: &Arc<Buffer>, f: impl FnOnce(&mut [u8]) -> R) -> R {
    // SAFETY: only called from the event-loop thread, which is the sole
    // writer; see the invariant documented on `Buffer`.
    let slice = unsafe { &mut *buf.data.get() };
    f(slice)
}
