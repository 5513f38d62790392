//! Completion-result batcher and the value type returned to the consumer.

use crate::buf::SwapSlice;
use crate::conn::Conn;
use crate::error::WatcherError;
use crate::request::Op;

/// One buffer, either the caller's own or a lent swap buffer. A swap
/// buffer must be consumed before the next call to `wait_io` — see
/// `SwapSlice`.
#[derive(Debug)]
pub enum CompletionBuf {
    Owned(Vec<u8>),
    Swap(SwapSlice),
}

impl std::ops::Deref for CompletionBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            CompletionBuf::Owned(v) => v,
            CompletionBuf::Swap(s) => s,
        }
    }
}

/// One element of a completion batch.
#[derive(Debug)]
pub struct Completion<Ctx> {
    pub op: Op,
    pub ctx: Ctx,
    pub conn: Conn,
    pub buf: CompletionBuf,
    pub size: usize,
    pub err: Option<WatcherError>,
}

/// A unit of delivery on the completion channel: one or more results
/// produced by a single loop iteration.
pub type Batch<Ctx> = Vec<Completion<Ctx>>;

/// Accumulates completions for the batch currently under construction and
/// flushes it down the completion channel.
///
/// Just a `Vec` that the loop fills and periodically hands off, replacing
/// itself with a fresh empty one so the consumer's batch is never mutated
/// after it has been sent.
pub(crate) struct Batcher<Ctx> {
    current: Batch<Ctx>,
}

impl<Ctx> Batcher<Ctx> {
    pub(crate) fn new() -> Batcher<Ctx> {
        Batcher {
            current: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, completion: Completion<Ctx>) {
        self.current.push(completion);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Takes the accumulated batch, leaving a fresh empty one behind.
    pub(crate) fn take(&mut self) -> Batch<Ctx> {
        std::mem::take(&mut self.current)
    }
}
