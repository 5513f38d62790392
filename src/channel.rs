//! Submission plumbing: the pending list submitters append to under a
//! mutex, and the bounded completion channel `wait_io` blocks on.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use crate::conn::Conn;
use crate::request::{Op, ReqBuf};

/// What a submitter hands to the loop before it has been assigned a
/// request id or joined a per-descriptor FIFO.
pub(crate) struct Submission<Ctx> {
    pub op: Op,
    pub ctx: Option<Ctx>,
    pub conn: Conn,
    pub buf: ReqBuf,
    pub deadline: Option<Instant>,
}

/// The pending list: appended to under a mutex by any number of submitter
/// threads, drained wholesale by the loop in one step.
pub(crate) struct PendingList<Ctx> {
    queue: Mutex<VecDeque<Submission<Ctx>>>,
}

impl<Ctx> PendingList<Ctx> {
    pub(crate) fn new() -> PendingList<Ctx> {
        PendingList {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push(&self, submission: Submission<Ctx>) {
        self.queue.lock().unwrap().push_back(submission);
    }

    /// Swaps the whole pending list out, leaving an empty one behind.
    pub(crate) fn drain(&self) -> VecDeque<Submission<Ctx>> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }
}

/// Completion channel capacity. `0` makes every send a rendezvous with the
/// next `wait_io` call, which is what gives the backpressure guarantee its
/// teeth: the loop makes zero further I/O progress until a consumer is
/// actually there to receive.
pub(crate) type CompletionSender<Ctx> = std::sync::mpsc::SyncSender<crate::batch::Batch<Ctx>>;
pub(crate) type CompletionReceiver<Ctx> = std::sync::mpsc::Receiver<crate::batch::Batch<Ctx>>;

pub(crate) fn completion_channel<Ctx>(
    capacity: usize,
) -> (CompletionSender<Ctx>, CompletionReceiver<Ctx>) {
    std::sync::mpsc::sync_channel(capacity)
}
