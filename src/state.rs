//! Per-descriptor state.

use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use crate::request::Request;

/// `conn_id` is the identity key into the loop's `idents` table, kept here
/// only so release can clean that table up — holding a live [`crate::conn::Conn`]
/// here would be the same mistake as holding one on [`Request`]: the
/// descriptor table is permanent internal state, not something a user
/// handle's liveness should ever depend on.
pub(crate) struct DescState<Ctx> {
    pub ident: RawFd,
    pub conn_id: usize,
    pub readers: VecDeque<Request<Ctx>>,
    pub writers: VecDeque<Request<Ctx>>,
    /// Most recent edge reported by the poller that has not yet been fully
    /// consumed by an attempted transfer.
    pub readable: bool,
    pub writable: bool,
}

impl<Ctx> DescState<Ctx> {
    pub(crate) fn new(ident: RawFd, conn_id: usize) -> DescState<Ctx> {
        DescState {
            ident,
            conn_id,
            readers: VecDeque::new(),
            writers: VecDeque::new(),
            readable: false,
            writable: false,
        }
    }

    /// All requests outstanding on this descriptor, both directions, in no
    /// particular cross-direction order — used when releasing a
    /// descriptor, which discards them without completions.
    pub(crate) fn drain_all(&mut self) -> Vec<Request<Ctx>> {
        let mut all: Vec<Request<Ctx>> = self.readers.drain(..).collect();
        all.extend(self.writers.drain(..));
        all
    }
}
