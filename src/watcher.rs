//! The event loop and the two handles built around it: [`Handle`], the
//! cloneable submission façade, and [`Watcher`], the completion side that
//! owns the background loop thread.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, trace, warn};

use crate::batch::{Batch, Batcher, Completion, CompletionBuf};
use crate::buf::SwapPool;
use crate::channel::{completion_channel, PendingList, Submission};
use crate::conn::{duplicate, Conn};
use crate::error::{Result, WatcherError};
use crate::heap::DeadlineHeap;
use crate::io_ops::{try_read, try_write, Attempt};
use crate::request::{Direction, Op, ReqBuf, Request};
use crate::state::DescState;
use crate::sys::{self, Poller};

/// Configures a [`Watcher`] before construction.
#[derive(Debug, Clone)]
pub struct WatcherBuilder {
    swap_buffer_size: usize,
    completion_channel_capacity: usize,
}

impl Default for WatcherBuilder {
    fn default() -> WatcherBuilder {
        WatcherBuilder {
            swap_buffer_size: 4096,
            // Rendezvous by default: every send corresponds to exactly one
            // `wait_io` call, which is what gives the backpressure
            // guarantee its teeth.
            completion_channel_capacity: 0,
        }
    }
}

impl WatcherBuilder {
    pub fn new() -> WatcherBuilder {
        WatcherBuilder::default()
    }

    /// Size in bytes of each of the two swap buffers.
    pub fn swap_buffer_size(&mut self, size: usize) -> &mut Self {
        self.swap_buffer_size = size;
        self
    }

    /// Completion channel capacity. `0` (the default) makes every send a
    /// rendezvous with the next `wait_io` call.
    pub fn completion_channel_capacity(&mut self, capacity: usize) -> &mut Self {
        self.completion_channel_capacity = capacity;
        self
    }

    pub fn build<Ctx: Send + 'static>(&self) -> std::io::Result<Watcher<Ctx>> {
        Watcher::with_builder(self)
    }
}

pub(crate) struct Shared<Ctx> {
    poller: Arc<Poller>,
    pending: PendingList<Ctx>,
    closed: AtomicBool,
    gc_tx: Sender<usize>,
}

/// The cloneable submission façade. Cheap to clone and safe to share
/// across threads; many `Handle`s can submit against the one background
/// loop a [`Watcher`] owns.
#[derive(Clone)]
pub struct Handle<Ctx> {
    shared: Arc<Shared<Ctx>>,
}

impl<Ctx> Handle<Ctx> {
    /// Hands the watcher sole ownership of `stream`'s descriptor and
    /// returns the identity object submissions key on.
    pub fn wrap<T>(&self, stream: T) -> Conn
    where
        T: std::os::unix::io::AsRawFd + Send + Sync + 'static,
    {
        Conn::new(stream, self.shared.gc_tx.clone(), Arc::clone(&self.shared.poller))
    }

    pub fn read(&self, ctx: Ctx, conn: &Conn, buf: Option<Vec<u8>>) -> Result<()> {
        self.submit(Op::Read, ctx, conn, buf_or_swap(buf), None)
    }

    pub fn read_timeout(
        &self,
        ctx: Ctx,
        conn: &Conn,
        buf: Option<Vec<u8>>,
        deadline: Instant,
    ) -> Result<()> {
        self.submit(Op::Read, ctx, conn, buf_or_swap(buf), Some(deadline))
    }

    pub fn write(&self, ctx: Ctx, conn: &Conn, buf: Vec<u8>) -> Result<()> {
        if buf.is_empty() {
            return Err(WatcherError::EmptyBuffer);
        }
        self.submit(Op::Write, ctx, conn, ReqBuf::Owned(buf), None)
    }

    pub fn write_timeout(
        &self,
        ctx: Ctx,
        conn: &Conn,
        buf: Vec<u8>,
        deadline: Instant,
    ) -> Result<()> {
        if buf.is_empty() {
            return Err(WatcherError::EmptyBuffer);
        }
        self.submit(Op::Write, ctx, conn, ReqBuf::Owned(buf), Some(deadline))
    }

    /// Releases `conn`'s descriptor and discards every request outstanding
    /// on it without completions.
    pub fn free(&self, conn: &Conn) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(WatcherError::WatcherClosed);
        }
        self.shared.pending.push(Submission {
            op: Op::Free,
            ctx: None,
            conn: conn.clone(),
            buf: ReqBuf::WantSwap,
            deadline: None,
        });
        let _ = self.shared.poller.wake();
        Ok(())
    }

    fn submit(
        &self,
        op: Op,
        ctx: Ctx,
        conn: &Conn,
        buf: ReqBuf,
        deadline: Option<Instant>,
    ) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(WatcherError::WatcherClosed);
        }
        self.shared.pending.push(Submission {
            op,
            ctx: Some(ctx),
            conn: conn.clone(),
            buf,
            deadline,
        });
        let _ = self.shared.poller.wake();
        Ok(())
    }
}

fn buf_or_swap(buf: Option<Vec<u8>>) -> ReqBuf {
    match buf {
        Some(v) if !v.is_empty() => ReqBuf::Owned(v),
        _ => ReqBuf::WantSwap,
    }
}

/// Owns the background event-loop thread and the consumer side of the
/// completion channel.
pub struct Watcher<Ctx> {
    shared: Arc<Shared<Ctx>>,
    completion_rx: Option<Receiver<Batch<Ctx>>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl<Ctx: Send + 'static> Watcher<Ctx> {
    /// Creates a watcher with the given swap-buffer size.
    pub fn new(bufsize: usize) -> std::io::Result<Watcher<Ctx>> {
        WatcherBuilder::new().swap_buffer_size(bufsize).build()
    }

    fn with_builder(builder: &WatcherBuilder) -> std::io::Result<Watcher<Ctx>> {
        let poller = Arc::new(Poller::open()?);
        let (gc_tx, gc_rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            poller,
            pending: PendingList::new(),
            closed: AtomicBool::new(false),
            gc_tx,
        });
        let (completion_tx, completion_rx) =
            completion_channel(builder.completion_channel_capacity);

        let loop_shared = Arc::clone(&shared);
        let bufsize = builder.swap_buffer_size;
        let thread = thread::Builder::new()
            .name("watcher-loop".into())
            .spawn(move || run_loop(loop_shared, gc_rx, completion_tx, bufsize))?;

        Ok(Watcher {
            shared,
            completion_rx: Some(completion_rx),
            thread: Some(thread),
        })
    }

    /// Returns a cloneable submission handle.
    pub fn handle(&self) -> Handle<Ctx> {
        Handle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Blocks until a non-empty completion batch is delivered, or the
    /// watcher shuts down.
    pub fn wait_io(&self) -> Result<Batch<Ctx>> {
        match self
            .completion_rx
            .as_ref()
            .expect("completion channel dropped only by Watcher::drop")
            .recv()
        {
            Ok(batch) => Ok(batch),
            Err(_) => Err(WatcherError::WatcherClosed),
        }
    }

    /// Idempotent shutdown: stops accepting submissions and tells the loop
    /// to release every descriptor and exit.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let _ = self.shared.poller.wake();
    }
}

impl<Ctx> Drop for Watcher<Ctx> {
    fn drop(&mut self) {
        self.close();
        // Drop the receiver first: if the loop thread is blocked sending a
        // batch nobody will ever collect, this turns that send into an
        // immediate error instead of a permanent hang, letting `join`
        // below return.
        self.completion_rx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct LoopState<Ctx> {
    descs: HashMap<RawFd, DescState<Ctx>>,
    idents: HashMap<usize, RawFd>,
    heap: DeadlineHeap,
    /// request id -> (ident, direction), used to locate a request's FIFO
    /// slot when its deadline fires.
    locator: HashMap<u64, (RawFd, Direction)>,
    pool: SwapPool,
    batcher: Batcher<Ctx>,
    next_id: u64,
}

impl<Ctx> LoopState<Ctx> {
    fn new(bufsize: usize) -> LoopState<Ctx> {
        LoopState {
            descs: HashMap::new(),
            idents: HashMap::new(),
            heap: DeadlineHeap::new(),
            locator: HashMap::new(),
            pool: SwapPool::new(bufsize),
            batcher: Batcher::new(),
            next_id: 0,
        }
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn flush(&mut self, completion_tx: &SyncSender<Batch<Ctx>>) {
        if self.batcher.is_empty() {
            return;
        }
        let batch = self.batcher.take();
        trace!("flushing completion batch of {} entr{}", batch.len(), if batch.len() == 1 { "y" } else { "ies" });
        let _ = completion_tx.send(batch);
    }

    fn deliver_now(&mut self, completion: Completion<Ctx>, completion_tx: &SyncSender<Batch<Ctx>>) {
        debug_assert!(self.batcher.is_empty());
        self.batcher.push(completion);
        self.flush(completion_tx);
    }

    /// Builds the completion for a finished request, or `None` if the
    /// connection's last strong reference vanished concurrently with this
    /// transfer — there is nobody left to hand the completion's `Conn`
    /// back to, so the request is dropped the same way a GC-released
    /// connection's outstanding requests are.
    fn to_completion(
        &self,
        req: Request<Ctx>,
        n: usize,
        err: Option<WatcherError>,
        swap: Option<crate::buf::SwapSlice>,
    ) -> Option<Completion<Ctx>> {
        let conn = req.conn.upgrade()?;
        let buf = match swap {
            Some(s) => CompletionBuf::Swap(s),
            None => match req.buf {
                ReqBuf::Owned(v) => CompletionBuf::Owned(v),
                ReqBuf::WantSwap => CompletionBuf::Owned(Vec::new()),
            },
        };
        Some(Completion {
            op: req.op,
            ctx: req.ctx.expect("ctx present on every Read/Write request"),
            conn,
            buf,
            size: n,
            err,
        })
    }

    /// Process every queued submission in order.
    fn process_pending(&mut self, shared: &Shared<Ctx>, completion_tx: &SyncSender<Batch<Ctx>>) {
        let pending = shared.pending.drain();
        for sub in pending {
            if sub.op == Op::Free {
                if let Some(ident) = self.idents.get(&sub.conn.id()).copied() {
                    self.release(ident);
                }
                continue;
            }

            let conn_id = sub.conn.id();
            let ident = match self.idents.get(&conn_id).copied() {
                Some(ident) => ident,
                None => match self.register(shared, sub.conn.clone()) {
                    Ok(ident) => ident,
                    Err(err) => {
                        warn!("setup failed for connection {}: {}", conn_id, err);
                        let completion = Completion {
                            op: sub.op,
                            ctx: sub.ctx.expect("ctx present on every Read/Write request"),
                            conn: sub.conn,
                            buf: CompletionBuf::Owned(Vec::new()),
                            size: 0,
                            err: Some(err),
                        };
                        self.deliver_now(completion, completion_tx);
                        continue;
                    }
                },
            };

            self.admit(ident, sub, completion_tx);
        }
    }

    fn register(&mut self, shared: &Shared<Ctx>, conn: Conn) -> Result<RawFd> {
        let ident = duplicate(&conn)?;
        if let Err(err) = shared.poller.watch(ident) {
            unsafe { libc::close(ident) };
            return Err(WatcherError::Io(err));
        }
        debug!("registered connection {} as ident {}", conn.id(), ident);
        self.idents.insert(conn.id(), ident);
        self.descs.insert(ident, DescState::new(ident, conn.id()));
        Ok(ident)
    }

    fn admit(&mut self, ident: RawFd, sub: Submission<Ctx>, completion_tx: &SyncSender<Batch<Ctx>>) {
        let id = self.next_request_id();
        let deadline = sub.deadline;
        let mut req = Request {
            id,
            op: sub.op,
            ctx: sub.ctx,
            conn: sub.conn.downgrade(),
            buf: sub.buf,
            progress: 0,
            deadline,
        };
        let dir = req.direction();
        let desc = self.descs.get_mut(&ident).expect("just registered or already known");

        let (fifo_empty, ready) = match dir {
            Direction::Read => (desc.readers.is_empty(), desc.readable),
            Direction::Write => (desc.writers.is_empty(), desc.writable),
        };

        if fifo_empty && ready {
            let attempt = match dir {
                Direction::Read => try_read(ident, &mut req, &mut self.pool),
                Direction::Write => try_write(ident, &mut req),
            };
            match attempt {
                Attempt::WouldBlock => {
                    let desc = self.descs.get_mut(&ident).unwrap();
                    match dir {
                        Direction::Read => desc.readable = false,
                        Direction::Write => desc.writable = false,
                    }
                    self.enqueue(ident, req, deadline);
                }
                Attempt::Done { n, err, eof, swap } => {
                    let release = err.is_some() || eof;
                    if let Some(completion) = self.to_completion(req, n, err, swap) {
                        self.deliver_now(completion, completion_tx);
                    }
                    if release {
                        self.release(ident);
                    }
                }
            }
        } else {
            self.enqueue(ident, req, deadline);
        }
    }

    fn enqueue(&mut self, ident: RawFd, req: Request<Ctx>, deadline: Option<Instant>) {
        let dir = req.direction();
        let id = req.id;
        self.locator.insert(id, (ident, dir));
        if let Some(dl) = deadline {
            self.heap.push(id, dl);
        }
        let desc = self.descs.get_mut(&ident).expect("descriptor exists while enqueuing");
        match dir {
            Direction::Read => desc.readers.push_back(req),
            Direction::Write => desc.writers.push_back(req),
        }
    }

    /// Drains the readers FIFO, honoring the eager-flush rule.
    fn drain_readers(&mut self, ident: RawFd, completion_tx: &SyncSender<Batch<Ctx>>) -> bool {
        loop {
            let can_try = {
                let desc = self.descs.get(&ident).unwrap();
                desc.readable && !desc.readers.is_empty()
            };
            if !can_try {
                return false;
            }
            let mut req = self.descs.get_mut(&ident).unwrap().readers.pop_front().unwrap();
            match try_read(ident, &mut req, &mut self.pool) {
                Attempt::WouldBlock => {
                    let desc = self.descs.get_mut(&ident).unwrap();
                    desc.readers.push_front(req);
                    desc.readable = false;
                    return false;
                }
                Attempt::Done { n, err, eof, swap } => {
                    self.locator.remove(&req.id);
                    self.heap.remove(req.id);
                    let release = err.is_some() || eof;
                    let used_swap = swap.is_some();
                    if let Some(completion) = self.to_completion(req, n, err, swap) {
                        self.batcher.push(completion);
                    }
                    if used_swap {
                        // Must not reissue this swap buffer before the
                        // consumer has accepted it.
                        self.flush(completion_tx);
                    }
                    if release {
                        return true;
                    }
                }
            }
        }
    }

    /// Drains the writers FIFO. No swap-buffer subtlety.
    fn drain_writers(&mut self, ident: RawFd, completion_tx: &SyncSender<Batch<Ctx>>) -> bool {
        let _ = completion_tx;
        loop {
            let can_try = {
                let desc = self.descs.get(&ident).unwrap();
                desc.writable && !desc.writers.is_empty()
            };
            if !can_try {
                return false;
            }
            let mut req = self.descs.get_mut(&ident).unwrap().writers.pop_front().unwrap();
            match try_write(ident, &mut req) {
                Attempt::WouldBlock => {
                    let desc = self.descs.get_mut(&ident).unwrap();
                    desc.writers.push_front(req);
                    desc.writable = false;
                    return false;
                }
                Attempt::Done { n, err, swap, .. } => {
                    self.locator.remove(&req.id);
                    self.heap.remove(req.id);
                    let release = err.is_some();
                    if let Some(completion) = self.to_completion(req, n, err, swap) {
                        self.batcher.push(completion);
                    }
                    if release {
                        return true;
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, ev: sys::Readiness, completion_tx: &SyncSender<Batch<Ctx>>) {
        if !self.descs.contains_key(&ev.ident) {
            // Post-release event already in flight; ignore.
            return;
        }
        let mut release_needed = false;
        if ev.readable {
            self.descs.get_mut(&ev.ident).unwrap().readable = true;
            release_needed = self.drain_readers(ev.ident, completion_tx);
        }
        if ev.writable && !release_needed {
            self.descs.get_mut(&ev.ident).unwrap().writable = true;
            release_needed = self.drain_writers(ev.ident, completion_tx);
        }
        if release_needed {
            self.release(ev.ident);
        }
    }

    /// Complete every request whose deadline has elapsed.
    fn fire_deadlines(&mut self, now: Instant) {
        for req_id in self.heap.drain_expired(now) {
            let Some((ident, dir)) = self.locator.remove(&req_id) else {
                continue;
            };
            let Some(desc) = self.descs.get_mut(&ident) else {
                continue;
            };
            let fifo = match dir {
                Direction::Read => &mut desc.readers,
                Direction::Write => &mut desc.writers,
            };
            let Some(pos) = fifo.iter().position(|r| r.id == req_id) else {
                continue;
            };
            let req = fifo.remove(pos).unwrap();
            debug!("deadline fired for request {}", req_id);
            if let Some(completion) =
                self.to_completion(req, 0, Some(WatcherError::DeadlineError), None)
            {
                self.batcher.push(completion);
            }
        }
    }

    /// Release a descriptor. Requests still queued on it are discarded
    /// without completions; this is deliberate, not an oversight, and is
    /// the same discard behavior `Free` and a consumer-dropped connection
    /// both rely on.
    fn release(&mut self, ident: RawFd) {
        let Some(mut desc) = self.descs.remove(&ident) else {
            return;
        };
        for req in desc.drain_all() {
            self.heap.remove(req.id);
            self.locator.remove(&req.id);
        }
        self.idents.remove(&desc.conn_id);
        unsafe { libc::close(ident) };
        debug!("released ident {}", ident);
    }

    fn shutdown(&mut self) {
        let idents: Vec<RawFd> = self.descs.keys().copied().collect();
        for ident in idents {
            self.release(ident);
        }
    }
}

fn run_loop<Ctx: Send + 'static>(
    shared: Arc<Shared<Ctx>>,
    gc_rx: Receiver<usize>,
    completion_tx: SyncSender<Batch<Ctx>>,
    bufsize: usize,
) {
    let mut state = LoopState::new(bufsize);
    let mut events: Vec<sys::Readiness> = Vec::with_capacity(sys::MAX_EVENTS);

    loop {
        let timeout = state
            .heap
            .peek_deadline()
            .map(|dl| dl.saturating_duration_since(Instant::now()));

        trace!("event loop tick, timeout={:?}", timeout);
        if let Err(err) = shared.poller.wait(&mut events, timeout, sys::MAX_EVENTS) {
            warn!("poller wait failed: {}", err);
            break;
        }

        // 1. pending submissions
        state.process_pending(&shared, &completion_tx);

        // 2. readiness batch
        for ev in events.drain(..) {
            state.handle_event(ev, &completion_tx);
        }
        state.flush(&completion_tx);

        // 3. timer
        state.fire_deadlines(Instant::now());
        state.flush(&completion_tx);

        // 4. GC notifications
        while let Ok(conn_id) = gc_rx.try_recv() {
            if let Some(ident) = state.idents.get(&conn_id).copied() {
                debug!("GC reclaimed connection {}, releasing ident {}", conn_id, ident);
                state.release(ident);
            }
        }

        // 5. shutdown
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
    }

    state.shutdown();
    trace!("event loop exiting");
}
