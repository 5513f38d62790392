//! Linux/Android readiness poller.

use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use libc::{EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP};

use super::cvt;
use super::waker::Waker;
use crate::sys::{Readiness, MAX_EVENTS};

/// Reserved epoll `u64` tag for the internal waker descriptor; real
/// connection idents are always small positive file descriptors and never
/// collide with this value in practice, but we also special-case it
/// explicitly in `wait()`.
const WAKER_TAG: u64 = u64::MAX;

pub struct Poller {
    epfd: OwnedFd,
    waker: Waker,
}

impl Poller {
    pub fn open() -> io::Result<Poller> {
        let epfd =
            unsafe { OwnedFd::from_raw_fd(cvt(libc::epoll_create1(libc::EPOLL_CLOEXEC))?) };
        let waker = Waker::new()?;
        let mut event = libc::epoll_event {
            events: (EPOLLIN | EPOLLET) as u32,
            u64: WAKER_TAG,
        };
        cvt(unsafe {
            libc::epoll_ctl(
                epfd.as_raw_fd(),
                libc::EPOLL_CTL_ADD,
                waker.as_raw_fd(),
                &mut event,
            )
        })?;
        Ok(Poller { epfd, waker })
    }

    pub fn watch(&self, ident: RawFd) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: (EPOLLIN | EPOLLOUT | EPOLLRDHUP | EPOLLET) as u32,
            u64: ident as u64,
        };
        cvt(unsafe {
            libc::epoll_ctl(self.epfd.as_raw_fd(), libc::EPOLL_CTL_ADD, ident, &mut event)
        })?;
        Ok(())
    }

    /// Blocks until at least one event is ready, the wakeup fd fires, or
    /// `timeout` elapses (`None` blocks forever), then drains up to
    /// `MAX_EVENTS` readiness reports into `out`. `close()`d descriptors
    /// are forgotten by the kernel automatically and never reappear here.
    /// An empty `out` on return with no error is not a failure: it means
    /// the call was woken for a reason other than connection readiness
    /// (a submission, a GC notification, or the timeout), which is exactly
    /// what the event loop's timer and pending-submission sources rely on.
    pub fn wait(
        &self,
        out: &mut Vec<Readiness>,
        timeout: Option<Duration>,
        limit: usize,
    ) -> io::Result<()> {
        out.clear();
        let millis = timeout.map_or(-1, |d| {
            d.checked_add(Duration::from_nanos(999_999))
                .unwrap_or(d)
                .as_millis()
                .min(i32::MAX as u128) as i32
        });
        let cap = limit.clamp(1, MAX_EVENTS);
        let mut raw = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
        loop {
            let n = match cvt(unsafe {
                libc::epoll_wait(self.epfd.as_raw_fd(), raw.as_mut_ptr(), cap as i32, millis)
            }) {
                Ok(n) => n,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            for ev in &raw[..n as usize] {
                if ev.u64 == WAKER_TAG {
                    self.waker.ack()?;
                    continue;
                }
                let bits = ev.events as i32;
                out.push(Readiness {
                    ident: ev.u64 as RawFd,
                    readable: bits & (EPOLLIN | EPOLLHUP) != 0,
                    writable: bits & libc::EPOLLOUT != 0,
                });
            }
            return Ok(());
        }
    }

    pub fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }
}
