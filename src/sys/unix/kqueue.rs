//! kqueue readiness poller for the BSD/macOS family.

use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use super::cvt;
use super::waker::Waker;
use crate::sys::{Readiness, MAX_EVENTS};

#[cfg(not(target_os = "netbsd"))]
type Count = libc::c_int;
#[cfg(target_os = "netbsd")]
type Count = libc::size_t;

#[cfg(any(target_os = "freebsd", target_os = "openbsd", target_os = "dragonfly"))]
type Filter = libc::c_short;
#[cfg(any(target_os = "macos", target_os = "ios"))]
type Filter = i16;
#[cfg(target_os = "netbsd")]
type Filter = u32;

pub struct Poller {
    kq: RawFd,
    waker: Waker,
}

impl Poller {
    pub fn open() -> io::Result<Poller> {
        let kq = cvt(unsafe { libc::kqueue() })?;
        cvt(unsafe { libc::fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC) })?;
        let waker = Waker::new()?;
        let poller = Poller { kq, waker };
        let waker_fd = poller.waker.as_raw_fd();
        // Unlike epoll's arbitrary `u64` tag, kqueue's `ident` field for
        // EVFILT_READ/EVFILT_WRITE *is* the file descriptor being watched —
        // there's no separate slot to stash a sentinel in, so the waker is
        // registered (and later recognized in `wait()`) under its own fd.
        poller.register_ident(waker_fd as libc::uintptr_t, libc::EVFILT_READ, waker_fd)?;
        Ok(poller)
    }

    pub fn watch(&self, ident: RawFd) -> io::Result<()> {
        self.register_ident(ident as libc::uintptr_t, libc::EVFILT_READ, ident)?;
        self.register_ident(ident as libc::uintptr_t, libc::EVFILT_WRITE, ident)?;
        Ok(())
    }

    fn register_ident(&self, id: libc::uintptr_t, filter: i32, _fd: RawFd) -> io::Result<()> {
        let changes = [libc::kevent {
            ident: id,
            filter: filter as Filter,
            flags: libc::EV_ADD | libc::EV_CLEAR,
            fflags: 0,
            data: 0,
            udata: std::ptr::null_mut(),
        }];
        cvt(unsafe {
            libc::kevent(
                self.kq,
                changes.as_ptr(),
                changes.len() as Count,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        })?;
        Ok(())
    }

    pub fn wait(
        &self,
        out: &mut Vec<Readiness>,
        timeout: Option<Duration>,
        limit: usize,
    ) -> io::Result<()> {
        out.clear();
        let cap = limit.clamp(1, MAX_EVENTS);
        let ts = timeout.map(|to| libc::timespec {
            tv_sec: to.as_secs() as libc::time_t,
            tv_nsec: libc::c_long::from(to.subsec_nanos() as i32),
        });
        let mut raw: [MaybeUninit<libc::kevent>; MAX_EVENTS] =
            unsafe { MaybeUninit::uninit().assume_init() };
        loop {
            let ts_ptr = ts
                .as_ref()
                .map_or(std::ptr::null(), |t| t as *const libc::timespec);
            let n = match cvt(unsafe {
                libc::kevent(
                    self.kq,
                    std::ptr::null(),
                    0,
                    raw.as_mut_ptr() as *mut libc::kevent,
                    cap as Count,
                    ts_ptr,
                )
            }) {
                Ok(n) => n,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            for slot in &raw[..n as usize] {
                let ev = unsafe { slot.assume_init() };
                if ev.ident as RawFd == self.waker.as_raw_fd() {
                    self.waker.ack()?;
                    continue;
                }
                let ident = ev.ident as RawFd;
                let mut merged = None::<&mut Readiness>;
                // kqueue reports read/write as separate events; merge any
                // pair that arrived in the same batch for the same ident.
                for existing in out.iter_mut() {
                    if existing.ident == ident {
                        merged = Some(existing);
                        break;
                    }
                }
                let readable = ev.filter as Filter == libc::EVFILT_READ as Filter;
                let writable = ev.filter as Filter == libc::EVFILT_WRITE as Filter;
                match merged {
                    Some(existing) => {
                        existing.readable |= readable;
                        existing.writable |= writable;
                    }
                    None => out.push(Readiness {
                        ident,
                        readable,
                        writable,
                    }),
                }
            }
            return Ok(());
        }
    }

    pub fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe { libc::close(self.kq) };
    }
}
