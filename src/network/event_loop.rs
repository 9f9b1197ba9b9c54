//! Readiness multiplexer di atas mio (epoll di Linux)
//!
//! Menyimpan interest mask per descriptor dalam tabel berukuran tetap.
//! Registrasi pertama = epoll ADD, perubahan = MOD, mask kosong = DEL.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::error::{Error, Result};

const EVENTS_CAPACITY: usize = 256;

bitflags! {
    /// Interest/readiness mask per descriptor
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        const READABLE = 0b01;
        const WRITABLE = 0b10;
    }
}

impl EventMask {
    fn to_interest(self) -> Option<Interest> {
        match (
            self.contains(EventMask::READABLE),
            self.contains(EventMask::WRITABLE),
        ) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

/// Satu descriptor yang siap setelah `poll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredEvent {
    pub fd: RawFd,
    pub mask: EventMask,
}

/// Flag stop yang bisa dipegang thread lain
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct EventLoop {
    poll: Poll,
    events: Events,
    masks: Box<[EventMask]>,
    max_fd: Option<RawFd>,
    stop: StopHandle,
}

impl EventLoop {
    /// `setsize` = jumlah slot descriptor; fd >= setsize ditolak
    pub fn new(setsize: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            masks: vec![EventMask::empty(); setsize].into_boxed_slice(),
            max_fd: None,
            stop: StopHandle(Arc::new(AtomicBool::new(false))),
        })
    }

    #[inline(always)]
    pub fn setsize(&self) -> usize {
        self.masks.len()
    }

    /// Descriptor tertinggi yang masih terdaftar
    #[inline(always)]
    pub fn max_fd(&self) -> Option<RawFd> {
        self.max_fd
    }

    /// Mask yang tercatat untuk `fd`
    pub fn interest(&self, fd: RawFd) -> EventMask {
        self.slot(fd).map(|i| self.masks[i]).unwrap_or_default()
    }

    fn slot(&self, fd: RawFd) -> Option<usize> {
        usize::try_from(fd).ok().filter(|&i| i < self.masks.len())
    }

    /// Gabungkan `mask` ke interest `fd`
    pub fn add_interest(&mut self, fd: RawFd, mask: EventMask) -> Result<()> {
        let idx = self.slot(fd).ok_or(Error::OutOfRange(fd))?;
        let old = self.masks[idx];
        let merged = old | mask;
        if merged == old {
            return Ok(());
        }

        let Some(interest) = merged.to_interest() else {
            return Ok(());
        };
        let registry = self.poll.registry();
        let token = Token(idx);
        if old.is_empty() {
            registry.register(&mut SourceFd(&fd), token, interest)?;
        } else {
            registry.reregister(&mut SourceFd(&fd), token, interest)?;
        }

        self.masks[idx] = merged;
        if self.max_fd.map_or(true, |max| fd > max) {
            self.max_fd = Some(fd);
        }
        Ok(())
    }

    /// Hapus bit `mask` dari interest `fd`
    pub fn remove_interest(&mut self, fd: RawFd, mask: EventMask) -> Result<()> {
        let idx = self.slot(fd).ok_or(Error::OutOfRange(fd))?;
        let old = self.masks[idx];
        if old.is_empty() {
            return Ok(());
        }
        let remaining = old - mask;
        if remaining == old {
            return Ok(());
        }

        let registry = self.poll.registry();
        match remaining.to_interest() {
            Some(interest) => registry.reregister(&mut SourceFd(&fd), Token(idx), interest)?,
            None => registry.deregister(&mut SourceFd(&fd))?,
        }
        self.masks[idx] = remaining;

        if remaining.is_empty() && self.max_fd == Some(fd) {
            self.max_fd = self.masks[..idx]
                .iter()
                .rposition(|m| !m.is_empty())
                .map(|i| i as RawFd);
        }
        Ok(())
    }

    /// Tunggu event sampai `timeout`; `EINTR` = tidak ada event
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<FiredEvent>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        }

        let mut fired = Vec::with_capacity(self.events.iter().count());
        for event in self.events.iter() {
            let mut mask = EventMask::empty();
            if event.is_readable() || event.is_read_closed() || event.is_error() {
                mask |= EventMask::READABLE;
            }
            if event.is_writable() || event.is_write_closed() {
                mask |= EventMask::WRITABLE;
            }
            // Hanya laporkan yang memang diminta
            let fd = event.token().0 as RawFd;
            mask &= self.interest(fd);
            if !mask.is_empty() {
                fired.push(FiredEvent { fd, mask });
            }
        }
        Ok(fired)
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    #[inline(always)]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}
