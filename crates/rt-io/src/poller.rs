// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{IoError, PreconditionError, check};
use crate::fd::Descriptor;
use bitflags::bitflags;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Mutex;
use std::time::Duration;

bitflags! {
    /// The readiness mask a descriptor is registered with, matching
    /// `txl::event_type`'s `epoll_event_t` bits one-for-one.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventType: u32 {
        const READABLE    = libc::EPOLLIN as u32;
        const WRITABLE    = libc::EPOLLOUT as u32;
        const READ_HANGUP = libc::EPOLLRDHUP as u32;
        const PRIORITY    = libc::EPOLLPRI as u32;
        const ERROR       = libc::EPOLLERR as u32;
        const HANGUP      = libc::EPOLLHUP as u32;
        const EDGE        = libc::EPOLLET as u32;
        const ONE_SHOT    = libc::EPOLLONESHOT as u32;
    }
}

/// The caller-chosen value handed back verbatim at `poll` time, matching
/// `txl::event_tag`'s union over `{fd, ptr, u32, u64}`. Stored as a plain
/// `u64` (exactly what `epoll_data.u64` holds): a tag is only ever decoded
/// through the accessor matching how it was constructed, same as the
/// original's union — there is no way to recover "which variant" was
/// stored from the bits alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(u64);

impl Tag {
    #[must_use]
    pub fn from_fd(fd: RawFd) -> Self {
        Self(u64::from(u32::try_from(fd).expect("fd must be non-negative")))
    }

    #[must_use]
    pub fn from_u32(v: u32) -> Self {
        Self(u64::from(v))
    }

    #[must_use]
    pub fn from_u64(v: u64) -> Self {
        Self(v)
    }

    /// # Panics
    /// Panics if this tag was not constructed via [`Tag::from_fd`].
    #[must_use]
    pub fn as_fd(self) -> RawFd {
        RawFd::try_from(self.0).expect("tag was not constructed from an fd")
    }

    /// # Panics
    /// Panics if this tag was not constructed via [`Tag::from_u32`].
    #[must_use]
    pub fn as_u32(self) -> u32 {
        u32::try_from(self.0).expect("tag was not constructed from a u32")
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// One readiness report: the descriptor, the mask that fired, and the tag
/// registered alongside it.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub fd: RawFd,
    pub events: EventType,
    pub tag: Tag,
}

/// A level/edge-triggered, kernel-backed wait set over descriptors, built
/// on `epoll`. Matches `txl::event_poller`.
///
/// `epoll_data` only has room for one 64-bit payload, so it cannot carry
/// both the registered descriptor and an arbitrary caller-chosen [`Tag`]
/// at once (a tag may legitimately be a pointer or an opaque `u32`/`u64`
/// unrelated to the fd). This registers the descriptor itself as the
/// kernel-visible payload and keeps the caller's tag in a side table keyed
/// by descriptor, so `poll` can always report the true descriptor
/// alongside whatever tag was registered for it.
pub struct Poller {
    fd: Descriptor,
    tags: Mutex<HashMap<RawFd, Tag>>,
}

impl Default for Poller {
    fn default() -> Self {
        Self::closed()
    }
}

impl Poller {
    #[must_use]
    pub fn closed() -> Self {
        Self { fd: Descriptor::closed(), tags: Mutex::new(HashMap::new()) }
    }

    /// # Errors
    /// [`PreconditionError::AlreadyOpen`] if already open, or the OS
    /// failure from `epoll_create1(2)`.
    pub fn open() -> Result<Self, IoError> {
        let mut p = Self::closed();
        p.open_in_place()?;
        Ok(p)
    }

    pub fn open_in_place(&mut self) -> Result<(), IoError> {
        if self.fd.is_open() {
            return Err(PreconditionError::AlreadyOpen.into());
        }
        // Safety: plain FFI call with no arguments that alias any memory.
        let fd = check(unsafe { libc::epoll_create1(0) })?;
        self.fd = Descriptor::open(fd);
        Ok(())
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.fd.is_open()
    }

    pub fn close(&mut self) -> Result<(), IoError> {
        self.fd.close()?;
        Ok(())
    }

    /// `u64` in the installed `epoll_event` is always `fd` itself, never the
    /// caller's tag — see the struct docs for why the tag lives in `tags`
    /// instead.
    fn ctl(&self, op: libc::c_int, fd: RawFd, mask: Option<EventType>) -> Result<(), IoError> {
        let epfd = self.fd.raw()?;
        let mut ev = mask.map(|mask| libc::epoll_event {
            events: mask.bits(),
            u64: u64::from(u32::try_from(fd).expect("fd must be non-negative")),
        });
        let ev_ptr = ev.as_mut().map_or(std::ptr::null_mut(), std::ptr::from_mut);
        // Safety: `epfd` is a valid open epoll descriptor, and `ev_ptr` is
        // either null (remove) or points at a live, correctly laid out
        // `epoll_event` for the duration of the call.
        let res = check(unsafe { libc::epoll_ctl(epfd, op, fd, ev_ptr) });
        match res {
            Ok(_) => {
                tracing::trace!(fd, op, "epoll_ctl succeeded");
                Ok(())
            }
            Err(e) if matches!(op, libc::EPOLL_CTL_ADD) && e.code() == libc::EEXIST => Err(e.into()),
            Err(e) if matches!(op, libc::EPOLL_CTL_MOD | libc::EPOLL_CTL_DEL) && e.code() == libc::ENOENT => {
                Err(PreconditionError::NotRegistered.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Registers `fd` for the given `mask`, tagged with `fd` itself.
    ///
    /// # Errors
    /// An OS error if `fd` is already registered or otherwise rejected.
    pub fn add(&self, fd: RawFd, mask: EventType) -> Result<(), IoError> {
        self.add_tagged(fd, mask, Tag::from_fd(fd))
    }

    /// # Errors
    /// An OS error if `fd` is already registered or otherwise rejected.
    pub fn add_tagged(&self, fd: RawFd, mask: EventType, tag: Tag) -> Result<(), IoError> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, Some(mask))?;
        self.tags.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(fd, tag);
        Ok(())
    }

    pub fn modify(&self, fd: RawFd, mask: EventType) -> Result<(), IoError> {
        self.modify_tagged(fd, mask, Tag::from_fd(fd))
    }

    /// # Errors
    /// [`PreconditionError::NotRegistered`] if `fd` was never added.
    pub fn modify_tagged(&self, fd: RawFd, mask: EventType, tag: Tag) -> Result<(), IoError> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, Some(mask))?;
        self.tags.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(fd, tag);
        Ok(())
    }

    /// # Errors
    /// [`PreconditionError::NotRegistered`] if `fd` was never added.
    pub fn remove(&self, fd: RawFd) -> Result<(), IoError> {
        self.ctl(libc::EPOLL_CTL_DEL, fd, None)?;
        self.tags.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&fd);
        Ok(())
    }

    /// Waits for readiness, writing fired events into `out` and returning
    /// how many fired. `timeout = None` blocks indefinitely;
    /// `Some(Duration::ZERO)` returns immediately.
    ///
    /// # Errors
    /// The OS failure from `epoll_wait(2)`.
    pub fn poll(&self, out: &mut [Event], timeout: Option<Duration>) -> Result<usize, IoError> {
        let epfd = self.fd.raw()?;
        let mut raw: Vec<libc::epoll_event> = vec![libc::epoll_event { events: 0, u64: 0 }; out.len()];
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => libc::c_int::try_from(d.as_millis()).unwrap_or(libc::c_int::MAX),
        };
        // Safety: `raw` is a valid buffer of `raw.len()` `epoll_event`
        // slots for the kernel to fill; `epfd` is a valid open epoll fd.
        let n = check(unsafe {
            libc::epoll_wait(epfd, raw.as_mut_ptr(), raw.len().try_into().unwrap_or(libc::c_int::MAX), timeout_ms)
        })?;
        let n = usize::try_from(n).expect("epoll_wait returned a negative ready count after success check");
        let tags = self.tags.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (slot, raw_ev) in out.iter_mut().zip(raw.into_iter()).take(n) {
            let fd = RawFd::try_from(raw_ev.u64).unwrap_or(-1);
            *slot = Event {
                fd,
                events: EventType::from_bits_truncate(raw_ev.events),
                tag: tags.get(&fd).copied().unwrap_or(Tag::from_fd(fd)),
            };
        }
        if n > 0 {
            tracing::trace!(ready = n, "epoll_wait returned");
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::PipePair;
    use crate::stream::Writer;

    #[test]
    fn readiness_reported_after_write() {
        let poller = Poller::open().unwrap();
        let mut pair = PipePair::open().unwrap();
        let read_fd = pair.input().unwrap().as_raw_fd().unwrap();
        poller.add(read_fd, EventType::READABLE).unwrap();

        pair.output().unwrap().write(b"Hello").unwrap();

        let mut events = [Event { fd: -1, events: EventType::empty(), tag: Tag::from_u64(0) }; 4];
        let n = poller.poll(&mut events, Some(Duration::ZERO)).unwrap();
        assert_eq!(n, 1);
        assert_eq!(events[0].fd, read_fd);
        assert!(events[0].events.contains(EventType::READABLE));
    }

    #[test]
    fn add_twice_is_rejected() {
        let poller = Poller::open().unwrap();
        let mut pair = PipePair::open().unwrap();
        let read_fd = pair.input().unwrap().as_raw_fd().unwrap();
        poller.add(read_fd, EventType::READABLE).unwrap();
        assert!(poller.add(read_fd, EventType::READABLE).is_err());
    }

    #[test]
    fn remove_unregistered_is_a_precondition_error() {
        let poller = Poller::open().unwrap();
        let err = poller.remove(123).unwrap_err();
        assert!(matches!(err, IoError::Precondition(PreconditionError::NotRegistered)));
    }

    #[test]
    fn poll_zero_timeout_returns_immediately_when_nothing_ready() {
        let poller = Poller::open().unwrap();
        let mut pair = PipePair::open().unwrap();
        let read_fd = pair.input().unwrap().as_raw_fd().unwrap();
        poller.add(read_fd, EventType::READABLE).unwrap();

        let mut events = [Event { fd: -1, events: EventType::empty(), tag: Tag::from_u64(0) }; 4];
        let n = poller.poll(&mut events, Some(Duration::ZERO)).unwrap();
        assert_eq!(n, 0);
    }
}
