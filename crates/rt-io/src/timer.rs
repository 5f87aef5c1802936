// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{IoError, PreconditionError, check, check_len};
use crate::fd::Descriptor;
use crate::stream::Reader;
use std::os::fd::RawFd;
use std::time::Duration;

/// Which kernel clock a timer is measured against, matching
/// `txl::clock_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    /// Unaffected by wall-clock adjustments; the only sane choice for a
    /// timeout computed as "now + delay".
    Monotonic,
    /// Follows `CLOCK_REALTIME`; jumps with NTP/manual adjustments.
    Realtime,
}

impl ClockKind {
    fn to_raw(self) -> libc::c_int {
        match self {
            Self::Monotonic => libc::CLOCK_MONOTONIC,
            Self::Realtime => libc::CLOCK_REALTIME,
        }
    }
}

fn duration_to_timespec(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: libc::time_t::try_from(d.as_secs()).unwrap_or(libc::time_t::MAX),
        tv_nsec: libc::c_long::from(d.subsec_nanos()),
    }
}

/// A single-shot or periodic kernel timer, readable for its expiration
/// count like any other descriptor. Matches `txl::event_timer`, built on
/// `timerfd_create(2)`.
pub struct Timer {
    fd: Descriptor,
}

impl Timer {
    #[must_use]
    pub const fn closed() -> Self {
        Self { fd: Descriptor::closed() }
    }

    /// # Errors
    /// [`PreconditionError::AlreadyOpen`] if already open, or the OS
    /// failure from `timerfd_create(2)`.
    pub fn open(clock: ClockKind) -> Result<Self, IoError> {
        let mut t = Self::closed();
        t.open_in_place(clock)?;
        Ok(t)
    }

    pub fn open_in_place(&mut self, clock: ClockKind) -> Result<(), IoError> {
        if self.fd.is_open() {
            return Err(PreconditionError::AlreadyOpen.into());
        }
        // Safety: plain FFI call, no pointers involved.
        let fd = check(unsafe { libc::timerfd_create(clock.to_raw(), 0) })?;
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

    #[must_use]
    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.fd.raw().ok()
    }

    /// Arms the timer to first fire after `initial`, then (if `interval` is
    /// non-zero) repeat every `interval` thereafter. `initial` of
    /// [`Duration::ZERO`] disarms the timer, matching `timerfd_settime`'s
    /// own convention.
    ///
    /// # Errors
    /// The descriptor precondition, or the OS failure from
    /// `timerfd_settime(2)`.
    pub fn set_time(&mut self, initial: Duration, interval: Duration) -> Result<(), IoError> {
        let fd = self.fd.raw()?;
        let spec = libc::itimerspec {
            it_interval: duration_to_timespec(interval),
            it_value: duration_to_timespec(initial),
        };
        // Safety: `fd` is a valid open timerfd, and `&spec` points at a
        // live, correctly laid out `itimerspec` for the call's duration.
        check(unsafe { libc::timerfd_settime(fd, 0, &raw const spec, std::ptr::null_mut()) })?;
        tracing::trace!(?initial, ?interval, "timer armed");
        Ok(())
    }

    pub fn disarm(&mut self) -> Result<(), IoError> {
        self.set_time(Duration::ZERO, Duration::ZERO)
    }

    /// Blocking-unless-nonblocking read of the expiration counter: how many
    /// times the timer has fired since the last read. Zero on a
    /// non-blocking read with nothing pending.
    ///
    /// # Errors
    /// The descriptor precondition, or the OS failure from the underlying
    /// `read(2)`.
    pub fn read_expirations(&mut self) -> Result<u64, IoError> {
        let fd = self.fd.raw()?;
        let mut count: u64 = 0;
        // Safety: `&mut count` points at 8 valid, writable bytes, exactly
        // what a `timerfd` read produces on success.
        let n = check_len(unsafe {
            libc::read(fd, std::ptr::from_mut(&mut count).cast(), std::mem::size_of::<u64>())
        })?;
        if n == 0 { Ok(0) } else { Ok(count) }
    }
}

impl Reader for Timer {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let fd = self.fd.raw()?;
        // Safety: `buf` is valid for `buf.len()` writable bytes.
        let n = check_len(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::{EventType, Event, Poller, Tag};
    use std::time::Instant;

    #[test]
    fn armed_monotonic_timer_fires_after_interval() {
        let mut timer = Timer::open(ClockKind::Monotonic).unwrap();
        timer.set_time(Duration::from_millis(10), Duration::ZERO).unwrap();

        let poller = Poller::open().unwrap();
        let fd = timer.as_raw_fd().unwrap();
        poller.add(fd, EventType::READABLE).unwrap();

        let started = Instant::now();
        let mut events = [Event { fd: -1, events: EventType::empty(), tag: Tag::from_u64(0) }; 1];
        let n = poller.poll(&mut events, Some(Duration::from_millis(20))).unwrap();

        assert_eq!(n, 1);
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert!(timer.read_expirations().unwrap() >= 1);
    }

    #[test]
    fn disarmed_timer_never_fires_within_short_poll() {
        let mut timer = Timer::open(ClockKind::Monotonic).unwrap();
        timer.set_time(Duration::from_millis(50), Duration::ZERO).unwrap();
        timer.disarm().unwrap();

        let poller = Poller::open().unwrap();
        poller.add(timer.as_raw_fd().unwrap(), EventType::READABLE).unwrap();

        let mut events = [Event { fd: -1, events: EventType::empty(), tag: Tag::from_u64(0) }; 1];
        let n = poller.poll(&mut events, Some(Duration::from_millis(5))).unwrap();
        assert_eq!(n, 0);
    }
}
