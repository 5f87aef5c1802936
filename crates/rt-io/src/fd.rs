// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{OsError, PreconditionError, check};
use std::os::fd::RawFd;

/// The RAII shape every stream type in this crate is built on: a raw
/// descriptor that is either open (`Some`) or closed (`None`), closed
/// automatically on drop and explicitly via [`Descriptor::close`].
///
/// This replaces the original's bare `int fd_ = -1` sentinel with an
/// `Option` so "closed" is a type-level state rather than a magic value,
/// while keeping the same open/close lifecycle shape.
pub(crate) struct Descriptor {
    fd: Option<RawFd>,
}

impl Descriptor {
    pub(crate) const fn closed() -> Self {
        Self { fd: None }
    }

    pub(crate) const fn open(fd: RawFd) -> Self {
        Self { fd: Some(fd) }
    }

    pub(crate) const fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    pub(crate) fn raw(&self) -> Result<RawFd, PreconditionError> {
        self.fd.ok_or(PreconditionError::NotOpen)
    }

    /// Closes the descriptor if open. Idempotent: calling this twice is a
    /// no-op, matching `file_base`'s `close()` being safe to call after the
    /// destructor already ran.
    pub(crate) fn close(&mut self) -> Result<(), OsError> {
        if let Some(fd) = self.fd.take() {
            // Safety: `fd` was produced by a prior open syscall owned
            // exclusively by this `Descriptor` and has not been closed yet.
            check(unsafe { libc::close(fd) })?;
        }
        Ok(())
    }

    /// Takes the raw descriptor out without closing it, for handoff (e.g.
    /// `accept` constructing a new owning `Socket` from the returned fd).
    pub(crate) fn take_raw(&mut self) -> Option<RawFd> {
        self.fd.take()
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            // Safety: same as `close`; errors here are unobservable, same
            // as every other RAII-close type in this crate's teacher stack.
            unsafe {
                libc::close(fd);
            }
        }
    }
}

pub(crate) fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<(), OsError> {
    // Safety: `fd` is a valid open descriptor for the duration of this call.
    let flags = check(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    let flags = if nonblocking { flags | libc::O_NONBLOCK } else { flags & !libc::O_NONBLOCK };
    // Safety: same as above.
    check(unsafe { libc::fcntl(fd, libc::F_SETFL, flags) })?;
    Ok(())
}
