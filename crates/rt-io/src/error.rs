// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::io;

/// An OS-backed failure: an `errno`-equivalent code plus its `strerror`
/// message, for anything the kernel itself rejected (as opposed to a
/// [`PreconditionError`], which is a caller-misuse failure this crate
/// detects before ever reaching a syscall).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsError {
    code: i32,
}

impl OsError {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        Self { code }
    }

    /// Captures the calling thread's current `errno`.
    #[must_use]
    pub fn last() -> Self {
        Self::from_code(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> String {
        io::Error::from_raw_os_error(self.code).to_string()
    }

    /// True for `EAGAIN`/`EWOULDBLOCK` — distinguishes a non-blocking
    /// "nothing ready right now" from a genuine transport failure.
    #[must_use]
    pub fn would_block(&self) -> bool {
        self.code == libc::EAGAIN || self.code == libc::EWOULDBLOCK
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (os error {})", self.message(), self.code)
    }
}

impl std::error::Error for OsError {}

/// A caller-misuse failure distinct from anything the OS reported: these
/// never carry an errno because this crate rejects the call before issuing
/// a syscall at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionError {
    AlreadyOpen,
    NotOpen,
    InvalidMode,
    NotRegistered,
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::AlreadyOpen => "descriptor is already open",
            Self::NotOpen => "descriptor is not open",
            Self::InvalidMode => "invalid mode string",
            Self::NotRegistered => "descriptor is not registered with this poller",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for PreconditionError {}

/// Unifies the two failure channels every stream/poller/timer operation can
/// produce — an OS rejection, or a precondition this crate caught itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    Os(OsError),
    Precondition(PreconditionError),
}

impl From<OsError> for IoError {
    fn from(e: OsError) -> Self {
        Self::Os(e)
    }
}

impl From<PreconditionError> for IoError {
    fn from(e: PreconditionError) -> Self {
        Self::Precondition(e)
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Os(e) => fmt::Display::fmt(e, f),
            Self::Precondition(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for IoError {}

impl IoError {
    /// True for a non-blocking operation that would otherwise have blocked.
    #[must_use]
    pub fn would_block(&self) -> bool {
        matches!(self, Self::Os(e) if e.would_block())
    }
}

/// Converts a raw `int`-returning syscall's result, where `-1` signals an
/// error recorded in `errno`, into a typed result.
pub(crate) fn check(res: libc::c_int) -> Result<libc::c_int, OsError> {
    if res == -1 { Err(OsError::last()) } else { Ok(res) }
}

/// Converts a raw `ssize_t`-returning syscall's result (`read`/`write`/…)
/// into a byte count, treating any negative return as an error.
pub(crate) fn check_len(res: libc::ssize_t) -> Result<usize, OsError> {
    if res < 0 {
        Err(OsError::last())
    } else {
        Ok(usize::try_from(res).expect("syscall byte count should fit in usize"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_detects_eagain() {
        let err = OsError::from_code(libc::EAGAIN);
        assert!(err.would_block());
        let other = OsError::from_code(libc::EINVAL);
        assert!(!other.would_block());
    }

    #[test]
    fn io_error_display_delegates() {
        let err: IoError = PreconditionError::NotOpen.into();
        assert_eq!(err.to_string(), "descriptor is not open");
    }
}
