// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{IoError, PreconditionError, check_len};
use crate::fd::{Descriptor, set_nonblocking};
use crate::stream::{Reader, Writer};
use std::os::fd::RawFd;

/// One end of an anonymous pipe. Matches `txl::pipe`: a thin `Reader` +
/// `Writer` over a raw descriptor, with no seek support.
pub struct Pipe {
    fd: Descriptor,
}

impl Pipe {
    pub(crate) const fn from_raw(fd: RawFd) -> Self {
        Self { fd: Descriptor::open(fd) }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.fd.is_open()
    }

    pub fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), IoError> {
        set_nonblocking(self.fd.raw()?, nonblocking)?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), IoError> {
        self.fd.close()?;
        Ok(())
    }

    #[must_use]
    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.fd.raw().ok()
    }
}

impl Reader for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let fd = self.fd.raw()?;
        // Safety: `buf` is valid for `buf.len()` writable bytes for the duration of the call.
        let n = check_len(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })?;
        Ok(n)
    }
}

impl Writer for Pipe {
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        let fd = self.fd.raw()?;
        // Safety: `buf` is valid for `buf.len()` readable bytes for the duration of the call.
        let n = check_len(unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) })?;
        Ok(n)
    }
}

/// An unopened, connected pair of pipe ends, matching `txl::pipe_connector`.
pub struct PipePair {
    input: Option<Pipe>,
    output: Option<Pipe>,
}

impl Default for PipePair {
    fn default() -> Self {
        Self::closed()
    }
}

impl PipePair {
    #[must_use]
    pub const fn closed() -> Self {
        Self { input: None, output: None }
    }

    /// # Errors
    /// [`PreconditionError::AlreadyOpen`] if either end is already open, or
    /// the OS failure from `pipe2(2)`.
    pub fn open() -> Result<Self, IoError> {
        let mut fds = [0i32; 2];
        // Safety: `fds` is a valid two-element buffer for `pipe2` to fill.
        crate::error::check(unsafe { libc::pipe2(fds.as_mut_ptr(), 0) })?;
        Ok(Self {
            input: Some(Pipe::from_raw(fds[0])),
            output: Some(Pipe::from_raw(fds[1])),
        })
    }

    pub fn input(&mut self) -> Result<&mut Pipe, PreconditionError> {
        self.input.as_mut().ok_or(PreconditionError::NotOpen)
    }

    pub fn output(&mut self) -> Result<&mut Pipe, PreconditionError> {
        self.output.as_mut().ok_or(PreconditionError::NotOpen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_on_output_is_visible_on_input() {
        let mut pair = PipePair::open().unwrap();
        assert_eq!(pair.output().unwrap().write(b"Hello").unwrap(), 5);

        let mut buf = [0u8; 5];
        assert_eq!(pair.input().unwrap().read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"Hello");
    }

    #[test]
    fn nonblocking_read_on_empty_pipe_would_block() {
        let mut pair = PipePair::open().unwrap();
        pair.input().unwrap().set_nonblocking(true).unwrap();

        let mut buf = [0u8; 4];
        let err = pair.input().unwrap().read(&mut buf).unwrap_err();
        assert!(err.would_block());
    }
}
