// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{IoError, PreconditionError, check, check_len};
use crate::fd::{Descriptor, set_nonblocking};
use crate::stream::{Reader, Writer};
use std::ffi::CString;
use std::os::fd::RawFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start,
    Current,
    End,
}

impl SeekFrom {
    fn to_whence(self) -> libc::c_int {
        match self {
            Self::Start => libc::SEEK_SET,
            Self::Current => libc::SEEK_CUR,
            Self::End => libc::SEEK_END,
        }
    }
}

fn mode_flags(mode: &str) -> Result<libc::c_int, PreconditionError> {
    match mode {
        "r" => Ok(libc::O_RDONLY),
        "w" => Ok(libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC),
        "a" => Ok(libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND),
        "r+" => Ok(libc::O_RDWR),
        "w+" => Ok(libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC),
        "a+" => Ok(libc::O_RDWR | libc::O_CREAT | libc::O_APPEND),
        _ => Err(PreconditionError::InvalidMode),
    }
}

const DEFAULT_FILE_PERMS: libc::mode_t = libc::S_IRUSR | libc::S_IWUSR | libc::S_IRGRP;

/// A seekable, positionable file stream. Mirrors `txl::file`: mode strings
/// `"r"`/`"w"`/`"a"`/`"r+"`/`"w+"`/`"a+"` select the same `O_*` flag
/// combinations the original derives from them.
pub struct File {
    fd: Descriptor,
}

impl File {
    #[must_use]
    pub fn closed() -> Self {
        Self { fd: Descriptor::closed() }
    }

    /// # Errors
    /// [`PreconditionError::AlreadyOpen`] if already open,
    /// [`PreconditionError::InvalidMode`] for an unrecognized mode string,
    /// or the OS failure from `open(2)`.
    pub fn open(path: &str, mode: &str) -> Result<Self, IoError> {
        let mut f = Self::closed();
        f.open_in_place(path, mode)?;
        Ok(f)
    }

    pub fn open_in_place(&mut self, path: &str, mode: &str) -> Result<(), IoError> {
        if self.fd.is_open() {
            return Err(PreconditionError::AlreadyOpen.into());
        }
        let flags = mode_flags(mode)?;
        let cpath = CString::new(path).map_err(|_| PreconditionError::InvalidMode)?;
        // Safety: `cpath` is a valid NUL-terminated string for the call's duration.
        let fd = check(unsafe { libc::open(cpath.as_ptr(), flags, DEFAULT_FILE_PERMS) })?;
        self.fd = Descriptor::open(fd);
        Ok(())
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

    /// Reads at `offset` without disturbing the file's current position.
    ///
    /// # Errors
    /// The descriptor precondition, or the OS failure from `pread(2)`.
    pub fn read_at(&mut self, offset: libc::off_t, buf: &mut [u8]) -> Result<usize, IoError> {
        let fd = self.fd.raw()?;
        // Safety: `buf` is valid for `buf.len()` writable bytes.
        let n = check_len(unsafe { libc::pread(fd, buf.as_mut_ptr().cast(), buf.len(), offset) })?;
        Ok(n)
    }

    /// # Errors
    /// The descriptor precondition, or the OS failure from `pwrite(2)`.
    pub fn write_at(&mut self, offset: libc::off_t, buf: &[u8]) -> Result<usize, IoError> {
        let fd = self.fd.raw()?;
        // Safety: `buf` is valid for `buf.len()` readable bytes.
        let n = check_len(unsafe { libc::pwrite(fd, buf.as_ptr().cast(), buf.len(), offset) })?;
        Ok(n)
    }

    /// # Errors
    /// The descriptor precondition, or the OS failure from `lseek(2)`.
    pub fn seek(&mut self, offset: libc::off_t, from: SeekFrom) -> Result<libc::off_t, IoError> {
        let fd = self.fd.raw()?;
        // Safety: FFI call with a valid fd and plain integer arguments.
        let res = unsafe { libc::lseek(fd, offset, from.to_whence()) };
        if res == -1 {
            Err(crate::error::OsError::last().into())
        } else {
            Ok(res)
        }
    }

    pub fn tell(&mut self) -> Result<libc::off_t, IoError> {
        self.seek(0, SeekFrom::Current)
    }

    /// Saves the current position, seeks to the end to measure size, then
    /// restores the original position.
    pub fn seekable_size(&mut self) -> Result<u64, IoError> {
        let pos = self.tell()?;
        let end = self.seek(0, SeekFrom::End)?;
        self.seek(pos, SeekFrom::Start)?;
        Ok(u64::try_from(end).unwrap_or(0))
    }

    pub fn truncate(&mut self, size: u64) -> Result<(), IoError> {
        let fd = self.fd.raw()?;
        let size = libc::off_t::try_from(size).map_err(|_| PreconditionError::InvalidMode)?;
        // Safety: FFI call with a valid fd.
        check(unsafe { libc::ftruncate(fd, size) })?;
        Ok(())
    }
}

impl Reader for File {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let fd = self.fd.raw()?;
        // Safety: `buf` is valid for `buf.len()` writable bytes for the duration of the call.
        let n = check_len(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })?;
        Ok(n)
    }
}

impl Writer for File {
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        let fd = self.fd.raw()?;
        // Safety: `buf` is valid for `buf.len()` readable bytes for the duration of the call.
        let n = check_len(unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) })?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        format!("/tmp/rt-io-file-test-{}-{name}", std::process::id())
    }

    #[test]
    fn write_then_read_back_roundtrips() {
        let path = temp_path("roundtrip");
        let mut f = File::open(&path, "w+").unwrap();
        assert_eq!(f.write(b"hello").unwrap(), 5);
        f.seek(0, SeekFrom::Start).unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(f.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        f.close().unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn eof_reads_return_zero_repeatedly() {
        let path = temp_path("eof");
        let mut f = File::open(&path, "w+").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(f.read(&mut buf).unwrap(), 0);
        assert_eq!(f.read(&mut buf).unwrap(), 0);
        f.close().unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_twice_is_a_precondition_error() {
        let path = temp_path("twice");
        let mut f = File::open(&path, "w+").unwrap();
        let err = f.open_in_place(&path, "w+").unwrap_err();
        assert!(matches!(err, IoError::Precondition(PreconditionError::AlreadyOpen)));
        f.close().unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn seekable_size_restores_position() {
        let path = temp_path("size");
        let mut f = File::open(&path, "w+").unwrap();
        f.write(b"0123456789").unwrap();
        f.seek(3, SeekFrom::Start).unwrap();
        assert_eq!(f.seekable_size().unwrap(), 10);
        assert_eq!(f.tell().unwrap(), 3);
        f.close().unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
