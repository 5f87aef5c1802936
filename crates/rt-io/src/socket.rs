// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{IoError, check, check_len};
use crate::fd::{Descriptor, set_nonblocking};
use crate::stream::{Reader, Writer};
use std::mem::{MaybeUninit, size_of};
use std::os::fd::RawFd;

/// An IPv4 address plus port, matching `txl::socket_address`'s
/// `sockaddr_in` wrapper. The "unset" constructor mirrors the original's
/// `INADDR_NONE` sentinel, including its odd equality rule: two unset
/// addresses compare equal regardless of port.
#[derive(Debug, Clone, Copy)]
pub struct SocketAddress {
    addr: libc::sockaddr_in,
}

impl SocketAddress {
    #[must_use]
    pub fn unset() -> Self {
        // Safety: `sockaddr_in` is a C struct of plain integer fields; an
        // all-zero bit pattern is a valid value for each of them.
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        addr.sin_family = u16::try_from(libc::AF_INET).expect("AF_INET fits in u16");
        addr.sin_addr.s_addr = u32::from(libc::INADDR_NONE).to_be();
        Self { addr }
    }

    #[must_use]
    pub fn any(port: u16) -> Self {
        let mut sa = Self::unset();
        sa.addr.sin_addr.s_addr = u32::from(libc::INADDR_ANY).to_be();
        sa.addr.sin_port = port.to_be();
        sa
    }

    /// # Panics
    /// Panics if `ip` is not a valid dotted-quad IPv4 address.
    #[must_use]
    pub fn new(ip: &str, port: u16) -> Self {
        let octets: Vec<u8> = ip
            .split('.')
            .map(|part| part.parse::<u8>().expect("ip must be a dotted-quad IPv4 address"))
            .collect();
        assert!(octets.len() == 4, "ip must be a dotted-quad IPv4 address");
        let mut sa = Self::unset();
        // `s_addr` is stored in network byte order, same as `any()`'s
        // `.to_be()` below; `from_ne_bytes` here makes the in-memory byte
        // layout equal the dotted-quad octets regardless of host endianness,
        // which is exactly network order.
        sa.addr.sin_addr.s_addr = u32::from_ne_bytes([octets[0], octets[1], octets[2], octets[3]]);
        sa.addr.sin_port = port.to_be();
        sa
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        u16::from_be(self.addr.sin_port)
    }

    pub(crate) fn as_sockaddr(&self) -> &libc::sockaddr_in {
        &self.addr
    }

    pub(crate) fn from_sockaddr(addr: libc::sockaddr_in) -> Self {
        Self { addr }
    }

    fn is_unset(&self) -> bool {
        // Same network-byte-order convention `unset()` stores with above, so
        // this stays correct now that `new()` stores in that order too.
        self.addr.sin_addr.s_addr == u32::from(libc::INADDR_NONE).to_be()
    }
}

impl PartialEq for SocketAddress {
    fn eq(&self, other: &Self) -> bool {
        if self.is_unset() && other.is_unset() {
            return true;
        }
        self.addr.sin_addr.s_addr == other.addr.sin_addr.s_addr && self.addr.sin_port == other.addr.sin_port
    }
}

impl Eq for SocketAddress {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet,
}

impl AddressFamily {
    fn raw(self) -> libc::c_int {
        match self {
            Self::Inet => libc::AF_INET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Stream,
    Datagram,
    Raw,
    SeqPacket,
}

impl SocketType {
    fn raw(self) -> libc::c_int {
        match self {
            Self::Stream => libc::SOCK_STREAM,
            Self::Datagram => libc::SOCK_DGRAM,
            Self::Raw => libc::SOCK_RAW,
            Self::SeqPacket => libc::SOCK_SEQPACKET,
        }
    }
}

/// A POSIX linger option value, matching `txl::socket_option::linger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linger {
    pub enabled: bool,
    pub seconds: i32,
}

/// A stream or datagram socket. Matches `txl::socket`: a `Reader` +
/// `Writer` over a raw descriptor plus the connection-oriented operations.
pub struct Socket {
    fd: Descriptor,
}

impl Socket {
    pub(crate) const fn from_raw(fd: RawFd) -> Self {
        Self { fd: Descriptor::open(fd) }
    }

    #[must_use]
    pub fn closed() -> Self {
        Self { fd: Descriptor::closed() }
    }

    /// # Errors
    /// The OS failure from `socket(2)`.
    pub fn open(family: AddressFamily, kind: SocketType, protocol: i32) -> Result<Self, IoError> {
        // Safety: plain FFI call with scalar arguments.
        let fd = check(unsafe { libc::socket(family.raw(), kind.raw(), protocol) })?;
        Ok(Self::from_raw(fd))
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

    pub fn bind(&mut self, addr: &SocketAddress) -> Result<(), IoError> {
        let fd = self.fd.raw()?;
        let sockaddr = addr.as_sockaddr();
        // Safety: `sockaddr` outlives the call and has the size `bind` expects for `AF_INET`.
        check(unsafe {
            libc::bind(fd, std::ptr::from_ref(sockaddr).cast(), size_of::<libc::sockaddr_in>().try_into().expect("sockaddr_in size fits in socklen_t"))
        })?;
        Ok(())
    }

    pub fn listen(&mut self, backlog: i32) -> Result<(), IoError> {
        let fd = self.fd.raw()?;
        // Safety: plain FFI call on a valid fd.
        check(unsafe { libc::listen(fd, backlog) })?;
        Ok(())
    }

    pub fn connect(&mut self, addr: &SocketAddress) -> Result<(), IoError> {
        let fd = self.fd.raw()?;
        let sockaddr = addr.as_sockaddr();
        // Safety: `sockaddr` outlives the call and has the size `connect` expects for `AF_INET`.
        check(unsafe {
            libc::connect(fd, std::ptr::from_ref(sockaddr).cast(), size_of::<libc::sockaddr_in>().try_into().expect("sockaddr_in size fits in socklen_t"))
        })?;
        Ok(())
    }

    /// # Errors
    /// The OS failure from `accept4(2)` — including `EAGAIN`/`EWOULDBLOCK`
    /// if the listening socket is non-blocking and nothing is pending.
    pub fn accept(&mut self) -> Result<(Self, SocketAddress), IoError> {
        let fd = self.fd.raw()?;
        let mut storage = MaybeUninit::<libc::sockaddr_in>::zeroed();
        let mut len = size_of::<libc::sockaddr_in>().try_into().expect("sockaddr_in size fits in socklen_t");
        // Safety: `storage`/`len` describe a valid output buffer of the expected size.
        let accepted = check(unsafe { libc::accept4(fd, storage.as_mut_ptr().cast(), &raw mut len, 0) })?;
        // Safety: `accept4` filled `storage` on success.
        let addr = unsafe { storage.assume_init() };
        Ok((Self::from_raw(accepted), SocketAddress::from_sockaddr(addr)))
    }

    pub fn shutdown(&mut self) -> Result<(), IoError> {
        let fd = self.fd.raw()?;
        // Safety: plain FFI call on a valid fd.
        check(unsafe { libc::shutdown(fd, libc::SHUT_RDWR) })?;
        Ok(())
    }

    pub fn local_address(&self) -> Result<SocketAddress, IoError> {
        let fd = self.fd.raw()?;
        let mut storage = MaybeUninit::<libc::sockaddr_in>::zeroed();
        let mut len = size_of::<libc::sockaddr_in>().try_into().expect("sockaddr_in size fits in socklen_t");
        // Safety: `storage`/`len` describe a valid output buffer of the expected size.
        check(unsafe { libc::getsockname(fd, storage.as_mut_ptr().cast(), &raw mut len) })?;
        // Safety: `getsockname` filled `storage` on success.
        Ok(SocketAddress::from_sockaddr(unsafe { storage.assume_init() }))
    }

    pub fn peer_address(&self) -> Result<SocketAddress, IoError> {
        let fd = self.fd.raw()?;
        let mut storage = MaybeUninit::<libc::sockaddr_in>::zeroed();
        let mut len = size_of::<libc::sockaddr_in>().try_into().expect("sockaddr_in size fits in socklen_t");
        // Safety: `storage`/`len` describe a valid output buffer of the expected size.
        check(unsafe { libc::getpeername(fd, storage.as_mut_ptr().cast(), &raw mut len) })?;
        // Safety: `getpeername` filled `storage` on success.
        Ok(SocketAddress::from_sockaddr(unsafe { storage.assume_init() }))
    }

    pub fn set_linger(&mut self, linger: Linger) -> Result<(), IoError> {
        let fd = self.fd.raw()?;
        let raw = libc::linger {
            l_onoff: i32::from(linger.enabled),
            l_linger: linger.seconds,
        };
        // Safety: `raw` is a valid, correctly sized `linger` option value.
        check(unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                std::ptr::from_ref(&raw).cast(),
                size_of::<libc::linger>().try_into().expect("linger size fits in socklen_t"),
            )
        })?;
        Ok(())
    }

    pub fn linger(&self) -> Result<Linger, IoError> {
        let fd = self.fd.raw()?;
        let mut raw = MaybeUninit::<libc::linger>::zeroed();
        let mut len = size_of::<libc::linger>().try_into().expect("linger size fits in socklen_t");
        // Safety: `raw`/`len` describe a valid output buffer of the expected size.
        check(unsafe { libc::getsockopt(fd, libc::SOL_SOCKET, libc::SO_LINGER, raw.as_mut_ptr().cast(), &raw mut len) })?;
        // Safety: `getsockopt` filled `raw` on success.
        let raw = unsafe { raw.assume_init() };
        Ok(Linger {
            enabled: raw.l_onoff != 0,
            seconds: raw.l_linger,
        })
    }
}

impl Reader for Socket {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let fd = self.fd.raw()?;
        // Safety: `buf` is valid for `buf.len()` writable bytes for the duration of the call.
        let n = check_len(unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), 0) })?;
        Ok(n)
    }
}

impl Writer for Socket {
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        let fd = self.fd.raw()?;
        // Safety: `buf` is valid for `buf.len()` readable bytes for the duration of the call.
        let n = check_len(unsafe { libc::send(fd, buf.as_ptr().cast(), buf.len(), 0) })?;
        Ok(n)
    }
}
