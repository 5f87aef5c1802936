// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::ops::{Deref, DerefMut};

cfg_if::cfg_if! {
    if #[cfg(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "powerpc64"))] {
        /// Pads and aligns a value to the size of a cache line, so that a hot
        /// atomic placed next to another one doesn't suffer false sharing.
        ///
        /// 128 bytes here: these architectures' big cores prefetch two
        /// adjacent 64-byte lines at once, so padding to one line alone
        /// still lets a neighbor's write invalidate the prefetch.
        #[repr(align(128))]
        pub struct CachePadded<T> {
            value: T,
        }
    } else if #[cfg(any(
        target_arch = "arm",
        target_arch = "mips",
        target_arch = "mips64",
        target_arch = "riscv64",
        target_arch = "sparc",
        target_arch = "hexagon",
    ))] {
        /// Pads and aligns a value to the size of a cache line, so that a hot
        /// atomic placed next to another one doesn't suffer false sharing.
        ///
        /// 32 bytes here: these embedded/smaller targets use shorter lines.
        #[repr(align(32))]
        pub struct CachePadded<T> {
            value: T,
        }
    } else if #[cfg(target_arch = "s390x")] {
        /// Pads and aligns a value to the size of a cache line, so that a hot
        /// atomic placed next to another one doesn't suffer false sharing.
        ///
        /// 256 bytes here: s390x's line size is unusually large.
        #[repr(align(256))]
        pub struct CachePadded<T> {
            value: T,
        }
    } else {
        /// Pads and aligns a value to the size of a cache line, so that a hot
        /// atomic placed next to another one doesn't suffer false sharing.
        ///
        /// 64 bytes here: the common case for everything not special-cased
        /// above.
        #[repr(align(64))]
        pub struct CachePadded<T> {
            value: T,
        }
    }
}

impl<T> CachePadded<T> {
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for CachePadded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePadded").field("value", &self.value).finish()
    }
}

impl<T> From<T> for CachePadded<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}
