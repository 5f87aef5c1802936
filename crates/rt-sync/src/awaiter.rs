// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::{Arc, Condvar, Mutex};

/// A shared, reference-counted one-shot wait/notify primitive.
///
/// Any clone can `notify_all`; any clone can `wait`. A `wait` that arrives
/// after `notify_all` has already fired returns immediately — this is
/// edge-recording, not edge-triggered, which is what lets a future call
/// `wait()` after the value was already produced.
#[derive(Clone, Debug)]
pub struct Awaiter {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Default for Awaiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Awaiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Blocks the calling thread until some clone calls [`Awaiter::notify_all`],
    /// or returns immediately if one already has since the last [`Awaiter::reset`].
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut signaled = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !*signaled {
            tracing::trace!("awaiter blocking");
        }
        while !*signaled {
            signaled = cvar.wait(signaled).unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Signals all current and future (until the next [`Awaiter::reset`])
    /// waiters.
    pub fn notify_all(&self) {
        let (lock, cvar) = &*self.inner;
        let mut signaled = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *signaled = true;
        tracing::trace!("awaiter notified");
        cvar.notify_all();
    }

    /// Returns to the unsignaled state. Must not be called concurrently with
    /// `wait`/`notify_all` on the same cycle — callers own the happens-before
    /// edge that makes this safe (a task's `run` resets its promise's
    /// awaiter before submission, never mid-flight).
    pub fn reset(&self) {
        let (lock, _cvar) = &*self.inner;
        let mut signaled = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *signaled = false;
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        let (lock, _cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
