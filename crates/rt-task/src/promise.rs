// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use rt_sync::{Awaiter, TaggedCell};
use std::sync::{Arc, Mutex};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

struct Inner<T> {
    cell: Mutex<TaggedCell<T, BoxError>>,
    awaiter: Awaiter,
}

/// A slot that transitions exactly once per run cycle from empty to a
/// terminal state (a value, or a captured failure), gated by a shared
/// [`Awaiter`].
///
/// Cloning a `Promise` shares the same underlying slot — this is how the
/// promise reaches both the worker that completes it and the [`Future`]
/// handle a caller waits on, without requiring either side to outlive the
/// other by lexical scope (the original's ownership note — "the owning task
/// must outlive all futures derived from it" — is honored by `Future` never
/// exposing anything beyond `wait`, not by a borrow).
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Mutex::new(TaggedCell::Empty),
                awaiter: Awaiter::new(),
            }),
        }
    }

    pub fn set_value(&self, value: T) {
        self.set_value_notify(value, true);
    }

    pub fn set_value_notify(&self, value: T, notify: bool) {
        self.inner.cell.lock().unwrap().set_value(value);
        if notify {
            self.inner.awaiter.notify_all();
        }
    }

    pub fn set_exception(&self, err: BoxError) {
        self.set_exception_notify(err, true);
    }

    pub fn set_exception_notify(&self, err: BoxError, notify: bool) {
        self.inner.cell.lock().unwrap().set_failure(err);
        if notify {
            self.inner.awaiter.notify_all();
        }
    }

    /// Signals the awaiter if the promise is already terminal; a no-op
    /// otherwise.
    pub fn notify_all(&self) {
        if !self.inner.cell.lock().unwrap().is_empty() {
            self.inner.awaiter.notify_all();
        }
    }

    pub fn reset(&self) {
        self.inner.cell.lock().unwrap().reset();
        self.inner.awaiter.reset();
    }

    #[must_use]
    pub fn is_value(&self) -> bool {
        self.inner.cell.lock().unwrap().is_value()
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.inner.cell.lock().unwrap().is_failure()
    }

    /// Blocks the calling thread until this promise reaches a terminal
    /// state.
    pub fn wait(&self) {
        self.inner.awaiter.wait();
    }

    /// Moves the stored value out.
    ///
    /// # Panics
    /// Panics if the promise is not currently holding a value.
    pub fn release_value(&self) -> T {
        self.inner.cell.lock().unwrap().release_value()
    }

    /// Moves the captured failure out.
    ///
    /// # Panics
    /// Panics if the promise is not currently holding a failure.
    pub fn release_failure(&self) -> BoxError {
        self.inner.cell.lock().unwrap().release_failure()
    }

    #[must_use]
    pub fn future(&self) -> Future<T> {
        Future {
            promise: self.clone(),
        }
    }
}

/// A read-only view onto a [`Promise`]'s awaiter. A future never inspects or
/// mutates the promise's value directly — callers wait, then consult the
/// promise (or call [`Future::wait_into_result`], which does both).
pub struct Future<T> {
    promise: Promise<T>,
}

impl<T> Future<T> {
    pub fn wait(&self) {
        self.promise.wait();
    }

    /// Waits, then moves the terminal value or failure out of the
    /// underlying promise.
    ///
    /// # Panics
    /// Panics if the promise never reached a terminal state (should not
    /// happen: every driven task synthesizes an empty-task failure if
    /// nothing else terminates it).
    pub fn wait_into_result(self) -> Result<T, BoxError> {
        self.promise.wait();
        if self.promise.is_value() {
            Ok(self.promise.release_value())
        } else if self.promise.is_failure() {
            Err(self.promise.release_failure())
        } else {
            panic!("Future::wait_into_result: promise is not terminal after wait()")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn set_value_then_future_wait_returns() {
        let p: Promise<i32> = Promise::new();
        p.set_value(42);
        let f = p.future();
        f.wait();
        assert_eq!(p.release_value(), 42);
    }

    #[test]
    fn set_value_happens_before_waiter_return() {
        let p: Promise<i32> = Promise::new();
        let witness = Arc::new(std::sync::atomic::AtomicI32::new(0));

        let waiter = {
            let p = p.clone();
            let witness = Arc::clone(&witness);
            thread::spawn(move || {
                p.wait();
                witness.load(std::sync::atomic::Ordering::Acquire)
            })
        };

        thread::sleep(std::time::Duration::from_millis(10));
        witness.store(7, std::sync::atomic::Ordering::Release);
        p.set_value(1);

        assert_eq!(waiter.join().unwrap(), 7);
    }

    #[test]
    fn reset_allows_reuse() {
        let p: Promise<i32> = Promise::new();
        p.set_value(1);
        p.wait();
        assert!(p.is_value());
        p.reset();
        assert!(!p.is_value());
        assert!(!p.is_failure());
    }
}
