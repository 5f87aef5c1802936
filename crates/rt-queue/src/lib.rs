// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A lock-free singly-linked FIFO used as a worker's intake queue.
//!
//! Producers are fully lock-free and wait-free with respect to each other
//! (`push_back` is a single CAS-free swap plus a link-store). The consumer
//! side is lock-free in the sense that it never blocks on a mutex, but this
//! queue only ever has one active consumer at a time: [`Queue::consumer`]
//! hands out an exclusive [`Consumer`] guard, which is what lets a pop free
//! its node immediately without hazard pointers or epoch-based reclamation —
//! there is no second dequeuer that could observe a freed node's address
//! reused. See `DESIGN.md` for the tradeoff this resolves.

use rt_util::{Backoff, CachePadded};
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

#[cfg(debug_assertions)]
const CANARY_LIVE: u32 = 0xC0FF_EE00;

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    value: std::cell::UnsafeCell<Option<T>>,
    #[cfg(debug_assertions)]
    canary: u32,
}

impl<T> Node<T> {
    fn alloc(value: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value: std::cell::UnsafeCell::new(value),
            #[cfg(debug_assertions)]
            canary: CANARY_LIVE,
        }))
    }
}

/// Multi-producer, single-consumer lock-free FIFO of owned values.
pub struct Queue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    has_consumer: AtomicBool,
    num_inserts: AtomicU64,
    num_pops: AtomicU64,
}

// Safety: all cross-thread access to `Node` contents is mediated by the
// atomic head/tail linkage and the single-consumer invariant enforced by
// `Consumer`.
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

static_assertions::assert_impl_all!(Queue<i32>: Send, Sync);

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    #[must_use]
    pub fn new() -> Self {
        let stub = Node::alloc(None);
        Self {
            head: CachePadded::new(AtomicPtr::new(stub)),
            tail: CachePadded::new(AtomicPtr::new(stub)),
            has_consumer: AtomicBool::new(false),
            num_inserts: AtomicU64::new(0),
            num_pops: AtomicU64::new(0),
        }
    }

    /// Enqueues `value`. Never blocks; lock-free with respect to other
    /// producers.
    pub fn push_back(&self, value: T) {
        let node = Node::alloc(Some(value));
        let prev_tail = self.tail.swap(node, Ordering::AcqRel);
        // Safety: `prev_tail` was installed by a previous `push_back` (or is
        // the initial stub) and stays alive until the consumer unlinks it
        // from `head`, which cannot happen before this store is visible.
        unsafe { (*prev_tail).next.store(node, Ordering::Release) };
        self.num_inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Conservative emptiness check: may briefly report non-empty while a
    /// push is still linking its node, but never reports empty for a push
    /// that has already completed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        // Safety: `head` always points at a node owned by this queue.
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }

    /// Advisory, relaxed-ordering counters; not authoritative mid-operation
    /// (see `DESIGN.md`).
    #[must_use]
    pub fn num_inserts(&self) -> u64 {
        self.num_inserts.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn num_pops(&self) -> u64 {
        self.num_pops.load(Ordering::Relaxed)
    }

    /// Acquires exclusive dequeue rights over this queue.
    ///
    /// # Panics
    /// Panics if a [`Consumer`] already exists for this queue.
    pub fn consumer(&self) -> Consumer<'_, T> {
        self.consumer_with_backoff(Backoff::DEFAULT_MAX_EXPONENT)
    }

    /// Like [`Queue::consumer`], but caps the exponential backoff
    /// [`Consumer::pop`] uses when it observes a transient "inconsistent"
    /// push race at `max_exponent` doublings instead of the default.
    ///
    /// # Panics
    /// Panics if a [`Consumer`] already exists for this queue.
    pub fn consumer_with_backoff(&self, max_exponent: u8) -> Consumer<'_, T> {
        assert!(
            !self.has_consumer.swap(true, Ordering::AcqRel),
            "rt_queue::Queue already has an active consumer"
        );
        Consumer { queue: self, max_exponent }
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        let mut node = *self.head.get_mut();
        while !node.is_null() {
            // Safety: with `&mut self`, no concurrent access is possible, so
            // every node reachable from `head` is uniquely ours to free.
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next.load(Ordering::Relaxed);
        }
    }
}

/// Exclusive dequeue handle for a [`Queue`]. Only one may exist per queue at
/// a time.
pub struct Consumer<'q, T> {
    queue: &'q Queue<T>,
    max_exponent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryPopError {
    /// The queue is genuinely empty.
    Empty,
    /// A push is mid-flight: its node has been swapped into `tail` but not
    /// yet linked from the previous tail. Retrying shortly resolves this.
    Inconsistent,
}

impl<T> Consumer<'_, T> {
    /// Attempts a single dequeue without retrying past a transient
    /// "inconsistent" observation; see [`Consumer::pop`] for a retrying
    /// variant.
    pub fn try_pop(&mut self) -> Result<T, TryPopError> {
        let q = self.queue;
        let head = q.head.load(Ordering::Relaxed);
        // Safety: `head` is only ever written by this consumer (there is at
        // most one) and always points at a live node.
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return if q.tail.load(Ordering::Acquire) == head {
                Err(TryPopError::Empty)
            } else {
                Err(TryPopError::Inconsistent)
            };
        }
        // Safety: `push_back` fully initializes `value` before publishing
        // `next` via a Release store, which we synchronized with above.
        let value = unsafe { (*(*next).value.get()).take() }
            .expect("rt_queue: linked node was missing its value");
        q.head.store(next, Ordering::Release);
        // Safety: `head` (the old sentinel) is unreachable from any other
        // consumer — there is only ever one — and producers never
        // dereference a node once it has stopped being `head`.
        let old = unsafe { Box::from_raw(head) };
        #[cfg(debug_assertions)]
        debug_assert_eq!(old.canary, CANARY_LIVE, "rt_queue: node reused after free");
        drop(old);
        q.num_pops.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Pops the front value, retrying past transient "inconsistent"
    /// observations with a bounded backoff. Returns `None` only once the
    /// queue is genuinely empty.
    pub fn pop(&mut self) -> Option<T> {
        let mut backoff = Backoff::with_max_exponent(self.max_exponent);
        loop {
            match self.try_pop() {
                Ok(v) => return Some(v),
                Err(TryPopError::Empty) => return None,
                Err(TryPopError::Inconsistent) => {
                    tracing::trace!("rt_queue: inconsistent pop observation, backing off");
                    backoff.spin();
                }
            }
        }
    }
}

impl<T> Drop for Consumer<'_, T> {
    fn drop(&mut self) {
        self.queue.has_consumer.store(false, Ordering::Release);
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("num_inserts", &self.num_inserts())
            .field("num_pops", &self.num_pops())
            .field("empty", &self.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_then_pop_preserves_order() {
        let q = Queue::new();
        for i in 0..8 {
            q.push_back(i);
        }
        let mut c = q.consumer();
        let popped: Vec<_> = std::iter::from_fn(|| c.pop()).collect();
        assert_eq!(popped, (0..8).collect::<Vec<_>>());
        assert_eq!(q.num_inserts(), 8);
        assert_eq!(q.num_pops(), 8);
    }

    #[test]
    fn empty_queue_pops_none() {
        let q: Queue<u32> = Queue::new();
        let mut c = q.consumer();
        assert_eq!(c.pop(), None);
    }

    #[test]
    #[should_panic(expected = "already has an active consumer")]
    fn second_consumer_panics() {
        let q: Queue<u32> = Queue::new();
        let _first = q.consumer();
        let _second = q.consumer();
    }

    #[test]
    fn fairness_under_two_producers_one_consumer() {
        const N: usize = 10_000;
        let q = Arc::new(Queue::new());

        let producers: Vec<_> = (0..2)
            .map(|producer_id| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..N {
                        q.push_back((producer_id, i));
                    }
                })
            })
            .collect();

        let mut popped = Vec::with_capacity(N * 2);
        let consumer = thread::spawn({
            let q = Arc::clone(&q);
            move || {
                let mut c = q.consumer();
                while popped.len() < N * 2 {
                    if let Some(v) = c.pop() {
                        popped.push(v);
                    }
                }
                popped
            }
        });

        for p in producers {
            p.join().unwrap();
        }
        let popped = consumer.join().unwrap();

        for producer_id in 0..2 {
            let seq: Vec<_> = popped
                .iter()
                .filter(|(p, _)| *p == producer_id)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(seq, (0..N).collect::<Vec<_>>());
        }
    }
}
