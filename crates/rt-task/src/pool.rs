// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::chain::StepDriver;
use crate::config::RuntimeConfig;
use crate::runner::TaskRunner;
use crate::worker::WorkerHandle;
use rt_sync::Awaiter;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Returned when [`ThreadPool::post_work`] is called after [`ThreadPool::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostError;

impl fmt::Display for PostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread pool is stopped and no longer accepts work")
    }
}

impl std::error::Error for PostError {}

/// A fixed-size pool of worker threads, each with its own intake queue.
///
/// Work is dispatched round-robin across workers rather than through one
/// shared queue: every worker's intake is a single-consumer [`rt_queue::Queue`],
/// so round-robin dispatch is what lets posting stay lock-free without a
/// shared consumer side.
pub struct ThreadPool {
    workers: Vec<WorkerHandle>,
    next: AtomicUsize,
    pending: Arc<AtomicUsize>,
    idle: Awaiter,
    stopped: AtomicBool,
    joined: Mutex<bool>,
}

impl ThreadPool {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Awaiter::new();
        idle.notify_all();

        let workers = (0..config.num_workers.get())
            .map(|id| {
                WorkerHandle::spawn(id, Arc::clone(&pending), idle.clone(), config.queue_backoff_max_exponent)
            })
            .collect();

        Self {
            workers,
            next: AtomicUsize::new(0),
            pending,
            idle,
            stopped: AtomicBool::new(false),
            joined: Mutex::new(false),
        }
    }

    /// Number of closures submitted but not yet completed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Hands `driver` to the next worker in round-robin order.
    ///
    /// # Errors
    /// Returns [`PostError`] if the pool has been stopped; `driver` is
    /// dropped unexecuted in that case.
    pub fn post_work(&self, driver: Box<dyn StepDriver>) -> Result<(), PostError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PostError);
        }
        let was_idle = self.pending.fetch_add(1, Ordering::AcqRel) == 0;
        if was_idle {
            self.idle.reset();
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[index].post(driver);
        Ok(())
    }

    /// Blocks until every posted closure has completed and no work remains
    /// in flight.
    ///
    /// Rechecks `pending` after each wake instead of trusting a single
    /// `wait()`: a worker's `idle.reset(); idle.notify_all()` can interleave
    /// with a concurrent `post_work`'s `idle.reset()` such that the awaiter
    /// is left signaled while `pending` is already back above zero, which
    /// would otherwise let this return early.
    pub fn wait_for_idle(&self) {
        while self.pending() > 0 {
            self.idle.wait();
        }
        self.idle.reset();
    }

    /// Stops accepting new work and joins every worker thread. Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        for worker in &self.workers {
            worker.stop();
        }
        let mut joined = self.joined.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !*joined {
            for worker in &self.workers {
                worker.join();
            }
            *joined = true;
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives tasks by dispatching them onto a [`ThreadPool`].
pub struct PoolRunner {
    pool: Arc<ThreadPool>,
}

impl PoolRunner {
    #[must_use]
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }
}

impl TaskRunner for PoolRunner {
    fn run(&self, mut driver: Box<dyn StepDriver>) {
        // Checked ahead of posting so a stopped pool still drives the
        // promise to a terminal state instead of leaving `wait` blocked
        // forever: `complete` synthesizes the usual empty-chain failure
        // since no step ever ran.
        if self.pool.is_stopped() {
            driver.complete();
            return;
        }
        // A concurrent `stop()` between the check above and this post is
        // possible; the driver is simply dropped unexecuted in that case,
        // same as any other post-to-stopped-pool race.
        let _ = self.pool.post_work(driver);
    }
}
