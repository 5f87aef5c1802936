// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::chain::StepDriver;
use rt_queue::Queue;
use rt_sync::Awaiter;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// Parking primitive for an idle worker: a producer posting work sets the
/// flag and notifies; the worker's park loop wakes, clears the flag, and
/// re-checks its queue. Plain mutex+condvar, same as the original — nothing
/// about worker sleep needs to be lock-free, only the queue it drains does.
type Park = (Mutex<bool>, Condvar);

/// The posting-side handle a [`crate::pool::ThreadPool`] holds for one
/// worker: enough to enqueue work and wake it, without needing access to
/// the worker thread's own state.
pub(crate) struct WorkerHandle {
    queue: Arc<Queue<Box<dyn StepDriver>>>,
    park: Arc<Park>,
    stopped: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    pub(crate) fn spawn(
        id: usize,
        pending: Arc<AtomicUsize>,
        idle: Awaiter,
        queue_backoff_max_exponent: u8,
    ) -> Self {
        let queue = Arc::new(Queue::new());
        let park: Arc<Park> = Arc::new((Mutex::new(false), Condvar::new()));
        let stopped = Arc::new(AtomicBool::new(false));

        let thread = {
            let queue = Arc::clone(&queue);
            let park = Arc::clone(&park);
            let stopped = Arc::clone(&stopped);
            std::thread::Builder::new()
                .name(format!("rt-worker-{id}"))
                .spawn(move || {
                    worker_loop(id, &queue, &park, &stopped, &pending, &idle, queue_backoff_max_exponent)
                })
                .expect("failed to spawn worker thread")
        };

        Self {
            queue,
            park,
            stopped,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Enqueues `driver` and wakes the worker if parked. The caller is
    /// responsible for having already checked `is_stopped`.
    pub(crate) fn post(&self, driver: Box<dyn StepDriver>) {
        self.queue.push_back(driver);
        let (lock, cvar) = &*self.park;
        let mut woke = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *woke = true;
        cvar.notify_one();
    }

    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let (lock, cvar) = &*self.park;
        let mut woke = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *woke = true;
        cvar.notify_all();
    }

    /// Joins the worker thread. Idempotent: a second call after the first
    /// has already taken the handle is a no-op.
    pub(crate) fn join(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    id: usize,
    queue: &Arc<Queue<Box<dyn StepDriver>>>,
    park: &Arc<Park>,
    stopped: &Arc<AtomicBool>,
    pending: &Arc<AtomicUsize>,
    idle: &Awaiter,
    queue_backoff_max_exponent: u8,
) {
    tracing::debug!(worker_id = id, "worker starting");
    let mut consumer = queue.consumer_with_backoff(queue_backoff_max_exponent);

    loop {
        match consumer.pop() {
            Some(mut driver) => {
                loop {
                    driver.execute();
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }
                    if !driver.next() {
                        break;
                    }
                }
                driver.complete();
                let remaining = pending.fetch_sub(1, Ordering::AcqRel) - 1;
                tracing::trace!(worker_id = id, pending = remaining, "drained one closure");
                if remaining == 0 {
                    idle.reset();
                    idle.notify_all();
                }
            }
            None => {
                if stopped.load(Ordering::Acquire) {
                    break;
                }
                let (lock, cvar) = &**park;
                let mut woke = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                while !*woke && queue.is_empty() && !stopped.load(Ordering::Acquire) {
                    woke = cvar.wait(woke).unwrap_or_else(std::sync::PoisonError::into_inner);
                }
                *woke = false;
            }
        }
    }
    tracing::debug!(worker_id = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    struct RecordDriver {
        slot: Arc<AtomicI32>,
        value: i32,
    }

    impl StepDriver for RecordDriver {
        fn execute(&mut self) {
            self.slot.store(self.value, Ordering::SeqCst);
        }
        fn next(&mut self) -> bool {
            false
        }
        fn complete(&mut self) {}
    }

    #[test]
    fn posted_driver_runs_on_worker_thread() {
        let pending = Arc::new(AtomicUsize::new(1));
        let idle = Awaiter::new();
        let worker = WorkerHandle::spawn(0, Arc::clone(&pending), idle.clone(), 8);

        let slot = Arc::new(AtomicI32::new(0));
        worker.post(Box::new(RecordDriver {
            slot: Arc::clone(&slot),
            value: 42,
        }));

        let mut waited = Duration::ZERO;
        while slot.load(Ordering::SeqCst) == 0 && waited < Duration::from_secs(1) {
            std::thread::sleep(Duration::from_millis(5));
            waited += Duration::from_millis(5);
        }
        assert_eq!(slot.load(Ordering::SeqCst), 42);

        worker.stop();
        worker.join();
    }

    #[test]
    fn stop_wakes_an_idle_worker_without_posted_work() {
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Awaiter::new();
        let worker = WorkerHandle::spawn(0, pending, idle, 8);
        worker.stop();
        worker.join();
    }
}
