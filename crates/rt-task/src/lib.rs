// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A composable unit-of-work abstraction ([`Task`]) backed by a
//! promise/future pair, driven either synchronously ([`InlineRunner`]) or
//! across a fixed [`ThreadPool`] ([`PoolRunner`]).

mod chain;
mod config;
mod context;
mod pool;
mod promise;
mod runner;
mod worker;

pub use chain::{BoxError, Task};
pub use config::RuntimeConfig;
pub use context::StepContext;
pub use pool::{PoolRunner, PostError, ThreadPool};
pub use promise::{Future, Promise};
pub use runner::{InlineRunner, TaskRunner, global, set_global};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    #[test]
    fn in_order_chain_on_thread_pool() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let pool = ThreadPool::new(RuntimeConfig::with_workers(4));
        let runner = PoolRunner::new(Arc::new(pool));

        let words = ["Be", "sure", "to", "drink", "your", "Ovaltine!"];
        let mut task: Task<()> = Task::from_fn({
            let log = Arc::clone(&log);
            move || {
                log.lock().unwrap().push(words[0]);
                Ok(())
            }
        });
        for word in &words[1..] {
            let log = Arc::clone(&log);
            let word = *word;
            task = task.then(move |_ctx| {
                log.lock().unwrap().push(word);
                Ok(())
            });
        }

        let fut = task.run(&runner);
        fut.wait();
        assert_eq!(*log.lock().unwrap(), words.to_vec());
        runner.pool().stop();
    }

    #[test]
    fn task_reuse_runs_ten_times() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = InlineRunner::new();
        let task: Task<usize> = Task::from_fn({
            let counter = Arc::clone(&counter);
            move || Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
        });

        for expected in 1..=10 {
            let fut = task.run(&runner);
            fut.wait();
            assert_eq!(task.promise().release_value(), expected);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn failure_capture_skips_remaining_steps() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = InlineRunner::new();
        let task: Task<()> = Task::from_fn(|| Err("boom".into()))
            .then({
                let counter = Arc::clone(&counter);
                move |_ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });

        let fut = task.run(&runner);
        fut.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let err = task.promise().release_failure();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn delay_is_monotonic() {
        let runner = InlineRunner::new();
        let t0 = Arc::new(Mutex::new(None));
        let t1 = Arc::new(Mutex::new(None));

        let task: Task<()> = Task::from_fn({
            let t0 = Arc::clone(&t0);
            move || {
                *t0.lock().unwrap() = Some(Instant::now());
                Ok(())
            }
        })
        .then_task(runner.delay(Duration::from_millis(1)))
        .then({
            let t1 = Arc::clone(&t1);
            move |_ctx| {
                *t1.lock().unwrap() = Some(Instant::now());
                Ok(())
            }
        });

        task.run(&runner).wait();
        let elapsed = t1.lock().unwrap().unwrap() - t0.lock().unwrap().unwrap();
        assert!(elapsed >= Duration::from_millis(1));
    }

    #[test]
    fn pool_drains_to_idle_exactly_n_completions() {
        let completed = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(ThreadPool::new(RuntimeConfig::with_workers(3)));
        let runner = PoolRunner::new(Arc::clone(&pool));

        const N: usize = 200;
        for _ in 0..N {
            let completed = Arc::clone(&completed);
            let task: Task<()> = Task::from_fn(move || {
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            task.run(&runner);
        }

        pool.wait_for_idle();
        assert_eq!(completed.load(Ordering::SeqCst), N);
        assert_eq!(pool.pending(), 0);
        pool.stop();
    }
}
