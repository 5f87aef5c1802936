// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::chain::{StepDriver, Task};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

/// Executes a driven chain to completion, either synchronously (the
/// [`InlineRunner`]) or by dispatching it across a worker pool (the
/// `PoolRunner` in `pool.rs`).
pub trait TaskRunner: Send + Sync {
    /// Takes ownership of `driver` and arranges for `execute → next → …
    /// → complete` to run to conclusion.
    fn run(&self, driver: Box<dyn StepDriver>);

    /// Returns a single-step task that sleeps for `duration` once it is
    /// driven. Which thread actually sleeps depends entirely on which
    /// runner subsequently drives the returned task — an inline runner
    /// sleeps the caller, a pool runner sleeps whichever worker picks it
    /// up — so every runner can share the same construction.
    fn delay(&self, duration: Duration) -> Task<()> {
        Task::from_fn(move || {
            std::thread::sleep(duration);
            Ok(())
        })
    }
}

/// Drives a task's chain synchronously on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineRunner;

impl InlineRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TaskRunner for InlineRunner {
    fn run(&self, mut driver: Box<dyn StepDriver>) {
        loop {
            driver.execute();
            if !driver.next() {
                break;
            }
        }
        driver.complete();
    }
}

static GLOBAL_RUNNER: OnceLock<RwLock<Arc<dyn TaskRunner>>> = OnceLock::new();

fn global_lock() -> &'static RwLock<Arc<dyn TaskRunner>> {
    GLOBAL_RUNNER.get_or_init(|| RwLock::new(Arc::new(InlineRunner::new())))
}

/// Returns the current process-wide default runner (the inline runner until
/// [`set_global`] is called).
#[must_use]
pub fn global() -> Arc<dyn TaskRunner> {
    Arc::clone(&global_lock().read().unwrap_or_else(std::sync::PoisonError::into_inner))
}

/// Installs `runner` as the process-wide default. The replacement must
/// outlive all subsequent calls to [`global`] — trivially true since it is
/// held in an `Arc` for the remainder of the process unless replaced again.
pub fn set_global(runner: Arc<dyn TaskRunner>) {
    *global_lock().write().unwrap_or_else(std::sync::PoisonError::into_inner) = runner;
}
