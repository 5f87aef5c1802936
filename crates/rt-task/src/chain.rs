// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::context::StepContext;
use crate::promise::{Future, Promise};
use crate::runner::TaskRunner;
use std::fmt;
use std::sync::{Arc, Mutex};

pub use crate::promise::BoxError;

type StepFn<T> = Box<dyn FnMut(&StepContext<T>) -> Result<T, BoxError> + Send>;

#[derive(Debug)]
struct EmptyTaskError;

impl fmt::Display for EmptyTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "empty task did not produce a result")
    }
}

impl std::error::Error for EmptyTaskError {}

/// An ordered sequence of steps paired with the promise that carries their
/// combined result, reusable across successive `run` invocations.
///
/// The step list lives behind an `Arc<Mutex<_>>` rather than being owned
/// outright: a `run` hands a driver over to a runner, which may execute it
/// on another OS thread entirely (the thread-pool runner always does), so
/// the steps must outlive the borrow-checker's usual notion of "this call
/// frame". The `Task` value itself is still the single owning handle from
/// the caller's point of view; nothing else holds a `Task`.
pub struct Task<T> {
    promise: Promise<T>,
    steps: Arc<Mutex<Vec<StepFn<T>>>>,
}

impl<T: Send + 'static> Task<T> {
    /// Builds a single-step task from a parameterless fallible closure.
    pub fn from_fn<F>(mut f: F) -> Self
    where
        F: FnMut() -> Result<T, BoxError> + Send + 'static,
    {
        Self {
            promise: Promise::new(),
            steps: Arc::new(Mutex::new(vec![Box::new(move |_ctx: &StepContext<T>| f())])),
        }
    }

    /// Appends a step that can observe the previous step's result through
    /// its [`StepContext`].
    #[must_use]
    pub fn then<F>(self, f: F) -> Self
    where
        F: FnMut(&StepContext<T>) -> Result<T, BoxError> + Send + 'static,
    {
        self.steps.lock().unwrap().push(Box::new(f));
        self
    }

    /// Transfers `other`'s steps onto this task's tail.
    #[must_use]
    pub fn then_task(self, other: Task<T>) -> Self {
        let mut other_steps = other.steps.lock().unwrap();
        self.steps.lock().unwrap().append(&mut other_steps);
        drop(other_steps);
        self
    }

    #[must_use]
    pub fn promise(&self) -> &Promise<T> {
        &self.promise
    }

    /// Resets the promise and submits this task's chain to `runner`,
    /// returning a future that resolves once the whole chain has run.
    ///
    /// # Panics
    /// Panics if called while a previous `run` of the same task is still
    /// in flight — the promise and chain are exclusively owned by the
    /// active run for its duration (see `DESIGN.md`).
    pub fn run(&self, runner: &dyn TaskRunner) -> Future<T> {
        self.promise.reset();
        let driver = ChainDriver {
            steps: Arc::clone(&self.steps),
            promise: self.promise.clone(),
            index: 0,
            ctx: StepContext::new(),
            failed: false,
        };
        let future = self.promise.future();
        runner.run(Box::new(driver));
        future
    }
}

/// Drives one task's chain through `execute → next → … → complete`. This is
/// the object a [`TaskRunner`] takes ownership of: an inline runner drives
/// it immediately on the caller's thread; a thread-pool worker enqueues it
/// and drives it once it is dequeued.
pub trait StepDriver: Send {
    /// Runs the current step, if any, recording its outcome.
    fn execute(&mut self);
    /// Advances to the next step. Returns `true` if another step remains.
    fn next(&mut self) -> bool;
    /// Signals the promise exactly once, synthesizing an empty-task failure
    /// if the chain produced neither a value nor a failure.
    fn complete(&mut self);
}

struct ChainDriver<T> {
    steps: Arc<Mutex<Vec<StepFn<T>>>>,
    promise: Promise<T>,
    index: usize,
    ctx: StepContext<T>,
    failed: bool,
}

impl<T: Send + 'static> StepDriver for ChainDriver<T> {
    fn execute(&mut self) {
        if self.failed {
            return;
        }
        let outcome = {
            let mut steps = self.steps.lock().unwrap();
            steps.get_mut(self.index).map(|step| step(&self.ctx))
        };
        match outcome {
            Some(Ok(value)) => self.ctx.record_success(value),
            Some(Err(err)) => {
                self.ctx.record_failure();
                self.failed = true;
                self.promise.set_exception_notify(err, false);
            }
            None => {}
        }
    }

    fn next(&mut self) -> bool {
        if self.failed {
            return false;
        }
        self.index += 1;
        self.index < self.steps.lock().unwrap().len()
    }

    fn complete(&mut self) {
        if self.failed {
            // already recorded in `execute`; just signal.
            self.promise.notify_all();
            return;
        }
        match self.ctx.take_result() {
            Some(value) => self.promise.set_value(value),
            None => self.promise.set_exception(Box::new(EmptyTaskError)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::InlineRunner;

    #[test]
    fn single_step_yields_value() {
        let runner = InlineRunner::new();
        let task: Task<i32> = Task::from_fn(|| Ok(5));
        let fut = task.run(&runner);
        assert_eq!(fut.wait_into_result().unwrap(), 5);
    }

    #[test]
    fn steps_observe_previous_result_in_order() {
        let runner = InlineRunner::new();
        let task: Task<i32> = Task::from_fn(|| Ok(1))
            .then(|ctx| Ok(ctx.result().copied().unwrap_or(0) + 1))
            .then(|ctx| Ok(ctx.result().copied().unwrap_or(0) * 10));
        let fut = task.run(&runner);
        assert_eq!(fut.wait_into_result().unwrap(), 20);
    }

    #[test]
    fn then_task_appends_other_chain_in_order() {
        let runner = InlineRunner::new();
        let head: Task<i32> = Task::from_fn(|| Ok(1));
        let tail: Task<i32> = Task::from_fn(|| Ok(41));
        let combined = head.then_task(tail).then(|ctx| Ok(ctx.result().copied().unwrap() + 1));
        let fut = combined.run(&runner);
        assert_eq!(fut.wait_into_result().unwrap(), 42);
    }
}
