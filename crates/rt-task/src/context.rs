// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// The handle a step uses to read the previous step's result.
///
/// `set_result`/`set_exception` are deliberately not exposed here: per the
/// continuation-across-failure policy, a step's own `Result` return value is
/// what the driver uses to advance `StepContext` between iterations (see
/// `chain.rs`), so the step itself never needs to poke the context directly.
#[derive(Debug, Default)]
pub struct StepContext<T> {
    success: bool,
    result: Option<T>,
}

impl<T> StepContext<T> {
    pub(crate) fn new() -> Self {
        Self {
            success: false,
            result: None,
        }
    }

    /// True when the previous step completed without failure. Always false
    /// before the first step runs.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// The previous step's value, if any (`None` before the first step, or
    /// if the previous step failed).
    pub fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    pub(crate) fn record_success(&mut self, value: T) {
        self.success = true;
        self.result = Some(value);
    }

    pub(crate) fn record_failure(&mut self) {
        self.success = false;
        self.result = None;
    }

    pub(crate) fn take_result(&mut self) -> Option<T> {
        self.result.take()
    }
}
