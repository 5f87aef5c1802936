// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! One-shot synchronization primitives: a shareable wait/notify [`Awaiter`]
//! and a small closed-sum [`TaggedCell`] used by promises to hold either a
//! value, a captured failure, or nothing.

mod awaiter;
mod cell;

pub use awaiter::Awaiter;
pub use cell::TaggedCell;
