// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::IoError;
use crate::stream::{Reader, Writer};

const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Decides how much of a stream a [`copy`] call should transfer, matching
/// the original's `size_policy` hierarchy: each policy caps how many bytes
/// the next read should even request (so `exactly`/`at_most` never read
/// past what they need), then updates its own state from however many
/// bytes actually came back.
pub trait SizePolicy {
    /// Upper bound on the next read request. `copy` additionally caps this
    /// by its own scratch buffer size.
    fn next_read_cap(&self) -> usize;

    /// Updates state from a chunk that was read in response to a request
    /// capped at `requested` bytes (a short read signals EOF is near).
    fn advance(&mut self, requested: usize, chunk: &[u8]);

    fn is_complete(&self) -> bool;
}

/// Stops once exactly `n` bytes have been transferred, or EOF, whichever
/// comes first — a short stream is not an error.
pub struct Exactly {
    remaining: usize,
}

impl Exactly {
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self { remaining: n }
    }
}

impl SizePolicy for Exactly {
    fn next_read_cap(&self) -> usize {
        self.remaining
    }

    fn advance(&mut self, _requested: usize, chunk: &[u8]) {
        self.remaining -= chunk.len().min(self.remaining);
    }

    fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Like [`Exactly`], but also treats a short read (fewer bytes back than
/// requested) as a sign the stream is drying up and stops there, matching
/// the original `at_most`'s `maybe_eof_` heuristic.
pub struct AtMost {
    remaining: usize,
    maybe_eof: bool,
}

impl AtMost {
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self { remaining: n, maybe_eof: false }
    }
}

impl SizePolicy for AtMost {
    fn next_read_cap(&self) -> usize {
        self.remaining
    }

    fn advance(&mut self, requested: usize, chunk: &[u8]) {
        self.maybe_eof = chunk.len() < requested;
        self.remaining -= chunk.len().min(self.remaining);
    }

    fn is_complete(&self) -> bool {
        self.remaining == 0 || self.maybe_eof
    }
}

/// Stops as soon as `pattern` has appeared anywhere in the stream, tracked
/// across read boundaries with a streaming Knuth-Morris-Pratt matcher.
///
/// The original's `until` policy never actually sets its matched flag —
/// its `process()` body is empty — so nothing using it can ever terminate.
/// This is a real implementation. It requests one byte at a time: the only
/// way to guarantee the transfer stops at exactly the matched byte (not
/// wherever the next chunk boundary happens to fall) without buffering
/// bytes back into the source.
pub struct Until {
    pattern: Vec<u8>,
    failure: Vec<usize>,
    matched_len: usize,
    done: bool,
}

impl Until {
    #[must_use]
    pub fn new(pattern: Vec<u8>) -> Self {
        let failure = build_failure_table(&pattern);
        let done = pattern.is_empty();
        Self { pattern, failure, matched_len: 0, done }
    }

    fn feed(&mut self, byte: u8) {
        loop {
            if byte == self.pattern[self.matched_len] {
                self.matched_len += 1;
                break;
            }
            if self.matched_len == 0 {
                break;
            }
            self.matched_len = self.failure[self.matched_len - 1];
        }
        if self.matched_len == self.pattern.len() {
            self.done = true;
        }
    }
}

fn build_failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0usize; pattern.len()];
    let mut k = 0usize;
    for i in 1..pattern.len() {
        while k > 0 && pattern[k] != pattern[i] {
            k = table[k - 1];
        }
        if pattern[k] == pattern[i] {
            k += 1;
        }
        table[i] = k;
    }
    table
}

impl SizePolicy for Until {
    fn next_read_cap(&self) -> usize {
        usize::from(!self.done)
    }

    fn advance(&mut self, _requested: usize, chunk: &[u8]) {
        for &byte in chunk {
            self.feed(byte);
            if self.done {
                break;
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.done
    }
}

/// Completes as soon as any one of its constituent policies does, matching
/// the original `one_of` composite.
pub struct OneOf {
    policies: Vec<Box<dyn SizePolicy>>,
}

impl OneOf {
    #[must_use]
    pub fn new(policies: Vec<Box<dyn SizePolicy>>) -> Self {
        Self { policies }
    }
}

impl SizePolicy for OneOf {
    fn next_read_cap(&self) -> usize {
        self.policies.iter().map(|p| p.next_read_cap()).min().unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    fn advance(&mut self, requested: usize, chunk: &[u8]) {
        for policy in &mut self.policies {
            policy.advance(requested, chunk);
        }
    }

    fn is_complete(&self) -> bool {
        self.policies.iter().any(|p| p.is_complete())
    }
}

/// Copies bytes from `reader` to `writer`, requesting only as many bytes
/// per read as `policy` currently permits, until `policy` reports
/// completion or the reader hits EOF. Matches the original `copy()` free
/// function's slice-capped read loop (`copy.h`).
///
/// # Errors
/// Propagates whatever [`Reader::read`] or [`Writer::write`] return.
pub fn copy(reader: &mut dyn Reader, writer: &mut dyn Writer, policy: &mut dyn SizePolicy) -> Result<u64, IoError> {
    let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
    let mut total: u64 = 0;

    while !policy.is_complete() {
        let requested = policy.next_read_cap().min(buf.len()).max(1);
        let n = reader.read(&mut buf[..requested])?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        writer.write(chunk)?;
        total += u64::try_from(n).unwrap_or(u64::MAX);
        policy.advance(requested, chunk);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_buffer::ByteBuffer;

    #[test]
    fn exactly_stops_after_requested_count() {
        let mut src = ByteBuffer::from_bytes(b"0123456789".to_vec());
        let mut dst = ByteBuffer::new();
        let n = copy(&mut src, &mut dst, &mut Exactly::new(4)).unwrap();
        assert_eq!(n, 4);
        assert_eq!(dst.into_vec(), b"0123");
    }

    #[test]
    fn exactly_is_not_an_error_when_the_stream_runs_short() {
        let mut src = ByteBuffer::from_bytes(b"ab".to_vec());
        let mut dst = ByteBuffer::new();
        let n = copy(&mut src, &mut dst, &mut Exactly::new(10)).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn at_most_stops_early_on_a_short_read() {
        let mut src = ByteBuffer::from_bytes(b"abc".to_vec());
        let mut dst = ByteBuffer::new();
        let n = copy(&mut src, &mut dst, &mut AtMost::new(10)).unwrap();
        assert_eq!(n, 3);
        assert_eq!(dst.into_vec(), b"abc");
    }

    #[test]
    fn until_finds_pattern_at_exact_byte_offset() {
        let mut src = ByteBuffer::from_bytes(b"hello EOF trailer".to_vec());
        let mut dst = ByteBuffer::new();
        let n = copy(&mut src, &mut dst, &mut Until::new(b"EOF".to_vec())).unwrap();
        assert_eq!(n, 9);
        assert_eq!(dst.into_vec(), b"hello EOF");
    }

    #[test]
    fn until_runs_to_eof_without_false_completion_when_pattern_absent() {
        let mut src = ByteBuffer::from_bytes(b"no marker here".to_vec());
        let mut dst = ByteBuffer::new();
        let n = copy(&mut src, &mut dst, &mut Until::new(b"EOF".to_vec())).unwrap();
        assert_eq!(n, 14);
    }

    #[test]
    fn one_of_completes_when_its_fastest_constituent_does() {
        let mut src = ByteBuffer::from_bytes(b"0123456789".to_vec());
        let mut dst = ByteBuffer::new();
        let mut policy = OneOf::new(vec![Box::new(Exactly::new(3)), Box::new(Exactly::new(100))]);
        let n = copy(&mut src, &mut dst, &mut policy).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn build_failure_table_matches_kmp_definition() {
        let table = build_failure_table(b"ababc");
        assert_eq!(table, vec![0, 0, 1, 2, 0]);
    }
}
