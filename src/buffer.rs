//! Buffer allocation policies for the decode and encode paths.
//!
//! Every codec operation that produces bytes takes an [`Allocator`] so the
//! caller decides the allocation policy. Two policies are provided:
//!
//! - [`ThresholdAllocator`]: small buffers take the routine allocation path;
//!   buffers at or above a threshold take a direct, exact-capacity path so
//!   large blobs never carry growth slack. Large buffers are freed as soon as
//!   their owner drops them; there is no deferred reclamation to manage.
//! - [`ScratchAllocator`]: retains one grow-only buffer across
//!   allocate/reclaim cycles for hot per-pulse decode paths. Must be owned by
//!   exactly one worker; it is not a shared pool.

use tracing::trace;

use crate::error::{Result, StreamError};

/// Default boundary between routine and direct allocation, in bytes.
pub const DEFAULT_DIRECT_THRESHOLD: usize = 64 * 1024;

/// Default per-allocation cap. Requests beyond this are resource errors.
pub const DEFAULT_ALLOCATION_CAP: usize = 1 << 30;

/// Strategy for producing writable byte buffers.
///
/// `allocate` returns a zeroed buffer whose length equals the request; the
/// caller owns it outright. `reclaim` offers a buffer back so reuse policies
/// can keep its capacity; stateless policies simply drop it.
pub trait Allocator: Send {
    /// Return a zeroed, writable buffer of exactly `len` bytes.
    fn allocate(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Hand a buffer back to the policy. Default: drop it.
    fn reclaim(&mut self, _buf: Vec<u8>) {}
}

/// Threshold policy: routine allocation below the threshold, direct
/// exact-capacity allocation at or above it.
#[derive(Debug, Clone)]
pub struct ThresholdAllocator {
    threshold: usize,
    cap: usize,
}

impl Default for ThresholdAllocator {
    fn default() -> Self {
        Self { threshold: DEFAULT_DIRECT_THRESHOLD, cap: DEFAULT_ALLOCATION_CAP }
    }
}

impl ThresholdAllocator {
    /// Create a policy with a custom threshold and per-allocation cap.
    pub fn new(threshold: usize, cap: usize) -> Self {
        Self { threshold, cap }
    }

    /// The configured direct-allocation threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Allocator for ThresholdAllocator {
    fn allocate(&mut self, len: usize) -> Result<Vec<u8>> {
        if len > self.cap {
            return Err(StreamError::AllocatorExhausted { requested: len, cap: self.cap });
        }
        if len >= self.threshold {
            trace!(len, "direct allocation for large buffer");
            // Exact capacity: large blobs must not carry amortized-growth slack.
            let mut buf = Vec::new();
            buf.reserve_exact(len);
            buf.resize(len, 0);
            Ok(buf)
        } else {
            Ok(vec![0; len])
        }
    }
}

/// Reuse policy: one retained buffer, regrown but never shrunk.
///
/// Scoped to a single worker. Handing one instance to concurrent decode
/// calls is a design violation, not something guarded at runtime; the
/// `&mut self` receiver makes sharing require an explicit (and wrong) lock.
#[derive(Debug, Default)]
pub struct ScratchAllocator {
    retained: Option<Vec<u8>>,
    high_water: usize,
}

impl ScratchAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest capacity the retained buffer has reached.
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}

impl Allocator for ScratchAllocator {
    fn allocate(&mut self, len: usize) -> Result<Vec<u8>> {
        match self.retained.take() {
            Some(mut buf) => {
                buf.clear();
                buf.resize(len, 0);
                self.high_water = self.high_water.max(buf.capacity());
                Ok(buf)
            }
            // The retained buffer is out on loan; fall back to a fresh one
            // rather than blocking the decode.
            None => Ok(vec![0; len]),
        }
    }

    fn reclaim(&mut self, buf: Vec<u8>) {
        match &self.retained {
            Some(kept) if kept.capacity() >= buf.capacity() => {}
            _ => {
                self.high_water = self.high_water.max(buf.capacity());
                self.retained = Some(buf);
            }
        }
    }
}
