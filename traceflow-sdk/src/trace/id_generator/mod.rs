//! Trace and span id generation.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use traceflow::trace::{SpanId, TraceId};

/// Source of ids for new spans.
///
/// Generated ids must be non-zero; zero is the reserved invalid value.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new trace id.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new span id.
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] backed by a per-thread PRNG seeded from the
/// OS.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            loop {
                let id = rng.random::<u128>();
                if id != 0 {
                    return TraceId::from_bytes(id.to_be_bytes());
                }
            }
        })
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            loop {
                let id = rng.random::<u64>();
                if id != 0 {
                    return SpanId::from_bytes(id.to_be_bytes());
                }
            }
        })
    }
}

thread_local! {
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

/// Deterministic [`IdGenerator`] producing sequential ids, for tests.
#[derive(Debug)]
pub struct IncrementIdGenerator {
    next_trace_id: AtomicU64,
    next_span_id: AtomicU64,
}

impl IncrementIdGenerator {
    /// Creates a generator whose first ids are both 1.
    pub fn new() -> Self {
        IncrementIdGenerator {
            next_trace_id: AtomicU64::new(1),
            next_span_id: AtomicU64::new(1),
        }
    }
}

impl Default for IncrementIdGenerator {
    fn default() -> Self {
        IncrementIdGenerator::new()
    }
}

impl IdGenerator for IncrementIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        let id = self.next_trace_id.fetch_add(1, Ordering::SeqCst);
        TraceId::from_bytes((id as u128).to_be_bytes())
    }

    fn new_span_id(&self) -> SpanId {
        let id = self.next_span_id.fetch_add(1, Ordering::SeqCst);
        SpanId::from_bytes(id.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_valid_and_distinct() {
        let generator = RandomIdGenerator;
        let first = generator.new_trace_id();
        let second = generator.new_trace_id();
        assert_ne!(first, TraceId::INVALID);
        assert_ne!(second, TraceId::INVALID);
        assert_ne!(first, second);

        assert_ne!(generator.new_span_id(), SpanId::INVALID);
    }

    #[test]
    fn increment_ids_are_sequential() {
        let generator = IncrementIdGenerator::new();
        assert_eq!(generator.new_span_id(), SpanId::from_bytes(1u64.to_be_bytes()));
        assert_eq!(generator.new_span_id(), SpanId::from_bytes(2u64.to_be_bytes()));
    }
}
