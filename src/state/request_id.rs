use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local id source: a random 128-bit seed XORed with a counter.
#[derive(Debug)]
pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            seed: fastrand::u128(..),
            counter: AtomicU64::new(1),
        }
    }

    /// `<prefix><32 hex chars>`.
    pub(crate) fn next_id(&self, prefix: &str) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let uuid = uuid::Uuid::from_u128(self.seed ^ u128::from(seq));
        let mut out = String::with_capacity(prefix.len() + uuid::fmt::Simple::LENGTH);
        out.push_str(prefix);
        out.push_str(uuid.simple().encode_lower(&mut uuid::Uuid::encode_buffer()));
        out
    }
}
