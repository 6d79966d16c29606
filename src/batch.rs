//! The unit of work handed to a worker for a single transport attempt.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide monotonically increasing identifier, diagnostic only.
///
/// Consumers must not rely on batches arriving at the sink in `BatchId`
/// order — only that it is unique and increasing in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(u64);

impl BatchId {
    fn next() -> Self {
        Self(NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered, immutable-between-emission-and-outcome segment of events.
///
/// `1 <= len() <= batch_size` for every batch the assembler emits. Retries
/// reuse the same `Batch` (possibly replaced by a filtered subsequence built
/// from `Batch::new` — see `worker::export_with_retry`); the events inside a
/// single batch are never reordered, only filtered.
#[derive(Debug, Clone)]
pub struct Batch<E> {
    id: BatchId,
    events: Vec<E>,
}

impl<E> Batch<E> {
    /// Opens a fresh batch with a new `BatchId`. Panics are not a concern
    /// here since the assembler never constructs one with an empty `Vec`.
    pub(crate) fn open() -> Self {
        Self {
            id: BatchId::next(),
            events: Vec::new(),
        }
    }

    /// Builds a filtered retry batch that keeps the original `BatchId` —
    /// it is still "the same batch", just a subsequence of it.
    pub(crate) fn retry_subset(id: BatchId, events: Vec<E>) -> Self {
        Self { id, events }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[E] {
        &self.events
    }

    pub fn into_events(self) -> Vec<E> {
        self.events
    }

    pub(crate) fn push(&mut self, event: E) {
        self.events.push(event);
    }
}

impl<E> IntoIterator for Batch<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_increase_monotonically() {
        let a = Batch::<u32>::open();
        let b = Batch::<u32>::open();
        assert!(b.id().value() > a.id().value());
    }

    #[test]
    fn retry_subset_preserves_id() {
        let mut b = Batch::<u32>::open();
        b.push(1);
        b.push(2);
        let id = b.id();
        let retried = Batch::retry_subset(id, vec![2]);
        assert_eq!(retried.id(), id);
        assert_eq!(retried.events(), &[2]);
    }
}
