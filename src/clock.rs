//! Monotonic timing and the cooperative-cancellation primitive shared by the
//! assembler, the worker pool, and `wait_for_drain`.

use std::time::{Duration, Instant};

pub use tokio_util::sync::CancellationToken;

/// A point in time the assembler stops accumulating a batch at, computed
/// once when a batch is opened.
///
/// A zero `LingerDuration` yields an already-elapsed deadline, which is how
/// `batch_size=1, linger=0` collapses to unbatched export without any
/// special-casing in the assembler loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LingerDeadline(Instant);

impl LingerDeadline {
    pub(crate) fn starting_now(linger: Duration) -> Self {
        Self(Instant::now() + linger)
    }

    pub(crate) fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub(crate) fn has_elapsed(&self) -> bool {
        Instant::now() >= self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_linger_is_already_elapsed() {
        let deadline = LingerDeadline::starting_now(Duration::ZERO);
        assert!(deadline.has_elapsed());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn nonzero_linger_has_remaining_time() {
        let deadline = LingerDeadline::starting_now(Duration::from_secs(60));
        assert!(!deadline.has_elapsed());
        assert!(deadline.remaining() > Duration::ZERO);
    }
}
