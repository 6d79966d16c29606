//! The bounded MPSC inbound queue: the one synchronization point producers
//! touch directly.

use tokio::sync::mpsc;

use crate::clock::CancellationToken;

/// Splits a freshly allocated bounded channel into its producer and
/// assembler halves.
pub(crate) fn inbound_channel<E>(capacity: usize) -> (InboundSender<E>, InboundReceiver<E>) {
    let (tx, rx) = mpsc::channel(capacity);
    (InboundSender { tx }, InboundReceiver { rx })
}

/// The producer-facing half. Cheap to clone — every producer gets its own
/// handle onto the same underlying channel.
#[derive(Clone)]
pub(crate) struct InboundSender<E> {
    tx: mpsc::Sender<E>,
}

impl<E> InboundSender<E> {
    /// Non-blocking. Returns `true` iff enqueued; on failure there is no
    /// side effect (`Buffered` is not incremented by the caller).
    pub(crate) fn try_write(&self, event: E) -> bool {
        self.tx.try_send(event).is_ok()
    }

    /// Blocks until either there is space and the event is enqueued, the
    /// channel is closed (receiver dropped), or `ctx` is cancelled.
    ///
    /// Races `Sender::send` against `ctx.cancelled()`; both arms are
    /// cancel-safe, so this is safe to use inside an outer `select!` too.
    pub(crate) async fn wait_to_write(&self, event: E, ctx: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => false,
            result = self.tx.send(event) => result.is_ok(),
        }
    }

    /// Best-effort bulk variant: stops at the first `try_write` failure and
    /// returns the count actually written.
    pub(crate) fn try_write_many(&self, events: impl IntoIterator<Item = E>) -> usize {
        let mut written = 0;
        for event in events {
            if self.try_write(event) {
                written += 1;
            } else {
                break;
            }
        }
        written
    }
}

/// The assembler-facing half. Single consumer by construction — never
/// cloned.
pub(crate) struct InboundReceiver<E> {
    rx: mpsc::Receiver<E>,
}

impl<E> InboundReceiver<E> {
    /// Suspends until an event is available or the channel is closed and
    /// drained (`None`).
    pub(crate) async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Non-blocking drain step used by the assembler's burst phase.
    pub(crate) fn try_recv(&mut self) -> Result<E, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_write_fails_when_full() {
        let (tx, mut rx) = inbound_channel::<u32>(1);
        assert!(tx.try_write(1));
        assert!(!tx.try_write(2));
        assert_eq!(rx.recv().await, Some(1));
    }

    #[tokio::test]
    async fn try_write_many_stops_at_first_failure() {
        let (tx, _rx) = inbound_channel::<u32>(2);
        let written = tx.try_write_many([1, 2, 3, 4]);
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn wait_to_write_honors_cancellation() {
        let (tx, _rx) = inbound_channel::<u32>(1);
        assert!(tx.try_write(0)); // fill the queue
        let ctx = CancellationToken::new();
        ctx.cancel();
        assert!(!tx.wait_to_write(1, &ctx).await);
    }
}
