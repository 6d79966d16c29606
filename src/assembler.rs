//! The single-writer batch assembler task.
//!
//! Dedicating one task to consuming the inbound queue — rather than having
//! many writers compete over batch state — removes a whole class of
//! locking a multi-writer design would need; producers touch only the
//! inbound queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::watch;

use crate::batch::Batch;
use crate::clock::LingerDeadline;
use crate::listener::CounterSet;
use crate::queue::InboundReceiver;

/// Invoked once per batch emitted to the outbound queue, before the send —
/// `(batch_id, size)`. Kept as a plain closure rather than a full
/// `Listener` reference so this module stays ungeneric over the strategy's
/// `Item` type.
pub(crate) type OnBatchPublished = Arc<dyn Fn(u64, usize) + Send + Sync>;

/// Runs the assembler loop until the inbound queue is closed and drained.
///
/// Behavior (§4.2):
/// 1. Wait for a first event, or for `closed` to be set with nothing left
///    buffered, in which case exit.
/// 2. Open a batch, compute a linger deadline.
/// 3. Greedily drain via non-blocking bursts, falling back to a single
///    timed wait, until `batch_size` is reached, the deadline passes, or
///    the queue disconnects.
/// 4. Emit the batch (suspends if the outbound queue is full — the primary
///    backpressure path back onto producers).
/// 5. Go to 1.
pub(crate) async fn run<E: Send + 'static>(
    mut inbound: InboundReceiver<E>,
    outbound: async_channel::Sender<Batch<E>>,
    batch_size: usize,
    linger: Duration,
    mut closed: watch::Receiver<bool>,
    counters: Arc<CounterSet>,
    on_batch_published: OnBatchPublished,
) {
    loop {
        let Some(first_event) = wait_for_first_event(&mut inbound, &mut closed).await else {
            break;
        };

        let mut batch = Batch::open();
        batch.push(first_event);
        let deadline = LingerDeadline::starting_now(linger);

        'fill: loop {
            if batch.len() >= batch_size {
                break 'fill;
            }
            match inbound.try_recv() {
                Ok(event) => {
                    batch.push(event);
                    continue 'fill;
                }
                Err(TryRecvError::Disconnected) => break 'fill,
                Err(TryRecvError::Empty) => {}
            }
            if deadline.has_elapsed() || *closed.borrow() {
                break 'fill;
            }
            tokio::select! {
                maybe = inbound.recv() => match maybe {
                    Some(event) => batch.push(event),
                    None => break 'fill,
                },
                _ = tokio::time::sleep(deadline.remaining()) => break 'fill,
                _ = closed.changed() => {} // loop back; try_recv drains whatever is buffered
            }
        }

        let id = batch.id();
        let size = batch.len();
        counters.inc_inflight_batches();

        #[cfg(feature = "tracing")]
        tracing::debug!(batch_id = id.value(), size, "assembled batch");

        on_batch_published(id.value(), size);

        if outbound.send(batch).await.is_err() {
            // Every worker handle is gone; nothing downstream to hand this to.
            counters.dec_inflight_batches();
            break;
        }
    }
}

async fn wait_for_first_event<E>(
    inbound: &mut InboundReceiver<E>,
    closed: &mut watch::Receiver<bool>,
) -> Option<E> {
    if *closed.borrow() {
        return inbound.try_recv().ok();
    }

    tokio::select! {
        maybe = inbound.recv() => maybe,
        _ = closed.changed() => inbound.try_recv().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::inbound_channel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn emits_full_batches_without_waiting_for_linger() {
        let (tx, rx) = inbound_channel::<u32>(100);
        let (out_tx, out_rx) = async_channel::bounded(10);
        let (_closed_tx, closed_rx) = watch::channel(false);
        let counters = Arc::new(CounterSet::default());
        let published = Arc::new(AtomicUsize::new(0));
        let published_clone = published.clone();
        let on_published: OnBatchPublished = Arc::new(move |_, _| {
            published_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handle = tokio::spawn(run(
            rx,
            out_tx,
            5,
            Duration::from_secs(60),
            closed_rx,
            counters,
            on_published,
        ));

        for i in 0..15u32 {
            assert!(tx.try_write(i));
        }
        drop(tx);

        let mut batches = Vec::new();
        while let Ok(batch) = out_rx.recv().await {
            batches.push(batch);
        }
        handle.await.unwrap();

        assert_eq!(batches.len(), 3);
        for b in &batches {
            assert_eq!(b.len(), 5);
        }
        assert_eq!(published.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn emits_partial_batch_on_linger_expiry() {
        let (tx, rx) = inbound_channel::<u32>(100);
        let (out_tx, out_rx) = async_channel::bounded(10);
        let (_closed_tx, closed_rx) = watch::channel(false);
        let counters = Arc::new(CounterSet::default());
        let on_published: OnBatchPublished = Arc::new(|_, _| {});

        let handle = tokio::spawn(run(
            rx,
            out_tx,
            1000,
            Duration::from_millis(30),
            closed_rx,
            counters,
            on_published,
        ));

        assert!(tx.try_write(1u32));

        let batch = out_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn closing_flushes_partial_batch_then_exits() {
        let (tx, rx) = inbound_channel::<u32>(100);
        let (out_tx, out_rx) = async_channel::bounded(10);
        let (closed_tx, closed_rx) = watch::channel(false);
        let counters = Arc::new(CounterSet::default());
        let on_published: OnBatchPublished = Arc::new(|_, _| {});

        let handle = tokio::spawn(run(
            rx,
            out_tx,
            1000,
            Duration::from_secs(60),
            closed_rx,
            counters,
            on_published,
        ));

        assert!(tx.try_write(1u32));
        assert!(tx.try_write(2u32));
        closed_tx.send(true).unwrap();

        let batch = out_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);

        drop(tx);
        handle.await.unwrap();
        assert!(out_rx.recv().await.is_err());
    }
}
