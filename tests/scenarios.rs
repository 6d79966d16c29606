//! Integration tests exercising the concrete scenarios this crate's
//! assembler/worker/retry pipeline is built to satisfy end to end, driven
//! entirely through the public `Channel` API and the `RecordingStrategy`
//! test double.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulk_channel::testing::{ItemOutcome, RecordingStrategy, ScriptedOutcome};
use bulk_channel::{Batch, CancellationToken, Channel, ChannelConfig, Listener};

fn ctx() -> CancellationToken {
    CancellationToken::new()
}

#[tokio::test]
async fn drains_one_hundred_events_in_batches_of_ten() {
    let config = ChannelConfig::builder()
        .max_in_flight(1000)
        .batch_size(10)
        .export_concurrency(1)
        .max_retries(0)
        .build()
        .unwrap();

    let strategy = RecordingStrategy::<u64>::always_succeeds();
    let channel = Channel::builder(strategy, config).build();

    for event in 0..100u64 {
        assert!(channel.try_write(event));
    }
    channel.close();

    let drained = channel.wait_for_drain(Duration::from_secs(5), &ctx()).await;
    assert!(drained);

    let counters = channel.counters();
    assert_eq!(counters.exported, 100);
    assert_eq!(counters.rejected, 0);
    assert_eq!(counters.exceptions, 0);
}

#[tokio::test]
async fn all_item_rate_limit_recovers_on_third_attempt() {
    let config = ChannelConfig::builder()
        .max_in_flight(10)
        .batch_size(5)
        .export_concurrency(1)
        .max_retries(2)
        .linger(Duration::from_millis(500))
        .build()
        .unwrap();

    let strategy = RecordingStrategy::<u64>::new(vec![
        ScriptedOutcome::RetryAll,
        ScriptedOutcome::RetryAll,
        ScriptedOutcome::Success,
    ]);
    let channel = Channel::builder(strategy, config)
        .cancellation_token(ctx())
        .build();

    for event in 0..5u64 {
        assert!(channel.try_write(event));
    }
    channel.close();

    let drained = channel.wait_for_drain(Duration::from_secs(5), &ctx()).await;
    assert!(drained);

    let counters = channel.counters();
    assert_eq!(counters.exported, 5);
    assert!(counters.retried >= 5);
    assert_eq!(counters.rejected, 0);
}

#[tokio::test]
async fn per_item_rejection_is_isolated_from_the_rest_of_the_batch() {
    #[derive(Default)]
    struct RejectionCapture {
        rejected_pairs: AtomicUsize,
    }

    impl Listener<u64, ItemOutcome> for RejectionCapture {
        fn on_server_rejection(&self, _batch_id: u64, pairs: &[(u64, ItemOutcome)]) {
            self.rejected_pairs.fetch_add(pairs.len(), Ordering::SeqCst);
        }
    }

    let config = ChannelConfig::builder()
        .max_in_flight(10)
        .batch_size(3)
        .export_concurrency(1)
        .max_retries(0)
        .linger(Duration::from_millis(500))
        .build()
        .unwrap();

    let strategy = RecordingStrategy::<u64>::new(vec![ScriptedOutcome::PerItem(vec![
        ItemOutcome::Success,
        ItemOutcome::Reject,
        ItemOutcome::Success,
    ])]);
    let capture = Arc::new(RejectionCapture::default());
    let channel = Channel::builder(strategy, config)
        .listener(capture.clone())
        .build();

    for event in 0..3u64 {
        assert!(channel.try_write(event));
    }
    channel.close();

    let drained = channel.wait_for_drain(Duration::from_secs(5), &ctx()).await;
    assert!(drained);

    let counters = channel.counters();
    assert_eq!(counters.exported, 2);
    assert_eq!(counters.rejected, 1);
    assert_eq!(counters.server_rejections, 1);
    assert_eq!(capture.rejected_pairs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_budget_exhaustion_rejects_the_whole_batch() {
    struct MaxRetriesCapture {
        batches: parking_lot::Mutex<Vec<usize>>,
    }

    impl Listener<u64, ItemOutcome> for MaxRetriesCapture {
        fn on_max_retries(&self, batch: &Batch<u64>) {
            self.batches.lock().push(batch.len());
        }
    }

    let config = ChannelConfig::builder()
        .max_in_flight(10)
        .batch_size(4)
        .export_concurrency(1)
        .max_retries(2)
        .linger(Duration::from_millis(500))
        .build()
        .unwrap();

    let strategy = RecordingStrategy::<u64>::new(vec![ScriptedOutcome::RetryAll]);
    let capture = Arc::new(MaxRetriesCapture {
        batches: parking_lot::Mutex::new(Vec::new()),
    });
    let channel = Channel::builder(strategy, config)
        .listener(capture.clone())
        .build();

    for event in 0..4u64 {
        assert!(channel.try_write(event));
    }
    channel.close();

    let drained = channel.wait_for_drain(Duration::from_secs(5), &ctx()).await;
    assert!(drained);

    let counters = channel.counters();
    assert_eq!(counters.rejected, 4);
    assert_eq!(counters.exported, 0);
    assert_eq!(capture.batches.lock().as_slice(), &[4usize]);
}

#[tokio::test]
async fn cancellation_drains_in_flight_exports_as_exceptions() {
    let config = ChannelConfig::builder()
        .max_in_flight(20_000)
        .batch_size(1000)
        .export_concurrency(4)
        .max_retries(0)
        .build()
        .unwrap();

    let strategy = RecordingStrategy::<u64>::new(vec![ScriptedOutcome::Hang]);
    let token = ctx();
    let channel = Channel::builder(strategy, config)
        .cancellation_token(token.clone())
        .build();

    for event in 0..10_000u64 {
        assert!(channel.try_write(event));
    }
    channel.close();
    token.cancel();

    let drained = channel
        .wait_for_drain(Duration::from_secs(5), &CancellationToken::new())
        .await;
    assert!(drained);

    let counters = channel.counters();
    assert_eq!(counters.exported, 0);
    assert!(counters.exceptions > 0);
    assert_eq!(counters.inflight_exports, 0);
}

#[tokio::test]
async fn linger_flushes_a_partial_batch_after_the_deadline() {
    let config = ChannelConfig::builder()
        .max_in_flight(1000)
        .batch_size(1000)
        .linger(Duration::from_millis(50))
        .export_concurrency(1)
        .max_retries(0)
        .build()
        .unwrap();

    let strategy = RecordingStrategy::<u64>::always_succeeds();
    let channel = Channel::builder(strategy, config).build();

    let started = tokio::time::Instant::now();
    assert!(channel.try_write(1u64));
    channel.close();

    let drained = channel.wait_for_drain(Duration::from_secs(5), &ctx()).await;
    assert!(drained);
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert!(started.elapsed() < Duration::from_millis(500));

    assert_eq!(channel.counters().exported, 1);
}
