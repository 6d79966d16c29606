//! The export worker pool and `export_with_retry` — the heart of the core.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::batch::{Batch, BatchId};
use crate::clock::CancellationToken;
use crate::config::BackoffPolicy;
use crate::error::ExportException;
use crate::listener::{CounterSet, ListenerRegistry};
use crate::strategy::{Strategy, ZipOutcome};

/// Spawns `export_concurrency` worker tasks, each looping on the shared
/// outbound receiver. Returns their join handles so the channel's lifecycle
/// can await them during `wait_for_drain`.
pub(crate) fn spawn_workers<E, S>(
    strategy: Arc<S>,
    outbound: async_channel::Receiver<Batch<E>>,
    export_concurrency: usize,
    max_retries: u32,
    backoff: BackoffPolicy,
    disable_diagnostics: bool,
    ctx: CancellationToken,
    counters: Arc<CounterSet>,
    listeners: Arc<ListenerRegistry<E, S::Item>>,
) -> Vec<tokio::task::JoinHandle<()>>
where
    E: Send + 'static,
    S: Strategy<E> + 'static,
{
    let remaining_workers = Arc::new(AtomicUsize::new(export_concurrency));

    (0..export_concurrency)
        .map(|_| {
            let strategy = strategy.clone();
            let outbound = outbound.clone();
            let backoff = backoff.clone();
            let ctx = ctx.clone();
            let counters = counters.clone();
            let listeners = listeners.clone();
            let remaining_workers = remaining_workers.clone();

            tokio::spawn(async move {
                worker_loop(
                    strategy.as_ref(),
                    outbound,
                    max_retries,
                    &backoff,
                    disable_diagnostics,
                    &ctx,
                    &counters,
                    &listeners,
                )
                .await;

                if remaining_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
                    listeners.on_outbound_channel_exited();
                }
            })
        })
        .collect()
}

async fn worker_loop<E, S>(
    strategy: &S,
    outbound: async_channel::Receiver<Batch<E>>,
    max_retries: u32,
    backoff: &BackoffPolicy,
    disable_diagnostics: bool,
    ctx: &CancellationToken,
    counters: &CounterSet,
    listeners: &ListenerRegistry<E, S::Item>,
) where
    E: Send + 'static,
    S: Strategy<E>,
{
    loop {
        let batch = match outbound.recv().await {
            Ok(batch) => batch,
            Err(_) => break, // Closed: end-of-stream, no more batches will arrive.
        };

        counters.enter_export(!disable_diagnostics);
        export_with_retry(strategy, batch, max_retries, backoff, ctx, counters, listeners).await;
        counters.exit_export();
        counters.dec_inflight_batches();
    }
}

/// Runs the `Submitted -> [Sending <-> Backoff]* -> Done` state machine for
/// one batch (§4.4). Terminal accounting (exported/retried/rejected/
/// exceptions) and listener dispatch happen here; nothing is returned since
/// every outcome is either a terminal counter bump or a listener callback.
async fn export_with_retry<E, S>(
    strategy: &S,
    mut batch: Batch<E>,
    max_retries: u32,
    backoff: &BackoffPolicy,
    ctx: &CancellationToken,
    counters: &CounterSet,
    listeners: &ListenerRegistry<E, S::Item>,
) where
    E: Send + 'static,
    S: Strategy<E>,
{
    let max_attempts = max_retries + 1;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let batch_id = batch.id();

        #[cfg(feature = "tracing")]
        tracing::debug!(batch_id = batch_id.value(), attempt, size = batch.len(), "sending batch");

        let send_outcome = tokio::select! {
            biased;
            _ = ctx.cancelled() => None,
            result = strategy.send(&batch, ctx) => Some(result),
        };

        let Some(send_result) = send_outcome else {
            #[cfg(feature = "tracing")]
            tracing::warn!(batch_id = batch_id.value(), "export cancelled before send completed");
            account_cancelled(&batch, counters, listeners);
            return;
        };

        let response = match send_result {
            Ok(response) => response,
            Err(err) => {
                let retryable = strategy.is_error_retryable(&err);
                #[cfg(feature = "tracing")]
                tracing::warn!(batch_id = batch_id.value(), attempt, retryable, error = %err, "export attempt failed");
                listeners.on_export_exception(&ExportException::new(err.to_string(), retryable));

                if retryable && attempt < max_attempts {
                    counters.add_retried(batch.len() as u64);
                    if sleep_backoff(backoff.delay_for(attempt - 1), ctx).await.is_err() {
                        account_cancelled(&batch, counters, listeners);
                        return;
                    }
                    continue;
                }

                counters.add_exceptions(batch.len() as u64);
                return;
            }
        };

        let retry_all = strategy.should_retry_all_items(&response);
        let should_retry = strategy.should_retry(&response);

        let next_batch: Option<Batch<E>> = if retry_all {
            Some(batch)
        } else {
            match strategy.zip(&response, batch) {
                ZipOutcome::Pairs(pairs) => {
                    classify_pairs(strategy, batch_id, pairs, counters, listeners)
                }
                ZipOutcome::Empty(original) => {
                    if should_retry {
                        Some(original)
                    } else {
                        let n = original.len() as u64;
                        counters.add_exported(n);
                        listeners.on_export_success(batch_id.value(), n as usize);
                        None
                    }
                }
            }
        };

        let Some(next) = next_batch.filter(|b| !b.is_empty()) else {
            return;
        };

        if attempt == max_attempts {
            #[cfg(feature = "tracing")]
            tracing::error!(
                batch_id = batch_id.value(),
                remaining = next.len(),
                "retry budget exhausted"
            );
            counters.add_rejected(next.len() as u64);
            listeners.on_max_retries(&next);
            return;
        }

        counters.add_retried(next.len() as u64);
        if sleep_backoff(backoff.delay_for(attempt - 1), ctx).await.is_err() {
            account_cancelled(&next, counters, listeners);
            return;
        }

        batch = next;
    }
}

/// Splits per-item pairs into successes (counted exported), rejections
/// (reported via `on_server_rejection`, counted rejected), and events still
/// worth retrying — returning the filtered retry batch, or `None` if
/// nothing needs retrying.
fn classify_pairs<E, S>(
    strategy: &S,
    batch_id: BatchId,
    pairs: Vec<(E, S::Item)>,
    counters: &CounterSet,
    listeners: &ListenerRegistry<E, S::Item>,
) -> Option<Batch<E>>
where
    E: Send + 'static,
    S: Strategy<E>,
{
    let mut rejections = Vec::new();
    let mut retry_events = Vec::new();
    let mut success_count: u64 = 0;

    for (event, item) in pairs {
        if strategy.is_rejection(&event, &item) {
            rejections.push((event, item));
        } else if strategy.is_retryable(&event, &item) {
            retry_events.push(event);
        } else {
            success_count += 1;
        }
    }

    if success_count > 0 {
        counters.add_exported(success_count);
        listeners.on_export_success(batch_id.value(), success_count as usize);
    }

    if !rejections.is_empty() {
        counters.add_rejected(rejections.len() as u64);
        counters.add_server_rejections(rejections.len() as u64);
        listeners.on_server_rejection(batch_id.value(), &rejections);
    }

    if retry_events.is_empty() {
        None
    } else {
        Some(Batch::retry_subset(batch_id, retry_events))
    }
}

fn account_cancelled<E, I>(
    batch: &Batch<E>,
    counters: &CounterSet,
    listeners: &ListenerRegistry<E, I>,
) {
    counters.add_exceptions(batch.len() as u64);
    listeners.on_export_exception(&ExportException::new("export cancelled", false));
}

/// Sleeps for `delay`, cancel-safe against `ctx`. `Err` means the context
/// fired before the backoff elapsed.
async fn sleep_backoff(delay: std::time::Duration, ctx: &CancellationToken) -> Result<(), ()> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(()),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
