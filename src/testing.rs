//! An in-memory reference [`Strategy`] used to exercise and document the
//! retry state machine in this crate's own tests.
//!
//! Not meant as a production transport — no network I/O, no external
//! services. Built the way the batch-processor examples in the retrieval
//! pack test their own batchers: channel-level assertions on counts and
//! callback invocations rather than wire-level fixtures.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::batch::Batch;
use crate::clock::CancellationToken;
use crate::strategy::{Strategy, ZipOutcome};

/// Per-call-site classification a scripted response carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Retry,
    Reject,
}

/// What [`RecordingStrategy::send`] should report for one attempt.
#[derive(Clone, Debug)]
pub enum ScriptedOutcome {
    /// The whole batch succeeded, no per-item breakdown (the APM shape).
    Success,
    /// `should_retry_all_items` — the whole batch should be retried as-is.
    RetryAll,
    /// Per-item classification, positionally matched to the batch's
    /// events. Indices beyond the script's length default to `Success`.
    PerItem(Vec<ItemOutcome>),
    /// `send` returns `Err` with the given retryability.
    TransportError { retryable: bool },
    /// `send` never completes — used to exercise cancellation mid-flight.
    Hang,
}

/// Transport-level failure `RecordingStrategy::send` reports for
/// `ScriptedOutcome::TransportError`.
#[derive(Debug, Error)]
#[error("mock transport error (retryable={retryable})")]
pub struct MockError {
    pub retryable: bool,
}

/// The transport-returned object `RecordingStrategy` hands back to the
/// core for classification.
pub struct MockResponse {
    outcome: ScriptedOutcome,
}

/// A scripted, in-memory [`Strategy`] implementation.
///
/// `send` consumes the script in order, one entry per call; once exhausted
/// it repeats the last entry (or `Success` if the script was empty) for
/// every subsequent attempt. This is enough to express every scenario in
/// this crate's test suite — e.g. `[RetryAll, RetryAll, Success]` models a
/// rate-limited endpoint that recovers on the third attempt.
pub struct RecordingStrategy<E> {
    script: Vec<ScriptedOutcome>,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    _marker: PhantomData<fn(E) -> E>,
}

impl<E> RecordingStrategy<E> {
    pub fn new(script: Vec<ScriptedOutcome>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            _marker: PhantomData,
        }
    }

    /// Always reports `Success` — the happy-path transport.
    pub fn always_succeeds() -> Self {
        Self::new(vec![ScriptedOutcome::Success])
    }

    /// Total number of `send` calls observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The size of every batch seen by `send`, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    fn outcome_for(&self, attempt_index: usize) -> ScriptedOutcome {
        self.script
            .get(attempt_index)
            .cloned()
            .or_else(|| self.script.last().cloned())
            .unwrap_or(ScriptedOutcome::Success)
    }
}

#[async_trait]
impl<E> Strategy<E> for RecordingStrategy<E>
where
    E: Send + Sync + 'static,
{
    type Response = MockResponse;
    type Item = ItemOutcome;
    type Error = MockError;

    async fn send(
        &self,
        batch: &Batch<E>,
        _ctx: &CancellationToken,
    ) -> Result<Self::Response, Self::Error> {
        let attempt_index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().push(batch.len());
        let outcome = self.outcome_for(attempt_index);

        if matches!(outcome, ScriptedOutcome::Hang) {
            std::future::pending::<()>().await;
        }

        match outcome {
            ScriptedOutcome::TransportError { retryable } => Err(MockError { retryable }),
            other => Ok(MockResponse { outcome: other }),
        }
    }

    fn should_retry(&self, response: &Self::Response) -> bool {
        matches!(response.outcome, ScriptedOutcome::RetryAll)
    }

    fn should_retry_all_items(&self, response: &Self::Response) -> bool {
        matches!(response.outcome, ScriptedOutcome::RetryAll)
    }

    fn zip(&self, response: &Self::Response, batch: Batch<E>) -> ZipOutcome<E, Self::Item> {
        match &response.outcome {
            ScriptedOutcome::PerItem(outcomes) => {
                let pairs = batch
                    .into_events()
                    .into_iter()
                    .enumerate()
                    .map(|(i, event)| {
                        let item = outcomes.get(i).copied().unwrap_or(ItemOutcome::Success);
                        (event, item)
                    })
                    .collect();
                ZipOutcome::Pairs(pairs)
            }
            _ => ZipOutcome::Empty(batch),
        }
    }

    fn is_retryable(&self, _event: &E, item: &Self::Item) -> bool {
        matches!(item, ItemOutcome::Retry)
    }

    fn is_rejection(&self, _event: &E, item: &Self::Item) -> bool {
        matches!(item, ItemOutcome::Reject)
    }

    fn is_error_retryable(&self, error: &Self::Error) -> bool {
        error.retryable
    }
}
