//! The embedder-supplied hook set that defines transport, retry
//! classification, and per-item outcome.
//!
//! Re-architected as a single trait bundling six functions rather than the
//! deep "channel base" inheritance hierarchy the source used — variants
//! like "Elasticsearch index", "data stream", "APM", and "wired stream"
//! become distinct `Strategy` implementations built once at construction,
//! not distinct subtypes.

use async_trait::async_trait;

use crate::batch::Batch;
use crate::clock::CancellationToken;

/// Result of classifying a transport response against a batch.
///
/// `Empty` means "no per-item info available" (the APM case): the batch is
/// handed back unconsumed and `Strategy::should_retry` alone decides whether
/// to retry it whole. `Pairs` carries one `(event, item)` per event the
/// strategy could classify.
pub enum ZipOutcome<E, I> {
    Empty(Batch<E>),
    Pairs(Vec<(E, I)>),
}

/// The embedder-supplied transport and retry-classification surface.
///
/// Bundles the six functions §6.2 lists separately. `send` is the only
/// async method since it is the only one expected to perform I/O; the
/// predicates are synchronous classification over an already-received
/// response.
#[async_trait]
pub trait Strategy<E>: Send + Sync
where
    E: Send + 'static,
{
    /// The transport-returned object.
    type Response: Send;
    /// The per-event response item produced by `zip`.
    type Item: Send;
    /// The transport-level failure type `send` may return.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Serialize and send a batch. Any `Err` is classified as an exception
    /// and handled via [`Strategy::is_error_retryable`].
    async fn send(
        &self,
        batch: &Batch<E>,
        ctx: &CancellationToken,
    ) -> Result<Self::Response, Self::Error>;

    /// Should any retry be considered at all for this response?
    fn should_retry(&self, response: &Self::Response) -> bool;

    /// Should the entire batch be retried as-is (e.g. HTTP 429)?
    ///
    /// Evaluated and short-circuits *before* `zip` is consulted — the
    /// source's interaction between whole-batch and per-item retry is
    /// under-documented when both could apply; this crate resolves it by
    /// always preferring the whole-batch answer.
    fn should_retry_all_items(&self, response: &Self::Response) -> bool;

    /// Classify every event in `batch` against `response`, or hand the
    /// batch back unconsumed if per-item classification is not available.
    fn zip(&self, response: &Self::Response, batch: Batch<E>) -> ZipOutcome<E, Self::Item>;

    /// Should this `(event, item)` pair be retried?
    fn is_retryable(&self, event: &E, item: &Self::Item) -> bool;

    /// Should this `(event, item)` pair be treated as a permanent,
    /// non-retryable rejection?
    fn is_rejection(&self, event: &E, item: &Self::Item) -> bool;

    /// Is a transport-level `Err` worth retrying?
    ///
    /// Default `true`: most transport errors (timeouts, connection resets)
    /// are transient. Override to classify e.g. malformed-request or auth
    /// errors as non-retryable.
    fn is_error_retryable(&self, _error: &Self::Error) -> bool {
        true
    }

    /// Optional hook a `send` implementation may call internally to turn a
    /// batch into wire bytes, given the opaque `serializer_context`.
    ///
    /// The core never calls this itself — per the data model, serialization
    /// is the transport's own concern. Default no-op.
    fn serialize(&self, _batch: &Batch<E>, _out: &mut Vec<u8>, _ctx: Option<&dyn std::any::Any>) {}
}
