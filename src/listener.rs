//! Diagnostics: the counter set and the callback trait workers dispatch to.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::batch::Batch;
use crate::error::ExportException;

/// Atomic, monotonically increasing counters tracked by every channel.
///
/// `observed_concurrency` is a CAS-based running max, updated whenever
/// `inflight_exports` increments; it is skipped (stays at 0) when
/// `disable_diagnostics` is set.
#[derive(Default)]
pub(crate) struct CounterSet {
    buffered: AtomicU64,
    exported: AtomicU64,
    retried: AtomicU64,
    rejected: AtomicU64,
    exceptions: AtomicU64,
    server_rejections: AtomicU64,
    inflight_batches: AtomicU64,
    inflight_exports: AtomicU64,
    observed_concurrency: AtomicU64,
}

impl CounterSet {
    pub(crate) fn snapshot(&self) -> Counters {
        Counters {
            buffered: self.buffered.load(Ordering::Relaxed),
            exported: self.exported.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            exceptions: self.exceptions.load(Ordering::Relaxed),
            server_rejections: self.server_rejections.load(Ordering::Relaxed),
            inflight_batches: self.inflight_batches.load(Ordering::Relaxed),
            inflight_exports: self.inflight_exports.load(Ordering::Relaxed),
            observed_concurrency: self.observed_concurrency.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add_buffered(&self, n: u64) {
        self.buffered.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_exported(&self, n: u64) {
        self.exported.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_retried(&self, n: u64) {
        self.retried.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_rejected(&self, n: u64) {
        self.rejected.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_exceptions(&self, n: u64) {
        self.exceptions.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_server_rejections(&self, n: u64) {
        self.server_rejections.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn inc_inflight_batches(&self) {
        self.inflight_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dec_inflight_batches(&self) {
        self.inflight_batches.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increments `inflight_exports` and folds the new value into the
    /// running max `observed_concurrency`, unless diagnostics are disabled.
    pub(crate) fn enter_export(&self, track_observed: bool) {
        let now = self.inflight_exports.fetch_add(1, Ordering::AcqRel) + 1;
        if !track_observed {
            return;
        }
        let mut current = self.observed_concurrency.load(Ordering::Acquire);
        while now > current {
            match self.observed_concurrency.compare_exchange_weak(
                current,
                now,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn exit_export(&self) {
        self.inflight_exports.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A cloneable handle onto a channel's live counters, for rendering a
/// snapshot outside the channel itself (e.g. from [`DefaultListener`]'s
/// `Display` impl). Obtained via `Channel::counter_handle`.
#[derive(Clone)]
pub struct CounterHandle(Arc<CounterSet>);

impl CounterHandle {
    pub(crate) fn new(counters: Arc<CounterSet>) -> Self {
        Self(counters)
    }

    pub fn snapshot(&self) -> Counters {
        self.0.snapshot()
    }
}

/// A point-in-time read of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub buffered: u64,
    pub exported: u64,
    pub retried: u64,
    pub rejected: u64,
    pub exceptions: u64,
    pub server_rejections: u64,
    pub inflight_batches: u64,
    pub inflight_exports: u64,
    pub observed_concurrency: u64,
}

/// The diagnostics callback surface. All methods have empty default bodies —
/// override only what you need. Every method is invoked from a worker task;
/// implementations must be `Send + Sync` and must not block the caller.
pub trait Listener<E, I>: Send + Sync {
    fn on_batch_published(&self, _batch_id: u64, _size: usize) {}
    fn on_export_success(&self, _batch_id: u64, _count: usize) {}
    fn on_server_rejection(&self, _batch_id: u64, _pairs: &[(E, I)]) {}
    fn on_max_retries(&self, _batch: &Batch<E>) {}
    fn on_export_exception(&self, _err: &ExportException) {}
    fn on_outbound_channel_exited(&self) {}
}

/// Dispatches to every attached listener, in attachment order.
pub(crate) struct ListenerRegistry<E, I> {
    listeners: Mutex<Vec<Arc<dyn Listener<E, I>>>>,
}

impl<E, I> ListenerRegistry<E, I> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn attach(&self, listener: Arc<dyn Listener<E, I>>) {
        self.listeners.lock().push(listener);
    }

    pub(crate) fn on_batch_published(&self, batch_id: u64, size: usize) {
        for l in self.listeners.lock().iter() {
            l.on_batch_published(batch_id, size);
        }
    }

    pub(crate) fn on_export_success(&self, batch_id: u64, count: usize) {
        for l in self.listeners.lock().iter() {
            l.on_export_success(batch_id, count);
        }
    }

    pub(crate) fn on_server_rejection(&self, batch_id: u64, pairs: &[(E, I)]) {
        for l in self.listeners.lock().iter() {
            l.on_server_rejection(batch_id, pairs);
        }
    }

    pub(crate) fn on_max_retries(&self, batch: &Batch<E>) {
        for l in self.listeners.lock().iter() {
            l.on_max_retries(batch);
        }
    }

    pub(crate) fn on_export_exception(&self, err: &ExportException) {
        for l in self.listeners.lock().iter() {
            l.on_export_exception(err);
        }
    }

    pub(crate) fn on_outbound_channel_exited(&self) {
        for l in self.listeners.lock().iter() {
            l.on_outbound_channel_exited();
        }
    }
}

/// Renders counters, observed concurrency, and the first captured error as a
/// human-readable string. Used for benchmarks and smoke tests.
///
/// Counter rendering requires a [`CounterHandle`], attached via
/// [`DefaultListener::with_counters`] — `Channel::counter_handle()` supplies
/// one. Without it, `Display` falls back to rendering the first error alone.
#[derive(Default)]
pub struct DefaultListener {
    counters: Option<CounterHandle>,
    first_error: Mutex<Option<String>>,
}

impl DefaultListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the counters to render alongside the first captured error.
    pub fn with_counters(mut self, counters: CounterHandle) -> Self {
        self.counters = Some(counters);
        self
    }
}

impl<E, I> Listener<E, I> for DefaultListener {
    fn on_export_exception(&self, err: &ExportException) {
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(err.message.clone());
        }
    }
}

impl fmt::Display for DefaultListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefaultListener(")?;
        if let Some(counters) = &self.counters {
            let c = counters.snapshot();
            write!(
                f,
                "buffered={}, exported={}, retried={}, rejected={}, exceptions={}, \
                 server_rejections={}, inflight_batches={}, inflight_exports={}, \
                 observed_concurrency={}, ",
                c.buffered,
                c.exported,
                c.retried,
                c.rejected,
                c.exceptions,
                c.server_rejections,
                c.inflight_batches,
                c.inflight_exports,
                c.observed_concurrency,
            )?;
        }
        match self.first_error.lock().as_ref() {
            Some(err) => write!(f, "first_error={err})"),
            None => write!(f, "no errors)"),
        }
    }
}
