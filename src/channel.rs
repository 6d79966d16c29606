//! Public surface: `Channel<E, S>`, its builder, and the lifecycle/drain
//! protocol tying the assembler and worker pool together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::assembler::{self, OnBatchPublished};
use crate::clock::CancellationToken;
use crate::config::ChannelConfig;
use crate::listener::{CounterHandle, CounterSet, Counters, Listener, ListenerRegistry};
use crate::queue::{inbound_channel, InboundSender};
use crate::strategy::Strategy;
use crate::worker;

struct Inner<E, S: Strategy<E>> {
    inbound: InboundSender<E>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    drained_rx: watch::Receiver<bool>,
    ctx: CancellationToken,
    counters: Arc<CounterSet>,
    listeners: Arc<ListenerRegistry<E, S::Item>>,
}

/// A buffered, batching, retrying channel from a high-rate producer of
/// in-memory events to a remote bulk sink.
///
/// Cheap to clone — every clone shares the same inbound queue, assembler,
/// and worker pool; `close()`/`wait_for_drain()` observe and affect all
/// clones identically.
pub struct Channel<E, S: Strategy<E>> {
    inner: Arc<Inner<E, S>>,
}

impl<E, S: Strategy<E>> Clone for Channel<E, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E, S> Channel<E, S>
where
    E: Send + 'static,
    S: Strategy<E> + 'static,
{
    /// Starts building a channel around `strategy`, validated by `config`.
    pub fn builder(strategy: S, config: ChannelConfig) -> ChannelBuilder<E, S> {
        ChannelBuilder::new(strategy, config)
    }

    /// Non-blocking. Returns `true` iff `e` was enqueued.
    ///
    /// Fails immediately (no side effect) if the inbound queue is full or
    /// the channel has been closed.
    pub fn try_write(&self, event: E) -> bool {
        if self.inner.closed.load(Ordering::Acquire) {
            return false;
        }
        let written = self.inner.inbound.try_write(event);
        if written {
            self.inner.counters.add_buffered(1);
        }
        written
    }

    /// Best-effort bulk variant of [`Channel::try_write`]: stops at the
    /// first failure and returns the count actually written.
    pub fn try_write_many(&self, events: impl IntoIterator<Item = E>) -> usize {
        if self.inner.closed.load(Ordering::Acquire) {
            return 0;
        }
        let written = self.inner.inbound.try_write_many(events);
        if written > 0 {
            self.inner.counters.add_buffered(written as u64);
        }
        written
    }

    /// Suspends until `e` is enqueued, the channel is closed, or `ctx` is
    /// cancelled. Returns `true` iff enqueued.
    pub async fn wait_to_write(&self, event: E, ctx: &CancellationToken) -> bool {
        if self.inner.closed.load(Ordering::Acquire) {
            return false;
        }
        let written = self.inner.inbound.wait_to_write(event, ctx).await;
        if written {
            self.inner.counters.add_buffered(1);
        }
        written
    }

    /// Stops accepting new writes, signals the assembler to flush its
    /// partial batch, and returns immediately. Idempotent: calls after the
    /// first are no-ops.
    pub fn close(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let _ = self.inner.closed_tx.send(true);
        }
    }

    /// Blocks until every worker task has exited (drain complete), or
    /// `timeout`/`ctx` fires first. Returns `true` iff drain completed
    /// cleanly.
    pub async fn wait_for_drain(&self, timeout: Duration, ctx: &CancellationToken) -> bool {
        let mut drained_rx = self.inner.drained_rx.clone();
        if *drained_rx.borrow() {
            return true;
        }
        tokio::select! {
            biased;
            _ = ctx.cancelled() => false,
            _ = tokio::time::sleep(timeout) => *drained_rx.borrow(),
            result = drained_rx.changed() => result.is_ok() && *drained_rx.borrow(),
        }
    }

    /// Attaches a diagnostics listener. Multiple listeners may be attached;
    /// all are invoked for every event, in attachment order.
    pub fn attach_listener(&self, listener: Arc<dyn Listener<E, S::Item>>) {
        self.inner.listeners.attach(listener);
    }

    /// A snapshot read of every counter, for ad-hoc inspection outside a
    /// listener.
    pub fn counters(&self) -> Counters {
        self.inner.counters.snapshot()
    }

    /// A cloneable handle onto this channel's live counters, for rendering
    /// (e.g. via `DefaultListener::with_counters`) independently of any
    /// single snapshot.
    pub fn counter_handle(&self) -> CounterHandle {
        CounterHandle::new(self.inner.counters.clone())
    }

    /// The cancellation token propagated to every in-flight
    /// `Strategy::send` call. Cancel it to cut in-flight transport I/O
    /// short (accounted as exceptions) without waiting for it to finish on
    /// its own.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.ctx.clone()
    }
}

/// Builder for [`Channel`]. `strategy` and `config` are required up front
/// since `ChannelConfig` is already validated by its own builder — only the
/// optional cancellation token and listeners are collected here before
/// `build()` spawns the assembler and worker pool.
#[must_use = "builders do nothing unless you call .build()"]
pub struct ChannelBuilder<E, S: Strategy<E>> {
    strategy: S,
    config: ChannelConfig,
    ctx: Option<CancellationToken>,
    listeners: Vec<Arc<dyn Listener<E, S::Item>>>,
}

impl<E, S> ChannelBuilder<E, S>
where
    E: Send + 'static,
    S: Strategy<E> + 'static,
{
    pub fn new(strategy: S, config: ChannelConfig) -> Self {
        Self {
            strategy,
            config,
            ctx: None,
            listeners: Vec::new(),
        }
    }

    /// Supplies an externally-owned cancellation token instead of an
    /// internally-created one, letting the embedder cancel in-flight sends
    /// from outside the channel.
    pub fn cancellation_token(mut self, ctx: CancellationToken) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Attaches a listener before the worker pool starts, so it observes
    /// every callback from the first batch onward.
    pub fn listener(mut self, listener: Arc<dyn Listener<E, S::Item>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Builds the channel. Spawns the assembler task and the fixed worker
    /// pool immediately — there is no separate `start()`, since a
    /// constructed-but-dormant channel has no useful observable state in
    /// Rust's ownership model.
    pub fn build(self) -> Channel<E, S> {
        let ChannelBuilder {
            strategy,
            config,
            ctx,
            listeners,
        } = self;

        let strategy = Arc::new(strategy);
        let ctx = ctx.unwrap_or_default();

        let (inbound_tx, inbound_rx) = inbound_channel(config.max_in_flight);
        let (outbound_tx, outbound_rx) = async_channel::bounded(config.outbound_buffer_max_size);
        let (closed_tx, closed_rx) = watch::channel(false);
        let (drained_tx, drained_rx) = watch::channel(false);

        let counters = Arc::new(CounterSet::default());
        let listener_registry = Arc::new(ListenerRegistry::new());
        for listener in listeners {
            listener_registry.attach(listener);
        }

        let on_batch_published: OnBatchPublished = {
            let registry = listener_registry.clone();
            Arc::new(move |batch_id, size| registry.on_batch_published(batch_id, size))
        };

        let assembler_handle = tokio::spawn(assembler::run(
            inbound_rx,
            outbound_tx,
            config.batch_size,
            config.linger,
            closed_rx,
            counters.clone(),
            on_batch_published,
        ));

        let worker_handles = worker::spawn_workers(
            strategy,
            outbound_rx,
            config.export_concurrency,
            config.max_retries,
            config.backoff.clone(),
            config.disable_diagnostics,
            ctx.clone(),
            counters.clone(),
            listener_registry.clone(),
        );

        tokio::spawn(async move {
            let _ = assembler_handle.await;
            for handle in worker_handles {
                let _ = handle.await;
            }
            let _ = drained_tx.send(true);
        });

        Channel {
            inner: Arc::new(Inner {
                inbound: inbound_tx,
                closed: AtomicBool::new(false),
                closed_tx,
                drained_rx,
                ctx,
                counters,
                listeners: listener_registry,
            }),
        }
    }
}
