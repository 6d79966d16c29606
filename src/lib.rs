//! A buffered, batching, retrying channel for bulk ingestion sinks.
//!
//! Sits between a high-rate producer of in-memory events and a remote bulk
//! sink (an Elasticsearch `_bulk` endpoint or an APM intake endpoint are the
//! typical targets, but this crate knows nothing about either wire format).
//! It accepts events concurrently with non-blocking or blocking
//! backpressure, assembles them into size- and time-bounded batches, exports
//! those batches to a transport with bounded concurrency, classifies
//! per-item responses to retry transient failures and surface permanent
//! ones, and exposes deterministic drain and completion semantics.
//!
//! This crate does not parse, validate, or mutate event payloads; it does
//! not speak any wire protocol itself; it does not manage remote schema,
//! policies, or aliases; it does not persist events across process
//! restarts; it does not order events across concurrent producers.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use bulk_channel::{Channel, ChannelConfig};
//! use bulk_channel::testing::RecordingStrategy;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = ChannelConfig::builder()
//!     .max_in_flight(1000)
//!     .batch_size(100)
//!     .build()
//!     .unwrap();
//!
//! let strategy = RecordingStrategy::<u64>::always_succeeds();
//! let channel = Channel::builder(strategy, config).build();
//!
//! for event in 0..10u64 {
//!     assert!(channel.try_write(event));
//! }
//!
//! channel.close();
//! let ctx = bulk_channel::CancellationToken::new();
//! let drained = channel.wait_for_drain(std::time::Duration::from_secs(5), &ctx).await;
//! assert!(drained);
//! assert_eq!(channel.counters().exported, 10);
//! # }
//! ```

mod assembler;
mod batch;
mod channel;
mod clock;
mod config;
pub mod error;
mod listener;
mod queue;
mod strategy;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod worker;

pub use batch::{Batch, BatchId};
pub use channel::{Channel, ChannelBuilder};
pub use clock::CancellationToken;
pub use config::{BackoffPolicy, ChannelConfig, ChannelConfigBuilder};
pub use listener::{CounterHandle, Counters, DefaultListener, Listener};
pub use strategy::{Strategy, ZipOutcome};
