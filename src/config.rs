//! Channel configuration and backoff policy.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// Attempt-indexed (0-based) delay function consulted between retries.
///
/// The default is exponential-with-jitter; supply your own via
/// [`ChannelConfigBuilder::backoff`] for a fixed or custom policy.
#[derive(Clone)]
pub struct BackoffPolicy(Arc<dyn Fn(u32) -> Duration + Send + Sync>);

impl BackoffPolicy {
    pub fn new(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        (self.0)(attempt)
    }

    /// Exponential backoff with full jitter, bounded by `max`.
    ///
    /// `attempt` is 0-based; `base * multiplier.powi(attempt)` grows until
    /// it is clamped to `max`, then a uniform random delay in `[0, bound)`
    /// is drawn (AWS SDK's "full jitter", same shape as the teacher crate's
    /// `JitterMode::Full`).
    pub fn exponential_jitter(base: Duration, max: Duration, multiplier: f64) -> Self {
        Self::new(move |attempt| {
            let scaled = base.as_secs_f64() * multiplier.powi(attempt as i32);
            let bound = scaled.min(max.as_secs_f64()).max(0.0);
            let mut rng = rand::thread_rng();
            Duration::from_secs_f64(rng.gen::<f64>() * bound)
        })
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential_jitter(Duration::from_millis(100), Duration::from_secs(30), 2.0)
    }
}

impl std::fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffPolicy").finish_non_exhaustive()
    }
}

/// Validated, immutable channel configuration.
///
/// Built via [`ChannelConfig::builder`], which is the only way to obtain
/// one — fields are private so a config can never be constructed with an
/// invalid combination.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub(crate) max_in_flight: usize,
    pub(crate) batch_size: usize,
    pub(crate) linger: Duration,
    pub(crate) outbound_buffer_max_size: usize,
    pub(crate) export_concurrency: usize,
    pub(crate) max_retries: u32,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) disable_diagnostics: bool,
}

impl ChannelConfig {
    pub fn builder() -> ChannelConfigBuilder {
        ChannelConfigBuilder::new()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn linger(&self) -> Duration {
        self.linger
    }

    pub fn outbound_buffer_max_size(&self) -> usize {
        self.outbound_buffer_max_size
    }

    pub fn export_concurrency(&self) -> usize {
        self.export_concurrency
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn disable_diagnostics(&self) -> bool {
        self.disable_diagnostics
    }
}

/// Builder for [`ChannelConfig`].
///
/// `max_in_flight` and `batch_size` are required; everything else defaults
/// per §6.1. `outbound_buffer_max_size` defaults to
/// `max(1, max_in_flight / 10)`, computed lazily in `build()` once
/// `max_in_flight` is known, unless overridden.
#[must_use = "builders do nothing unless you call .build()"]
#[derive(Clone)]
pub struct ChannelConfigBuilder {
    max_in_flight: Option<usize>,
    batch_size: Option<usize>,
    linger: Duration,
    outbound_buffer_max_size: Option<usize>,
    export_concurrency: usize,
    max_retries: u32,
    backoff: BackoffPolicy,
    disable_diagnostics: bool,
}

impl ChannelConfigBuilder {
    pub fn new() -> Self {
        Self {
            max_in_flight: None,
            batch_size: None,
            linger: Duration::ZERO,
            outbound_buffer_max_size: None,
            export_concurrency: 1,
            max_retries: 3,
            backoff: BackoffPolicy::default(),
            disable_diagnostics: false,
        }
    }

    /// Inbound queue capacity. Required.
    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = Some(n);
        self
    }

    /// Max events per batch. Required.
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }

    /// Max time the assembler waits before emitting a partial batch.
    pub fn linger(mut self, d: Duration) -> Self {
        self.linger = d;
        self
    }

    /// Capacity of the queue feeding the export worker pool.
    pub fn outbound_buffer_max_size(mut self, n: usize) -> Self {
        self.outbound_buffer_max_size = Some(n);
        self
    }

    /// Fixed worker count.
    pub fn export_concurrency(mut self, n: usize) -> Self {
        self.export_concurrency = n;
        self
    }

    /// Additional attempts beyond the first.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Attempt-indexed delay function.
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Skip observed-concurrency tracking and string rendering.
    pub fn disable_diagnostics(mut self, disabled: bool) -> Self {
        self.disable_diagnostics = disabled;
        self
    }

    pub fn build(self) -> Result<ChannelConfig, ConfigError> {
        let max_in_flight = self.max_in_flight.ok_or(ConfigError::MaxInFlightMissing)?;
        if max_in_flight == 0 {
            return Err(ConfigError::MaxInFlightZero(0));
        }

        let batch_size = self.batch_size.ok_or(ConfigError::BatchSizeMissing)?;
        if batch_size == 0 {
            return Err(ConfigError::BatchSizeZero(0));
        }

        if self.export_concurrency == 0 {
            return Err(ConfigError::ExportConcurrencyZero(0));
        }

        let outbound_buffer_max_size = self
            .outbound_buffer_max_size
            .unwrap_or_else(|| (max_in_flight / 10).max(1));
        if outbound_buffer_max_size == 0 {
            return Err(ConfigError::OutboundBufferZero(0));
        }

        Ok(ChannelConfig {
            max_in_flight,
            batch_size,
            linger: self.linger,
            outbound_buffer_max_size,
            export_concurrency: self.export_concurrency,
            max_retries: self.max_retries,
            backoff: self.backoff,
            disable_diagnostics: self.disable_diagnostics,
        })
    }
}

impl Default for ChannelConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_max_in_flight() {
        let err = ChannelConfig::builder()
            .max_in_flight(0)
            .batch_size(10)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MaxInFlightZero(0)));
    }

    #[test]
    fn rejects_missing_batch_size() {
        let err = ChannelConfig::builder()
            .max_in_flight(10)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::BatchSizeMissing));
    }

    #[test]
    fn rejects_missing_max_in_flight() {
        let err = ChannelConfig::builder().batch_size(10).build().unwrap_err();
        assert!(matches!(err, ConfigError::MaxInFlightMissing));
    }

    #[test]
    fn default_outbound_buffer_is_tenth_of_max_in_flight() {
        let cfg = ChannelConfig::builder()
            .max_in_flight(1000)
            .batch_size(50)
            .build()
            .unwrap();
        assert_eq!(cfg.outbound_buffer_max_size(), 100);
    }

    #[test]
    fn default_outbound_buffer_floors_at_one() {
        let cfg = ChannelConfig::builder()
            .max_in_flight(5)
            .batch_size(1)
            .build()
            .unwrap();
        assert_eq!(cfg.outbound_buffer_max_size(), 1);
    }

    #[test]
    fn explicit_outbound_buffer_overrides_default() {
        let cfg = ChannelConfig::builder()
            .max_in_flight(1000)
            .batch_size(50)
            .outbound_buffer_max_size(7)
            .build()
            .unwrap();
        assert_eq!(cfg.outbound_buffer_max_size(), 7);
    }

    #[test]
    fn exponential_jitter_stays_within_bound() {
        let backoff = BackoffPolicy::exponential_jitter(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
        );
        for attempt in 0..10 {
            let d = backoff.delay_for(attempt);
            assert!(d <= Duration::from_millis(100));
        }
    }
}
