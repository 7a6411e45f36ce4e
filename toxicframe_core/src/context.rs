//! Run-scoped ownership of every collaborator a search needs.
//!
//! A [`RunContext`] is opened once per run, handed by reference to each
//! strategy, and closed at the end. Nothing in the crate keeps global state.

use crate::aggregator::{CancelToken, TrialAggregator};
use crate::capture::CaptureLoop;
use crate::config::ToxicframeConfig;
use crate::frame::FrameError;
use crate::probe::ProbeStats;
use crate::safe_cache::SafeCache;
use crate::store::{ResultStore, StoreError};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("{what} is unavailable ({hint})")]
    TransportUnavailable { what: String, hint: String },
    #[error("Invalid frame settings: {0}")]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Knobs shared by every strategy in a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Trials for confirmation probes.
    pub trials: u32,
    /// Trials for probes inside boundary binary searches.
    pub binary_search_trials: u32,
    /// Trials for batched enumeration and mutation probes.
    pub batch_trials: u32,
    pub batch_size: usize,
    /// Re-measure keys that already have a stored result.
    pub force_retest: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            trials: 10,
            binary_search_trials: 3,
            batch_trials: 1,
            batch_size: 256,
            force_retest: false,
        }
    }
}

pub struct RunContext {
    pub(crate) aggregator: TrialAggregator,
    pub(crate) store: ResultStore,
    pub(crate) cache: Option<SafeCache>,
    pub(crate) settings: RunSettings,
    pub(crate) stats: Mutex<ProbeStats>,
    capture: Option<CaptureLoop>,
}

impl RunContext {
    /// Assembles a context from ready-made parts, without network resources.
    pub fn with_parts(
        aggregator: TrialAggregator,
        store: ResultStore,
        cache: Option<SafeCache>,
        settings: RunSettings,
    ) -> Self {
        Self {
            aggregator,
            store,
            cache,
            settings,
            stats: Mutex::new(ProbeStats::default()),
            capture: None,
        }
    }

    /// Connects to the injection service, starts the capture loop and opens
    /// the store and cache described by `config`.
    ///
    /// Fails with [`ContextError::TransportUnavailable`] if either end of the
    /// measurement channel cannot be acquired.
    pub fn open(config: &ToxicframeConfig, settings: RunSettings) -> Result<Self, ContextError> {
        let layout = config.frame.layout()?;
        let (oracle, capture) = transport::connect(config, layout)?;

        let store = ResultStore::open(&config.store.path)?;
        let cache = if config.store.safe_cache {
            let cache = SafeCache::open(&config.store.path, config.store.cache_epoch)?;
            let warmed = cache.warm(config.store.warm_limit)?;
            tracing::info!(warmed, epoch = cache.epoch(), "safe cache ready");
            Some(cache)
        } else {
            None
        };

        let aggregator = TrialAggregator::new(oracle, config.trial_timeout())
            .with_maybe_policy(config.trials.maybe_policy());

        let mut context = Self::with_parts(aggregator, store, cache, settings);
        context.capture = Some(capture);
        Ok(context)
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn cache(&self) -> Option<&SafeCache> {
        self.cache.as_ref()
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn aggregator(&self) -> &TrialAggregator {
        &self.aggregator
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.aggregator.cancel_token()
    }

    pub fn stats(&self) -> ProbeStats {
        *self.stats.lock()
    }

    /// Stops the capture loop and returns the run's probe statistics.
    pub fn close(mut self) -> ProbeStats {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            tracing::debug!(frames = capture.frames_seen(), "capture closed");
        }
        let stats = self.stats();
        tracing::info!(
            store_hits = stats.store_hits,
            cache_hits = stats.cache_hits,
            classified = stats.classified,
            toxic = stats.toxic,
            "run closed"
        );
        stats
    }
}

#[cfg(target_os = "linux")]
mod transport {
    use super::ContextError;
    use crate::capture::{ArrivalTable, CaptureLoop, PacketSocket};
    use crate::config::ToxicframeConfig;
    use crate::frame::FrameLayout;
    use crate::injector::{HttpInjector, Injector};
    use crate::oracle::{CorrelationOracle, Oracle};
    use std::sync::Arc;
    use std::time::Duration;

    pub(super) fn connect(
        config: &ToxicframeConfig,
        layout: FrameLayout,
    ) -> Result<(Arc<dyn Oracle>, CaptureLoop), ContextError> {
        let injector = HttpInjector::new(
            &config.injector.url,
            Duration::from_millis(config.injector.request_timeout_ms),
        )
        .map_err(|e| ContextError::TransportUnavailable {
            what: format!("injection service at {}", config.injector.url),
            hint: e.to_string(),
        })?;
        if !injector.health() {
            return Err(ContextError::TransportUnavailable {
                what: format!("injection service at {}", config.injector.url),
                hint: "check that the packet generator is running and [injector] url is correct"
                    .to_string(),
            });
        }
        tracing::info!(url = injector.base_url(), "injection service healthy");

        let socket = PacketSocket::open(
            &config.capture.interface,
            layout.ethertype,
            Duration::from_millis(config.capture.read_timeout_ms),
        )
        .map_err(|e| ContextError::TransportUnavailable {
            what: format!("capture socket on {}", config.capture.interface),
            hint: format!("{e}; raw capture needs root or CAP_NET_RAW"),
        })?;

        let arrivals = Arc::new(ArrivalTable::new());
        let capture = CaptureLoop::spawn(socket, layout.clone(), Arc::clone(&arrivals)).map_err(
            |e| ContextError::TransportUnavailable {
                what: "capture thread".to_string(),
                hint: e.to_string(),
            },
        )?;
        tracing::info!(interface = %config.capture.interface, ethertype = layout.ethertype, "capture started");

        let oracle: Arc<dyn Oracle> = Arc::new(CorrelationOracle::new(
            Arc::new(injector),
            arrivals,
            layout,
            config.oracle_settings(),
        ));
        Ok((oracle, capture))
    }
}

#[cfg(not(target_os = "linux"))]
mod transport {
    use super::ContextError;
    use crate::capture::CaptureLoop;
    use crate::config::ToxicframeConfig;
    use crate::frame::FrameLayout;
    use crate::oracle::Oracle;
    use std::sync::Arc;

    pub(super) fn connect(
        config: &ToxicframeConfig,
        _layout: FrameLayout,
    ) -> Result<(Arc<dyn Oracle>, CaptureLoop), ContextError> {
        Err(ContextError::TransportUnavailable {
            what: format!("capture socket on {}", config.capture.interface),
            hint: "raw link-layer capture is only implemented for Linux".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PredicateOracle;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn open_fails_fast_without_injection_service() {
        let mut config = ToxicframeConfig::default();
        config.injector.url = "http://127.0.0.1:9".to_string();
        config.injector.request_timeout_ms = 200;
        let err = RunContext::open(&config, RunSettings::default())
            .err()
            .expect("open must fail");
        assert!(matches!(err, ContextError::TransportUnavailable { .. }));
    }

    #[test]
    fn close_reports_stats_of_an_offline_context() {
        let aggregator = TrialAggregator::new(
            Arc::new(PredicateOracle::new(|_| false)),
            Duration::from_millis(1),
        );
        let ctx = RunContext::with_parts(
            aggregator,
            ResultStore::open_in_memory().unwrap(),
            None,
            RunSettings::default(),
        );
        assert_eq!(ctx.close(), ProbeStats::default());
    }
}
