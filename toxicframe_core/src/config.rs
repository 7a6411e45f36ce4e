use crate::aggregator::MaybePolicy;
use crate::batch::BatchSettings;
use crate::frame::{DEFAULT_ETHERTYPE, DEFAULT_MTU, FrameError, FrameLayout, MacAddr};
use crate::oracle::OracleSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct InjectorSettings {
    #[serde(default = "default_injector_url")]
    pub url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

fn default_injector_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_repeat() -> u32 {
    1
}

impl Default for InjectorSettings {
    fn default() -> Self {
        Self {
            url: default_injector_url(),
            request_timeout_ms: default_request_timeout_ms(),
            repeat: default_repeat(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CaptureSettings {
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_read_timeout_ms() -> u64 {
    10
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FrameSettings {
    #[serde(default = "default_dst_mac")]
    pub dst_mac: String,
    #[serde(default = "default_src_mac")]
    pub src_mac: String,
    #[serde(default = "default_ethertype")]
    pub ethertype: u16,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
}

fn default_dst_mac() -> String {
    MacAddr::BROADCAST.to_string()
}

fn default_src_mac() -> String {
    "00:00:00:00:00:00".to_string()
}

fn default_ethertype() -> u16 {
    DEFAULT_ETHERTYPE
}

fn default_mtu() -> usize {
    DEFAULT_MTU
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            dst_mac: default_dst_mac(),
            src_mac: default_src_mac(),
            ethertype: default_ethertype(),
            mtu: default_mtu(),
        }
    }
}

impl FrameSettings {
    pub fn layout(&self) -> Result<FrameLayout, FrameError> {
        FrameLayout::new(
            self.dst_mac.parse()?,
            self.src_mac.parse()?,
            self.ethertype,
            self.mtu,
        )
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TrialSettings {
    /// Trials per candidate for final classifications.
    #[serde(default = "default_trial_count")]
    pub count: u32,
    /// Trials per probe inside boundary binary searches.
    #[serde(default = "default_binary_search_trials")]
    pub binary_search: u32,
    /// Trials per candidate in batched brute-force scans. TOXIC hits are
    /// re-measured with `count` before they are reported.
    #[serde(default = "default_batch_trials")]
    pub batch: u32,
    #[serde(default = "default_trial_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
    /// Trial count used to re-measure MAYBE results; 0 disables retesting.
    #[serde(default)]
    pub maybe_retest: u32,
}

fn default_trial_count() -> u32 {
    10
}

fn default_binary_search_trials() -> u32 {
    3
}

fn default_batch_trials() -> u32 {
    1
}

fn default_trial_timeout_ms() -> u64 {
    100
}

fn default_poll_interval_us() -> u64 {
    200
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            count: default_trial_count(),
            binary_search: default_binary_search_trials(),
            batch: default_batch_trials(),
            timeout_ms: default_trial_timeout_ms(),
            poll_interval_us: default_poll_interval_us(),
            maybe_retest: 0,
        }
    }
}

impl TrialSettings {
    pub fn maybe_policy(&self) -> MaybePolicy {
        match self.maybe_retest {
            0 => MaybePolicy::Accept,
            trials => MaybePolicy::Retest { trials },
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_per_candidate_wait_ms")]
    pub per_candidate_wait_ms: u64,
}

fn default_batch_size() -> usize {
    256
}

fn default_workers() -> usize {
    4
}

fn default_per_candidate_wait_ms() -> u64 {
    2
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            workers: default_workers(),
            per_candidate_wait_ms: default_per_candidate_wait_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub safe_cache: bool,
    #[serde(default)]
    pub cache_epoch: i64,
    #[serde(default = "default_warm_limit")]
    pub warm_limit: usize,
}

pub fn default_store_path() -> PathBuf {
    PathBuf::from("./toxicframe.db")
}

fn default_true() -> bool {
    true
}

fn default_warm_limit() -> usize {
    50_000
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            safe_cache: true,
            cache_epoch: 0,
            warm_limit: default_warm_limit(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SearchSettings {
    /// Seed for mutation sampling; a fixed value makes climbs reproducible.
    #[serde(default)]
    pub rng_seed: u64,
    #[serde(default = "default_hill_climb_iterations")]
    pub hill_climb_iterations: usize,
    #[serde(default = "default_samples_per_position")]
    pub samples_per_position: usize,
    #[serde(default = "default_pattern_len")]
    pub pattern_len: usize,
}

fn default_hill_climb_iterations() -> usize {
    50
}

fn default_samples_per_position() -> usize {
    10
}

fn default_pattern_len() -> usize {
    14
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            rng_seed: 0,
            hill_climb_iterations: default_hill_climb_iterations(),
            samples_per_position: default_samples_per_position(),
            pattern_len: default_pattern_len(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ToxicframeConfig {
    #[serde(default)]
    pub injector: InjectorSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub frame: FrameSettings,
    #[serde(default)]
    pub trials: TrialSettings,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

impl ToxicframeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: ToxicframeConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    pub fn trial_timeout(&self) -> Duration {
        Duration::from_millis(self.trials.timeout_ms)
    }

    pub fn oracle_settings(&self) -> OracleSettings {
        OracleSettings {
            poll_interval: Duration::from_micros(self.trials.poll_interval_us),
            repeat: self.injector.repeat.max(1),
            batch: BatchSettings {
                size: self.batch.size.max(1),
                workers: self.batch.workers.max(1),
                per_candidate_wait: Duration::from_millis(self.batch.per_candidate_wait_ms),
            },
        }
    }
}
