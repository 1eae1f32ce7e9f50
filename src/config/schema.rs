use crate::client::ClientSettings;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispatchConfig {
    /// Target URL for counted mode.
    #[serde(default)]
    #[validate(url)]
    pub url: Option<String>,

    #[serde(default = "default_requests")]
    #[validate(range(min = 1))]
    pub requests: u64,

    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1))]
    pub concurrency: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_success_status")]
    #[validate(range(min = 100, max = 599))]
    pub success_status: u16,

    #[serde(default = "default_progress_every")]
    #[validate(range(min = 1))]
    pub progress_every: u64,

    /// Idle connections kept per host; unbounded when unset.
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,

    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    #[validate]
    pub probe: Option<ProbeConfig>,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProbeConfig {
    /// Text file with one candidate endpoint per line.
    #[validate(length(min = 1))]
    pub candidates: String,

    #[serde(default = "default_test_url")]
    #[validate(url)]
    pub test_url: String,

    /// Workers for probe runs; replaces the top-level `concurrency`.
    #[serde(default = "default_probe_concurrency")]
    #[validate(range(min = 1))]
    pub concurrency: usize,

    /// Retries per candidate; a dead proxy is usually not worth a second try.
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default)]
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputConfig {
    Console,
    Text { path: String },
    Json { path: String },
    Csv { path: String },
}

impl OutputConfig {
    /// File the handler writes to; `None` for console output.
    pub fn path(&self) -> Option<&str> {
        match self {
            OutputConfig::Console => None,
            OutputConfig::Text { path } | OutputConfig::Json { path } | OutputConfig::Csv { path } => {
                Some(path)
            }
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            url: None,
            requests: default_requests(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            success_status: default_success_status(),
            progress_every: default_progress_every(),
            pool_max_idle_per_host: None,
            insecure: false,
            user_agent: default_user_agent(),
            probe: None,
            extends: None,
        }
    }
}

impl DispatchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
            .with_backoff(
                Duration::from_millis(self.backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
            )
            .with_success_status(self.success_status)
    }

    /// Swaps in the probe worker count and retry budget, taken from the
    /// `probe` section or its defaults when there is none.
    pub fn apply_probe_defaults(&mut self) {
        let (concurrency, max_retries) = self
            .probe
            .as_ref()
            .map_or((default_probe_concurrency(), 0), |p| (p.concurrency, p.max_retries));
        self.concurrency = concurrency;
        self.max_retries = max_retries;
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            timeout: Duration::from_millis(self.timeout_ms),
            pool_max_idle_per_host: self.pool_max_idle_per_host,
            insecure: self.insecure,
            user_agent: self.user_agent.clone(),
        }
    }
}

fn default_requests() -> u64 {
    100_000
}

fn default_concurrency() -> usize {
    1000
}

fn default_probe_concurrency() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    8_000
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_success_status() -> u16 {
    200
}

fn default_progress_every() -> u64 {
    1000
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

pub fn default_test_url() -> String {
    "https://httpbin.org/ip".to_string()
}
