//! Notifier configuration.

use serde::Deserialize;
use std::time::Duration;

/// Poll loop timing.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Whether the poller runs at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Time between poll cycles.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Extra wait after the source could not be reached.
    #[serde(default = "default_connectivity_backoff", with = "humantime_serde")]
    pub connectivity_backoff: Duration,

    /// Extra wait after any other failed cycle.
    #[serde(default = "default_error_backoff", with = "humantime_serde")]
    pub error_backoff: Duration,

    /// Pause between consecutive source requests.
    #[serde(default = "default_request_pause", with = "humantime_serde")]
    pub request_pause: Duration,

    /// Channel ids per direct-follow request.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_connectivity_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_error_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_request_pause() -> Duration {
    Duration::from_secs(1)
}

fn default_max_batch() -> usize {
    100
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval: default_interval(),
            connectivity_backoff: default_connectivity_backoff(),
            error_backoff: default_error_backoff(),
            request_pause: default_request_pause(),
            max_batch: default_max_batch(),
        }
    }
}
