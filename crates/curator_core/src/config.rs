use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            poll_interval_ms: 1_000,
        }
    }
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// What happens to items whose verdict is unknown or not yet decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailureMode {
    /// Keep them visible.
    #[default]
    FailOpen,
    /// Hide them, except while the circuit-breaker fallback is active.
    FailClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    pub failure_mode: FailureMode,
    /// Upper bound on visible items; `None` keeps every allowed item.
    pub max_visible: Option<usize>,
    pub strip_noise: bool,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            failure_mode: FailureMode::FailOpen,
            max_visible: None,
            strip_noise: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Label of the observed region, used in logs and change signals.
    pub region: String,
    pub watcher: WatcherConfig,
    pub visibility: VisibilityConfig,
    pub max_parked: usize,
    pub cache_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            region: "feed".to_string(),
            watcher: WatcherConfig::default(),
            visibility: VisibilityConfig::default(),
            max_parked: 500,
            cache_capacity: 10_000,
        }
    }
}
