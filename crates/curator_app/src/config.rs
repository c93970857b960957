use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use curator_core::{ReconcilerConfig, SurfaceProfile};
use curator_engine::{
    Classifier, ClassifierSettings, ClientSettings, HttpClassifier, KeywordClassifier,
};
use curator_logging::{curator_info, LevelFilter, LogDestination};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "curator.ron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogTarget {
    File,
    #[default]
    Terminal,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::File => LogDestination::File,
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub destination: LogTarget,
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            destination: LogTarget::Terminal,
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow!("unknown log level {:?}", self.level))
    }
}

/// Known surfaces: how many items each shows and what else it clutters in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfacePreset {
    Home,
    Sidebar,
    /// Search results.
    Results,
}

impl SurfacePreset {
    pub fn max_visible(self) -> Option<usize> {
        match self {
            SurfacePreset::Home => Some(10),
            SurfacePreset::Sidebar => Some(2),
            SurfacePreset::Results => None,
        }
    }

    pub fn noise_tags(self) -> &'static [&'static str] {
        match self {
            SurfacePreset::Results => &["reel-shelf", "chips"],
            SurfacePreset::Home | SurfacePreset::Sidebar => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub preset: Option<SurfacePreset>,
    pub profile: SurfaceProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub request_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            retry_backoff_ms: 500,
            breaker_threshold: 3,
            breaker_cooldown_ms: 30_000,
        }
    }
}

impl ClientConfig {
    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: Duration::from_millis(self.request_timeout_ms.max(1)),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            breaker_threshold: self.breaker_threshold,
            breaker_cooldown: Duration::from_millis(self.breaker_cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierConfig {
    /// Offline substring matching against the active filters.
    Keyword {
        #[serde(default)]
        delay_ms: u64,
    },
    Http {
        endpoint: String,
        #[serde(default)]
        bearer_token: Option<String>,
        #[serde(default = "default_connect_timeout_ms")]
        connect_timeout_ms: u64,
    },
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::Keyword { delay_ms: 0 }
    }
}

impl ClassifierConfig {
    pub fn build(&self, client: &ClientConfig) -> Result<Arc<dyn Classifier>> {
        match self {
            ClassifierConfig::Keyword { delay_ms } => Ok(Arc::new(
                KeywordClassifier::new().with_delay(Duration::from_millis(*delay_ms)),
            )),
            ClassifierConfig::Http {
                endpoint,
                bearer_token,
                connect_timeout_ms,
            } => {
                let endpoint = Url::parse(endpoint)
                    .with_context(|| format!("invalid classifier endpoint {endpoint:?}"))?;
                let settings = ClassifierSettings {
                    connect_timeout: Duration::from_millis(*connect_timeout_ms),
                    request_timeout: Duration::from_millis(client.request_timeout_ms.max(1)),
                    bearer_token: bearer_token.clone(),
                    ..ClassifierSettings::new(endpoint)
                };
                let classifier = HttpClassifier::new(settings)
                    .context("failed to build the HTTP classifier")?;
                Ok(Arc::new(classifier))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySwitch {
    pub at_tick: u32,
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub ticks: u32,
    pub tick_ms: u64,
    pub items_per_tick: usize,
    pub policy_switch: Option<PolicySwitch>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            ticks: 12,
            tick_ms: 250,
            items_per_tick: 3,
            policy_switch: Some(PolicySwitch {
                at_tick: 8,
                filters: vec!["cooking".to_string()],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub reconciler: ReconcilerConfig,
    pub surface: SurfaceConfig,
    pub client: ClientConfig,
    pub classifier: ClassifierConfig,
    pub filters: Vec<String>,
    pub demo: DemoConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            reconciler: ReconcilerConfig::default(),
            surface: SurfaceConfig::default(),
            client: ClientConfig::default(),
            classifier: ClassifierConfig::default(),
            filters: vec!["politics".to_string()],
            demo: DemoConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reconciler settings with the surface preset applied when no explicit
    /// limit is configured.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let mut config = self.reconciler.clone();
        if config.visibility.max_visible.is_none() {
            config.visibility.max_visible =
                self.surface.preset.and_then(SurfacePreset::max_visible);
        }
        config
    }

    /// The configured profile plus the preset's noise tags.
    pub fn surface_profile(&self) -> SurfaceProfile {
        let mut profile = self.surface.profile.clone();
        if let Some(preset) = self.surface.preset {
            for tag in preset.noise_tags() {
                if !profile.noise_tags.iter().any(|t| t == tag) {
                    profile.noise_tags.push(tag.to_string());
                }
            }
        }
        profile
    }

    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
            .context("failed to serialize configuration")
    }
}

/// Reads `path`; a missing file yields the defaults.
pub fn load(path: &Path) -> Result<AppConfig> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AppConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config {}", path.display()))
        }
    };
    let config: AppConfig = ron::from_str(&content)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config.log.level_filter()?;
    Ok(config)
}

pub fn write_default(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing {}", path.display());
    }
    let content = AppConfig::default().to_ron()?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    curator_info!("default configuration written to {}", path.display());
    Ok(())
}
