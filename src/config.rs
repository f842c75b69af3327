//! Configuration loader and validator for the crawl orchestrator.
use crate::model::QualityThresholds;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub crawl: Crawl,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub breaker: Breaker,
    pub sources: Vec<SourceConfig>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Cron expression for `schedule` mode (seconds field included).
    #[serde(default = "default_cron")]
    pub cron: String,
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Crawl {
    pub timeout_ms: u64,
    pub concurrency: usize,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

/// Validation quality thresholds, with optional per-source overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Quality {
    pub min_valid_ratio: f64,
    pub min_description_length: usize,
    pub overrides: HashMap<String, ThresholdOverride>,
}

/// Partial per-source threshold override; unset fields fall back to the
/// global defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThresholdOverride {
    pub min_valid_ratio: Option<f64>,
    pub min_description_length: Option<usize>,
}

/// Circuit breaker settings for chronically failing sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Breaker {
    pub enabled: bool,
    pub fail_threshold: i64,
    pub fail_window_hours: i64,
    pub cooldown_hours: i64,
}

/// One crawl source: a stable name plus the feed it is fetched from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    pub display_name: String,
    pub feed_url: String,
}

fn default_cron() -> String {
    // 09:00 and 18:00 daily
    "0 0 9,18 * * *".to_string()
}

impl Crawl {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for Crawl {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            concurrency: 3,
            retry_count: 1,
            retry_delay_ms: 2_000,
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            min_valid_ratio: 0.7,
            min_description_length: 50,
            overrides: HashMap::new(),
        }
    }
}

impl Default for Breaker {
    fn default() -> Self {
        Self {
            enabled: false,
            fail_threshold: 3,
            fail_window_hours: 24,
            cooldown_hours: 6,
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Resolve thresholds for a source: per-source override beats the
    /// global default, field by field.
    pub fn thresholds_for(&self, source: &str) -> QualityThresholds {
        let entry = self
            .quality
            .overrides
            .get(source)
            .or_else(|| self.quality.overrides.get(&source.to_lowercase()));
        QualityThresholds {
            min_valid_ratio: entry
                .and_then(|e| e.min_valid_ratio)
                .unwrap_or(self.quality.min_valid_ratio),
            min_description_length: entry
                .and_then(|e| e.min_description_length)
                .unwrap_or(self.quality.min_description_length),
        }
    }

    /// Apply environment overrides on top of the file-based config.
    /// Malformed values are logged and ignored; defaults stay in force.
    pub fn apply_env(&mut self) {
        env_parse("CRAWL_TIMEOUT_MS", &mut self.crawl.timeout_ms);
        env_parse("CRAWL_CONCURRENCY", &mut self.crawl.concurrency);
        env_parse("CRAWL_RETRY_COUNT", &mut self.crawl.retry_count);
        env_parse("CRAWL_RETRY_DELAY_MS", &mut self.crawl.retry_delay_ms);
        env_parse("CRAWL_BREAKER_ENABLED", &mut self.breaker.enabled);
        env_parse("CRAWL_FAIL_THRESHOLD", &mut self.breaker.fail_threshold);
        env_parse("CRAWL_FAIL_WINDOW_HOURS", &mut self.breaker.fail_window_hours);
        env_parse("CRAWL_COOLDOWN_HOURS", &mut self.breaker.cooldown_hours);
        env_parse("CRAWL_MIN_VALID_RATIO", &mut self.quality.min_valid_ratio);
        env_parse(
            "CRAWL_MIN_DESCRIPTION_LENGTH",
            &mut self.quality.min_description_length,
        );

        if let Ok(raw) = std::env::var("CRAWL_SOURCE_THRESHOLDS") {
            match serde_json::from_str::<HashMap<String, ThresholdOverride>>(&raw) {
                Ok(map) => self.quality.overrides.extend(map),
                Err(err) => {
                    warn!(%err, "malformed CRAWL_SOURCE_THRESHOLDS JSON; using defaults")
                }
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!(key, value = %raw, "unparseable environment override; keeping default"),
        }
    }
}

/// Load configuration from a YAML file, validate it, then layer
/// environment overrides on top.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    cfg.apply_env();
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.crawl.timeout_ms == 0 {
        return Err(ConfigError::Invalid("crawl.timeout_ms must be > 0"));
    }
    if cfg.crawl.concurrency == 0 {
        return Err(ConfigError::Invalid("crawl.concurrency must be > 0"));
    }
    if !(0.0..=1.0).contains(&cfg.quality.min_valid_ratio) {
        return Err(ConfigError::Invalid(
            "quality.min_valid_ratio must be within [0, 1]",
        ));
    }
    if cfg.sources.is_empty() {
        return Err(ConfigError::Invalid("sources must list at least one source"));
    }
    let mut seen = std::collections::HashSet::new();
    for source in &cfg.sources {
        if source.name.trim().is_empty() {
            return Err(ConfigError::Invalid("sources[].name must be non-empty"));
        }
        if source.feed_url.trim().is_empty() {
            return Err(ConfigError::Invalid("sources[].feed_url must be non-empty"));
        }
        if !seen.insert(source.name.as_str()) {
            return Err(ConfigError::Invalid("sources[].name must be unique"));
        }
    }
    Ok(())
}

/// Example YAML configuration, also used as a fixture in tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  cron: "0 0 9,18 * * *"

crawl:
  timeout_ms: 30000
  concurrency: 3
  retry_count: 1
  retry_delay_ms: 2000

quality:
  min_valid_ratio: 0.7
  min_description_length: 50
  overrides:
    nexon:
      min_valid_ratio: 0.5

breaker:
  enabled: false
  fail_threshold: 3
  fail_window_hours: 24
  cooldown_hours: 6

sources:
  - name: naver
    display_name: "NAVER"
    feed_url: "https://feeds.example.com/naver.json"
  - name: kakao
    display_name: "Kakao"
    feed_url: "https://feeds.example.com/kakao.json"
  - name: nexon
    display_name: "NEXON"
    feed_url: "https://feeds.example.com/nexon.json"
"#
}
