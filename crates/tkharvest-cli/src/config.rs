//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tkharvest_core::HttpConfig;
use tkharvest_syncfeed::DeletionMarker;

/// Destination when neither the config file nor `HF_REPO_ID` names one
const FALLBACK_DESTINATION: &str = "user/ingest";

/// Global configuration for tkharvest
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub http: HttpSection,
    pub harvest: HarvestSection,
    pub store: StoreConfig,
    pub publish: PublishConfig,
    pub pdf: PdfConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub category: String,
    pub source: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let defaults = tkharvest_syncfeed::Config::default();
        Self {
            url: defaults.feed_url,
            category: defaults.category,
            source: defaults.source,
        }
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub connect_timeout: u64,
    pub request_timeout: u64,
    pub max_body_bytes: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        let defaults = HttpConfig::default();
        Self {
            connect_timeout: defaults.connect_timeout.as_secs(),
            request_timeout: defaults.request_timeout.as_secs(),
            max_body_bytes: defaults.max_body_bytes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSection {
    /// 0 disables the limit
    pub max_documents: usize,
    pub max_pages: Option<usize>,
    pub workers: usize,
}

impl Default for HarvestSection {
    fn default() -> Self {
        let defaults = tkharvest_syncfeed::Config::default();
        Self {
            max_documents: defaults.max_documents.unwrap_or(0),
            max_pages: defaults.max_pages,
            workers: defaults.workers,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Cursor file
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./state/progress.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub output_dir: PathBuf,
    #[serde(deserialize_with = "deserialize_destination")]
    pub destination: String,
    pub compression_level: i32,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            destination: default_destination(),
            compression_level: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// `pdftotext` executable
    pub program: PathBuf,
    /// Seconds per conversion
    pub timeout: u64,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pdftotext"),
            timeout: 60,
        }
    }
}

fn default_destination() -> String {
    std::env::var("HF_REPO_ID")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_DESTINATION.to_string())
}

/// `${VAR}` expands to the variable; an unset variable falls back to the default
fn deserialize_destination<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(expand_env_var(&raw).unwrap_or_else(default_destination))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./tkharvest.toml (current directory)
    /// 2. ~/.config/tkharvest/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("tkharvest.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "tkharvest") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.http.connect_timeout),
            request_timeout: Duration::from_secs(self.http.request_timeout),
            max_body_bytes: self.http.max_body_bytes,
        }
    }

    /// Harvest settings before command-line overrides
    pub fn harvest_config(&self) -> tkharvest_syncfeed::Config {
        tkharvest_syncfeed::Config {
            feed_url: self.feed.url.clone(),
            category: self.feed.category.clone(),
            source: self.feed.source.clone(),
            max_documents: (self.harvest.max_documents > 0).then_some(self.harvest.max_documents),
            max_pages: self.harvest.max_pages,
            workers: self.harvest.workers.max(1),
            deletion_marker: DeletionMarker::default(),
        }
    }
}
