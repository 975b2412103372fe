//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Period;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where bulletins live and how to read them
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Gap resolution and index refresh policy
    #[serde(default)]
    pub sync: SyncConfig,

    /// Full-text index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// On-disk locations
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Make relative paths relative to `root` (usually the storage directory).
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.paths.database = rebase(root, &self.paths.database);
        self.paths.index_dir = rebase(root, &self.paths.index_dir);
        self.paths.lexicon = rebase(root, &self.paths.lexicon);
        self
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.source.base_url).is_err() {
            return Err(AppError::validation("source.base_url is not a valid URL"));
        }
        if self.source.marker.trim().is_empty() {
            return Err(AppError::validation("source.marker is empty"));
        }
        if self.source.subject_label.trim().is_empty() || self.source.summary_label.trim().is_empty()
        {
            return Err(AppError::validation("source labels must not be empty"));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.sync.max_periods == Some(0) {
            return Err(AppError::validation("sync.max_periods must be > 0 when set"));
        }
        self.sync.epoch()?;
        if self.index.lock_timeout_ms == 0 {
            return Err(AppError::validation("index.lock_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

/// Bulletin archive layout and extraction markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Archive root; listings live at `{base_url}/annee-{year}/semaine-{week}`
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Substring of anchor text identifying relevant bulletins
    #[serde(default = "defaults::marker")]
    pub marker: String,

    /// Detail-link fragment replaced to derive the document link
    #[serde(default = "defaults::document_link_from")]
    pub document_link_from: String,

    /// Replacement for `document_link_from`
    #[serde(default = "defaults::document_link_to")]
    pub document_link_to: String,

    /// Label preceding the subject on a detail page
    #[serde(default = "defaults::subject_label")]
    pub subject_label: String,

    /// Label preceding the summary on a detail page
    #[serde(default = "defaults::summary_label")]
    pub summary_label: String,

    /// Value stored when a field cannot be extracted
    #[serde(default = "defaults::sentinel")]
    pub sentinel: String,
}

impl SourceConfig {
    /// Listing URL for one period.
    pub fn listing_url(&self, period: Period) -> String {
        format!(
            "{}/annee-{}/semaine-{}",
            self.base_url.trim_end_matches('/'),
            period.year,
            period.week
        )
    }

    /// Companion document link for a detail link.
    pub fn document_link(&self, source_link: &str) -> String {
        source_link.replace(&self.document_link_from, &self.document_link_to)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            marker: defaults::marker(),
            document_link_from: defaults::document_link_from(),
            document_link_to: defaults::document_link_to(),
            subject_label: defaults::subject_label(),
            summary_label: defaults::summary_label(),
            sentinel: defaults::sentinel(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent detail-page requests
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Retries after the first attempt for retryable failures
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Initial backoff, doubled on each retry
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            max_retries: defaults::max_retries(),
            retry_backoff_ms: defaults::retry_backoff(),
        }
    }
}

/// How the index is refreshed after a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    #[default]
    Rebuild,
    Incremental,
}

/// Gap resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// First year checked when the store is empty
    #[serde(default = "defaults::epoch_year")]
    pub epoch_year: i32,

    /// First week checked when the store is empty
    #[serde(default = "defaults::epoch_week")]
    pub epoch_week: u32,

    /// Upper bound on periods per run, keeping the most recent
    #[serde(default)]
    pub max_periods: Option<usize>,

    #[serde(default)]
    pub index_mode: IndexMode,
}

impl SyncConfig {
    pub fn epoch(&self) -> Result<Period> {
        Period::new(self.epoch_year, self.epoch_week)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            epoch_year: defaults::epoch_year(),
            epoch_week: defaults::epoch_week(),
            max_periods: None,
            index_mode: IndexMode::default(),
        }
    }
}

/// Full-text index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Bounded wait for the index write lock
    #[serde(default = "defaults::lock_timeout")]
    pub lock_timeout_ms: u64,

    /// Tokens shorter than this (in chars) are not indexed
    #[serde(default = "defaults::min_token_length")]
    pub min_token_length: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: defaults::lock_timeout(),
            min_token_length: defaults::min_token_length(),
        }
    }
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::database")]
    pub database: PathBuf,

    #[serde(default = "defaults::index_dir")]
    pub index_dir: PathBuf,

    /// Word-forms/synonym database for query expansion
    #[serde(default = "defaults::lexicon")]
    pub lexicon: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: defaults::database(),
            index_dir: defaults::index_dir(),
            lexicon: defaults::lexicon(),
        }
    }
}

fn rebase(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

mod defaults {
    use std::path::PathBuf;

    // Source defaults
    pub fn base_url() -> String {
        "https://info.agriculture.gouv.fr/boagri/historique".into()
    }
    pub fn marker() -> String {
        "SDSSA".into()
    }
    pub fn document_link_from() -> String {
        "/detail".into()
    }
    pub fn document_link_to() -> String {
        "/telechargement".into()
    }
    pub fn subject_label() -> String {
        "Objet".into()
    }
    pub fn summary_label() -> String {
        "Résumé".into()
    }
    pub fn sentinel() -> String {
        "unknown".into()
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; boagri/0.1)".into()
    }
    pub fn timeout() -> u64 {
        15
    }
    pub fn request_delay() -> u64 {
        200
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn max_retries() -> u32 {
        2
    }
    pub fn retry_backoff() -> u64 {
        500
    }

    // Sync defaults
    pub fn epoch_year() -> i32 {
        2019
    }
    pub fn epoch_week() -> u32 {
        1
    }

    // Index defaults
    pub fn lock_timeout() -> u64 {
        2_000
    }
    pub fn min_token_length() -> usize {
        2
    }

    // Path defaults
    pub fn database() -> PathBuf {
        "data/sdssa_instructions.db".into()
    }
    pub fn index_dir() -> PathBuf {
        "indexdir".into()
    }
    pub fn lexicon() -> PathBuf {
        "data/lexicon.json".into()
    }
}
