use crate::rss_utils::url::is_valid_rss_url;
use crate::types::{AggregatorError, FeedSource, FetchConfig, Result, RetryPolicy};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Longest accepted freshness window, ten years.
pub const MAX_WINDOW_HOURS: u64 = 24 * 365 * 10;

/// Shape of one entry under `sources` in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub hours_back_override: Option<u64>,
}

fn default_category() -> String {
    "other".to_string()
}

fn default_priority() -> u32 {
    5
}

/// Global pipeline settings. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default freshness window in hours.
    pub hours_back: u64,
    pub hours_back_by_category: HashMap<String, u64>,
    pub max_articles_per_source: usize,
    pub max_total_articles: usize,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub max_concurrency: usize,
    pub summary_max_length: usize,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    pub cache_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let fetch = FetchConfig::default();
        Self {
            hours_back: 48,
            hours_back_by_category: HashMap::new(),
            max_articles_per_source: 5,
            max_total_articles: 40,
            retry_attempts: fetch.retry.max_attempts,
            retry_delay_secs: fetch.retry.base_delay.as_secs(),
            request_timeout_secs: fetch.timeout.as_secs(),
            user_agent: fetch.user_agent,
            max_concurrency: 5,
            summary_max_length: 500,
            max_feed_size_mb: fetch.max_feed_size_mb,
            max_redirects: fetch.max_redirects,
            cache_path: PathBuf::from("data/article_cache.json"),
        }
    }
}

impl Settings {
    /// Freshness window for `source`: category override, then the source's
    /// own override, then the global default.
    pub fn window_for(&self, source: &FeedSource) -> Duration {
        let hours = self
            .hours_back_by_category
            .get(&source.category)
            .copied()
            .or(source.hours_back_override)
            .unwrap_or(self.hours_back)
            .min(MAX_WINDOW_HOURS);
        Duration::hours(hours as i64)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            std::time::Duration::from_secs(self.retry_delay_secs),
        )
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout: std::time::Duration::from_secs(self.request_timeout_secs),
            retry: self.retry_policy(),
            max_feed_size_mb: self.max_feed_size_mb,
            max_redirects: self.max_redirects,
        }
    }
}

/// Everything one run needs: the sources and the settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub settings: Settings,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(AggregatorError::Config("no sources configured".to_string()));
        }
        for (id, source) in &self.sources {
            if !is_valid_rss_url(&source.url) {
                return Err(AggregatorError::Config(format!(
                    "source {} has an invalid url: {}",
                    id, source.url
                )));
            }
            if source.hours_back_override.is_some_and(|h| h > MAX_WINDOW_HOURS) {
                return Err(AggregatorError::Config(format!(
                    "source {} window exceeds {} hours",
                    id, MAX_WINDOW_HOURS
                )));
            }
        }
        if self.settings.hours_back > MAX_WINDOW_HOURS {
            return Err(AggregatorError::Config(format!(
                "hours_back {} exceeds {} hours",
                self.settings.hours_back, MAX_WINDOW_HOURS
            )));
        }
        for (category, hours) in &self.settings.hours_back_by_category {
            if *hours > MAX_WINDOW_HOURS {
                return Err(AggregatorError::Config(format!(
                    "window for category {} exceeds {} hours",
                    category, MAX_WINDOW_HOURS
                )));
            }
        }
        if self.settings.max_concurrency == 0 {
            return Err(AggregatorError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.settings.retry_attempts == 0 {
            return Err(AggregatorError::Config(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Sources in identifier order.
    pub fn feed_sources(&self) -> Vec<FeedSource> {
        self.sources
            .iter()
            .map(|(id, source)| FeedSource {
                id: id.clone(),
                name: source.name.clone(),
                url: source.url.clone(),
                category: source.category.clone(),
                priority: source.priority,
                hours_back_override: source.hours_back_override,
            })
            .collect()
    }
}
