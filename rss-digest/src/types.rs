use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One configured feed endpoint. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: String,
    pub name: String,
    pub url: String,
    pub category: String,
    /// Lower is more important.
    pub priority: u32,
    /// Source-specific freshness window in hours.
    pub hours_back_override: Option<u64>,
}

impl FeedSource {
    /// Undated entries from high priority sources are kept with a synthetic date.
    pub fn is_high_priority(&self) -> bool {
        self.priority <= 2
    }
}

/// A timestamp as found in a feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDate {
    /// Already understood by the feed parser.
    Parsed(DateTime<Utc>),
    /// Raw text that may or may not be a valid date.
    Text(String),
}

/// Parser output for one feed item, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub published: Option<EntryDate>,
    pub updated: Option<EntryDate>,
    pub created: Option<EntryDate>,
}

/// A validated item, the unit handed to ranking and to downstream renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub fingerprint: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: DateTime<Utc>,
    pub source_id: String,
    pub source_name: String,
    pub category: String,
    pub priority: u32,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "rss-digest/0.1 (feed digest bot)".to_string(),
            timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

/// How often and how patiently a feed request is retried.
///
/// The delay before attempt `n + 1` is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Same attempt budget without any sleeping in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// What a single fetch of one source produced.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub entries: Vec<RawEntry>,
    /// Channel title of the parsed document.
    pub feed_title: Option<String>,
    pub attempts: u32,
    pub http_status: Option<u16>,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn failed(attempts: u32, error: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            feed_title: None,
            attempts,
            http_status: None,
            response_time_ms: 0,
            error: Some(error.into()),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-source diagnostics collected by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub source_name: String,
    pub entries_found: usize,
    /// Items this source contributes after cross-source dedup.
    pub accepted: usize,
    pub error: Option<String>,
}

impl SourceReport {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Feed contained no entries")]
    EmptyFeed,

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AggregatorError {
    /// Timeouts and connection-level failures are worth another attempt.
    /// Everything the server or the document itself told us is final.
    pub fn is_transient(&self) -> bool {
        match self {
            AggregatorError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
