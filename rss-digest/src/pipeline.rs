use crate::cache::FingerprintCache;
use crate::config::PipelineConfig;
use crate::coordinator::{Collected, FetchCoordinator};
use crate::fetcher::FeedClient;
use crate::ranker::Ranker;
use crate::traits::FeedFetch;
use crate::types::{FeedSource, Item, Result, SourceReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "items", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Ranked, capped items ready for rendering.
    Ranked(Vec<Item>),
    /// No source produced a single new item.
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub sources: Vec<SourceReport>,
    /// Items accepted before the total cap was applied.
    pub collected: usize,
    pub cache_entries: usize,
    /// Set when the fingerprint cache could not be written.
    pub cache_error: Option<String>,
}

impl RunReport {
    pub fn items(&self) -> &[Item] {
        match &self.outcome {
            RunOutcome::Ranked(items) => items,
            RunOutcome::Empty => &[],
        }
    }

    pub fn into_items(self) -> Vec<Item> {
        match self.outcome {
            RunOutcome::Ranked(items) => items,
            RunOutcome::Empty => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.outcome, RunOutcome::Empty)
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|r| r.failed())
    }
}

/// One full cycle: load the cache, fetch everything, rank, remember.
pub struct DigestPipeline<F> {
    sources: Vec<FeedSource>,
    config: PipelineConfig,
    coordinator: FetchCoordinator<F>,
}

impl DigestPipeline<FeedClient> {
    /// Pipeline backed by the HTTP feed client.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let client = FeedClient::new(config.settings.fetch_config())?;
        Ok(Self::new(config, client))
    }
}

impl<F: FeedFetch> DigestPipeline<F> {
    pub fn new(config: PipelineConfig, fetcher: F) -> Self {
        let sources = config.feed_sources();
        let coordinator = FetchCoordinator::new(fetcher, config.settings.clone());
        Self {
            sources,
            config,
            coordinator,
        }
    }

    pub async fn run(&self) -> RunReport {
        self.run_at(Utc::now()).await
    }

    /// Run one cycle with `now` as the reference instant for freshness,
    /// scoring and cache retention.
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunReport {
        let settings = &self.config.settings;
        info!("Starting digest run with {} sources", self.sources.len());

        let mut cache = FingerprintCache::load(&settings.cache_path, now);
        let Collected { items, reports } = self
            .coordinator
            .collect(&self.sources, cache.snapshot(), now)
            .await;
        let collected = items.len();
        let ranked = Ranker::new(settings.max_total_articles).rank(items.clone(), now);

        // Everything accepted is remembered, including items cut by the total cap
        let cache_error = match cache.record_and_persist(&items, now) {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    "Failed to save fingerprint cache {}: {}",
                    cache.path().display(),
                    e
                );
                Some(e.to_string())
            }
        };

        let outcome = if ranked.is_empty() {
            warn!("No new items from any source");
            RunOutcome::Empty
        } else {
            info!("Digest run produced {} items ({} collected)", ranked.len(), collected);
            RunOutcome::Ranked(ranked)
        };

        RunReport {
            started_at: now,
            outcome,
            sources: reports,
            collected,
            cache_entries: cache.len(),
            cache_error,
        }
    }
}
