use crate::parser::{is_valid_feed_content, FeedParser, ParsedFeed};
use crate::traits::FeedFetch;
use crate::types::{AggregatorError, FeedSource, FetchConfig, FetchOutcome, Result, RetryPolicy};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

/// Linear schedule over a [`RetryPolicy`]: `base_delay * n` after the n-th
/// failed attempt, `None` once the attempt budget is spent.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl LinearBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }
}

impl Backoff for LinearBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        Some(self.policy.delay_after(self.attempt))
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Fetches and parses a single feed endpoint.
pub struct FeedClient {
    client: Client,
    config: FetchConfig,
}

impl FeedClient {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    /// Fetch `url` under the configured retry policy.
    ///
    /// Never returns an error: exhausted retries and permanent failures come
    /// back as an outcome without entries and with the cause attached.
    pub async fn fetch_feed(&self, name: &str, url: &str) -> FetchOutcome {
        let start_time = Instant::now();
        let policy = self.config.retry;
        let mut backoff = LinearBackoff::new(policy);
        let mut attempts = 0;

        loop {
            attempts += 1;
            if attempts > 1 {
                info!("Retrying {} (attempt {}/{})", name, attempts, policy.max_attempts);
            }

            match self.fetch_once(url).await {
                Ok((status, feed)) => {
                    let response_time_ms = start_time.elapsed().as_millis() as u64;
                    info!(
                        "Fetched {} ({}): {} entries in {}ms",
                        name,
                        feed.title.as_deref().unwrap_or("untitled"),
                        feed.entries.len(),
                        response_time_ms
                    );
                    return FetchOutcome {
                        entries: feed.entries,
                        feed_title: feed.title,
                        attempts,
                        http_status: Some(status),
                        response_time_ms,
                        error: None,
                    };
                }
                Err(e) if e.is_transient() => match backoff.next_backoff() {
                    Some(delay) => {
                        warn!(
                            "Attempt {} failed for {}, retrying in {:?}: {}",
                            attempts, name, delay, e
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!("Failed to fetch {} after {} attempts: {}", name, attempts, e);
                        return self.failed(attempts, start_time, None, e);
                    }
                },
                Err(e) => {
                    warn!("Giving up on {}: {}", name, e);
                    let status = match &e {
                        AggregatorError::HttpStatus { status } => Some(*status),
                        _ => None,
                    };
                    return self.failed(attempts, start_time, status, e);
                }
            }
        }
    }

    fn failed(
        &self,
        attempts: u32,
        start_time: Instant,
        http_status: Option<u16>,
        error: AggregatorError,
    ) -> FetchOutcome {
        FetchOutcome {
            http_status,
            response_time_ms: start_time.elapsed().as_millis() as u64,
            ..FetchOutcome::failed(attempts, error.to_string())
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<(u16, ParsedFeed)> {
        debug!("GET {}", url);
        let response = self.client.get(url).header(ACCEPT, FEED_ACCEPT).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let limit = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit {
                return Err(AggregatorError::FeedTooLarge {
                    size_mb: content_length as usize / (1024 * 1024),
                });
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let next_len = body.len() + chunk.len();
            if next_len > limit {
                return Err(AggregatorError::FeedTooLarge {
                    size_mb: next_len / (1024 * 1024),
                });
            }
            body.extend_from_slice(&chunk);
        }

        let parsed = FeedParser::parse_feed(&body).map_err(|e| {
            if is_valid_feed_content(&String::from_utf8_lossy(&body)) {
                e
            } else {
                AggregatorError::Parse("response is not a feed document".to_string())
            }
        })?;

        if parsed.entries.is_empty() {
            return Err(AggregatorError::EmptyFeed);
        }

        Ok((status.as_u16(), parsed))
    }
}

#[async_trait]
impl FeedFetch for FeedClient {
    async fn fetch(&self, source: &FeedSource) -> FetchOutcome {
        self.fetch_feed(&source.name, &source.url).await
    }
}
