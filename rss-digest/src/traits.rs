use crate::types::{FeedSource, FetchOutcome};
use async_trait::async_trait;

/// Trait for pulling raw entries for one configured source.
///
/// Implementations must not fail: every error is reported through
/// [`FetchOutcome::error`] so one source can never abort a run.
#[async_trait]
pub trait FeedFetch: Send + Sync {
    async fn fetch(&self, source: &FeedSource) -> FetchOutcome;
}
