pub mod cache;
pub mod config;
pub mod coordinator;
pub mod fetcher;
pub mod filter;
pub mod parser;
pub mod pipeline;
pub mod ranker;
pub mod rss_utils;
pub mod traits;
pub mod types;

pub use cache::{fingerprint, CacheSnapshot, FingerprintCache};
pub use config::{PipelineConfig, Settings, SourceConfig};
pub use coordinator::{Collected, FetchCoordinator};
pub use fetcher::FeedClient;
pub use filter::{ItemFilter, Rejection};
pub use parser::FeedParser;
pub use pipeline::{DigestPipeline, RunOutcome, RunReport};
pub use ranker::Ranker;
pub use traits::FeedFetch;
pub use types::*;
