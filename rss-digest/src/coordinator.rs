use crate::cache::CacheSnapshot;
use crate::config::Settings;
use crate::filter::{ItemFilter, Rejection};
use crate::rss_utils::time::format_duration;
use crate::traits::FeedFetch;
use crate::types::{FeedSource, Item, SourceReport};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Merged result of one fetch round across all sources.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Accepted items, no particular order.
    pub items: Vec<Item>,
    /// One report per configured source, in identifier order.
    pub reports: Vec<SourceReport>,
}

impl Collected {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.reports.iter().filter(|r| r.failed())
    }
}

/// Runs fetch + filter for every source with bounded parallelism.
pub struct FetchCoordinator<F> {
    fetcher: F,
    settings: Settings,
}

impl<F: FeedFetch> FetchCoordinator<F> {
    pub fn new(fetcher: F, settings: Settings) -> Self {
        Self { fetcher, settings }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch and filter all `sources` against the `known` fingerprints.
    ///
    /// At most `max_concurrency` sources are in flight; the others wait for a
    /// free slot. A failing source contributes a report with its error and no
    /// items, and never disturbs the others.
    pub async fn collect(
        &self,
        sources: &[FeedSource],
        known: CacheSnapshot,
        now: DateTime<Utc>,
    ) -> Collected {
        let concurrency = self.settings.max_concurrency.max(1);
        info!(
            "Fetching {} sources with concurrency {}",
            sources.len(),
            concurrency
        );

        let mut results: Vec<(SourceReport, Vec<Item>)> = stream::iter(sources)
            .map(|source| {
                let known = known.clone();
                async move { self.collect_source(source, &known, now).await }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results.sort_by(|a, b| a.0.source_id.cmp(&b.0.source_id));

        let mut reports = Vec::with_capacity(results.len());
        let mut items = Vec::new();
        for (report, source_items) in results {
            items.extend(source_items);
            reports.push(report);
        }

        let total = items.len();
        let items = dedup_across_sources(items);
        if items.len() < total {
            debug!(
                "Dropped {} items already collected from another source",
                total - items.len()
            );
        }

        let mut kept: HashMap<&str, usize> = HashMap::new();
        for item in &items {
            *kept.entry(item.source_id.as_str()).or_default() += 1;
        }
        for report in &mut reports {
            report.accepted = kept.get(report.source_id.as_str()).copied().unwrap_or(0);
            if report.accepted == 0 {
                match &report.error {
                    Some(error) => warn!("{} returned no items: {}", report.source_name, error),
                    None => info!("{} returned no new items", report.source_name),
                }
            }
        }

        let failed = reports.iter().filter(|r| r.failed()).count();
        info!(
            "Collected {} items from {} sources ({} failed)",
            items.len(),
            reports.len(),
            failed
        );

        Collected { items, reports }
    }

    async fn collect_source(
        &self,
        source: &FeedSource,
        known: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> (SourceReport, Vec<Item>) {
        let outcome = self.fetcher.fetch(source).await;
        let mut report = SourceReport {
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            entries_found: outcome.entries.len(),
            accepted: 0,
            error: outcome.error.clone(),
        };
        if !outcome.success() {
            return (report, Vec::new());
        }

        let cap = self.settings.max_articles_per_source;
        let window = self.settings.window_for(source);
        let mut filter = ItemFilter::new(source, known, window, now)
            .with_summary_length(self.settings.summary_max_length);
        debug!(
            "Filtering {} with a {} window (cutoff {})",
            source.name,
            format_duration(window),
            filter.cutoff()
        );

        let mut items = Vec::new();
        let mut rejected: HashMap<Rejection, usize> = HashMap::new();
        for entry in outcome.entries.into_iter().take(cap.saturating_mul(2)) {
            if items.len() >= cap {
                break;
            }
            match filter.accept(entry) {
                Ok(item) => items.push(item),
                Err(reason) => *rejected.entry(reason).or_default() += 1,
            }
        }

        for (reason, count) in &rejected {
            debug!("{}: skipped {} entries ({})", source.name, count, reason);
        }
        info!("Got {} new items from {}", items.len(), source.name);

        report.accepted = items.len();
        (report, items)
    }
}

/// Keep one item per fingerprint; the better ranked source wins, then the
/// lower source identifier.
fn dedup_across_sources(items: Vec<Item>) -> Vec<Item> {
    let mut best: HashMap<String, Item> = HashMap::with_capacity(items.len());
    let mut order = Vec::with_capacity(items.len());

    for item in items {
        match best.get(&item.fingerprint) {
            None => {
                order.push(item.fingerprint.clone());
                best.insert(item.fingerprint.clone(), item);
            }
            Some(current) => {
                let incoming = (item.priority, item.source_id.as_str());
                let existing = (current.priority, current.source_id.as_str());
                if incoming < existing {
                    best.insert(item.fingerprint.clone(), item);
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|fingerprint| best.remove(&fingerprint))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(fingerprint: &str, source_id: &str, priority: u32) -> Item {
        Item {
            fingerprint: fingerprint.to_string(),
            title: fingerprint.to_string(),
            link: format!("https://x.com/{fingerprint}"),
            summary: String::new(),
            published: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
            source_id: source_id.to_string(),
            source_name: source_id.to_uppercase(),
            category: "blog".to_string(),
            priority,
        }
    }

    #[test]
    fn cross_source_duplicates_keep_best_source() {
        let items = vec![
            item("f1", "c", 3),
            item("f2", "c", 3),
            item("f1", "b", 1),
            item("f1", "a", 1),
        ];
        let kept = dedup_across_sources(items);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].fingerprint, "f1");
        assert_eq!(kept[0].source_id, "a");
        assert_eq!(kept[1].fingerprint, "f2");
    }
}
