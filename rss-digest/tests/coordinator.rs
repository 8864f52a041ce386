use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rss_digest::{
    EntryDate, FeedClient, FeedFetch, FeedSource, FetchConfig, FetchCoordinator, FetchOutcome,
    RawEntry, RetryPolicy, Settings,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

fn source(id: &str, url: &str, priority: u32) -> FeedSource {
    FeedSource {
        id: id.to_string(),
        name: format!("Source {id}"),
        url: url.to_string(),
        category: "business".to_string(),
        priority,
        hours_back_override: None,
    }
}

fn entry(title: &str, link: &str, published: DateTime<Utc>) -> RawEntry {
    RawEntry {
        title: Some(title.to_string()),
        link: Some(link.to_string()),
        summary: Some("summary".to_string()),
        published: Some(EntryDate::Parsed(published)),
        ..RawEntry::default()
    }
}

/// Serves canned entries per source id and tracks how many fetches overlap.
#[derive(Default)]
struct StaticFetcher {
    feeds: HashMap<String, Vec<RawEntry>>,
    delay_ms: u64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticFetcher {
    fn with_feed(mut self, id: &str, entries: Vec<RawEntry>) -> Self {
        self.feeds.insert(id.to_string(), entries);
        self
    }
}

#[async_trait]
impl FeedFetch for StaticFetcher {
    async fn fetch(&self, source: &FeedSource) -> FetchOutcome {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.feeds.get(&source.id) {
            Some(entries) => FetchOutcome {
                entries: entries.clone(),
                feed_title: Some(format!("{} feed", source.name)),
                attempts: 1,
                http_status: Some(200),
                response_time_ms: self.delay_ms,
                error: None,
            },
            None => FetchOutcome::failed(1, "HTTP status 404"),
        }
    }
}

fn rss_with_items(items: &[(&str, &str, DateTime<Utc>)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link, published)| {
            format!(
                "<item><title>{}</title><link>{}</link><description>d</description><pubDate>{}</pubDate></item>",
                title,
                link,
                published.to_rfc2822()
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>t</title><link>https://example.com</link><description>d</description>{}</channel></rss>"#,
        items
    )
}

#[tokio::test]
async fn one_slow_source_does_not_block_the_others() {
    init_tracing();
    let server = MockServer::start().await;
    let now = Utc::now();
    let fresh = now - Duration::hours(1);

    Mock::given(method("GET"))
        .and(path("/one"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            rss_with_items(&[("One", "https://one.example/1", fresh)]),
            "application/rss+xml",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/two"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(rss_with_items(&[]), "application/rss+xml")
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/three"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            rss_with_items(&[("Three", "https://three.example/3", fresh)]),
            "application/rss+xml",
        ))
        .mount(&server)
        .await;

    let client = FeedClient::new(FetchConfig {
        timeout: std::time::Duration::from_millis(100),
        retry: RetryPolicy::immediate(2),
        ..FetchConfig::default()
    })
    .unwrap();
    let coordinator = FetchCoordinator::new(client, Settings::default());
    let sources = vec![
        source("s1", &format!("{}/one", server.uri()), 1),
        source("s2", &format!("{}/two", server.uri()), 1),
        source("s3", &format!("{}/three", server.uri()), 1),
    ];

    let collected = coordinator
        .collect(&sources, Arc::new(HashSet::new()), now)
        .await;

    let mut titles: Vec<_> = collected.items.iter().map(|i| i.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["One", "Three"]);

    let failed: Vec<_> = collected
        .failed_sources()
        .map(|r| r.source_id.as_str())
        .collect();
    assert_eq!(failed, vec!["s2"]);
    let ids: Vec<_> = collected.reports.iter().map(|r| r.source_id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3"]);
}

#[tokio::test]
async fn concurrency_is_bounded() {
    init_tracing();
    let now = fixed_now();
    let mut fetcher = StaticFetcher {
        delay_ms: 20,
        ..StaticFetcher::default()
    };
    let mut sources = Vec::new();
    for i in 0..8 {
        let id = format!("s{i}");
        let link = format!("https://x.com/{i}");
        fetcher = fetcher.with_feed(&id, vec![entry(&id, &link, now)]);
        sources.push(source(&id, "https://x.com/feed", 3));
    }

    let settings = Settings {
        max_concurrency: 2,
        ..Settings::default()
    };
    let coordinator = FetchCoordinator::new(fetcher, settings);
    let collected = coordinator
        .collect(&sources, Arc::new(HashSet::new()), now)
        .await;

    assert_eq!(collected.items.len(), 8);
    assert_eq!(coordinator.fetcher().max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn per_source_cap_limits_scan_and_output() {
    init_tracing();
    let now = fixed_now();
    let stale = now - Duration::days(5);

    let busy: Vec<_> = (0..6)
        .map(|i| entry(&format!("busy {i}"), &format!("https://busy.com/{i}"), now))
        .collect();
    // three stale entries up front use up most of the 2 * cap scan budget
    let mostly_stale = vec![
        entry("stale 0", "https://stale.com/0", stale),
        entry("stale 1", "https://stale.com/1", stale),
        entry("stale 2", "https://stale.com/2", stale),
        entry("fresh 3", "https://stale.com/3", now),
        entry("fresh 4", "https://stale.com/4", now),
    ];

    let fetcher = StaticFetcher::default()
        .with_feed("busy", busy)
        .with_feed("stale", mostly_stale);
    let settings = Settings {
        max_articles_per_source: 2,
        ..Settings::default()
    };
    let coordinator = FetchCoordinator::new(fetcher, settings);
    let sources = vec![
        source("busy", "https://busy.com/feed", 3),
        source("stale", "https://stale.com/feed", 3),
    ];

    let collected = coordinator
        .collect(&sources, Arc::new(HashSet::new()), now)
        .await;

    let report = |id: &str| {
        collected
            .reports
            .iter()
            .find(|r| r.source_id == id)
            .cloned()
            .unwrap()
    };
    assert_eq!(report("busy").accepted, 2);
    assert_eq!(report("busy").entries_found, 6);
    assert_eq!(report("stale").accepted, 1);
    assert_eq!(collected.items.len(), 3);
}

#[tokio::test]
async fn duplicates_across_sources_keep_the_higher_priority_copy() {
    init_tracing();
    let now = fixed_now();
    let shared = || entry("Same story", "https://news.com/story", now);

    let fetcher = StaticFetcher::default()
        .with_feed("aggregator", vec![shared()])
        .with_feed("publisher", vec![shared()]);
    let coordinator = FetchCoordinator::new(fetcher, Settings::default());
    let sources = vec![
        source("aggregator", "https://agg.com/feed", 3),
        source("publisher", "https://news.com/feed", 1),
    ];

    let collected = coordinator
        .collect(&sources, Arc::new(HashSet::new()), now)
        .await;

    assert_eq!(collected.items.len(), 1);
    assert_eq!(collected.items[0].source_id, "publisher");

    let accepted: Vec<_> = collected
        .reports
        .iter()
        .map(|r| (r.source_id.as_str(), r.accepted))
        .collect();
    assert_eq!(accepted, vec![("aggregator", 0), ("publisher", 1)]);
}

#[tokio::test]
async fn known_fingerprints_are_skipped() {
    init_tracing();
    let now = fixed_now();
    let fetcher = StaticFetcher::default().with_feed(
        "a",
        vec![
            entry("Seen", "https://x.com/seen", now),
            entry("Unseen", "https://x.com/unseen", now),
        ],
    );
    let coordinator = FetchCoordinator::new(fetcher, Settings::default());
    let known: HashSet<String> = [rss_digest::fingerprint("Seen", "https://x.com/seen")]
        .into_iter()
        .collect();

    let collected = coordinator
        .collect(&[source("a", "https://x.com/feed", 1)], Arc::new(known), now)
        .await;

    assert_eq!(collected.items.len(), 1);
    assert_eq!(collected.items[0].title, "Unseen");
}

#[tokio::test]
async fn failing_source_is_reported_without_items() {
    init_tracing();
    let now = fixed_now();
    let fetcher =
        StaticFetcher::default().with_feed("ok", vec![entry("Fine", "https://x.com/ok", now)]);
    let coordinator = FetchCoordinator::new(fetcher, Settings::default());
    let sources = vec![
        source("broken", "https://x.com/broken", 1),
        source("ok", "https://x.com/feed", 1),
    ];

    let collected = coordinator
        .collect(&sources, Arc::new(HashSet::new()), now)
        .await;

    assert_eq!(collected.items.len(), 1);
    let broken = &collected.reports[0];
    assert_eq!(broken.source_id, "broken");
    assert_eq!(broken.accepted, 0);
    assert!(broken.error.as_deref().unwrap().contains("404"));
}
