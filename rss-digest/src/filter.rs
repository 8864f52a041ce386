use crate::cache::fingerprint;
use crate::rss_utils::feed::{clean_summary, normalize_whitespace};
use crate::rss_utils::time::parse_feed_date;
use crate::rss_utils::url::canonical_link;
use crate::types::{EntryDate, FeedSource, Item, RawEntry};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::fmt;

/// Age assigned to undated entries from high priority sources.
pub const UNDATED_AGE_HOURS: i64 = 12;

pub const DEFAULT_SUMMARY_LENGTH: usize = 500;

/// Why an entry did not become an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    Stale,
    Undated,
    InvalidLink,
    Duplicate,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::Stale => "older than freshness window",
            Rejection::Undated => "undated entry from low priority source",
            Rejection::InvalidLink => "invalid link",
            Rejection::Duplicate => "already seen",
        };
        f.write_str(reason)
    }
}

/// First parseable of published, updated, created.
pub fn publication_date(entry: &RawEntry) -> Option<DateTime<Utc>> {
    [&entry.published, &entry.updated, &entry.created]
        .into_iter()
        .flatten()
        .find_map(|date| match date {
            EntryDate::Parsed(dt) => Some(*dt),
            EntryDate::Text(text) => parse_feed_date(text),
        })
}

/// Turns raw entries of one source into items.
///
/// Holds the fingerprints it already produced, so an entry listed twice in
/// the same feed yields one item.
pub struct ItemFilter<'a> {
    source: &'a FeedSource,
    known: &'a HashSet<String>,
    seen: HashSet<String>,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
    summary_max_length: usize,
}

impl<'a> ItemFilter<'a> {
    pub fn new(
        source: &'a FeedSource,
        known: &'a HashSet<String>,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            known,
            seen: HashSet::new(),
            now,
            cutoff: now
                .checked_sub_signed(window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            summary_max_length: DEFAULT_SUMMARY_LENGTH,
        }
    }

    pub fn with_summary_length(mut self, max_chars: usize) -> Self {
        self.summary_max_length = max_chars;
        self
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub fn accept(&mut self, entry: RawEntry) -> Result<Item, Rejection> {
        let published = match publication_date(&entry) {
            Some(date) if date < self.cutoff => return Err(Rejection::Stale),
            Some(date) => date,
            None if self.source.is_high_priority() => {
                self.now - Duration::hours(UNDATED_AGE_HOURS)
            }
            None => return Err(Rejection::Undated),
        };

        let link = entry
            .link
            .as_deref()
            .and_then(canonical_link)
            .ok_or(Rejection::InvalidLink)?;

        let summary = clean_summary(
            entry.summary.as_deref().unwrap_or_default(),
            self.summary_max_length,
        );

        let raw_title = entry.title.as_deref().unwrap_or_default();
        let fingerprint = fingerprint(raw_title, &link);
        if self.known.contains(&fingerprint) || !self.seen.insert(fingerprint.clone()) {
            return Err(Rejection::Duplicate);
        }

        let title = match normalize_whitespace(raw_title) {
            t if t.is_empty() => "Untitled".to_string(),
            t => t,
        };

        Ok(Item {
            fingerprint,
            title,
            link,
            summary,
            published,
            source_id: self.source.id.clone(),
            source_name: self.source.name.clone(),
            category: self.source.category.clone(),
            priority: self.source.priority,
        })
    }
}
