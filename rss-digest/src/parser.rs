use crate::types::{AggregatorError, EntryDate, RawEntry, Result};
use chrono::Utc;
use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use tracing::debug;

/// Parsed feed document, reduced to what the pipeline consumes.
#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
}

pub struct FeedParser;

impl FeedParser {
    /// Parse an RSS 0.9x/1.0/2.0, Atom or JSON Feed document.
    pub fn parse_feed(content: &[u8]) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content)
            .map_err(|e| AggregatorError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let entries: Vec<RawEntry> = feed.entries.into_iter().map(Self::raw_entry).collect();

        debug!("Parsed feed with {} entries", entries.len());
        Ok(ParsedFeed { title, entries })
    }

    fn raw_entry(entry: Entry) -> RawEntry {
        let title = entry.title.map(|t| t.content);
        let link = primary_link(&entry.links).map(|l| l.href.clone());

        // RSS <description> lands in summary; Atom-only feeds may only carry content
        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body));

        RawEntry {
            title,
            link,
            summary,
            published: entry.published.map(|dt| EntryDate::Parsed(dt.with_timezone(&Utc))),
            updated: entry.updated.map(|dt| EntryDate::Parsed(dt.with_timezone(&Utc))),
            created: None,
        }
    }
}

/// The alternate link if the entry marks one, otherwise the first link.
fn primary_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| links.first())
}

pub fn is_valid_feed_content(content: &str) -> bool {
    // Basic validation to check if content might be a valid RSS/Atom feed
    let content_lower = content.to_lowercase();

    content_lower.contains("<rss")
        || content_lower.contains("<feed")
        || content_lower.contains("<rdf:rdf")
        || content_lower.contains("<channel")
}
