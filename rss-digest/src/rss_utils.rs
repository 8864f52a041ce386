//! RSS-specific utility functions for the digest pipeline

/// URL utilities for feed items
pub mod url {
    use url::Url;

    /// Validate an item link and return it trimmed.
    ///
    /// The link has to carry an explicit `http://` or `https://` prefix and
    /// parse into a URL with a non-empty host.
    pub fn canonical_link(link: &str) -> Option<String> {
        let link = link.trim();
        if !(link.starts_with("http://") || link.starts_with("https://")) {
            return None;
        }
        let parsed = Url::parse(link).ok()?;
        match parsed.host_str() {
            Some(host) if !host.is_empty() => Some(link.to_string()),
            _ => None,
        }
    }

    /// Validate RSS feed URL format
    pub fn is_valid_rss_url(url_str: &str) -> bool {
        if let Ok(url) = Url::parse(url_str) {
            url.scheme() == "http" || url.scheme() == "https"
        } else {
            false
        }
    }
}

/// Time utilities for feed entries
pub mod time {
    use chrono::{DateTime, Duration, Utc};

    /// Parse a textual feed date. RSS uses RFC 2822, Atom uses RFC 3339.
    pub fn parse_feed_date(text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc3339(text)
            .or_else(|_| DateTime::parse_from_rfc2822(text))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Fractional hours between two instants, negative when `then` is in the future.
    pub fn hours_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        now.signed_duration_since(then).num_milliseconds() as f64 / 3_600_000.0
    }

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.num_seconds();

        if total_seconds < 60 {
            format!("{}s", total_seconds)
        } else if total_seconds < 3600 {
            format!("{}m", total_seconds / 60)
        } else if total_seconds < 86400 {
            format!("{}h", total_seconds / 3600)
        } else {
            format!("{}d", total_seconds / 86400)
        }
    }
}

/// Feed text utilities
pub mod feed {
    /// Extract clean text content from HTML
    pub fn extract_text_from_html(html: &str) -> String {
        // Tags are dropped, entities are left alone
        html.chars()
            .fold((String::new(), false), |(mut text, in_tag), c| match c {
                '<' => (text, true),
                '>' => (text, false),
                _ if !in_tag => {
                    text.push(c);
                    (text, in_tag)
                }
                _ => (text, in_tag),
            })
            .0
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Plain-text summary capped at `max_chars` characters, `...` appended when cut.
    pub fn clean_summary(raw: &str, max_chars: usize) -> String {
        let text = extract_text_from_html(raw);
        if text.chars().count() <= max_chars {
            return text;
        }
        let mut truncated: String = text.chars().take(max_chars).collect();
        truncated.push_str("...");
        truncated
    }

    /// Trim and collapse inner whitespace.
    pub fn normalize_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// First `max_chars` characters, no marker.
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        text.chars().take(max_chars).collect()
    }
}
