use crate::rss_utils::feed::{normalize_whitespace, truncate_chars};
use crate::types::{Item, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// How long a fingerprint suppresses an item after it was first emitted.
pub const RETENTION_DAYS: i64 = 7;

const TITLE_CHARS: usize = 100;

/// Deterministic identity of an item across runs.
///
/// Only the normalized title and link take part, so an edited summary does not
/// resurface an item while a changed link does.
pub fn fingerprint(title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_whitespace(title).as_bytes());
    hasher.update(link.trim().as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub first_seen: DateTime<Utc>,
    pub title: String,
}

/// Read-only view of the known fingerprints, shared by all fetch tasks.
pub type CacheSnapshot = Arc<HashSet<String>>;

/// Persistent record of items already handed downstream.
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl FingerprintCache {
    /// Load persisted entries, dropping everything outside the retention window.
    ///
    /// Never fails: a missing or unreadable file is a cold start.
    pub fn load(path: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                debug!("No fingerprint cache at {}, starting cold", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                warn!("Failed to load fingerprint cache {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        let mut cache = Self { path, entries };
        let evicted = cache.evict_expired(now);
        info!(
            "Loaded fingerprint cache with {} entries ({} expired)",
            cache.entries.len(),
            evicted
        );
        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.entries.contains_key(fingerprint)
    }

    pub fn get(&self, fingerprint: &str) -> Option<&CacheEntry> {
        self.entries.get(fingerprint)
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        Arc::new(self.entries.keys().cloned().collect())
    }

    /// Merge accepted items into the cache and write it back.
    ///
    /// An existing entry keeps its first-seen instant, so recording the same
    /// items twice leaves the cache unchanged. The in-memory state is updated
    /// even when writing fails.
    pub fn record_and_persist(&mut self, items: &[Item], now: DateTime<Utc>) -> Result<()> {
        let mut added = 0usize;
        for item in items {
            self.entries
                .entry(item.fingerprint.clone())
                .or_insert_with(|| {
                    added += 1;
                    CacheEntry {
                        first_seen: now,
                        title: truncate_chars(&item.title, TITLE_CHARS),
                    }
                });
        }
        self.evict_expired(now);

        debug!(
            "Recorded {} new fingerprints, writing {} entries to {}",
            added,
            self.entries.len(),
            self.path.display()
        );
        self.persist()
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.first_seen > cutoff);
        before - self.entries.len()
    }

    fn persist(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Option<BTreeMap<String, CacheEntry>>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&contents)?))
}
