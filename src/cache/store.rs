//! Persistent skip-list of memento URLs that failed playback

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use super::error::{CacheError, Result};
use super::pruning::{prune_expired, PruneStats};

/// Canonical on-disk timestamp layout
pub const CACHE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Memento URLs that recently failed playback, with their last failure time
///
/// Shared by every worker; inserts from concurrent workers are last-write-wins.
#[derive(Debug)]
pub struct UnplaybackableCache {
    path: Option<PathBuf>,
    ttl: Duration,
    entries: DashMap<String, DateTime<Utc>>,
}

impl UnplaybackableCache {
    /// Cache that is never read from or written to disk
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            path: None,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Load from `path`; a missing file is an empty cache
    ///
    /// Entries are loaded as-is; expiry only happens on save.
    pub fn load(path: Option<&Path>, ttl: Duration) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::in_memory(ttl));
        };

        let mut cache = Self::in_memory(ttl);
        cache.path = Some(path.to_path_buf());

        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No skip-cache file yet");
                return Ok(cache);
            }
            Err(e) => return Err(e.into()),
        };

        let stored: BTreeMap<String, String> =
            serde_json::from_slice(&raw).map_err(|source| CacheError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        for (url, value) in stored {
            let failed_at = parse_timestamp(&value).ok_or_else(|| CacheError::InvalidTimestamp {
                url: url.clone(),
                value: value.clone(),
            })?;
            cache.entries.insert(url, failed_at);
        }

        info!(path = %path.display(), entries = cache.entries.len(), "Loaded skip-cache");
        Ok(cache)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Record a playback failure
    pub fn mark(&self, url: &str, failed_at: DateTime<Utc>) {
        self.entries.insert(url.to_string(), failed_at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expire old entries and write the rest; no-op without a path
    pub fn save(&self, now: DateTime<Utc>) -> Result<Option<PruneStats>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        let stats = prune_expired(&self.entries, now, self.ttl);
        let snapshot: BTreeMap<String, String> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), format_timestamp(entry.value())))
            .collect();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // Write beside the target, then swap it in
        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);
        std::fs::write(&tmp_path, serde_json::to_vec(&snapshot)?)?;
        std::fs::rename(&tmp_path, path)?;

        info!(
            path = %path.display(),
            kept = stats.kept,
            pruned = stats.pruned,
            "Saved skip-cache"
        );
        Ok(Some(stats))
    }
}

pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format(CACHE_TIMESTAMP_FORMAT).to_string()
}

/// Canonical form first, then any RFC 3339 timestamp
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, CACHE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::TempDir;

    const WEEK: Duration = Duration::from_secs(7 * 86_400);

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = UnplaybackableCache::load(Some(&dir.path().join("none.json")), WEEK).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"[not, a, mapping").unwrap();

        let result = UnplaybackableCache::load(Some(&path), WEEK);
        assert!(matches!(result, Err(CacheError::Malformed { .. })));
    }

    #[test]
    fn test_save_prunes_and_normalizes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("unplaybackable.json");
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 30, 45).unwrap();

        let cache = UnplaybackableCache::load(Some(&path), WEEK).unwrap();
        cache.mark("https://web.archive.org/web/1id_/old", now - ChronoDuration::days(8));
        cache.mark(
            "https://web.archive.org/web/2id_/recent",
            now - ChronoDuration::days(1) + ChronoDuration::milliseconds(250),
        );

        let stats = cache.save(now).unwrap().unwrap();
        assert_eq!(stats, PruneStats { kept: 1, pruned: 1 });

        let written: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(
            written["https://web.archive.org/web/2id_/recent"],
            "2024-03-09T12:30:45Z"
        );

        // And it loads back
        let reloaded = UnplaybackableCache::load(Some(&path), WEEK).unwrap();
        assert!(reloaded.contains("https://web.archive.org/web/2id_/recent"));
        assert!(!reloaded.contains("https://web.archive.org/web/1id_/old"));
    }

    #[test]
    fn test_load_keeps_expired_entries_until_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, br#"{"https://example.gov/": "2001-01-01T00:00:00Z"}"#).unwrap();

        let cache = UnplaybackableCache::load(Some(&path), WEEK).unwrap();
        assert!(cache.contains("https://example.gov/"));
    }

    #[test]
    fn test_save_without_path_is_noop() {
        let cache = UnplaybackableCache::in_memory(WEEK);
        cache.mark("https://example.gov/", Utc::now());
        assert!(cache.save(Utc::now()).unwrap().is_none());
    }
}
