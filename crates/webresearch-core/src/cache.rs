//! Report cache: one JSON file per query, named by the md5 of the
//! lower-cased, trimmed query.
//!
//! Expiry is checked on lookup only; expired files stay on disk until
//! [`DiskCache::purge_expired`] is called.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::WebResearchError;
use crate::config::CacheConfig;
use crate::metrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query: String,
    /// Unix seconds at write time.
    pub timestamp: f64,
    /// Seconds the original research run took.
    pub duration: f64,
    pub report: String,
}

/// Lower-case hex md5 of the trimmed, lower-cased query.
pub fn cache_key(query: &str) -> String {
    hex::encode(Md5::digest(query.trim().to_lowercase().as_bytes()))
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    enabled: bool,
    default_ttl: Duration,
    news_ttl: Duration,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, default_ttl: Duration, news_ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            enabled: true,
            default_ttl,
            news_ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            enabled: config.enabled,
            default_ttl: Duration::from_secs(config.default_ttl_hours.saturating_mul(3_600)),
            news_ttl: Duration::from_secs(config.news_ttl_hours.saturating_mul(3_600)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path_for(&self, query: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(query)))
    }

    /// Queries mentioning news go stale quickly.
    pub fn ttl_for(&self, query: &str) -> Duration {
        if query.to_lowercase().contains("news") {
            self.news_ttl
        } else {
            self.default_ttl
        }
    }

    pub fn get(&self, query: &str) -> Option<CacheEntry> {
        self.get_at(query, SystemTime::now())
    }

    /// Look up a report as of `now`. Missing, expired, unreadable and corrupt
    /// files are all misses.
    pub fn get_at(&self, query: &str, now: SystemTime) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }

        let path = self.path_for(query);
        let entry = match read_entry(&path) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                return None;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable cache entry");
                metrics::record_cache_lookup("corrupt");
                return None;
            }
        };

        if is_fresh(&entry, self.ttl_for(query), now) {
            debug!(path = %path.display(), "cache hit");
            metrics::record_cache_lookup("hit");
            Some(entry)
        } else {
            debug!(path = %path.display(), "cache entry expired");
            metrics::record_cache_lookup("expired");
            None
        }
    }

    pub fn put(&self, query: &str, report: &str, duration: Duration) -> Result<(), WebResearchError> {
        self.put_at(query, report, duration, SystemTime::now())
    }

    /// Write an entry through a temp file in the cache directory followed by a
    /// rename, so readers never observe a partial file.
    pub fn put_at(
        &self,
        query: &str,
        report: &str,
        duration: Duration,
        now: SystemTime,
    ) -> Result<(), WebResearchError> {
        if !self.enabled {
            return Ok(());
        }

        fs::create_dir_all(&self.dir)
            .map_err(|err| WebResearchError::cache_io(self.dir.clone(), err))?;

        let entry = CacheEntry {
            query: query.to_string(),
            timestamp: unix_seconds(now),
            duration: duration.as_secs_f64(),
            report: report.to_string(),
        };
        let payload = serde_json::to_vec_pretty(&entry).map_err(anyhow::Error::from)?;

        let path = self.path_for(query);
        let mut staged = NamedTempFile::new_in(&self.dir)
            .map_err(|err| WebResearchError::cache_io(self.dir.clone(), err))?;
        staged
            .write_all(&payload)
            .map_err(|err| WebResearchError::cache_io(staged.path().to_path_buf(), err))?;
        staged
            .persist(&path)
            .map_err(|err| WebResearchError::cache_io(path.clone(), err.error))?;

        debug!(path = %path.display(), "cached report");
        Ok(())
    }

    pub fn purge_expired(&self) -> Result<usize, WebResearchError> {
        self.purge_expired_at(SystemTime::now())
    }

    /// Remove entries past their own expiry plus any file that no longer
    /// parses. Returns the number of files removed.
    pub fn purge_expired_at(&self, now: SystemTime) -> Result<usize, WebResearchError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let listing =
            fs::read_dir(&self.dir).map_err(|err| WebResearchError::cache_io(self.dir.clone(), err))?;

        let mut removed = 0;
        for item in listing {
            let item = item.map_err(|err| WebResearchError::cache_io(self.dir.clone(), err))?;
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let stale = match read_entry(&path) {
                Ok(Some(entry)) => !is_fresh(&entry, self.ttl_for(&entry.query), now),
                Ok(None) => false,
                Err(_) => true,
            };
            if stale {
                fs::remove_file(&path).map_err(|err| WebResearchError::cache_io(path.clone(), err))?;
                removed += 1;
            }
        }

        debug!(removed, dir = %self.dir.display(), "purged expired cache entries");
        Ok(removed)
    }
}

fn read_entry(path: &Path) -> anyhow::Result<Option<CacheEntry>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_slice(&raw)?))
}

fn is_fresh(entry: &CacheEntry, ttl: Duration, now: SystemTime) -> bool {
    unix_seconds(now) - entry.timestamp < ttl.as_secs_f64()
}

fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3_600);

    fn cache(dir: &TempDir) -> DiskCache {
        DiskCache::new(dir.path(), 24 * HOUR, HOUR)
    }

    #[test]
    fn key_is_md5_of_normalized_query() {
        assert_eq!(
            cache_key("What is machine learning?"),
            "0c9fdf1c9bd767b44887ab8491c4b9c0"
        );
        assert_eq!(cache_key("  WHAT IS MACHINE LEARNING?  "), cache_key("what is machine learning?"));
    }

    #[test]
    fn round_trip_within_window() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache
            .put("Rust ownership", "# Ownership\nMoves and borrows [1]", Duration::from_millis(2_500))
            .unwrap();

        let entry = cache.get("rust ownership").expect("cached entry");
        assert_eq!(entry.report, "# Ownership\nMoves and borrows [1]");
        assert_eq!(entry.query, "Rust ownership");
        assert!((entry.duration - 2.5).abs() < f64::EPSILON);
        assert!(cache.path_for("Rust ownership").exists());
    }

    #[test]
    fn news_queries_expire_after_an_hour() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let written = SystemTime::now();
        cache.put_at("tech news today", "report", Duration::ZERO, written).unwrap();

        assert!(cache.get_at("tech news today", written + HOUR - Duration::from_secs(1)).is_some());
        assert!(cache.get_at("tech news today", written + HOUR + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn other_queries_expire_after_a_day() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let written = SystemTime::now();
        cache.put_at("rust traits", "report", Duration::ZERO, written).unwrap();

        assert!(cache.get_at("rust traits", written + 2 * HOUR).is_some());
        assert!(cache.get_at("rust traits", written + 24 * HOUR + Duration::from_secs(1)).is_none());
        // Expired entries stay on disk until purged.
        assert!(cache.path_for("rust traits").exists());
    }

    #[test]
    fn corrupt_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        std::fs::write(cache.path_for("broken"), b"{not json").unwrap();
        assert!(cache.get("broken").is_none());
    }

    #[test]
    fn purge_removes_expired_and_corrupt_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let written = SystemTime::now();
        cache.put_at("fresh topic", "keep", Duration::ZERO, written).unwrap();
        cache.put_at("market news", "drop", Duration::ZERO, written).unwrap();
        std::fs::write(cache.path_for("broken"), b"garbage").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();

        let removed = cache.purge_expired_at(written + 2 * HOUR).unwrap();
        assert_eq!(removed, 2);
        assert!(cache.path_for("fresh topic").exists());
        assert!(!cache.path_for("market news").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn disabled_cache_never_reads_or_writes() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            enabled: false,
            dir: dir.path().to_path_buf(),
            ..CacheConfig::default()
        };
        let cache = DiskCache::from_config(&config);
        cache.put("anything", "report", Duration::ZERO).unwrap();
        assert!(!cache.path_for("anything").exists());
        assert!(cache.get("anything").is_none());
    }
}
