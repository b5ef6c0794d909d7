//! On-disk cache of raw OpenWeather responses.
//!
//! One JSON file per (location, query kind). The file's modification time is
//! the fetch timestamp.

use std::{fmt::Write as _, fs, io, path::PathBuf, time::SystemTime};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    directory::canonical_name,
    error::{Result, WeatherError},
    query::QueryKind,
};

/// OpenWeather asks free-tier callers not to poll more often than every 10 minutes.
pub const CACHE_TTL_SECS: i64 = 600;

pub fn cache_ttl() -> Duration {
    Duration::seconds(CACHE_TTL_SECS)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    location: String,
    kind: QueryKind,
}

impl CacheKey {
    /// Keyed on what the user typed (title-cased), never on a resolved provider id.
    pub fn new(location: &str, kind: QueryKind) -> Self {
        Self { location: canonical_name(location), kind }
    }

    /// File name for this key. Bytes outside `[A-Za-z0-9-]` are `%XX`-escaped
    /// so distinct locations never share a file.
    pub fn file_name(&self) -> String {
        let mut name = String::with_capacity(self.location.len() + 16);
        for b in self.location.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' {
                name.push(b as char);
            } else {
                let _ = write!(name, "%{b:02X}");
            }
        }
        name.push('.');
        name.push_str(self.kind.as_str());
        name.push_str(".json");
        name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Body text as it sits on disk.
    pub raw: String,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        is_fresh(self, now, ttl)
    }
}

/// An entry is fresh while `now - fetched_at <= ttl`.
pub fn is_fresh(entry: &CacheEntry, now: DateTime<Utc>, ttl: Duration) -> bool {
    entry.age(now) <= ttl
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Stored entry for the key, if any. Missing, empty and unreadable JSON
    /// files all count as a miss.
    pub fn get(&self, location: &str, kind: QueryKind) -> Result<Option<CacheEntry>> {
        let key = CacheKey::new(location, kind);
        let path = self.path_for(&key);

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Cache miss");
                return Ok(None);
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache file");
                return Ok(None);
            }
            Err(e) => return Err(WeatherError::storage(&path, e)),
        };

        if raw.trim().is_empty() {
            info!(path = %path.display(), "Ignoring empty cache file");
            return Ok(None);
        }

        let payload: Value = match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache file");
                return Ok(None);
            }
        };

        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| WeatherError::storage(&path, e))?;

        Ok(Some(CacheEntry { key, raw, payload, fetched_at: DateTime::<Utc>::from(modified) }))
    }

    /// Store `body` byte for byte under the key, replacing any previous entry,
    /// and stamp the file with `fetched_at`. The body must be valid JSON.
    pub fn put(
        &self,
        location: &str,
        kind: QueryKind,
        body: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        let payload: Value = serde_json::from_str(body)?;

        fs::create_dir_all(&self.dir).map_err(|e| WeatherError::storage(&self.dir, e))?;

        let key = CacheKey::new(location, kind);
        let path = self.path_for(&key);

        fs::write(&path, body).map_err(|e| WeatherError::storage(&path, e))?;

        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(SystemTime::from(fetched_at)))
            .map_err(|e| WeatherError::storage(&path, e))?;

        debug!(path = %path.display(), %fetched_at, "Cached response");

        Ok(CacheEntry { key, raw: body.to_string(), payload, fetched_at })
    }

    /// Remove the entry for the key. Returns whether anything was removed.
    pub fn invalidate(&self, location: &str, kind: QueryKind) -> Result<bool> {
        let path = self.path_for(&CacheKey::new(location, kind));

        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Removed cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WeatherError::storage(&path, e)),
        }
    }
}
