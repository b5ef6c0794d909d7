//! User-registered locations: a city name mapped to an OpenWeather city id
//! and, optionally, an IANA timezone.
//!
//! Stored as a single JSON object keyed by canonical city name:
//!
//! ```json
//! { "London": { "id": 2643743, "timezone": "Europe/London" } }
//! ```

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, WeatherError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEntry {
    pub name: String,
    pub provider_id: u64,
    /// Empty until set.
    pub timezone: String,
}

impl LocationEntry {
    pub fn timezone(&self) -> Option<&str> {
        (!self.timezone.is_empty()).then_some(self.timezone.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredLocation {
    id: u64,
    #[serde(default)]
    timezone: String,
}

#[derive(Debug, Clone)]
pub struct LocationDirectory {
    path: PathBuf,
    entries: BTreeMap<String, StoredLocation>,
}

impl LocationDirectory {
    /// Empty directory that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), entries: BTreeMap::new() }
    }

    /// Load the directory from disk. A missing or blank file yields an empty directory.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = Self::load_all(&path)?;
        let mut dir = Self::empty(path);
        for entry in entries {
            dir.insert(entry);
        }
        Ok(dir)
    }

    /// Read every entry stored at `path`.
    pub fn load_all(path: &Path) -> Result<Vec<LocationEntry>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No location directory yet, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(WeatherError::storage(path, e)),
        };

        if contents.trim().is_empty() {
            info!(path = %path.display(), "Location directory is empty");
            return Ok(Vec::new());
        }

        let stored: BTreeMap<String, StoredLocation> = serde_json::from_str(&contents)?;

        Ok(stored
            .into_iter()
            .map(|(name, loc)| LocationEntry {
                name: canonical_name(&name),
                provider_id: loc.id,
                timezone: loc.timezone,
            })
            .collect())
    }

    /// Write `entries` to `path`, replacing whatever was stored there.
    pub fn persist_all(path: &Path, entries: &[LocationEntry]) -> Result<()> {
        let stored: BTreeMap<String, StoredLocation> = entries
            .iter()
            .map(|e| {
                (
                    canonical_name(&e.name),
                    StoredLocation { id: e.provider_id, timezone: e.timezone.clone() },
                )
            })
            .collect();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WeatherError::storage(parent, e))?;
        }

        let json = serde_json::to_string_pretty(&stored)?;
        fs::write(path, json).map_err(|e| WeatherError::storage(path, e))?;

        debug!(path = %path.display(), count = entries.len(), "Saved location directory");
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        Self::persist_all(&self.path, &self.list())
    }

    /// Case-insensitive lookup. `None` means the name is not registered.
    pub fn lookup(&self, name: &str) -> Option<LocationEntry> {
        let key = canonical_name(name);
        self.entries.get(&key).map(|loc| LocationEntry {
            name: key,
            provider_id: loc.id,
            timezone: loc.timezone.clone(),
        })
    }

    /// Register `name`, or overwrite the id and timezone of an existing registration.
    pub fn upsert(
        &mut self,
        name: &str,
        provider_id: u64,
        timezone: Option<&str>,
    ) -> LocationEntry {
        let entry = LocationEntry {
            name: canonical_name(name),
            provider_id,
            timezone: timezone.unwrap_or_default().to_string(),
        };
        self.insert(entry.clone());
        entry
    }

    pub fn list(&self) -> Vec<LocationEntry> {
        self.entries
            .iter()
            .map(|(name, loc)| LocationEntry {
                name: name.clone(),
                provider_id: loc.id,
                timezone: loc.timezone.clone(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, entry: LocationEntry) {
        self.entries.insert(
            canonical_name(&entry.name),
            StoredLocation { id: entry.provider_id, timezone: entry.timezone },
        );
    }
}

/// Title-case a location name: the first letter of every alphabetic run is
/// upper-cased and the rest lower-cased, so `"new york,us"` becomes
/// `"New York,Us"`.
///
/// Inputs that differ only in letter case map to the same name, for both
/// directory lookups and cache keys.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_is_alpha = false;

    for c in name.trim().chars() {
        if c.is_alphabetic() {
            if prev_is_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_alpha = true;
        } else {
            out.push(c);
            prev_is_alpha = false;
        }
    }

    out
}
