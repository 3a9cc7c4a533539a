//! File-backed TTL cache for finished sentiment reports.
//!
//! One JSON file per entry under the cache directory, named by a stable
//! SHA-256 key over (symbol, entry type, parameters). Expiry is evaluated at
//! read time; `sweep_expired` exists for explicit housekeeping but nothing
//! depends on it running.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// What a cache entry stores alongside the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub symbol: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub data: Value,
    /// Human-readable creation time, `%Y-%m-%d %H:%M:%S`.
    pub created_at: String,
    /// Machine creation time, RFC3339; expiry is computed from this.
    pub timestamp: DateTime<Local>,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    pub total_bytes: u64,
}

pub struct SentimentCache {
    dir: PathBuf,
    ttl: Duration,
}

impl SentimentCache {
    pub fn new(dir: impl Into<PathBuf>, ttl_secs: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
        Ok(Self {
            dir,
            ttl: Duration::seconds(ttl_secs as i64),
        })
    }

    /// Stable key: SHA-256 over the canonical JSON of the identifying fields.
    /// `BTreeMap` keeps parameter order deterministic.
    pub fn key(symbol: &str, entry_type: &str, params: &BTreeMap<String, String>) -> String {
        #[derive(Serialize)]
        struct KeyMaterial<'a> {
            symbol: &'a str,
            entry_type: &'a str,
            params: &'a BTreeMap<String, String>,
        }
        let canonical = serde_json::to_string(&KeyMaterial {
            symbol,
            entry_type,
            params,
        })
        .expect("key material serializes");
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Fetch a live entry; expired entries are deleted on the spot and
    /// reported as a miss.
    pub fn get(
        &self,
        symbol: &str,
        entry_type: &str,
        params: &BTreeMap<String, String>,
    ) -> Option<CacheRecord> {
        let key = Self::key(symbol, entry_type, params);
        let path = self.path_for(&key);
        let raw = fs::read_to_string(&path).ok()?;
        let record: CacheRecord = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache entry, removing");
                let _ = fs::remove_file(&path);
                return None;
            }
        };
        if self.is_expired(&record) {
            debug!(symbol, entry_type, "cache entry expired");
            let _ = fs::remove_file(&path);
            return None;
        }
        debug!(symbol, entry_type, "cache hit");
        Some(record)
    }

    /// Write-through: serialize to a temp file in the same directory, then
    /// rename over the final path so readers never see a partial entry.
    pub fn set(
        &self,
        symbol: &str,
        entry_type: &str,
        params: &BTreeMap<String, String>,
        data: Value,
    ) -> Result<()> {
        let now = Local::now();
        let record = CacheRecord {
            symbol: symbol.to_string(),
            entry_type: entry_type.to_string(),
            data,
            created_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            timestamp: now,
            params: params.clone(),
        };
        let key = Self::key(symbol, entry_type, params);
        let path = self.path_for(&key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));

        let body = serde_json::to_string_pretty(&record).context("serializing cache record")?;
        fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("renaming into {}", path.display()))?;
        debug!(symbol, entry_type, "cache entry written");
        Ok(())
    }

    pub fn delete(
        &self,
        symbol: &str,
        entry_type: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<bool> {
        let path = self.path_for(&Self::key(symbol, entry_type, params));
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("deleting {}", path.display())),
        }
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn sweep_expired(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in self.entries()? {
            let (path, record) = entry;
            match record {
                Some(r) if !self.is_expired(&r) => {}
                // Expired or unreadable both go.
                _ => {
                    if fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats {
            entries: 0,
            expired: 0,
            total_bytes: 0,
        };
        for (path, record) in self.entries()? {
            stats.entries += 1;
            stats.total_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match record {
                Some(r) if self.is_expired(&r) => stats.expired += 1,
                None => stats.expired += 1,
                _ => {}
            }
        }
        Ok(stats)
    }

    fn is_expired(&self, record: &CacheRecord) -> bool {
        Local::now() - record.timestamp > self.ttl
    }

    fn entries(&self) -> Result<Vec<(PathBuf, Option<CacheRecord>)>> {
        let mut out = Vec::new();
        let read = fs::read_dir(&self.dir)
            .with_context(|| format!("listing cache directory {}", self.dir.display()))?;
        for entry in read {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record = fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok());
            out.push((path, record));
        }
        Ok(out)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
