//! Persistent cache of OCR results keyed by content hash
//!
//! Entries live in an embedded `sled` database. The cache never fails its
//! callers: when the database cannot be opened the cache runs disabled, and
//! individual read or write failures are logged and treated as misses.

use super::OcrResult;
use crate::error::{Result, ReaderError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use std::time::Duration;

/// Stored cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedOcr {
    /// Content hash of the article HTML
    pub id: String,
    /// Per-image results in image order
    pub results: Vec<OcrResult>,
    /// Time of the last write, in milliseconds since the Unix epoch
    pub updated_at: i64,
}

/// OCR result cache
///
/// Cloning is cheap and clones share the same database.
#[derive(Clone)]
pub struct OcrCache {
    db: Option<Db>,
}

impl std::fmt::Debug for OcrCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrCache")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl OcrCache {
    /// Open or create the cache database at `path`
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use wxreader::ocr::OcrCache;
    ///
    /// # fn main() -> wxreader::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let cache = OcrCache::new(dir.path().join("ocr_cache"))?;
    /// assert!(cache.get("missing").is_none());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ReaderError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db: Some(db) })
    }

    /// Open the cache, falling back to a disabled cache on failure
    pub fn open_or_disabled(path: impl AsRef<Path>) -> Self {
        match Self::new(path.as_ref()) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!("OCR cache unavailable, continuing without it: {}", e);
                Self::disabled()
            }
        }
    }

    /// A cache that stores nothing
    pub fn disabled() -> Self {
        Self { db: None }
    }

    /// Whether a database backs this cache
    pub fn is_enabled(&self) -> bool {
        self.db.is_some()
    }

    /// Cached results for `id`, if any
    pub fn get(&self, id: &str) -> Option<Vec<OcrResult>> {
        let db = self.db.as_ref()?;
        match self.read(db, id) {
            Ok(entry) => entry.map(|e| e.results),
            Err(e) => {
                tracing::warn!("OCR cache read failed for {}: {}", id, e);
                None
            }
        }
    }

    /// Store `results` under `id`, stamped with the current time
    pub fn set(&self, id: &str, results: &[OcrResult]) {
        self.set_at(id, results, Utc::now().timestamp_millis());
    }

    pub(crate) fn set_at(&self, id: &str, results: &[OcrResult], updated_at: i64) {
        let Some(db) = self.db.as_ref() else {
            return;
        };
        let entry = CachedOcr {
            id: id.to_string(),
            results: results.to_vec(),
            updated_at,
        };
        if let Err(e) = Self::write(db, &entry) {
            tracing::warn!("OCR cache write failed for {}: {}", id, e);
        }
    }

    /// Remove entries last written more than `max_age` ago
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        self.cleanup_at(Utc::now().timestamp_millis(), max_age)
    }

    pub(crate) fn cleanup_at(&self, now_millis: i64, max_age: Duration) -> usize {
        let Some(db) = self.db.as_ref() else {
            return 0;
        };
        let max_age_millis = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let mut removed = 0;

        for item in db.iter() {
            let (key, value) = match item {
                Ok(kv) => kv,
                Err(e) => {
                    tracing::warn!("OCR cache cleanup iteration failed: {}", e);
                    break;
                }
            };
            let stale = match serde_json::from_slice::<CachedOcr>(&value) {
                Ok(entry) => now_millis.saturating_sub(entry.updated_at) > max_age_millis,
                // Unreadable entries can never be served, drop them too.
                Err(_) => true,
            };
            if stale {
                match db.remove(&key) {
                    Ok(_) => removed += 1,
                    Err(e) => tracing::warn!("OCR cache cleanup remove failed: {}", e),
                }
            }
        }

        if let Err(e) = db.flush() {
            tracing::warn!("OCR cache flush failed: {}", e);
        }
        tracing::debug!("OCR cache cleanup removed {} entries", removed);
        removed
    }

    /// Remove every entry
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let Some(db) = self.db.as_ref() else {
            return 0;
        };
        let count = db.len();
        if let Err(e) = db.clear().and_then(|_| db.flush().map(|_| ())) {
            tracing::warn!("OCR cache clear failed: {}", e);
            return 0;
        }
        count
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.db.as_ref().map(|db| db.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, db: &Db, id: &str) -> Result<Option<CachedOcr>> {
        match db
            .get(id.as_bytes())
            .map_err(|e| ReaderError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let entry = serde_json::from_slice(&bytes)
                    .map_err(|e| ReaderError::Storage(format!("Deserialization failed: {}", e)))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn write(db: &Db, entry: &CachedOcr) -> Result<()> {
        let value = serde_json::to_vec(entry)
            .map_err(|e| ReaderError::Storage(format!("Serialization failed: {}", e)))?;

        db.insert(entry.id.as_bytes(), value)
            .map_err(|e| ReaderError::Storage(format!("Insert failed: {}", e)))?;

        db.flush()
            .map_err(|e| ReaderError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }
}
