//! ModelCache - persistent disk cache for downloaded model definitions.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const EXTENSION: &str = "json";

/// A cached model definition on disk.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub hash: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
    /// URL the definition was downloaded from, if recorded
    pub url: Option<String>,
}

/// Persistent disk cache keyed by the model URL.
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache rooted at `cache_dir`. The directory is created lazily.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Default: `~/.cache/absence-capture/models/`
    pub fn with_default_dir() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("absence-capture")
            .join("models");
        Self::new(cache_dir)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Deterministic 32-character key for a URL (first 16 bytes of SHA-256).
    pub fn hash_url(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", hash, EXTENSION))
    }

    fn url_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.url", hash))
    }

    /// Cached file for `url`, if present.
    pub fn get(&self, url: &str) -> Option<PathBuf> {
        let path = self.entry_path(&Self::hash_url(url));
        path.exists().then_some(path)
    }

    /// Store `bytes` as the definition for `url`.
    pub fn store(&self, url: &str, bytes: &[u8]) -> Result<PathBuf, std::io::Error> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let hash = Self::hash_url(url);
        let path = self.entry_path(&hash);
        std::fs::write(&path, bytes)?;
        std::fs::write(self.url_path(&hash), url)?;
        Ok(path)
    }

    /// All cached definitions, oldest first.
    pub fn list(&self) -> Result<Vec<CacheEntry>, std::io::Error> {
        let mut entries = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(entries);
        }

        for entry in std::fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(hash) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(CacheEntry {
                url: std::fs::read_to_string(self.url_path(&hash)).ok(),
                hash,
                path,
                size_bytes: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        entries.sort_by_key(|e| e.modified);
        Ok(entries)
    }

    /// Remove one cached definition by hash. Returns whether it existed.
    pub fn remove(&self, hash: &str) -> Result<bool, std::io::Error> {
        let path = self.entry_path(hash);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        let url_path = self.url_path(hash);
        if url_path.exists() {
            std::fs::remove_file(url_path)?;
        }
        Ok(true)
    }

    /// Remove every cached definition. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, std::io::Error> {
        let mut removed = 0;
        for entry in self.list()? {
            if self.remove(&entry.hash)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_url_is_deterministic() {
        let a = ModelCache::hash_url("http://x/model.json");
        let b = ModelCache::hash_url("http://x/model.json");
        let c = ModelCache::hash_url("http://y/model.json");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_store_get_list_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path().join("models"));
        let url = "http://x/model.json";

        assert!(cache.get(url).is_none());
        assert!(cache.list().unwrap().is_empty());

        let path = cache.store(url, b"{}").unwrap();
        assert_eq!(cache.get(url), Some(path.clone()));
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");

        let entries = cache.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url.as_deref(), Some(url));
        assert_eq!(entries[0].size_bytes, 2);

        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.get(url).is_none());
    }

    #[test]
    fn test_remove_unknown_hash() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path().to_path_buf());
        assert!(!cache.remove("deadbeef").unwrap());
    }
}
