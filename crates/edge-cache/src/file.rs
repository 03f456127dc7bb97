//! Edge cache backend persisted as JSON files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::{CacheResult, CachedResponse, EdgeCacheBackend};

const ENTRY_EXT: &str = "json";

// Longest hex stem written as-is; longer keys are shortened and hashed.
const MAX_STEM_LEN: usize = 200;

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    entry: CachedResponse,
}

/// Stores one JSON file per cache key under a directory.
///
/// File names are the hex-encoded key, so any key maps to a safe name. Each
/// file also records its key, which is what [`FileBackend::keys`] reads. Writes
/// go to a temporary file first and are renamed into place, which keeps
/// concurrent upserts of the same key whole.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    seq: AtomicU64,
}

impl FileBackend {
    /// Open a backend rooted at `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
        })
    }

    /// Directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of stored entries.
    pub async fn len(&self) -> CacheResult<usize> {
        Ok(self.keys().await?.len())
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let stored: StoredEntry = serde_json::from_slice(&bytes)?;
            keys.push(stored.key);
        }
        keys.sort();
        Ok(keys)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", file_stem(key), ENTRY_EXT))
    }
}

#[async_trait]
impl EdgeCacheBackend for FileBackend {
    async fn put(&self, key: &str, entry: CachedResponse) -> CacheResult<()> {
        let stored = StoredEntry {
            key: key.to_string(),
            entry,
        };
        let bytes = serde_json::to_vec(&stored)?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", file_stem(key), seq));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(err) = tokio::fs::rename(&tmp, self.entry_path(key)).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(err.into());
        }

        tracing::trace!(key, dir = %self.dir.display(), "wrote cache file");
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CachedResponse>> {
        let bytes = match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let stored: StoredEntry = serde_json::from_slice(&bytes)?;
        Ok(Some(stored.entry))
    }
}

fn file_stem(key: &str) -> String {
    let hex: String = key.bytes().map(|b| format!("{:02x}", b)).collect();
    if hex.len() <= MAX_STEM_LEN {
        return hex;
    }
    format!("{}-{:016x}", &hex[..MAX_STEM_LEN - 17], fnv1a(key.as_bytes()))
}

// FNV-1a, stable across builds and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use edge_core::RenderedResponse;

    use super::*;
    use crate::policy::EdgeCachePolicy;

    fn entry(body: &str) -> CachedResponse {
        CachedResponse::from_response(&RenderedResponse::ok(body), &EdgeCachePolicy::default())
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let backend = FileBackend::open(dir.path()).await.unwrap();
            backend
                .put("/categories/mens|cookie:language=de", entry("de"))
                .await
                .unwrap();
            backend.put("/", entry("home")).await.unwrap();
        }

        let reopened = FileBackend::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.keys().await.unwrap(),
            vec!["/", "/categories/mens|cookie:language=de"]
        );
        let stored = reopened
            .get("/categories/mens|cookie:language=de")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body, b"de".to_vec());
        assert_eq!(stored.max_age_secs, EdgeCachePolicy::default().max_age_seconds);
    }

    #[tokio::test]
    async fn test_put_is_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("cache")).await.unwrap();

        backend.put("/", entry("one")).await.unwrap();
        backend.put("/", entry("two")).await.unwrap();

        assert_eq!(backend.len().await.unwrap(), 1);
        let stored = backend.get("/").await.unwrap().unwrap();
        assert_eq!(stored.body, b"two".to_vec());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        assert!(backend.get("/nope").await.unwrap().is_none());
        assert_eq!(backend.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_long_keys_stay_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        let base = format!("/p/{}", "x".repeat(300));
        let de = format!("{}|cookie:language=de", base);
        let en = format!("{}|cookie:language=en", base);

        backend.put(&de, entry("de")).await.unwrap();
        backend.put(&en, entry("en")).await.unwrap();

        assert_eq!(backend.len().await.unwrap(), 2);
        assert_eq!(backend.get(&de).await.unwrap().unwrap().body, b"de".to_vec());
        assert_eq!(backend.get(&en).await.unwrap().unwrap().body, b"en".to_vec());
        assert!(file_stem(&de).len() <= MAX_STEM_LEN);
    }

    #[test]
    fn test_file_stem_is_hex() {
        assert_eq!(file_stem("/"), "2f");
        assert_eq!(file_stem("/a|b"), "2f617c62");
    }
}
