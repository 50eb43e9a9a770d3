//! Per-feed snapshot cache with a durable backing store.
//!
//! Reads go through a `DashMap` of in-memory slots; a slot is hydrated
//! from the store on first read after a restart. Unreadable persisted data
//! is a miss, never an error. Readable data is passed through
//! `CachePayload::sanitize` before it is served.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Clock, Error, Result};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Snapshot plus the time it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub payload: T,
    /// Epoch milliseconds.
    pub fetched_at_ms: i64,
    pub ttl_ms: u64,
}

impl<T> CacheEntry<T> {
    /// `now - fetched_at < ttl`.
    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        let ttl = i64::try_from(self.ttl_ms).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.fetched_at_ms) < ttl
    }
}

/// On-disk record: `{ "data": ..., "timestamp": <epoch ms> }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedRecord<T> {
    pub data: T,
    pub timestamp: i64,
}

/// Something a `DataCache` can hold.
pub trait CachePayload: Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Check a payload read back from the store. Implementations drop
    /// content that would have been rejected on the way in, or return
    /// `Error::PersistenceCorruption` to discard the whole record.
    fn sanitize(self, _key: &str) -> Result<Self> {
        Ok(self)
    }
}

// ── Stores ────────────────────────────────────────────────────────────

/// Durable key/value text store behind the cache.
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// `Ok(None)` when nothing has been stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, contents: &str) -> Result<()>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::PersistenceCorruption(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn save(&self, key: &str, contents: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Other(format!("create {}: {e}", self.dir.display())))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| Error::Other(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Other(format!("rename to {}: {e}", path.display())))?;
        Ok(())
    }
}

/// Process-local store for tests and ephemeral runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored text, as a restarted process would read it.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn put_raw(&self, key: &str, contents: impl Into<String>) {
        self.entries.insert(key.to_string(), contents.into());
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.raw(key))
    }

    async fn save(&self, key: &str, contents: &str) -> Result<()> {
        self.put_raw(key, contents);
        Ok(())
    }
}

// ── Cache ─────────────────────────────────────────────────────────────

/// One slot per well-known key.
///
/// `get`/`set` are individually safe to call concurrently, but a
/// check-then-fetch-then-set sequence is not atomic; callers that need
/// that go through the polling scheduler.
#[derive(Debug)]
pub struct DataCache<T> {
    slots: DashMap<String, CacheEntry<T>>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    /// Applied to entries hydrated from the store, which carry no TTL.
    default_ttl_ms: u64,
}

impl<T: CachePayload> DataCache<T> {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, default_ttl_ms: u64) -> Self {
        Self {
            slots: DashMap::new(),
            store,
            clock,
            default_ttl_ms,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn default_ttl_ms(&self) -> u64 {
        self.default_ttl_ms
    }

    /// Current entry for `key`, fresh or not.
    pub async fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        let cached = self.slots.get(key).map(|e| e.value().clone());
        if cached.is_some() {
            return cached;
        }

        let hydrated = self.hydrate(key).await?;
        // A concurrent `set` wins over what was on disk.
        let entry = self
            .slots
            .entry(key.to_string())
            .or_insert(hydrated)
            .value()
            .clone();
        Some(entry)
    }

    async fn hydrate(&self, key: &str) -> Option<CacheEntry<T>> {
        let text = match self.store.load(key).await {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache store read failed for {}, treating as miss: {}", key, e);
                return None;
            }
        };

        let record = serde_json::from_str::<PersistedRecord<T>>(&text)
            .map_err(|e| Error::PersistenceCorruption(format!("{key}: {e}")))
            .and_then(|record| {
                let payload = record.data.sanitize(key)?;
                Ok((payload, record.timestamp))
            });

        match record {
            Ok((payload, timestamp)) => {
                debug!("Hydrated cache slot {} (fetched_at={})", key, timestamp);
                Some(CacheEntry {
                    payload,
                    fetched_at_ms: timestamp,
                    ttl_ms: self.default_ttl_ms,
                })
            }
            Err(e) => {
                warn!("{}; treating as miss", e);
                None
            }
        }
    }

    /// Replace the slot for `key`. Persisting is best effort: a store
    /// failure is logged and the in-memory slot is still updated.
    pub async fn set(&self, key: &str, payload: T, ttl_ms: u64) -> CacheEntry<T> {
        let entry = CacheEntry {
            payload,
            fetched_at_ms: self.clock.now_ms(),
            ttl_ms,
        };
        self.slots.insert(key.to_string(), entry.clone());

        let record = PersistedRecord {
            data: &entry.payload,
            timestamp: entry.fetched_at_ms,
        };
        match serde_json::to_string(&record) {
            Ok(text) => {
                if let Err(e) = self.store.save(key, &text).await {
                    warn!("Failed to persist cache slot {}: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to serialize cache slot {}: {}", key, e),
        }
        entry
    }

    pub fn is_fresh(&self, entry: &CacheEntry<T>) -> bool {
        entry.is_fresh_at(self.clock.now_ms())
    }
}

#[cfg(test)]
mod tests {
    use common::ManualClock;

    use super::*;

    const KEY: &str = "earthquakes_felt";

    impl CachePayload for Vec<u32> {}

    /// Odd values never make it into a `Numbers` slot.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Numbers(Vec<u32>);

    impl CachePayload for Numbers {
        fn sanitize(self, key: &str) -> Result<Self> {
            if self.0.is_empty() {
                return Err(Error::PersistenceCorruption(format!("{key}: empty")));
            }
            Ok(Numbers(self.0.into_iter().filter(|n| n % 2 == 0).collect()))
        }
    }

    fn cache_with(store: Arc<dyn CacheStore>, clock: &ManualClock) -> DataCache<Vec<u32>> {
        DataCache::new(store, Arc::new(clock.clone()), 300_000)
    }

    #[tokio::test]
    async fn test_freshness_window() {
        let clock = ManualClock::new(1_000_000);
        let cache = cache_with(Arc::new(MemoryStore::new()), &clock);

        let entry = cache.set(KEY, vec![1, 2, 3], 300_000).await;
        assert!(cache.is_fresh(&entry));

        clock.advance_ms(299_999);
        assert!(cache.is_fresh(&entry));

        clock.advance_ms(2);
        assert!(!cache.is_fresh(&entry));

        // Stale entries are still returned.
        let stale = cache.get(KEY).await.expect("entry present");
        assert_eq!(stale.payload, vec![1, 2, 3]);
        assert_eq!(stale.fetched_at_ms, 1_000_000);
    }

    #[tokio::test]
    async fn test_missing_key_is_absent() {
        let clock = ManualClock::new(0);
        let cache = cache_with(Arc::new(MemoryStore::new()), &clock);
        assert!(cache.get(KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_set_persists_record_shape() {
        let clock = ManualClock::new(42);
        let store = MemoryStore::new();
        let cache = cache_with(Arc::new(store.clone()), &clock);

        cache.set(KEY, vec![7], 1_000).await;

        let raw = store.raw(KEY).expect("persisted");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["data"], serde_json::json!([7]));
        assert_eq!(value["timestamp"], serde_json::json!(42));
    }

    #[tokio::test]
    async fn test_restart_hydrates_from_store() {
        let clock = ManualClock::new(5_000);
        let store = MemoryStore::new();
        store.put_raw(KEY, r#"{"data":[4,5],"timestamp":4000}"#);

        let cache = cache_with(Arc::new(store), &clock);
        let entry = cache.get(KEY).await.expect("hydrated");
        assert_eq!(entry.payload, vec![4, 5]);
        assert_eq!(entry.fetched_at_ms, 4_000);
        assert_eq!(entry.ttl_ms, 300_000);
        assert!(cache.is_fresh(&entry));
    }

    #[tokio::test]
    async fn test_corrupt_persisted_data_is_a_miss() {
        let clock = ManualClock::new(0);
        let store = MemoryStore::new();
        store.put_raw(KEY, "{not json");
        store.put_raw("earthquakes_recent", r#"{"data":"wrong shape","timestamp":1}"#);

        let cache = cache_with(Arc::new(store), &clock);
        assert!(cache.get(KEY).await.is_none());
        assert!(cache.get("earthquakes_recent").await.is_none());

        // A later set still works and replaces the bad record.
        cache.set(KEY, vec![9], 1_000).await;
        assert_eq!(cache.get(KEY).await.map(|e| e.payload), Some(vec![9]));
    }

    #[tokio::test]
    async fn test_hydrated_payload_is_sanitized() {
        let clock = ManualClock::new(0);
        let store = MemoryStore::new();
        store.put_raw(KEY, r#"{"data":[1,2,3,4],"timestamp":0}"#);
        store.put_raw("earthquakes_recent", r#"{"data":[],"timestamp":0}"#);

        let cache: DataCache<Numbers> = DataCache::new(Arc::new(store), Arc::new(clock), 300_000);
        let entry = cache.get(KEY).await.expect("hydrated");
        assert_eq!(entry.payload, Numbers(vec![2, 4]));
        assert!(cache.get("earthquakes_recent").await.is_none());
    }

    #[tokio::test]
    async fn test_file_store_round_trip_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::new(10_000);

        let first = cache_with(Arc::new(FileStore::new(dir.path())), &clock);
        first.set(KEY, vec![1, 1, 2], 300_000).await;

        let second = cache_with(Arc::new(FileStore::new(dir.path())), &clock);
        let entry = second.get(KEY).await.expect("read back from disk");
        assert_eq!(entry.payload, vec![1, 1, 2]);
        assert_eq!(entry.fetched_at_ms, 10_000);
        assert!(!dir.path().join("earthquakes_felt.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_garbage_file_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("earthquakes_felt.json"), b"\x00\x01garbage")
            .expect("write garbage");

        let clock = ManualClock::new(0);
        let cache = cache_with(Arc::new(FileStore::new(dir.path())), &clock);
        assert!(cache.get(KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_unwritable_store_still_updates_memory() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A regular file where the cache directory should be.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").expect("write blocker");

        let clock = ManualClock::new(0);
        let cache = cache_with(Arc::new(FileStore::new(&blocker)), &clock);
        cache.set(KEY, vec![3], 1_000).await;
        assert_eq!(cache.get(KEY).await.map(|e| e.payload), Some(vec![3]));
    }
}
