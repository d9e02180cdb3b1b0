use crate::domain::model::{CacheEntry, Dataset};
use crate::domain::ports::Storage;
use crate::utils::error::{EpiError, Result};
use chrono::{DateTime, Duration, Utc};

/// Last successfully loaded dataset per key, persisted through a [`Storage`].
///
/// Unreadable entries are reported as absent so callers fall back to a
/// fresh fetch. No locking: one process owns the cache directory.
pub struct DatasetCache<S: Storage> {
    storage: S,
}

impl<S: Storage> DatasetCache<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn file_name(key: &str) -> String {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}.json", safe)
    }

    /// The stored dataset if it is at most `ttl` old.
    pub async fn get(&self, key: &str, ttl: Duration) -> Option<Dataset> {
        self.get_as_of(key, ttl, Utc::now()).await
    }

    pub async fn get_as_of(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Option<Dataset> {
        self.fresh_entry_as_of(key, ttl, now)
            .await
            .map(|entry| entry.dataset)
    }

    /// Like [`get`](Self::get) but keeps the source and timestamp.
    pub async fn fresh_entry(&self, key: &str, ttl: Duration) -> Option<CacheEntry> {
        self.fresh_entry_as_of(key, ttl, Utc::now()).await
    }

    pub async fn fresh_entry_as_of(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Option<CacheEntry> {
        let entry = self.entry(key).await?;
        let age = now - entry.fetched_at;
        if age > ttl {
            tracing::info!(
                "Cache entry '{}' expired ({} min old, ttl {} min)",
                key,
                age.num_minutes(),
                ttl.num_minutes()
            );
            return None;
        }
        tracing::debug!("Cache hit for '{}' ({} rows)", key, entry.dataset.len());
        Some(entry)
    }

    /// The stored entry regardless of age; absent when missing or corrupt.
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        match self.read_entry(key).await {
            Ok(entry) => Some(entry),
            Err(EpiError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No cache entry for '{}'", key);
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache entry '{}': {}", key, e);
                None
            }
        }
    }

    /// Strict read: surfaces `CacheCorrupt` instead of treating it as a miss.
    pub async fn read_entry(&self, key: &str) -> Result<CacheEntry> {
        let bytes = self.storage.read_file(&Self::file_name(key)).await?;
        serde_json::from_slice(&bytes).map_err(|e| EpiError::CacheCorrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Overwrites any entry for `key`, stamped with the current time.
    pub async fn put(&self, key: &str, dataset: &Dataset, source: &str) -> Result<()> {
        self.put_at(key, dataset, source, Utc::now()).await
    }

    pub async fn put_at(
        &self,
        key: &str,
        dataset: &Dataset,
        source: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = CacheEntry {
            source: source.to_string(),
            fetched_at,
            dataset: dataset.clone(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        tracing::debug!("Writing cache entry '{}' ({} bytes)", key, bytes.len());
        self.storage.write_file(&Self::file_name(key), &bytes).await?;
        tracing::info!("Cached {} rows from {} as '{}'", dataset.len(), source, key);
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) -> Result<()> {
        match self.storage.remove_file(&Self::file_name(key)).await {
            Err(EpiError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Column, Record};
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                EpiError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn remove_file(&self, path: &str) -> Result<()> {
            let mut files = self.files.lock().await;
            files.remove(path).map(|_| ()).ok_or_else(|| {
                EpiError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }
    }

    fn sample() -> Dataset {
        let day = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        Dataset::new(vec![
            Record::new("France", day)
                .with(Column::TotalCases, 130.0)
                .with(Column::TotalDeaths, 2.0)
                .with(Column::NewCases, 0.1 + 0.2)
                .with(Column::NewDeaths, 0.0),
            Record::new("Spain", day).with(Column::TotalCases, 84.0),
        ])
    }

    #[tokio::test]
    async fn test_put_then_get_returns_exact_dataset() {
        let cache = DatasetCache::new(MockStorage::default());
        let data = sample();

        cache.put("owid", &data, "https://example.com/a.csv").await.unwrap();
        let loaded = cache.get("owid", Duration::hours(24)).await;

        assert_eq!(loaded, Some(data));
    }

    #[tokio::test]
    async fn test_get_after_ttl_is_absent() {
        let cache = DatasetCache::new(MockStorage::default());
        let fetched_at = Utc::now() - Duration::hours(25);
        cache
            .put_at("owid", &sample(), "primary", fetched_at)
            .await
            .unwrap();

        assert!(cache.get("owid", Duration::hours(24)).await.is_none());
        assert!(cache.get("owid", Duration::hours(26)).await.is_some());
        // Expired entries stay readable for stale fallbacks.
        assert_eq!(cache.entry("owid").await.unwrap().source, "primary");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let storage = MockStorage::default();
        storage
            .write_file("owid.json", b"{ not json")
            .await
            .unwrap();
        let cache = DatasetCache::new(storage);

        assert!(cache.get("owid", Duration::hours(24)).await.is_none());
        assert!(matches!(
            cache.read_entry("owid").await,
            Err(EpiError::CacheCorrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_put_overwrites_and_invalidate_removes() {
        let cache = DatasetCache::new(MockStorage::default());
        cache.put("k", &sample(), "first").await.unwrap();
        cache.put("k", &Dataset::default(), "second").await.unwrap();

        let entry = cache.entry("k").await.unwrap();
        assert_eq!(entry.source, "second");
        assert!(entry.dataset.is_empty());

        cache.invalidate("k").await.unwrap();
        assert!(cache.entry("k").await.is_none());
        cache.invalidate("k").await.unwrap();
    }

    #[test]
    fn test_keys_map_to_safe_file_names() {
        assert_eq!(
            DatasetCache::<MockStorage>::file_name("owid/covid data"),
            "owid_covid_data.json"
        );
    }
}
