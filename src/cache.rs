use crate::{MediaError, MediaRecord};
use dashmap::DashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

type Slot = Arc<OnceCell<MediaRecord>>;

/// Records keyed by canonical URL.
///
/// Each key owns a `OnceCell`, so concurrent callers asking for the same key
/// share a single computation. A computation that fails or is cancelled
/// leaves the cell empty and the next caller starts over.
#[derive(Clone)]
pub struct Cache {
    cache: Arc<DashMap<String, Slot>>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).map_or(100, NonZeroUsize::get);
        Self {
            cache: Arc::new(DashMap::with_capacity(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<MediaRecord> {
        self.cache
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn put(&self, key: impl Into<String>, record: MediaRecord) {
        self.cache
            .insert(key.into(), Arc::new(OnceCell::new_with(Some(record))));
    }

    /// Stores `record` under `key` unless the key already holds a record.
    pub fn put_if_absent(&self, key: impl Into<String>, record: MediaRecord) {
        let slot = self.slot(key.into());
        let _ = slot.set(record);
    }

    pub fn invalidate(&self, key: &str) -> Option<MediaRecord> {
        self.cache
            .remove(key)
            .and_then(|(_, slot)| slot.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.cache.iter().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached record for `key`, running `compute` only when no
    /// other caller has produced or is producing one.
    pub async fn get_or_try_init<F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<MediaRecord, MediaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MediaRecord, MediaError>>,
    {
        // The map guard must not live across the await below.
        let slot = self.slot(key.to_string());
        if let Some(record) = slot.get() {
            debug!(key = %key, "Cache hit");
            return Ok(record.clone());
        }
        slot.get_or_try_init(compute).await.cloned()
    }

    /// Recomputes `key` unconditionally and replaces whatever was stored.
    pub async fn refresh<F, Fut>(&self, key: &str, compute: F) -> Result<MediaRecord, MediaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MediaRecord, MediaError>>,
    {
        let record = compute().await?;
        debug!(key = %key, "Cache entry refreshed");
        self.put(key, record.clone());
        Ok(record)
    }

    fn slot(&self, key: String) -> Slot {
        self.cache
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MediaType, Provider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn record(url: &str, title: &str) -> MediaRecord {
        let mut record = MediaRecord::new(url, url, Provider::Page, MediaType::Item);
        record.fields.title = title.to_string();
        record
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = Cache::new(10);
        let calls = Arc::new(AtomicUsize::new(0));

        let compute = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, MediaError>(record("https://xkcd.com/1479", "Troubleshooting"))
        };

        let (a, b) = tokio::join!(
            cache.get_or_try_init("https://xkcd.com/1479", || compute(calls.clone())),
            cache.get_or_try_init("https://xkcd.com/1479", || compute(calls.clone())),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().fields.title, "Troubleshooting");
        assert_eq!(b.unwrap().fields.title, "Troubleshooting");
    }

    #[tokio::test]
    async fn test_failed_computation_is_not_cached() {
        let cache = Cache::new(10);

        let failed = cache
            .get_or_try_init("https://xkcd.com/1479", || async {
                Err::<MediaRecord, _>(MediaError::FetchError("boom".into()))
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.get("https://xkcd.com/1479").is_none());

        let ok = cache
            .get_or_try_init("https://xkcd.com/1479", || async {
                Ok(record("https://xkcd.com/1479", "second try"))
            })
            .await
            .unwrap();
        assert_eq!(ok.fields.title, "second try");
    }

    #[tokio::test]
    async fn test_refresh_replaces_entry() {
        let cache = Cache::new(10);
        cache.put("k", record("k", "old"));

        let refreshed = cache
            .refresh("k", || async { Ok(record("k", "new")) })
            .await
            .unwrap();
        assert_eq!(refreshed.fields.title, "new");
        assert_eq!(cache.get("k").unwrap().fields.title, "new");
    }

    #[test]
    fn test_put_if_absent_keeps_existing() {
        let cache = Cache::new(0);
        cache.put("k", record("k", "first"));
        cache.put_if_absent("k", record("k", "second"));
        assert_eq!(cache.get("k").unwrap().fields.title, "first");

        cache.put_if_absent("alias", record("k", "second"));
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate("k").is_some());
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 1);
    }
}
