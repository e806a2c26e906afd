//! Read-through cache of upstream subscription content.
//!
//! The artifact under `sub:<hash>` stores the raw upstream body and parsed
//! headers, plus the record's update marker at the time of caching in its
//! metadata. Staleness is decided lazily on every read by comparing markers;
//! there is no locking, so concurrent cold reads may fetch twice.

use crate::errors::SubscriptionError;
use crate::headers::SubHeaders;
use crate::metrics_defs::{
    ARTIFACT_CACHE_CORRUPT, ARTIFACT_CACHE_HIT, ARTIFACT_CACHE_MISS, ARTIFACT_CACHE_STALE,
};
use crate::record::{RecordStore, SubscriptionRecord, artifact_key, hash_token};
use crate::upstream::UpstreamFetcher;
use serde::{Deserialize, Serialize};
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use store::{KvStore, PutOptions, StoreError};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub content: String,
    pub headers: SubHeaders,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kv_updated_at: Option<u64>,
}

/// A record together with the upstream content to render for it.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedSubscription {
    pub record: SubscriptionRecord,
    pub artifact: CachedArtifact,
}

/// An artifact cached under `cached` is stale for a record at `current` when
/// the record carries a marker and the artifact does not carry one at least
/// as new.
pub fn is_stale(current: Option<u64>, cached: Option<u64>) -> bool {
    match (current, cached) {
        (Some(current), Some(cached)) => current > cached,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

pub struct SubscriptionCache {
    store: Arc<dyn KvStore>,
    records: RecordStore,
    fetcher: Arc<dyn UpstreamFetcher>,
    ttl: Duration,
}

impl SubscriptionCache {
    pub fn new(store: Arc<dyn KvStore>, fetcher: Arc<dyn UpstreamFetcher>, ttl: Duration) -> Self {
        SubscriptionCache {
            records: RecordStore::new(store.clone()),
            store,
            fetcher,
            ttl,
        }
    }

    /// Resolves `token` to its record and returns fresh upstream content,
    /// from the cache when possible.
    pub async fn get_or_fetch(
        &self,
        token: &str,
        user_agent: Option<&str>,
    ) -> Result<CachedSubscription, SubscriptionError> {
        let hash = hash_token(token);
        let (record, marker) = self
            .records
            .load_by_hash(&hash)
            .await?
            .ok_or(SubscriptionError::TokenNotFound)?;

        if let Some(artifact) = self.read_artifact(&hash, marker).await? {
            counter!(ARTIFACT_CACHE_HIT).increment(1);
            tracing::debug!(token_hash = %hash, "serving cached subscription");
            return Ok(CachedSubscription { record, artifact });
        }

        self.fetch_and_store(&hash, record, marker, user_agent).await
    }

    /// `None` when the artifact is missing, stale or unreadable.
    async fn read_artifact(
        &self,
        hash: &str,
        marker: Option<u64>,
    ) -> Result<Option<CachedArtifact>, SubscriptionError> {
        let stored = match self.store.get_with_metadata(&artifact_key(hash)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                counter!(ARTIFACT_CACHE_MISS).increment(1);
                return Ok(None);
            }
            Err(StoreError::Serialization(e)) => {
                counter!(ARTIFACT_CACHE_CORRUPT).increment(1);
                tracing::warn!(token_hash = %hash, error = %e, "unreadable cache entry, refetching");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let cached_marker = stored
            .metadata
            .and_then(|m| serde_json::from_value::<ArtifactMetadata>(m).ok())
            .and_then(|m| m.kv_updated_at);
        if is_stale(marker, cached_marker) {
            counter!(ARTIFACT_CACHE_STALE).increment(1);
            tracing::info!(
                token_hash = %hash,
                record_updated_at = ?marker,
                cached_updated_at = ?cached_marker,
                "subscription record changed, invalidating cache"
            );
            return Ok(None);
        }

        match serde_json::from_str(&stored.value) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => {
                counter!(ARTIFACT_CACHE_CORRUPT).increment(1);
                tracing::warn!(token_hash = %hash, error = %e, "failed to parse cached data, refetching");
                Ok(None)
            }
        }
    }

    async fn fetch_and_store(
        &self,
        hash: &str,
        record: SubscriptionRecord,
        marker: Option<u64>,
        user_agent: Option<&str>,
    ) -> Result<CachedSubscription, SubscriptionError> {
        let response = self.fetcher.fetch(&record.url, user_agent).await?;
        let artifact = CachedArtifact {
            content: response.content,
            headers: response.headers,
        };

        let metadata = ArtifactMetadata {
            kv_updated_at: marker,
        };
        let options = PutOptions {
            metadata: Some(serde_json::to_value(metadata).map_err(StoreError::from)?),
            expiration_ttl: Some(self.ttl),
        };
        let value = serde_json::to_string(&artifact).map_err(StoreError::from)?;
        self.store.put(&artifact_key(hash), value, options).await?;

        tracing::info!(
            token_hash = %hash,
            ttl_secs = self.ttl.as_secs(),
            record_updated_at = ?marker,
            "cached subscription content"
        );

        Ok(CachedSubscription { record, artifact })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UpstreamError;
    use crate::record::{generate_token, record_key};
    use crate::upstream::UpstreamResponse;
    use async_trait::async_trait;
    use converter::FilterCriteria;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use store::{MemoryStore, StoredValue};

    /// Upstream fake that counts fetches and returns a numbered document.
    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl UpstreamFetcher for CountingFetcher {
        async fn fetch(&self, url: &str, _user_agent: Option<&str>) -> Result<UpstreamResponse, UpstreamError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(UpstreamError::NotYaml);
            }
            Ok(UpstreamResponse {
                content: format!("fetch: {n}\nurl: {url}\n"),
                headers: SubHeaders::default(),
            })
        }
    }

    /// Store wrapper that counts writes.
    struct CountingStore {
        inner: MemoryStore,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl KvStore for CountingStore {
        async fn get_with_metadata(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
            self.inner.get_with_metadata(key).await
        }

        async fn put(&self, key: &str, value: String, options: PutOptions) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, value, options).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list(prefix).await
        }
    }

    struct Fixture {
        token: String,
        store: Arc<CountingStore>,
        fetcher: Arc<CountingFetcher>,
        records: RecordStore,
        cache: SubscriptionCache,
    }

    impl Fixture {
        async fn new(fail: bool) -> Self {
            let store = Arc::new(CountingStore {
                inner: MemoryStore::new(),
                puts: AtomicUsize::new(0),
            });
            let fetcher = Arc::new(CountingFetcher {
                fail,
                ..Default::default()
            });
            let records = RecordStore::new(store.clone());
            let token = generate_token();
            records.save(&record(&token)).await.unwrap();
            store.puts.store(0, Ordering::SeqCst);

            Fixture {
                cache: SubscriptionCache::new(store.clone(), fetcher.clone(), DEFAULT_TTL),
                token,
                store,
                fetcher,
                records,
            }
        }

        fn fetches(&self) -> usize {
            self.fetcher.calls.load(Ordering::SeqCst)
        }

        fn writes(&self) -> usize {
            self.store.puts.load(Ordering::SeqCst)
        }
    }

    fn record(token: &str) -> SubscriptionRecord {
        SubscriptionRecord {
            token: token.into(),
            label: "Airport".into(),
            url: "https://upstream.example/sub".into(),
            filter: FilterCriteria {
                label: "all".into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_staleness_rule() {
        assert!(!is_stale(None, None));
        assert!(!is_stale(None, Some(5)));
        assert!(is_stale(Some(5), None));
        assert!(is_stale(Some(6), Some(5)));
        assert!(!is_stale(Some(5), Some(5)));
        assert!(!is_stale(Some(4), Some(5)));
    }

    #[tokio::test]
    async fn test_cold_read_fetches_and_writes_once() {
        let fx = Fixture::new(false).await;

        let sub = fx.cache.get_or_fetch(&fx.token, Some("Stash/2.4")).await.unwrap();
        assert_eq!(fx.fetches(), 1);
        assert_eq!(fx.writes(), 1);
        assert_eq!(sub.record.label, "Airport");
        assert!(sub.artifact.content.starts_with("fetch: 1"));
    }

    #[tokio::test]
    async fn test_warm_read_skips_upstream() {
        let fx = Fixture::new(false).await;

        fx.cache.get_or_fetch(&fx.token, None).await.unwrap();
        let second = fx.cache.get_or_fetch(&fx.token, None).await.unwrap();

        assert_eq!(fx.fetches(), 1);
        assert_eq!(fx.writes(), 1);
        assert!(second.artifact.content.starts_with("fetch: 1"));
    }

    #[tokio::test]
    async fn test_record_update_forces_one_refetch() {
        let fx = Fixture::new(false).await;
        fx.cache.get_or_fetch(&fx.token, None).await.unwrap();

        let mut updated = record(&fx.token);
        updated.url = "https://upstream.example/new".into();
        fx.records.save(&updated).await.unwrap();

        let refreshed = fx.cache.get_or_fetch(&fx.token, None).await.unwrap();
        assert_eq!(fx.fetches(), 2);
        assert!(refreshed.artifact.content.contains("/new"));

        fx.cache.get_or_fetch(&fx.token, None).await.unwrap();
        assert_eq!(fx.fetches(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_artifact_is_a_miss() {
        let fx = Fixture::new(false).await;
        fx.cache.get_or_fetch(&fx.token, None).await.unwrap();

        let (_, marker) = fx.records.load_by_hash(&hash_token(&fx.token)).await.unwrap().unwrap();
        let options = PutOptions {
            metadata: Some(serde_json::json!({ "kvUpdatedAt": marker })),
            expiration_ttl: None,
        };
        fx.store
            .put(&artifact_key(&hash_token(&fx.token)), "{broken".into(), options)
            .await
            .unwrap();

        let sub = fx.cache.get_or_fetch(&fx.token, None).await.unwrap();
        assert_eq!(fx.fetches(), 2);
        assert!(sub.artifact.content.starts_with("fetch: 2"));
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let fx = Fixture::new(false).await;
        let err = fx.cache.get_or_fetch(&generate_token(), None).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::TokenNotFound));
        assert_eq!(fx.fetches(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_not_cached() {
        let fx = Fixture::new(true).await;
        let err = fx.cache.get_or_fetch(&fx.token, None).await.unwrap_err();
        assert!(err.is_upstream_fault());
        assert_eq!(fx.writes(), 0);

        let hash = hash_token(&fx.token);
        assert!(fx.store.get(&artifact_key(&hash)).await.unwrap().is_none());
        assert!(fx.store.get(&record_key(&hash)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_artifact_layout() {
        let fx = Fixture::new(false).await;
        fx.cache.get_or_fetch(&fx.token, None).await.unwrap();

        let hash = hash_token(&fx.token);
        let stored = fx.store.get_with_metadata(&artifact_key(&hash)).await.unwrap().unwrap();
        let (_, marker) = fx.records.load_by_hash(&hash).await.unwrap().unwrap();
        assert_eq!(stored.metadata, Some(serde_json::json!({ "kvUpdatedAt": marker })));

        let artifact: CachedArtifact = serde_json::from_str(&stored.value).unwrap();
        assert!(artifact.content.starts_with("fetch: 1"));
    }
}
