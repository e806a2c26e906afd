use crate::{KvStore, PutOptions, StoreError, StoredValue, check_key};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Instant;

struct Entry {
    stored: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Process-local store. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops `key` if it is still expired at `now` under the write lock.
    /// A put that landed after the expired read is returned instead.
    fn remove_if_expired(&self, key: &str, now: Instant) -> Option<StoredValue> {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key)
            && entry.is_live(now)
        {
            return Some(entry.stored.clone());
        }
        entries.remove(key);
        None
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_with_metadata(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.stored.clone())),
                Some(_) => {}
            }
        }
        Ok(self.remove_if_expired(key, now))
    }

    async fn put(&self, key: &str, value: String, options: PutOptions) -> Result<(), StoreError> {
        check_key(key)?;
        let entry = Entry {
            stored: StoredValue {
                value,
                metadata: options.metadata,
            },
            expires_at: options.expiration_ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("kv:a").await.unwrap(), None);

        let options = PutOptions {
            metadata: Some(json!({"updatedAt": 1})),
            ..Default::default()
        };
        store.put("kv:a", "one".into(), options).await.unwrap();
        assert_eq!(store.get("kv:a").await.unwrap().as_deref(), Some("one"));
        let stored = store.get_with_metadata("kv:a").await.unwrap().unwrap();
        assert_eq!(stored.metadata, Some(json!({"updatedAt": 1})));

        store.put("kv:a", "two".into(), PutOptions::default()).await.unwrap();
        let stored = store.get_with_metadata("kv:a").await.unwrap().unwrap();
        assert_eq!(stored.value, "two");
        assert_eq!(stored.metadata, None);

        store.delete("kv:a").await.unwrap();
        store.delete("kv:a").await.unwrap();
        assert_eq!(store.get("kv:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let store = MemoryStore::new();
        let expired = PutOptions {
            expiration_ttl: Some(Duration::ZERO),
            ..Default::default()
        };
        let live = PutOptions {
            expiration_ttl: Some(Duration::from_secs(3600)),
            ..Default::default()
        };
        store.put("sub:old", "x".into(), expired).await.unwrap();
        store.put("sub:new", "y".into(), live).await.unwrap();

        assert_eq!(store.get("sub:old").await.unwrap(), None);
        assert_eq!(store.get("sub:new").await.unwrap().as_deref(), Some("y"));
        assert_eq!(store.list("sub:").await.unwrap(), ["sub:new"]);
    }

    #[tokio::test]
    async fn test_expiry_keeps_concurrent_put() {
        let store = MemoryStore::new();
        let expired = PutOptions {
            expiration_ttl: Some(Duration::ZERO),
            ..Default::default()
        };
        store.put("sub:k", "old".into(), expired).await.unwrap();
        let read_at = Instant::now();

        // A writer replaces the entry after the reader saw it expired.
        let live = PutOptions {
            expiration_ttl: Some(Duration::from_secs(3600)),
            ..Default::default()
        };
        store.put("sub:k", "fresh".into(), live).await.unwrap();

        let kept = store.remove_if_expired("sub:k", read_at).unwrap();
        assert_eq!(kept.value, "fresh");
        assert_eq!(store.get("sub:k").await.unwrap().as_deref(), Some("fresh"));

        store
            .put(
                "sub:gone",
                "x".into(),
                PutOptions {
                    expiration_ttl: Some(Duration::ZERO),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.remove_if_expired("sub:gone", Instant::now()), None);
        assert!(store.entries.read().get("sub:gone").is_none());
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = MemoryStore::new();
        for key in ["kv:b", "sub:a", "kv:a", "kvx"] {
            store.put(key, String::new(), PutOptions::default()).await.unwrap();
        }
        assert_eq!(store.list("kv:").await.unwrap(), ["kv:a", "kv:b"]);
        assert_eq!(store.list("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = MemoryStore::new();
        let err = store.put("", "x".into(), PutOptions::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyKey));
    }
}
