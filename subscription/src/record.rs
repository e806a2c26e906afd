//! Subscription records and their storage layout.
//!
//! A record lives under `kv:<sha256(token)>` with `{updatedAt: <ms>}` metadata.
//! The plain token is never used as a key.

use crate::errors::SubscriptionError;
use converter::FilterCriteria;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use store::{KvStore, PutOptions};

pub const TOKEN_PREFIX: &str = "sk-";
pub const RECORD_PREFIX: &str = "kv:";
pub const ARTIFACT_PREFIX: &str = "sub:";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub token: String,
    pub label: String,
    pub url: String,
    pub filter: FilterCriteria,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

/// A fresh `sk-` token with 128 random bits.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

pub fn is_valid_token(token: &str) -> bool {
    token
        .strip_prefix(TOKEN_PREFIX)
        .is_some_and(|rest| rest.len() == 32 && rest.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Lowercase hex SHA-256 of the token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn record_key(hash: &str) -> String {
    format!("{RECORD_PREFIX}{hash}")
}

pub fn artifact_key(hash: &str) -> String {
    format!("{ARTIFACT_PREFIX}{hash}")
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Record operations over a `KvStore`.
#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn KvStore>,
}

impl RecordStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        RecordStore { store }
    }

    /// Looks a record up by token hash. Returns the record and its update marker.
    pub async fn load_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<(SubscriptionRecord, Option<u64>)>, SubscriptionError> {
        let Some(stored) = self.store.get_with_metadata(&record_key(hash)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&stored.value).map_err(SubscriptionError::RecordParse)?;
        let marker = stored
            .metadata
            .and_then(|m| serde_json::from_value::<RecordMetadata>(m).ok())
            .and_then(|m| m.updated_at);
        Ok(Some((record, marker)))
    }

    pub async fn load(&self, token: &str) -> Result<Option<SubscriptionRecord>, SubscriptionError> {
        Ok(self.load_by_hash(&hash_token(token)).await?.map(|(record, _)| record))
    }

    /// Writes the whole record and bumps its update marker. The new marker
    /// is strictly greater than the previous one even within one millisecond.
    pub async fn save(&self, record: &SubscriptionRecord) -> Result<u64, SubscriptionError> {
        let key = record_key(&hash_token(&record.token));
        let previous = self
            .store
            .get_with_metadata(&key)
            .await?
            .and_then(|stored| stored.metadata)
            .and_then(|m| serde_json::from_value::<RecordMetadata>(m).ok())
            .and_then(|m| m.updated_at);

        let updated_at = match previous {
            Some(prev) => now_millis().max(prev + 1),
            None => now_millis(),
        };
        let metadata = RecordMetadata {
            updated_at: Some(updated_at),
        };

        let options = PutOptions {
            metadata: Some(serde_json::to_value(metadata).map_err(store::StoreError::from)?),
            expiration_ttl: None,
        };
        let value = serde_json::to_string(record).map_err(store::StoreError::from)?;
        self.store.put(&key, value, options).await?;
        Ok(updated_at)
    }

    /// Removes the record and any cached artifact. Returns whether a record existed.
    pub async fn delete(&self, token: &str) -> Result<bool, SubscriptionError> {
        let hash = hash_token(token);
        let existed = self.store.get(&record_key(&hash)).await?.is_some();
        self.store.delete(&record_key(&hash)).await?;
        self.store.delete(&artifact_key(&hash)).await?;
        Ok(existed)
    }

    /// Token hashes of every stored record.
    pub async fn list_hashes(&self) -> Result<Vec<String>, SubscriptionError> {
        Ok(self
            .store
            .list(RECORD_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(RECORD_PREFIX).map(String::from))
            .collect())
    }
}
