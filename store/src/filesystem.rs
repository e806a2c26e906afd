use crate::{KvStore, PutOptions, StoreError, StoredValue, check_key};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const EXTENSION: &str = "json";

/// On-disk form of one entry.
#[derive(Serialize, Deserialize)]
struct FileEntry {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
    /// Unix seconds after which the entry is dead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

impl FileEntry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// One JSON document per key under a base directory. File names are the
/// hex encoded key, so any key is a valid file name.
pub struct FilesystemStore {
    base_dir: PathBuf,
}

impl FilesystemStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        FilesystemStore {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{EXTENSION}", hex::encode(key.as_bytes())))
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<FileEntry>, StoreError> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: FileEntry = serde_json::from_slice(&data)?;
        if entry.is_live(unix_now()) {
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }
}

fn key_from_file_name(name: &str) -> Option<String> {
    let encoded = name.strip_suffix(EXTENSION)?.strip_suffix('.')?;
    String::from_utf8(hex::decode(encoded).ok()?).ok()
}

#[async_trait]
impl KvStore for FilesystemStore {
    async fn get_with_metadata(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        check_key(key)?;
        Ok(self
            .read_entry(&self.path_for(key))
            .await?
            .map(|entry| StoredValue {
                value: entry.value,
                metadata: entry.metadata,
            }))
    }

    async fn put(&self, key: &str, value: String, options: PutOptions) -> Result<(), StoreError> {
        check_key(key)?;
        let entry = FileEntry {
            value,
            metadata: options.metadata,
            expires_at: options.expiration_ttl.map(|ttl| unix_now() + ttl.as_secs()),
        };
        let data = serde_json::to_vec(&entry)?;
        let bytes = data.len();

        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = self.path_for(key);
        let base_dir = self.base_dir.clone();
        let target = path.clone();
        // Each put writes its own temp file and renames it over the entry,
        // so readers and concurrent writers never see a half written file.
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&base_dir)?;
            tmp.write_all(&data)?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(io::Error::other)??;

        tracing::debug!(path = %path.display(), bytes, "stored entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(dir_entry) = dir.next_entry().await? {
            let file_name = dir_entry.file_name();
            let Some(key) = file_name.to_str().and_then(key_from_file_name) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            match self.read_entry(&dir_entry.path()).await {
                Ok(Some(_)) => keys.push(key),
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }
}
