//! Persistence for best-known swarm health records

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use super::types::SwarmHealthRecord;
use crate::torrent::InfoHash;

/// Errors from loading or saving swarm records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Swarm record store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Swarm record store at {path} is corrupt: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage for the last-known-good record of each torrent.
#[async_trait]
pub trait SwarmRecordStore: Send + Sync {
    /// Loads the record for `info_hash`, `None` when nothing is stored.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - Backing storage could not be read
    /// - `StoreError::Serialization` - Stored data could not be decoded
    async fn load(&self, info_hash: &InfoHash) -> Result<Option<SwarmHealthRecord>, StoreError>;

    /// Replaces the record for `info_hash`.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - Backing storage could not be written
    /// - `StoreError::Serialization` - Record could not be encoded
    async fn save(&self, info_hash: &InfoHash, record: SwarmHealthRecord)
    -> Result<(), StoreError>;
}

/// Process-local record store.
#[derive(Debug, Default)]
pub struct InMemorySwarmRecordStore {
    records: RwLock<HashMap<InfoHash, SwarmHealthRecord>>,
}

impl InMemorySwarmRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of torrents with a stored record.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl SwarmRecordStore for InMemorySwarmRecordStore {
    async fn load(&self, info_hash: &InfoHash) -> Result<Option<SwarmHealthRecord>, StoreError> {
        Ok(self.records.read().get(info_hash).copied())
    }

    async fn save(
        &self,
        info_hash: &InfoHash,
        record: SwarmHealthRecord,
    ) -> Result<(), StoreError> {
        self.records.write().insert(*info_hash, record);
        Ok(())
    }
}

/// Record store backed by one JSON document keyed by hex info hash.
///
/// Writes go to a sibling temp file that is renamed over the document, so a
/// crash mid-write leaves the previous version intact.
#[derive(Debug)]
pub struct JsonFileSwarmRecordStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

type RecordDocument = BTreeMap<String, SwarmHealthRecord>;

impl JsonFileSwarmRecordStore {
    /// Creates a store at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_document(&self) -> Result<RecordDocument, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RecordDocument::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(RecordDocument::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_document(&self, document: &RecordDocument) -> Result<(), StoreError> {
        let json =
            serde_json::to_vec_pretty(document).map_err(|source| StoreError::Serialization {
                path: self.path.clone(),
                source,
            })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        tokio::fs::write(&temp_path, &json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

#[async_trait]
impl SwarmRecordStore for JsonFileSwarmRecordStore {
    async fn load(&self, info_hash: &InfoHash) -> Result<Option<SwarmHealthRecord>, StoreError> {
        let document = self.read_document().await?;
        Ok(document.get(&info_hash.to_hex()).copied())
    }

    async fn save(
        &self,
        info_hash: &InfoHash,
        record: SwarmHealthRecord,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(info_hash.to_hex(), record);
        self.write_document(&document).await?;
        debug!(
            "Saved swarm record for {} to {}",
            info_hash,
            self.path.display()
        );
        Ok(())
    }
}
