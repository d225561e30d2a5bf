// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A single collection: the document/metadata file pair plus the snapshot
//! index, all behind one async mutex.

use crate::fs_access;
use crate::metadata::Metadata;
use crate::StoreError;
use murmur_proto::canonical;
use murmur_proto::fingerprint::DocumentFingerprint;
use murmur_proto::{CollectionName, DocumentId, Timestamp};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

pub(crate) const DATA_DIR: &str = "data";
pub(crate) const METADATA_DIR: &str = "metadata";

/// A named bag of documents.
///
/// Every operation that touches the file pair or the snapshot index holds
/// the collection mutex for its whole duration, which is what makes the
/// `(document, updated_at)` pair reads and the index/key-set invariant hold
/// under concurrent access from the engine and the anti-entropy workers.
pub struct Collection {
    name: CollectionName,
    dir: PathBuf,
    index: Mutex<HashMap<DocumentId, DocumentFingerprint>>,
}

impl Collection {
    pub(crate) fn new(name: CollectionName, store_root: &Path) -> Self {
        let dir = store_root.join(name.as_str());
        Self {
            name,
            dir,
            index: Mutex::new(HashMap::new()),
        }
    }

    /// The collection's name.
    pub fn name(&self) -> &CollectionName {
        &self.name
    }

    /// Create the `data/` and `metadata/` tree; fails if the collection
    /// directory already exists.
    pub(crate) async fn create_dirs(&self) -> Result<(), StoreError> {
        if fs::metadata(&self.dir).await.is_ok() {
            return Err(StoreError::CollectionExists(self.name.as_str().to_owned()));
        }
        fs::create_dir_all(self.dir.join(DATA_DIR)).await?;
        fs::create_dir_all(self.dir.join(METADATA_DIR)).await?;
        Ok(())
    }

    /// Recursively remove the collection directory and drop the index.
    pub(crate) async fn remove_dirs(&self) -> Result<(), StoreError> {
        let mut index = self.index.lock().await;
        fs::remove_dir_all(&self.dir).await?;
        index.clear();
        Ok(())
    }

    /// Scan `data/` and rebuild the snapshot index, fingerprinting each
    /// stored document from its bytes.
    pub(crate) async fn seed_index(&self) -> Result<(), StoreError> {
        let mut index = self.index.lock().await;
        index.clear();
        let mut entries = fs::read_dir(self.dir.join(DATA_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let raw_name = entry.file_name();
            let Some(text) = raw_name.to_str() else {
                warn!(collection = %self.name, "skipping non-UTF-8 data file");
                continue;
            };
            let Ok(id) = DocumentId::parse(text) else {
                warn!(collection = %self.name, file = text, "skipping file with invalid id");
                continue;
            };
            let bytes = fs_access::read(&entry.path()).await?;
            match canonical::leaf_bytes(&bytes) {
                Ok(leaves) => {
                    index.insert(id, DocumentFingerprint::compute(&leaves));
                }
                Err(err) => {
                    warn!(collection = %self.name, document = %id, %err,
                        "stored document cannot be fingerprinted; excluded from anti-entropy");
                }
            }
        }
        Ok(())
    }

    /// Write a new document and its metadata, and index its fingerprint.
    ///
    /// The canonical form is computed before anything touches disk, so an
    /// unfingerprintable document never leaves an orphaned file behind.
    pub async fn create_document(
        &self,
        id: DocumentId,
        data: &[u8],
        updated_at: Timestamp,
    ) -> Result<(), StoreError> {
        let leaves = canonical::leaf_bytes(data)?;
        let fingerprint = DocumentFingerprint::compute(&leaves);

        let mut index = self.index.lock().await;
        if index.contains_key(&id) {
            return Err(StoreError::DocumentExists(id));
        }
        fs_access::create(&self.data_path(id), data)
            .await
            .map_err(|err| map_exists(err, id))?;
        let metadata = Metadata::new(updated_at);
        fs_access::create(&self.metadata_path(id), &encode_metadata(id, &metadata)?)
            .await
            .map_err(|err| map_exists(err, id))?;
        index.insert(id, fingerprint);
        Ok(())
    }

    /// Rewrite an existing document, advance its `updated_at`, and recompute
    /// its index entry. Atomic at pair granularity under the collection lock.
    pub async fn update_document(
        &self,
        id: DocumentId,
        data: &[u8],
        updated_at: Timestamp,
    ) -> Result<(), StoreError> {
        let leaves = canonical::leaf_bytes(data)?;
        let fingerprint = DocumentFingerprint::compute(&leaves);

        let mut index = self.index.lock().await;
        fs_access::update(&self.data_path(id), data)
            .await
            .map_err(|err| map_missing(err, id))?;
        let mut metadata = self.read_metadata(id).await?;
        metadata.updated_at = updated_at;
        fs_access::update(&self.metadata_path(id), &encode_metadata(id, &metadata)?)
            .await
            .map_err(|err| map_missing(err, id))?;
        index.insert(id, fingerprint);
        Ok(())
    }

    /// Remove both files and the index entry. A missing id surfaces the
    /// filesystem error as [`StoreError::DocumentMissing`].
    pub async fn delete_document(&self, id: DocumentId) -> Result<(), StoreError> {
        let mut index = self.index.lock().await;
        fs_access::delete(&self.data_path(id))
            .await
            .map_err(|err| map_missing(err, id))?;
        fs_access::delete(&self.metadata_path(id))
            .await
            .map_err(|err| map_missing(err, id))?;
        index.remove(&id);
        Ok(())
    }

    /// The raw document bytes.
    pub async fn read_document(&self, id: DocumentId) -> Result<Vec<u8>, StoreError> {
        let _index = self.index.lock().await;
        fs_access::read(&self.data_path(id))
            .await
            .map_err(|err| map_missing(err, id))
    }

    /// The raw document bytes and the metadata clock, read under one lock
    /// hold so the pair is consistent.
    pub async fn read_document_with_updated_at(
        &self,
        id: DocumentId,
    ) -> Result<(Vec<u8>, Timestamp), StoreError> {
        let _index = self.index.lock().await;
        let data = fs_access::read(&self.data_path(id))
            .await
            .map_err(|err| map_missing(err, id))?;
        let metadata = self.read_metadata(id).await?;
        Ok((data, metadata.updated_at))
    }

    /// Snapshot of the index's key set, in id order.
    pub async fn doc_ids(&self) -> Vec<DocumentId> {
        let index = self.index.lock().await;
        let mut ids: Vec<DocumentId> = index.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The indexed fingerprint for `id`, if the document exists.
    pub async fn get_snapshot(&self, id: DocumentId) -> Option<DocumentFingerprint> {
        self.index.lock().await.get(&id).copied()
    }

    /// The document's `updated_at` clock.
    pub async fn get_updated_at(&self, id: DocumentId) -> Result<Timestamp, StoreError> {
        let _index = self.index.lock().await;
        Ok(self.read_metadata(id).await?.updated_at)
    }

    /// Overwrite the document's `updated_at` clock, leaving the rest of the
    /// metadata record untouched.
    pub async fn set_updated_at(
        &self,
        id: DocumentId,
        updated_at: Timestamp,
    ) -> Result<(), StoreError> {
        let _index = self.index.lock().await;
        let mut metadata = self.read_metadata(id).await?;
        metadata.updated_at = updated_at;
        fs_access::update(&self.metadata_path(id), &encode_metadata(id, &metadata)?)
            .await
            .map_err(|err| map_missing(err, id))
    }

    // Callers hold the collection lock.
    async fn read_metadata(&self, id: DocumentId) -> Result<Metadata, StoreError> {
        let bytes = fs_access::read(&self.metadata_path(id))
            .await
            .map_err(|err| map_missing(err, id))?;
        Metadata::from_bytes(&bytes).map_err(|source| StoreError::Metadata { id, source })
    }

    fn data_path(&self, id: DocumentId) -> PathBuf {
        self.dir.join(DATA_DIR).join(id.to_string())
    }

    fn metadata_path(&self, id: DocumentId) -> PathBuf {
        self.dir.join(METADATA_DIR).join(id.to_string())
    }
}

fn encode_metadata(id: DocumentId, metadata: &Metadata) -> Result<Vec<u8>, StoreError> {
    metadata
        .to_bytes()
        .map_err(|source| StoreError::Metadata { id, source })
}

fn map_missing(err: io::Error, id: DocumentId) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::DocumentMissing(id)
    } else {
        StoreError::Io(err)
    }
}

fn map_exists(err: io::Error, id: DocumentId) -> StoreError {
    if err.kind() == io::ErrorKind::AlreadyExists {
        StoreError::DocumentExists(id)
    } else {
        StoreError::Io(err)
    }
}
