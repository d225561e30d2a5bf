// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Document and metadata storage for a murmur node.
//!
//! Layout on disk, per collection `C` under the node's data root:
//!
//! ```text
//! <root>/C/data/<doc-id>        raw document bytes
//! <root>/C/metadata/<doc-id>    {"updated_at":"...","is_frozen":false}
//! ```
//!
//! Each [`Collection`] also carries the in-memory *snapshot index* mapping
//! every document id to its current 14-byte fingerprint; the index's key set
//! equals the `data/` directory's filename set at quiescence. One async mutex
//! per collection guards the file pair and the index entry together, so a
//! reader always observes a consistent `(document, updated_at)` snapshot.
//!
//! [`Store::open`] discovers pre-existing collections (any subdirectory with
//! both `data/` and `metadata/`) and seeds their indexes eagerly by
//! re-fingerprinting the stored bytes.

mod collection;
mod fs_access;
mod metadata;

pub use collection::Collection;
pub use metadata::Metadata;

use murmur_proto::canonical::CanonicalError;
use murmur_proto::{CollectionName, DocumentId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Explicit create of a collection that already exists.
    #[error("collection `{0}` already exists")]
    CollectionExists(String),
    /// Operation on a collection that does not exist.
    #[error("collection `{0}` does not exist")]
    CollectionMissing(String),
    /// Create of a document id that is already present.
    #[error("document {0} already exists")]
    DocumentExists(DocumentId),
    /// Read/update/delete of a document id that is not present.
    #[error("document {0} does not exist")]
    DocumentMissing(DocumentId),
    /// The document bytes cannot be fingerprinted.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
    /// The metadata record for a document is malformed.
    #[error("metadata for {id} is malformed: {source}")]
    Metadata {
        /// Document whose metadata failed to round-trip.
        id: DocumentId,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Any other filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The node-level store: collection name → collection handle.
///
/// Collections are created lazily on first reference via
/// [`get_or_create`](Store::get_or_create); explicit create and recursive
/// delete also exist for the collection lifecycle opcodes.
pub struct Store {
    root: PathBuf,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Store {
    /// Open (creating if needed) a store rooted at `root` and discover the
    /// collections already on disk.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let mut collections = HashMap::new();
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path();
            if !is_dir(&path.join(collection::DATA_DIR)).await
                || !is_dir(&path.join(collection::METADATA_DIR)).await
            {
                continue;
            }
            let raw_name = entry.file_name();
            let Some(text) = raw_name.to_str() else {
                warn!(path = %path.display(), "skipping non-UTF-8 directory");
                continue;
            };
            let Ok(name) = CollectionName::new(text) else {
                warn!(path = %path.display(), "skipping directory with invalid collection name");
                continue;
            };

            let collection = Arc::new(Collection::new(name.clone(), &root));
            collection.seed_index().await?;
            info!(collection = %name, "discovered collection");
            collections.insert(name.as_str().to_owned(), collection);
        }

        Ok(Self {
            root,
            collections: RwLock::new(collections),
        })
    }

    /// The data root this store lives under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Explicitly create a collection; fails if it already exists.
    pub async fn create_collection(
        &self,
        name: &CollectionName,
    ) -> Result<Arc<Collection>, StoreError> {
        let mut map = self.collections.write().await;
        if map.contains_key(name.as_str()) {
            return Err(StoreError::CollectionExists(name.as_str().to_owned()));
        }
        let collection = Arc::new(Collection::new(name.clone(), &self.root));
        collection.create_dirs().await?;
        map.insert(name.as_str().to_owned(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Recursively delete a collection and drop its snapshot index.
    pub async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut map = self.collections.write().await;
        let collection = map
            .remove(name)
            .ok_or_else(|| StoreError::CollectionMissing(name.to_owned()))?;
        collection.remove_dirs().await
    }

    /// Look up an existing collection.
    pub async fn get(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().await.get(name).cloned()
    }

    /// Look up a collection, creating it lazily on first reference.
    pub async fn get_or_create(
        &self,
        name: &CollectionName,
    ) -> Result<Arc<Collection>, StoreError> {
        if let Some(collection) = self.get(name.as_str()).await {
            return Ok(collection);
        }
        match self.create_collection(name).await {
            Ok(collection) => Ok(collection),
            // Lost a create race; the winner's handle is in the map now.
            Err(StoreError::CollectionExists(_)) => self
                .get(name.as_str())
                .await
                .ok_or_else(|| StoreError::CollectionMissing(name.as_str().to_owned())),
            Err(err) => Err(err),
        }
    }

    /// Snapshot of every collection handle.
    pub async fn collections(&self) -> Vec<Arc<Collection>> {
        self.collections.read().await.values().cloned().collect()
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}
