// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Operation records accepted by the engine.

use murmur_proto::{CollectionName, DocumentId};
use tokio::sync::oneshot;

/// A queued document operation.
#[derive(Debug)]
pub enum Operation {
    /// Create a document under a pre-assigned id.
    Create(CreateOperation),
    /// Read a document, answering through a one-shot slot.
    Read(ReadOperation),
    /// Overwrite a document.
    Update(UpdateOperation),
    /// Remove a document.
    Delete(DeleteOperation),
}

/// Create a document.
///
/// The id is minted by the accepting endpoint *before* the operation is
/// queued, so the client can be answered immediately; a duplicate id (two
/// creates in the same microsecond) surfaces later as a contained engine
/// failure.
#[derive(Debug)]
pub struct CreateOperation {
    /// Target collection, created lazily if absent.
    pub collection: CollectionName,
    /// The pre-assigned document id.
    pub id: DocumentId,
    /// Raw JSON document bytes.
    pub document: Vec<u8>,
}

impl CreateOperation {
    /// Build a create with a freshly minted id.
    pub fn new(collection: CollectionName, document: Vec<u8>) -> Self {
        Self {
            collection,
            id: DocumentId::generate(),
            document,
        }
    }
}

/// Read a document.
///
/// The result slot is single-assignment: the worker sends `Some(bytes)` or
/// `None` for a miss exactly once, and the accepting endpoint awaits the
/// receiving half instead of polling a flag.
#[derive(Debug)]
pub struct ReadOperation {
    /// Target collection.
    pub collection: CollectionName,
    /// Document to fetch.
    pub id: DocumentId,
    /// Completion slot observed by the accepting endpoint.
    pub reply: oneshot::Sender<Option<Vec<u8>>>,
}

/// Overwrite a document.
#[derive(Debug)]
pub struct UpdateOperation {
    /// Target collection.
    pub collection: CollectionName,
    /// Document to overwrite.
    pub id: DocumentId,
    /// Raw JSON document bytes.
    pub document: Vec<u8>,
}

/// Remove a document.
#[derive(Debug)]
pub struct DeleteOperation {
    /// Target collection.
    pub collection: CollectionName,
    /// Document to remove.
    pub id: DocumentId,
}
