// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client request framing.
//!
//! One request per TCP connection, terminated by [`FRAME_TERMINATOR`] or EOF:
//!
//! ```text
//! | opcode : 1 | coll-name-len : 1 | coll-name : N | tail ... |
//! ```
//!
//! Tails per opcode are documented on [`ClientRequest`]. Byte order is
//! big-endian throughout; all lengths are unsigned.

use crate::cursor::Cursor;
use crate::{CollectionName, DocumentId, IdError, NameError};

/// Terminator byte closing a client frame (and a read response body).
pub const FRAME_TERMINATOR: u8 = 0x00;

/// Response body sent for a read of a document that does not exist, followed
/// by the terminator.
pub const MISSING_BODY: &[u8] = b"None";

/// Document-level operations; the numeric codes double as event-bus topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentOp {
    /// Create a document (opcode 1).
    CreateDoc,
    /// Update a document (opcode 2).
    UpdateDoc,
    /// Delete a document (opcode 3).
    DeleteDoc,
    /// Read a document (opcode 4).
    ReadDoc,
}

impl DocumentOp {
    /// The wire opcode / event-bus topic.
    pub const fn code(self) -> u8 {
        match self {
            Self::CreateDoc => 1,
            Self::UpdateDoc => 2,
            Self::DeleteDoc => 3,
            Self::ReadDoc => 4,
        }
    }
}

/// Collection-level operations; the numeric codes double as event-bus topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionOp {
    /// Explicitly create a collection (opcode 11).
    CreateCollection,
    /// Recursively delete a collection (opcode 12).
    DeleteCollection,
}

impl CollectionOp {
    /// The wire opcode / event-bus topic.
    pub const fn code(self) -> u8 {
        match self {
            Self::CreateCollection => 11,
            Self::DeleteCollection => 12,
        }
    }
}

/// Malformed client or anti-entropy frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame ended before its fixed-width fields did.
    #[error("frame truncated")]
    Truncated,
    /// No such opcode.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    /// The collection name bytes are not UTF-8.
    #[error("collection name is not valid UTF-8")]
    NameEncoding,
    /// The collection name failed validation.
    #[error(transparent)]
    Name(#[from] NameError),
    /// The document id or timestamp failed validation.
    #[error(transparent)]
    Id(#[from] IdError),
}

/// A parsed client request.
#[derive(Debug, PartialEq, Eq)]
pub enum ClientRequest {
    /// Opcode 1 — tail: document bytes. Response: the 26-byte assigned id.
    CreateDocument {
        /// Target collection.
        collection: CollectionName,
        /// Raw JSON document bytes.
        document: Vec<u8>,
    },
    /// Opcode 2 — tail: `doc-id : 26 | document bytes`. No response body.
    UpdateDocument {
        /// Target collection.
        collection: CollectionName,
        /// Document to overwrite.
        id: DocumentId,
        /// Raw JSON document bytes.
        document: Vec<u8>,
    },
    /// Opcode 3 — tail: `doc-id : 26`. No response body.
    DeleteDocument {
        /// Target collection.
        collection: CollectionName,
        /// Document to remove.
        id: DocumentId,
    },
    /// Opcode 4 — tail: `doc-id : 26`. Response: document bytes then the
    /// terminator; [`MISSING_BODY`] then the terminator when absent.
    ReadDocument {
        /// Target collection.
        collection: CollectionName,
        /// Document to fetch.
        id: DocumentId,
    },
    /// Opcode 11 — no tail. Reserved; collections are normally created
    /// lazily on first document reference.
    CreateCollection {
        /// Collection to create.
        collection: CollectionName,
    },
    /// Opcode 12 — no tail. No response body.
    DeleteCollection {
        /// Collection to drop.
        collection: CollectionName,
    },
}

impl ClientRequest {
    /// Parse a full frame (terminator already stripped).
    pub fn parse(frame: &[u8]) -> Result<Self, FrameError> {
        let mut cur = Cursor::new(frame);
        let opcode = cur.take_u8().ok_or(FrameError::Truncated)?;
        let collection = read_name(&mut cur)?;

        match opcode {
            1 => Ok(Self::CreateDocument {
                collection,
                document: cur.rest().to_vec(),
            }),
            2 => {
                let id = read_doc_id(&mut cur)?;
                Ok(Self::UpdateDocument {
                    collection,
                    id,
                    document: cur.rest().to_vec(),
                })
            }
            3 => {
                let id = read_doc_id(&mut cur)?;
                Ok(Self::DeleteDocument { collection, id })
            }
            4 => {
                let id = read_doc_id(&mut cur)?;
                Ok(Self::ReadDocument { collection, id })
            }
            11 => Ok(Self::CreateCollection { collection }),
            12 => Ok(Self::DeleteCollection { collection }),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }

    /// Encode the frame (without the terminator).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::CreateDocument {
                collection,
                document,
            } => {
                let mut out = header(DocumentOp::CreateDoc.code(), collection, document.len());
                out.extend_from_slice(document);
                out
            }
            Self::UpdateDocument {
                collection,
                id,
                document,
            } => {
                let mut out = header(
                    DocumentOp::UpdateDoc.code(),
                    collection,
                    DocumentId::WIRE_LEN + document.len(),
                );
                out.extend_from_slice(&id.to_wire());
                out.extend_from_slice(document);
                out
            }
            Self::DeleteDocument { collection, id } => {
                let mut out = header(
                    DocumentOp::DeleteDoc.code(),
                    collection,
                    DocumentId::WIRE_LEN,
                );
                out.extend_from_slice(&id.to_wire());
                out
            }
            Self::ReadDocument { collection, id } => {
                let mut out = header(DocumentOp::ReadDoc.code(), collection, DocumentId::WIRE_LEN);
                out.extend_from_slice(&id.to_wire());
                out
            }
            Self::CreateCollection { collection } => {
                header(CollectionOp::CreateCollection.code(), collection, 0)
            }
            Self::DeleteCollection { collection } => {
                header(CollectionOp::DeleteCollection.code(), collection, 0)
            }
        }
    }
}

fn header(opcode: u8, collection: &CollectionName, tail_len: usize) -> Vec<u8> {
    let name = collection.as_str().as_bytes();
    let mut out = Vec::with_capacity(2 + name.len() + tail_len);
    out.push(opcode);
    out.push(collection.len_byte());
    out.extend_from_slice(name);
    out
}

/// Read a length-prefixed collection name.
pub(crate) fn read_name(cur: &mut Cursor<'_>) -> Result<CollectionName, FrameError> {
    let len = cur.take_u8().ok_or(FrameError::Truncated)?;
    let raw = cur.take(usize::from(len)).ok_or(FrameError::Truncated)?;
    let text = std::str::from_utf8(raw).map_err(|_| FrameError::NameEncoding)?;
    Ok(CollectionName::new(text)?)
}

/// Read a fixed-width document id.
pub(crate) fn read_doc_id(cur: &mut Cursor<'_>) -> Result<DocumentId, FrameError> {
    let raw = cur.take(DocumentId::WIRE_LEN).ok_or(FrameError::Truncated)?;
    Ok(DocumentId::from_wire(raw)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn users() -> CollectionName {
        CollectionName::new("users").unwrap()
    }

    fn id() -> DocumentId {
        DocumentId::parse("2024_02_07_08_32_20_594746").unwrap()
    }

    #[test]
    fn create_frame_round_trips() {
        let req = ClientRequest::CreateDocument {
            collection: users(),
            document: br#"{"firstname":"Valerii"}"#.to_vec(),
        };
        let frame = req.encode();
        assert_eq!(frame[0], 1);
        assert_eq!(frame[1], 5);
        assert_eq!(&frame[2..7], b"users");
        assert_eq!(ClientRequest::parse(&frame).unwrap(), req);
    }

    #[test]
    fn update_frame_round_trips() {
        let req = ClientRequest::UpdateDocument {
            collection: users(),
            id: id(),
            document: br#"{"firstname":"Maryna"}"#.to_vec(),
        };
        assert_eq!(ClientRequest::parse(&req.encode()).unwrap(), req);
    }

    #[test]
    fn delete_read_and_collection_frames_round_trip() {
        for req in [
            ClientRequest::DeleteDocument {
                collection: users(),
                id: id(),
            },
            ClientRequest::ReadDocument {
                collection: users(),
                id: id(),
            },
            ClientRequest::CreateCollection {
                collection: users(),
            },
            ClientRequest::DeleteCollection {
                collection: users(),
            },
        ] {
            assert_eq!(ClientRequest::parse(&req.encode()).unwrap(), req);
        }
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(
            ClientRequest::parse(&[]),
            Err(FrameError::Truncated)
        ));
        // Name length prefix points past the end of the frame.
        assert!(matches!(
            ClientRequest::parse(&[1, 200, b'u']),
            Err(FrameError::Truncated)
        ));
        assert!(matches!(
            ClientRequest::parse(&[99, 1, b'u']),
            Err(FrameError::UnknownOpcode(99))
        ));
        // Read with a garbage id.
        let mut frame = vec![4, 1, b'u'];
        frame.extend_from_slice(&[b'x'; 26]);
        assert!(matches!(
            ClientRequest::parse(&frame),
            Err(FrameError::Id(_))
        ));
    }
}
