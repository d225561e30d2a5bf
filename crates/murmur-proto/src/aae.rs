// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Anti-entropy wire formats.
//!
//! Two channels exist between neighbors:
//!
//! - **UDP snapshot checks** — the initiator sends a [`CheckSnapshot`]
//!   datagram; the responder answers with one [`SnapshotReply`] datagram
//!   (`TERMINATE_SESSION` when fingerprints agree, `SENDING_TIMESTAMP`
//!   otherwise). Every attempt is an independent one-shot exchange.
//! - **TCP document pushes** — a [`DocumentPush`] payload, one document per
//!   connection, terminated by EOF. The receiver resolves races with the
//!   carried `updated_at` (last writer wins, ties keep local).

use crate::cursor::Cursor;
use crate::fingerprint::{DocumentFingerprint, FINGERPRINT_LEN};
use crate::wire::{read_doc_id, read_name, FrameError};
use crate::{CollectionName, DocumentId, Timestamp};

/// Anti-entropy datagram opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AaeOp {
    /// Fingerprints agree; nothing to do (opcode 0).
    TerminateSession,
    /// A fingerprint check request (opcode 1).
    SendingSnapshot,
    /// A timestamp answer to a check (opcode 2).
    SendingTimestamp,
}

impl AaeOp {
    /// The wire opcode.
    pub const fn code(self) -> u8 {
        match self {
            Self::TerminateSession => 0,
            Self::SendingSnapshot => 1,
            Self::SendingTimestamp => 2,
        }
    }

    /// Map a wire opcode back, if known.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::TerminateSession),
            1 => Some(Self::SendingSnapshot),
            2 => Some(Self::SendingTimestamp),
            _ => None,
        }
    }
}

/// Largest possible [`CheckSnapshot`] datagram:
/// opcode + name length + 255-byte name + id + fingerprint.
pub const MAX_CHECK_FRAME: usize =
    2 + CollectionName::MAX_LEN + DocumentId::WIRE_LEN + FINGERPRINT_LEN;

/// Largest possible [`SnapshotReply`] datagram: opcode + timestamp.
pub const MAX_REPLY_FRAME: usize = 1 + Timestamp::WIRE_LEN;

/// A fingerprint check sent to a neighbor's snapshot responder.
///
/// Wire form: `| 1 | name-len : 1 | name | doc-id : 26 | fingerprint : 14 |`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSnapshot {
    /// Collection the document lives in.
    pub collection: CollectionName,
    /// Document under comparison.
    pub doc_id: DocumentId,
    /// The sender's current 14-byte fingerprint.
    pub fingerprint: DocumentFingerprint,
}

impl CheckSnapshot {
    /// Encode the full datagram, opcode included.
    pub fn encode(&self) -> Vec<u8> {
        let name = self.collection.as_str().as_bytes();
        let mut out = Vec::with_capacity(2 + name.len() + DocumentId::WIRE_LEN + FINGERPRINT_LEN);
        out.push(AaeOp::SendingSnapshot.code());
        out.push(self.collection.len_byte());
        out.extend_from_slice(name);
        out.extend_from_slice(&self.doc_id.to_wire());
        out.extend_from_slice(self.fingerprint.as_bytes());
        out
    }

    /// Parse the payload following the opcode byte.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        let mut cur = Cursor::new(payload);
        let collection = read_name(&mut cur)?;
        let doc_id = read_doc_id(&mut cur)?;
        let fingerprint = DocumentFingerprint::try_from(cur.rest())
            .map_err(|_| FrameError::Truncated)?;
        Ok(Self {
            collection,
            doc_id,
            fingerprint,
        })
    }
}

/// The responder's one-datagram answer to a [`CheckSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotReply {
    /// `| 0 |` — fingerprints agree.
    InSync,
    /// `| 2 | updated-at : 26 |` — the responder's clock for the document
    /// (the epoch sentinel when the responder does not hold it).
    Timestamp(Timestamp),
}

impl SnapshotReply {
    /// Encode the full datagram.
    pub fn encode(self) -> Vec<u8> {
        match self {
            Self::InSync => vec![AaeOp::TerminateSession.code()],
            Self::Timestamp(ts) => {
                let mut out = Vec::with_capacity(MAX_REPLY_FRAME);
                out.push(AaeOp::SendingTimestamp.code());
                out.extend_from_slice(&ts.to_wire());
                out
            }
        }
    }

    /// Parse a full reply datagram. Unknown opcodes are an error so the
    /// initiator can drop them.
    pub fn parse(frame: &[u8]) -> Result<Self, FrameError> {
        let mut cur = Cursor::new(frame);
        let opcode = cur.take_u8().ok_or(FrameError::Truncated)?;
        match AaeOp::from_code(opcode) {
            Some(AaeOp::TerminateSession) => Ok(Self::InSync),
            Some(AaeOp::SendingTimestamp) => {
                let raw = cur.take(Timestamp::WIRE_LEN).ok_or(FrameError::Truncated)?;
                Ok(Self::Timestamp(Timestamp::from_wire(raw)?))
            }
            _ => Err(FrameError::UnknownOpcode(opcode)),
        }
    }
}

/// A document pushed over TCP to a neighbor's document receiver.
///
/// Wire form:
/// `| name-len : 1 | name | doc-id : 26 | updated-at : 26 | document |`,
/// terminated by EOF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPush {
    /// Collection the document lives in.
    pub collection: CollectionName,
    /// Document being replicated.
    pub doc_id: DocumentId,
    /// The sender's clock for the document; preserved verbatim on apply.
    pub updated_at: Timestamp,
    /// Raw document bytes.
    pub document: Vec<u8>,
}

impl DocumentPush {
    /// Encode the stream payload.
    pub fn encode(&self) -> Vec<u8> {
        let name = self.collection.as_str().as_bytes();
        let mut out = Vec::with_capacity(
            1 + name.len() + DocumentId::WIRE_LEN + Timestamp::WIRE_LEN + self.document.len(),
        );
        out.push(self.collection.len_byte());
        out.extend_from_slice(name);
        out.extend_from_slice(&self.doc_id.to_wire());
        out.extend_from_slice(&self.updated_at.to_wire());
        out.extend_from_slice(&self.document);
        out
    }

    /// Parse a complete stream payload.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        let mut cur = Cursor::new(payload);
        let collection = read_name(&mut cur)?;
        let doc_id = read_doc_id(&mut cur)?;
        let raw_ts = cur.take(Timestamp::WIRE_LEN).ok_or(FrameError::Truncated)?;
        let updated_at = Timestamp::from_wire(raw_ts)?;
        Ok(Self {
            collection,
            doc_id,
            updated_at,
            document: cur.rest().to_vec(),
        })
    }
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
    fn check_snapshot_round_trips() {
        let check = CheckSnapshot {
            collection: users(),
            doc_id: id(),
            fingerprint: DocumentFingerprint::compute(b"ValeriiNikitin"),
        };
        let frame = check.encode();
        assert_eq!(frame[0], AaeOp::SendingSnapshot.code());
        assert!(frame.len() <= MAX_CHECK_FRAME);
        assert_eq!(CheckSnapshot::parse(&frame[1..]).unwrap(), check);
    }

    #[test]
    fn replies_round_trip() {
        assert_eq!(
            SnapshotReply::parse(&SnapshotReply::InSync.encode()).unwrap(),
            SnapshotReply::InSync
        );
        let ts = Timestamp::parse("2024_02_07_08_32_20_594746").unwrap();
        let reply = SnapshotReply::Timestamp(ts);
        let frame = reply.encode();
        assert_eq!(frame.len(), MAX_REPLY_FRAME);
        assert_eq!(SnapshotReply::parse(&frame).unwrap(), reply);
    }

    #[test]
    fn unknown_reply_opcode_is_rejected() {
        assert!(matches!(
            SnapshotReply::parse(&[7]),
            Err(FrameError::UnknownOpcode(7))
        ));
    }

    #[test]
    fn document_push_round_trips() {
        let push = DocumentPush {
            collection: users(),
            doc_id: id(),
            updated_at: Timestamp::parse("2024_02_07_09_00_00_000000").unwrap(),
            document: br#"{"firstname":"Valerii"}"#.to_vec(),
        };
        assert_eq!(DocumentPush::parse(&push.encode()).unwrap(), push);
    }

    #[test]
    fn truncated_push_is_rejected() {
        let push = DocumentPush {
            collection: users(),
            doc_id: id(),
            updated_at: Timestamp::epoch(),
            document: Vec::new(),
        };
        let frame = push.encode();
        assert!(matches!(
            DocumentPush::parse(&frame[..frame.len() - 1]),
            Err(FrameError::Truncated)
        ));
    }
}
