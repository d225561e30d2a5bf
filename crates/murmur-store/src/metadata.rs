// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The per-document metadata record.

use murmur_proto::Timestamp;
use serde::{Deserialize, Serialize};

/// Sidecar record stored at `metadata/<doc-id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Last-writer-wins clock for the document.
    pub updated_at: Timestamp,
    /// Reserved flag; written as `false` and never consulted.
    pub is_frozen: bool,
}

impl Metadata {
    /// A fresh record for a document written at `updated_at`.
    pub fn new(updated_at: Timestamp) -> Self {
        Self {
            updated_at,
            is_frozen: false,
        }
    }

    /// Serialize to the on-disk JSON form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse the on-disk JSON form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn on_disk_form_round_trips() {
        let meta = Metadata::new(Timestamp::parse("2024_02_07_08_32_20_594746").unwrap());
        let bytes = meta.to_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"updated_at\":\"2024_02_07_08_32_20_594746\""));
        assert!(text.contains("\"is_frozen\":false"));
        assert_eq!(Metadata::from_bytes(&bytes).unwrap(), meta);
    }
}
