// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Document identifiers.

use crate::timestamp::{IdError, Timestamp};
use std::fmt;
use std::str::FromStr;

/// Primary key of a document: the UTC creation instant of the accepting
/// node, in the same 26-character form as [`Timestamp`].
///
/// Doubles as a coarse creation-order proxy. Two creates landing in the same
/// microsecond on one node collide, which the store treats as a creation
/// failure rather than papering over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(Timestamp);

impl DocumentId {
    /// Byte length of the wire form.
    pub const WIRE_LEN: usize = Timestamp::WIRE_LEN;

    /// Mint a fresh id from the current instant.
    pub fn generate() -> Self {
        Self(Timestamp::now())
    }

    /// Parse the 26-character text form.
    pub fn parse(src: &str) -> Result<Self, IdError> {
        Timestamp::parse(src).map(Self)
    }

    /// Parse the wire bytes.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, IdError> {
        Timestamp::from_wire(bytes).map(Self)
    }

    /// Render the fixed-width ASCII wire form.
    pub fn to_wire(self) -> [u8; Self::WIRE_LEN] {
        self.0.to_wire()
    }

    /// The creation instant the id encodes.
    pub fn created_at(self) -> Timestamp {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
