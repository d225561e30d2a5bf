// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The 26-character UTC timestamp used for ids and `updated_at` clocks.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// `strftime`-style pattern for the on-wire form, e.g.
/// `2026_08_01_14_03_22_094713`.
const WIRE_FORMAT: &str = "%Y_%m_%d_%H_%M_%S_%6f";

/// Failure to interpret bytes as a [`Timestamp`] or [`crate::DocumentId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Wrong on-wire length.
    #[error("expected {expected} bytes, got {got}")]
    Length {
        /// Required byte count.
        expected: usize,
        /// Observed byte count.
        got: usize,
    },
    /// The bytes are not UTF-8.
    #[error("not valid UTF-8")]
    Encoding,
    /// The text does not parse back to a UTC timestamp.
    #[error("`{0}` is not a YYYY_MM_DD_HH_MM_SS_ffffff timestamp")]
    Format(String),
}

/// A UTC instant with microsecond precision and a fixed 26-byte ASCII form.
///
/// Ordering is plain chronological ordering, which is exactly the
/// last-writer-wins rule: the replica with the greater `updated_at` wins,
/// ties keep local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Byte length of the wire form.
    pub const WIRE_LEN: usize = 26;

    /// The current UTC instant, truncated to whole microseconds so that
    /// formatting and re-parsing round-trips exactly.
    pub fn now() -> Self {
        let now = Utc::now().naive_utc();
        Self(
            now.with_nanosecond(now.nanosecond() / 1000 * 1000)
                .unwrap_or(now),
        )
    }

    /// The epoch sentinel `1970_01_01_00_00_00_000000`.
    ///
    /// Sent by a snapshot responder that does not hold the document at all,
    /// which forces the asking peer to consider its own copy newer.
    pub fn epoch() -> Self {
        Self(DateTime::UNIX_EPOCH.naive_utc())
    }

    /// Parse the 26-character text form.
    pub fn parse(src: &str) -> Result<Self, IdError> {
        if src.len() != Self::WIRE_LEN {
            return Err(IdError::Length {
                expected: Self::WIRE_LEN,
                got: src.len(),
            });
        }
        NaiveDateTime::parse_from_str(src, WIRE_FORMAT)
            .map(Self)
            .map_err(|_| IdError::Format(src.to_owned()))
    }

    /// Parse the wire bytes (ASCII text form).
    pub fn from_wire(bytes: &[u8]) -> Result<Self, IdError> {
        let text = std::str::from_utf8(bytes).map_err(|_| IdError::Encoding)?;
        Self::parse(text)
    }

    /// Render the fixed-width ASCII wire form.
    pub fn to_wire(self) -> [u8; Self::WIRE_LEN] {
        let text = self.to_string();
        let mut out = [0_u8; Self::WIRE_LEN];
        out.copy_from_slice(text.as_bytes());
        out
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WIRE_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
