// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Collection names.

use std::fmt;

/// Rejected collection name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Names must contain at least one byte.
    #[error("collection name is empty")]
    Empty,
    /// Names must fit the one-byte length prefix.
    #[error("collection name is {0} bytes, max is {max}", max = CollectionName::MAX_LEN)]
    TooLong(usize),
}

/// A validated collection name: 1–255 bytes of UTF-8, so it always fits the
/// one-byte length prefix used by every frame that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    /// Maximum encoded length in bytes.
    pub const MAX_LEN: usize = 255;

    /// Validate and wrap a name.
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(NameError::TooLong(name.len()));
        }
        Ok(Self(name))
    }

    /// The name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The one-byte length prefix for this name.
    #[allow(clippy::cast_possible_truncation)] // length validated <= 255 at construction
    pub fn len_byte(&self) -> u8 {
        self.0.len() as u8
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        let name = CollectionName::new("users").unwrap();
        assert_eq!(name.as_str(), "users");
        assert_eq!(name.len_byte(), 5);
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert_eq!(CollectionName::new(""), Err(NameError::Empty));
        let long = "x".repeat(256);
        assert_eq!(CollectionName::new(long), Err(NameError::TooLong(256)));
        assert!(CollectionName::new("y".repeat(255)).is_ok());
    }

    #[test]
    fn length_prefix_counts_bytes_not_chars() {
        let name = CollectionName::new("héllo").unwrap();
        assert_eq!(name.len_byte(), 6);
    }
}
