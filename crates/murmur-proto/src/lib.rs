// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire schema shared by every murmur node and driver.
//!
//! `murmur-proto` owns everything two nodes (or a node and a client) must
//! agree on byte-for-byte:
//!
//! - [`DocumentId`] / [`Timestamp`] — the 26-character UTC microsecond format
//!   that doubles as primary key and last-writer-wins clock.
//! - [`canonical`] — the canonical leaf-byte form of a JSON document, the
//!   input to both fingerprint functions.
//! - [`fingerprint`] — the spectral Bloom filter and prime-histogram hash
//!   whose 14-byte concatenation is compared during anti-entropy.
//! - [`wire`] — the client request framing (opcode, length-prefixed
//!   collection name, operation tail).
//! - [`aae`] — the anti-entropy datagrams and the document-push stream
//!   payload.
//!
//! All multi-byte lengths on the wire are unsigned big-endian. The crate is
//! deliberately runtime-free: pure parsing and encoding over byte slices, so
//! the same code serves the node, the driver, and the tests.

pub mod aae;
pub mod canonical;
pub mod fingerprint;
pub mod wire;

mod collection;
mod cursor;
mod id;
mod timestamp;

pub use collection::{CollectionName, NameError};
pub use id::DocumentId;
pub use timestamp::{IdError, Timestamp};
