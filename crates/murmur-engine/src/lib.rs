// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The serialized document-operation engine.
//!
//! All client-visible mutations and reads funnel through one worker task
//! that owns four FIFO queues (delete, read, create, update) and drains them
//! with a fixed per-iteration discipline:
//!
//! 1. one delete, recording its id for the round;
//! 2. one read, answered with the missing marker if its id was deleted this
//!    round;
//! 3. one create, publishing `CREATE_DOC` on success;
//! 4. one update, dropped if its id was deleted this round, retried without
//!    bound on any failure (the usual cause is a document whose create is
//!    still in flight), publishing `UPDATE_DOC` on success.
//!
//! The delete-first rule keeps a racing read or update from resurrecting a
//! row that was already doomed within the same scheduler pass. Publication
//! on the [`bus::EventBus`] happens after the mutation is durable in both
//! the data and metadata files.

pub mod bus;
mod engine;
mod op;

pub use engine::{Engine, EngineClosed, EngineHandle};
pub use op::{CreateOperation, DeleteOperation, Operation, ReadOperation, UpdateOperation};
