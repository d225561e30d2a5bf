// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-process publish/subscribe keyed by operation code.
//!
//! Topics are the numeric opcodes of [`DocumentOp`] and [`CollectionOp`].
//! `subscribe` is additive: every registered callback stays registered and
//! all of them run synchronously on publish, in unspecified order. The bus
//! keeps no history; a subscriber that registers after a publish does not
//! observe it.

use murmur_proto::wire::{CollectionOp, DocumentOp};
use murmur_proto::{CollectionName, DocumentId};
use std::collections::HashMap;
use std::sync::Mutex;

/// An event published by the engine (or the endpoint, for collection
/// lifecycle operations).
///
/// Consumers route on the variant tag, never on code-set membership.
#[derive(Debug, Clone)]
pub enum Event {
    /// A document-oriented event.
    Document {
        /// Collection the document lives in.
        collection: CollectionName,
        /// Which document operation completed.
        op: DocumentOp,
        /// The document's id.
        id: DocumentId,
    },
    /// A collection-oriented event.
    Collection {
        /// The collection operated on.
        collection: CollectionName,
        /// Which collection operation completed.
        op: CollectionOp,
    },
}

impl Event {
    /// The topic this event publishes to.
    pub fn code(&self) -> u8 {
        match self {
            Self::Document { op, .. } => op.code(),
            Self::Collection { op, .. } => op.code(),
        }
    }
}

/// Subscription to a topic the bus does not carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown event topic {0}")]
pub struct UnknownTopic(pub u8);

type Callback = Box<dyn Fn(&Event) + Send + Sync>;

/// The bus. One internal mutex per topic; publish holds only the published
/// topic's lock.
pub struct EventBus {
    topics: HashMap<u8, Mutex<Vec<Callback>>>,
}

impl EventBus {
    /// A bus carrying every document and collection operation topic.
    pub fn new() -> Self {
        let codes = [
            DocumentOp::CreateDoc.code(),
            DocumentOp::UpdateDoc.code(),
            DocumentOp::DeleteDoc.code(),
            DocumentOp::ReadDoc.code(),
            CollectionOp::CreateCollection.code(),
            CollectionOp::DeleteCollection.code(),
        ];
        Self {
            topics: codes
                .into_iter()
                .map(|code| (code, Mutex::new(Vec::new())))
                .collect(),
        }
    }

    /// Register one more callback for `code`. Subscriptions accumulate.
    pub fn subscribe(
        &self,
        code: u8,
        callback: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Result<(), UnknownTopic> {
        let topic = self.topics.get(&code).ok_or(UnknownTopic(code))?;
        lock_topic(topic).push(Box::new(callback));
        Ok(())
    }

    /// Invoke every callback registered for the event's topic.
    pub fn publish(&self, event: &Event) {
        let Some(topic) = self.topics.get(&event.code()) else {
            return;
        };
        let subscribers = lock_topic(topic);
        for callback in &*subscribers {
            callback(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned topic only means a subscriber panicked mid-publish; the
// subscriber list itself is still intact.
fn lock_topic(topic: &Mutex<Vec<Callback>>) -> std::sync::MutexGuard<'_, Vec<Callback>> {
    topic
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn users() -> CollectionName {
        CollectionName::new("users").unwrap()
    }

    fn create_event() -> Event {
        Event::Document {
            collection: users(),
            op: DocumentOp::CreateDoc,
            id: DocumentId::generate(),
        }
    }

    #[test]
    fn subscriptions_accumulate() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            bus.subscribe(DocumentOp::CreateDoc.code(), move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        bus.publish(&create_event());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn publish_reaches_only_the_matching_topic() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            bus.subscribe(DocumentOp::UpdateDoc.code(), move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        bus.publish(&create_event());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_topic_is_rejected() {
        let bus = EventBus::new();
        assert_eq!(bus.subscribe(99, |_| {}), Err(UnknownTopic(99)));
    }

    #[test]
    fn collection_events_carry_their_tag() {
        let event = Event::Collection {
            collection: users(),
            op: CollectionOp::DeleteCollection,
        };
        assert_eq!(event.code(), 12);
        assert!(matches!(event, Event::Collection { .. }));
    }
}
