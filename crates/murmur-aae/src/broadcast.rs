// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The broadcaster: event-driven pushes plus the background sweep.

use crate::config::{Endpoint, NodeEndpoints};
use murmur_proto::aae::{CheckSnapshot, DocumentPush, SnapshotReply, MAX_REPLY_FRAME};
use murmur_proto::{CollectionName, DocumentId, Timestamp};
use murmur_store::{Collection, Store, StoreError};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long to wait for a snapshot reply before skipping the neighbor for
/// this round.
const REPLY_TIMEOUT: Duration = Duration::from_millis(200);

/// Pause between sweep rounds. Events arriving mid-sweep pre-empt the sweep
/// between ids; events arriving during the pause wait at most this long.
const ROUND_PAUSE: Duration = Duration::from_millis(200);

/// A coalescable mutation notification from the engine.
#[derive(Debug)]
pub(crate) struct DocEvent {
    pub(crate) collection: CollectionName,
    pub(crate) id: DocumentId,
}

/// Outcome of one check datagram exchange with one neighbor.
enum Exchange {
    InSync,
    PeerClock(Timestamp),
    Skip,
}

pub(crate) struct Broadcaster {
    store: Arc<Store>,
    neighbors: Vec<NodeEndpoints>,
    events: mpsc::UnboundedReceiver<DocEvent>,
}

impl Broadcaster {
    pub(crate) fn new(
        store: Arc<Store>,
        neighbors: Vec<NodeEndpoints>,
        events: mpsc::UnboundedReceiver<DocEvent>,
    ) -> Self {
        Self {
            store,
            neighbors,
            events,
        }
    }

    /// Serve forever; failures are logged and the loop retries.
    pub(crate) async fn run(mut self) {
        loop {
            self.drain_events().await;
            self.sweep().await;
            tokio::time::sleep(ROUND_PAUSE).await;
        }
    }

    /// Drain the event queue, coalescing by (collection, doc id) so only one
    /// push per document goes out per drain.
    async fn drain_events(&mut self) {
        let mut pending = Vec::new();
        let mut seen: HashSet<(String, DocumentId)> = HashSet::new();
        while let Ok(event) = self.events.try_recv() {
            if seen.insert((event.collection.as_str().to_owned(), event.id)) {
                pending.push(event);
            }
        }
        for event in &pending {
            if let Err(err) = self.push_to_all(event).await {
                warn!(collection = %event.collection, document = %event.id, %err,
                    "event-driven push failed");
            }
        }
    }

    /// Push the current state of one document straight to every neighbor's
    /// document receiver, bypassing the fingerprint handshake: the initiator
    /// knows its copy is authoritative for this event.
    async fn push_to_all(&self, event: &DocEvent) -> anyhow::Result<()> {
        let Some(collection) = self.store.get(event.collection.as_str()).await else {
            return Ok(());
        };
        let (document, updated_at) = match collection
            .read_document_with_updated_at(event.id)
            .await
        {
            Ok(pair) => pair,
            // Deleted between the event and the drain; nothing to push.
            Err(StoreError::DocumentMissing(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let push = DocumentPush {
            collection: event.collection.clone(),
            doc_id: event.id,
            updated_at,
            document,
        };
        let payload = push.encode();
        for neighbor in &self.neighbors {
            if let Err(err) = send_document(&neighbor.document_receiver, &payload).await {
                warn!(neighbor = %neighbor.document_receiver.to_addr(), %err,
                    "document push failed");
            }
        }
        Ok(())
    }

    /// Fingerprint-check every document against every neighbor. Incoming
    /// events pre-empt the sweep between ids.
    async fn sweep(&mut self) {
        for collection in self.store.collections().await {
            for id in collection.doc_ids().await {
                self.drain_events().await;
                if let Err(err) = self.check_one(&collection, id).await {
                    warn!(collection = %collection.name(), document = %id, %err,
                        "sweep check failed");
                }
            }
        }
    }

    async fn check_one(
        &self,
        collection: &Arc<Collection>,
        id: DocumentId,
    ) -> anyhow::Result<()> {
        // The document may be gone since `doc_ids` was snapshotted.
        let Some(fingerprint) = collection.get_snapshot(id).await else {
            return Ok(());
        };
        let check = CheckSnapshot {
            collection: collection.name().clone(),
            doc_id: id,
            fingerprint,
        };
        let datagram = check.encode();

        for neighbor in &self.neighbors {
            match exchange(&datagram, neighbor).await? {
                Exchange::InSync | Exchange::Skip => {}
                Exchange::PeerClock(peer_clock) => {
                    let (document, updated_at) =
                        match collection.read_document_with_updated_at(id).await {
                            Ok(pair) => pair,
                            Err(StoreError::DocumentMissing(_)) => return Ok(()),
                            Err(err) => return Err(err.into()),
                        };
                    if updated_at > peer_clock {
                        let push = DocumentPush {
                            collection: collection.name().clone(),
                            doc_id: id,
                            updated_at,
                            document,
                        };
                        send_document(&neighbor.document_receiver, &push.encode()).await?;
                    }
                    // Otherwise the peer is newer and will eventually push.
                }
            }
        }
        Ok(())
    }
}

/// One independent check exchange over a fresh ephemeral socket, so a stale
/// reply from an earlier attempt can never bleed into this one.
async fn exchange(datagram: &[u8], neighbor: &NodeEndpoints) -> io::Result<Exchange> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket
        .send_to(datagram, neighbor.snapshot_receiver.to_addr())
        .await?;

    let mut buf = [0_u8; MAX_REPLY_FRAME];
    let received = match timeout(REPLY_TIMEOUT, socket.recv_from(&mut buf)).await {
        Err(_elapsed) => {
            debug!(neighbor = %neighbor.snapshot_receiver.to_addr(),
                "no snapshot reply; skipping neighbor this round");
            return Ok(Exchange::Skip);
        }
        Ok(result) => result?,
    };

    let (len, _) = received;
    match SnapshotReply::parse(&buf[..len]) {
        Ok(SnapshotReply::InSync) => Ok(Exchange::InSync),
        Ok(SnapshotReply::Timestamp(ts)) => Ok(Exchange::PeerClock(ts)),
        Err(err) => {
            debug!(%err, "dropping malformed snapshot reply");
            Ok(Exchange::Skip)
        }
    }
}

/// Ship one encoded document payload to a neighbor's document receiver.
async fn send_document(endpoint: &Endpoint, payload: &[u8]) -> io::Result<()> {
    let mut stream = TcpStream::connect(endpoint.to_addr()).await?;
    stream.write_all(payload).await?;
    stream.shutdown().await
}
