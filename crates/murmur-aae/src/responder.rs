// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The UDP snapshot responder.

use murmur_proto::aae::{AaeOp, CheckSnapshot, SnapshotReply, MAX_CHECK_FRAME};
use murmur_proto::Timestamp;
use murmur_store::{Store, StoreError};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Answers one datagram at a time on the node's `snapshot_receiver` port.
pub(crate) struct SnapshotResponder {
    socket: UdpSocket,
    store: Arc<Store>,
}

impl SnapshotResponder {
    pub(crate) async fn bind(addr: &str, store: Arc<Store>) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket, store })
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve forever; failures are logged and the loop resumes.
    pub(crate) async fn run(self) {
        let mut buf = vec![0_u8; MAX_CHECK_FRAME];
        loop {
            if let Err(err) = self.serve_once(&mut buf).await {
                warn!(%err, "snapshot responder iteration failed");
            }
        }
    }

    async fn serve_once(&self, buf: &mut [u8]) -> anyhow::Result<()> {
        let (len, peer) = self.socket.recv_from(buf).await?;
        let Some((&opcode, payload)) = buf[..len].split_first() else {
            return Ok(());
        };
        // Only checks are expected inbound; everything else is dropped.
        if AaeOp::from_code(opcode) != Some(AaeOp::SendingSnapshot) {
            debug!(opcode, %peer, "dropping unexpected datagram");
            return Ok(());
        }

        let check = CheckSnapshot::parse(payload)?;
        let reply = self.answer(&check).await?;
        self.socket.send_to(&reply.encode(), peer).await?;
        Ok(())
    }

    async fn answer(&self, check: &CheckSnapshot) -> Result<SnapshotReply, StoreError> {
        let collection = self.store.get_or_create(&check.collection).await?;

        // Unknown id: answer with the epoch sentinel so the asking peer
        // treats its own copy as newer and pushes it over.
        let Some(local) = collection.get_snapshot(check.doc_id).await else {
            return Ok(SnapshotReply::Timestamp(Timestamp::epoch()));
        };

        if local == check.fingerprint {
            return Ok(SnapshotReply::InSync);
        }

        let updated_at = collection.get_updated_at(check.doc_id).await?;
        Ok(SnapshotReply::Timestamp(updated_at))
    }
}
