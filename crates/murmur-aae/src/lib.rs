// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Active anti-entropy (AAE) for a murmur node.
//!
//! Three concurrent activities keep a statically configured cluster
//! eventually consistent:
//!
//! - the **snapshot responder** answers neighbors' UDP fingerprint checks;
//! - the **document receiver** accepts TCP document pushes and applies them
//!   under last-writer-wins;
//! - the **broadcaster** pushes every locally mutated document to all
//!   neighbors as engine events arrive, and sweeps the whole store with
//!   fingerprint checks whenever its event queue runs dry.
//!
//! Workers never terminate on their own: every iteration-level failure is
//! logged at warning level and the loop resumes. Socket timeouts are normal
//! flow, not errors. Deletions deliberately do not propagate here.

mod broadcast;
mod config;
mod receiver;
mod responder;

pub use config::{AaeConfig, Endpoint, NodeEndpoints};

use broadcast::{Broadcaster, DocEvent};
use murmur_engine::bus::{Event, EventBus};
use murmur_proto::wire::DocumentOp;
use murmur_store::Store;
use receiver::DocumentReceiver;
use responder::SnapshotResponder;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Entry point wiring the three workers together.
pub struct ActiveAntiEntropy;

impl ActiveAntiEntropy {
    /// Bind both endpoints, subscribe to the engine's mutation events, and
    /// spawn the three workers.
    pub async fn spawn(
        config: AaeConfig,
        store: Arc<Store>,
        bus: &EventBus,
    ) -> io::Result<AaeHandle> {
        let AaeConfig { current, neighbors } = config;

        let responder =
            SnapshotResponder::bind(&current.snapshot_receiver.to_addr(), Arc::clone(&store))
                .await?;
        let snapshot_addr = responder.local_addr()?;

        let receiver =
            DocumentReceiver::bind(&current.document_receiver.to_addr(), Arc::clone(&store))
                .await?;
        let document_addr = receiver.local_addr()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        for code in [DocumentOp::CreateDoc.code(), DocumentOp::UpdateDoc.code()] {
            let tx = events_tx.clone();
            bus.subscribe(code, move |event| {
                // Route purely on the event's tag; collection-oriented
                // events are not broadcast material.
                if let Event::Document { collection, id, .. } = event {
                    let _ = tx.send(DocEvent {
                        collection: collection.clone(),
                        id: *id,
                    });
                }
            })
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        }

        info!(
            snapshot = %snapshot_addr,
            document = %document_addr,
            neighbors = neighbors.len(),
            "anti-entropy started"
        );
        let broadcaster = Broadcaster::new(store, neighbors, events_rx);

        let tasks = vec![
            tokio::spawn(responder.run()),
            tokio::spawn(receiver.run()),
            tokio::spawn(broadcaster.run()),
        ];

        Ok(AaeHandle {
            snapshot_addr,
            document_addr,
            tasks,
        })
    }
}

/// Handle over the three running workers.
pub struct AaeHandle {
    snapshot_addr: SocketAddr,
    document_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl AaeHandle {
    /// Actually-bound address of the UDP snapshot responder.
    pub fn snapshot_addr(&self) -> SocketAddr {
        self.snapshot_addr
    }

    /// Actually-bound address of the TCP document receiver.
    pub fn document_addr(&self) -> SocketAddr {
        self.document_addr
    }

    /// Stop all three workers.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for AaeHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
