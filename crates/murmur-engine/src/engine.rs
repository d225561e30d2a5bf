// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The engine worker and its handle.

use crate::bus::{Event, EventBus};
use crate::op::{CreateOperation, DeleteOperation, Operation, ReadOperation, UpdateOperation};
use murmur_proto::wire::DocumentOp;
use murmur_proto::{DocumentId, Timestamp};
use murmur_store::Store;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause before re-attempting a failed update, so a permanently failing
/// operation cannot spin the worker hot while it waits for its document's
/// create to land.
const UPDATE_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Submission after the engine worker has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation engine is stopped")]
pub struct EngineClosed;

/// Factory for the engine worker task.
pub struct Engine;

impl Engine {
    /// Spawn the worker against `store` and return its handle.
    pub fn spawn(store: Arc<Store>) -> EngineHandle {
        let bus = Arc::new(EventBus::new());
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let worker = Worker {
            store,
            bus: Arc::clone(&bus),
            ops: ops_rx,
            stop: stop_rx,
            deletes: VecDeque::new(),
            reads: VecDeque::new(),
            creates: VecDeque::new(),
            updates: VecDeque::new(),
        };
        let task = tokio::spawn(worker.run());

        EngineHandle {
            ops: ops_tx,
            bus,
            stop: stop_tx,
            task,
        }
    }
}

/// Handle for submitting operations and reaching the event bus.
pub struct EngineHandle {
    ops: mpsc::UnboundedSender<Operation>,
    bus: Arc<EventBus>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Queue an operation for the worker.
    pub fn submit(&self, operation: Operation) -> Result<(), EngineClosed> {
        self.ops.send(operation).map_err(|_| EngineClosed)
    }

    /// The engine's event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Cooperative shutdown: the stop flag is observed at the top of the
    /// next iteration and any still-queued work is dropped.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        drop(self.ops);
        let _ = self.task.await;
    }
}

struct Worker {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    ops: mpsc::UnboundedReceiver<Operation>,
    stop: watch::Receiver<bool>,
    deletes: VecDeque<DeleteOperation>,
    reads: VecDeque<ReadOperation>,
    creates: VecDeque<CreateOperation>,
    updates: VecDeque<UpdateOperation>,
}

impl Worker {
    async fn run(mut self) {
        info!("operation engine started");
        loop {
            if *self.stop.borrow() {
                break;
            }
            if self.queues_empty() {
                // Blocking dequeue: nothing to do until an op or stop arrives.
                tokio::select! {
                    _ = self.stop.changed() => continue,
                    maybe = self.ops.recv() => match maybe {
                        Some(op) => self.enqueue(op),
                        None => break,
                    },
                }
            }
            while let Ok(op) = self.ops.try_recv() {
                self.enqueue(op);
            }
            self.iteration().await;
        }
        info!("operation engine stopped");
    }

    fn queues_empty(&self) -> bool {
        self.deletes.is_empty()
            && self.reads.is_empty()
            && self.creates.is_empty()
            && self.updates.is_empty()
    }

    fn enqueue(&mut self, operation: Operation) {
        match operation {
            Operation::Create(op) => self.creates.push_back(op),
            Operation::Read(op) => self.reads.push_back(op),
            Operation::Update(op) => self.updates.push_back(op),
            Operation::Delete(op) => self.deletes.push_back(op),
        }
    }

    /// One scheduler pass: at most one op per queue, deletes first.
    async fn iteration(&mut self) {
        let mut deleted_this_round: HashSet<DocumentId> = HashSet::new();

        if let Some(op) = self.deletes.pop_front() {
            if let Err(err) = self.handle_delete(&op).await {
                // A missing document is logged and the engine proceeds.
                warn!(collection = %op.collection, document = %op.id, %err, "delete failed");
            }
            deleted_this_round.insert(op.id);
        }

        if let Some(op) = self.reads.pop_front() {
            if deleted_this_round.contains(&op.id) {
                let _ = op.reply.send(None);
            } else {
                self.handle_read(op).await;
            }
        }

        if let Some(op) = self.creates.pop_front() {
            match self.handle_create(&op).await {
                Ok(()) => self.bus.publish(&Event::Document {
                    collection: op.collection.clone(),
                    op: DocumentOp::CreateDoc,
                    id: op.id,
                }),
                Err(err) => {
                    warn!(collection = %op.collection, document = %op.id, %err, "create failed");
                }
            }
        }

        let mut retried = false;
        if let Some(op) = self.updates.pop_front() {
            if !deleted_this_round.contains(&op.id) {
                match self.handle_update(&op).await {
                    Ok(()) => self.bus.publish(&Event::Document {
                        collection: op.collection.clone(),
                        op: DocumentOp::UpdateDoc,
                        id: op.id,
                    }),
                    Err(err) => {
                        // Assumed transient (e.g. the create is still in
                        // flight): retry without bound.
                        debug!(collection = %op.collection, document = %op.id, %err,
                            "update failed; re-enqueued");
                        self.updates.push_back(op);
                        retried = true;
                    }
                }
            }
        }

        if retried {
            tokio::time::sleep(UPDATE_RETRY_BACKOFF).await;
        }
    }

    async fn handle_delete(&self, op: &DeleteOperation) -> Result<(), murmur_store::StoreError> {
        let collection = self.store.get_or_create(&op.collection).await?;
        collection.delete_document(op.id).await
    }

    async fn handle_read(&self, op: ReadOperation) {
        let result = match self.store.get_or_create(&op.collection).await {
            Ok(collection) => collection.read_document(op.id).await.ok(),
            Err(err) => {
                warn!(collection = %op.collection, %err, "read could not resolve collection");
                None
            }
        };
        let _ = op.reply.send(result);
    }

    async fn handle_create(&self, op: &CreateOperation) -> Result<(), murmur_store::StoreError> {
        let collection = self.store.get_or_create(&op.collection).await?;
        collection
            .create_document(op.id, &op.document, Timestamp::now())
            .await
    }

    async fn handle_update(&self, op: &UpdateOperation) -> Result<(), murmur_store::StoreError> {
        let collection = self.store.get_or_create(&op.collection).await?;
        collection
            .update_document(op.id, &op.document, Timestamp::now())
            .await
    }
}
