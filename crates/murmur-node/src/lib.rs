// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! An embeddable murmur node: store, operation engine, anti-entropy and the
//! client TCP endpoint wired together.
//!
//! The `murmurd` binary is a thin shell over [`Node::start`]; integration
//! tests embed nodes directly and read the actually-bound addresses so
//! everything can run on ephemeral ports.

use anyhow::{Context, Result};
use murmur_aae::{AaeConfig, AaeHandle, ActiveAntiEntropy};
use murmur_engine::bus::Event;
use murmur_engine::{
    CreateOperation, DeleteOperation, Engine, EngineHandle, Operation, ReadOperation,
    UpdateOperation,
};
use murmur_proto::wire::{ClientRequest, CollectionOp, FRAME_TERMINATOR, MISSING_BODY};
use murmur_store::Store;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use murmur_aae::{Endpoint, NodeEndpoints};

/// Hard cap on a single client frame.
const MAX_FRAME: usize = 8 * 1024 * 1024;

/// Everything needed to start a node.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// Data root holding one directory per collection.
    pub data_dir: PathBuf,
    /// `host:port` for the client endpoint; port 0 binds ephemerally.
    pub listen: String,
    /// This node's anti-entropy endpoints and neighbor list.
    pub aae: AaeConfig,
}

/// A running node.
pub struct Node {
    client_addr: SocketAddr,
    store: Arc<Store>,
    engine: Arc<EngineHandle>,
    aae: AaeHandle,
    acceptor: JoinHandle<()>,
}

impl Node {
    /// Open the store, spawn the engine and anti-entropy workers, and bind
    /// the client endpoint.
    pub async fn start(settings: NodeSettings) -> Result<Self> {
        let NodeSettings {
            data_dir,
            listen,
            aae,
        } = settings;

        let store = Arc::new(
            Store::open(&data_dir)
                .await
                .with_context(|| format!("opening store at {}", data_dir.display()))?,
        );
        let engine = Arc::new(Engine::spawn(Arc::clone(&store)));
        let aae = ActiveAntiEntropy::spawn(aae, Arc::clone(&store), engine.bus())
            .await
            .context("binding anti-entropy endpoints")?;

        let listener = TcpListener::bind(&listen)
            .await
            .with_context(|| format!("binding client endpoint at {listen}"))?;
        let client_addr = listener.local_addr()?;
        info!(client = %client_addr, data_dir = %data_dir.display(), "node started");

        let acceptor = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&store),
            Arc::clone(&engine),
        ));

        Ok(Self {
            client_addr,
            store,
            engine,
            aae,
            acceptor,
        })
    }

    /// Actually-bound client endpoint address.
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Actually-bound anti-entropy snapshot-responder address.
    pub fn snapshot_addr(&self) -> SocketAddr {
        self.aae.snapshot_addr()
    }

    /// Actually-bound anti-entropy document-receiver address.
    pub fn document_addr(&self) -> SocketAddr {
        self.aae.document_addr()
    }

    /// Direct handle on the node's store (used by embedding tests).
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Stop the acceptor, the anti-entropy workers and the engine. Queued
    /// engine work is dropped.
    pub async fn shutdown(self) {
        self.acceptor.abort();
        let _ = self.acceptor.await;
        self.aae.abort();
        if let Ok(engine) = Arc::try_unwrap(self.engine) {
            engine.shutdown().await;
        }
    }
}

/// Serve client connections one request per connection, serially. Protocol
/// errors drop the connection silently; the loop itself never exits.
async fn accept_loop(listener: TcpListener, store: Arc<Store>, engine: Arc<EngineHandle>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(err) = handle_connection(stream, &store, &engine).await {
                    debug!(%peer, %err, "dropping client connection");
                }
            }
            Err(err) => warn!(%err, "client accept failed"),
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    store: &Arc<Store>,
    engine: &Arc<EngineHandle>,
) -> Result<()> {
    let frame = read_frame(&mut stream).await?;
    let request = match ClientRequest::parse(&frame) {
        Ok(request) => request,
        Err(err) => {
            // Malformed or unknown: close without a response.
            debug!(%err, "malformed client frame");
            return Ok(());
        }
    };

    match request {
        ClientRequest::CreateDocument {
            collection,
            document,
        } => {
            // The id is minted here so the client can be answered at once;
            // the engine materializes the document behind it.
            let op = CreateOperation::new(collection, document);
            let id = op.id;
            engine.submit(Operation::Create(op))?;
            stream.write_all(&id.to_wire()).await?;
        }
        ClientRequest::ReadDocument { collection, id } => {
            let (reply, slot) = oneshot::channel();
            engine.submit(Operation::Read(ReadOperation {
                collection,
                id,
                reply,
            }))?;
            let result = slot.await.unwrap_or(None);
            match result {
                Some(bytes) => stream.write_all(&bytes).await?,
                None => stream.write_all(MISSING_BODY).await?,
            }
            stream.write_all(&[FRAME_TERMINATOR]).await?;
        }
        ClientRequest::UpdateDocument {
            collection,
            id,
            document,
        } => {
            engine.submit(Operation::Update(UpdateOperation {
                collection,
                id,
                document,
            }))?;
        }
        ClientRequest::DeleteDocument { collection, id } => {
            engine.submit(Operation::Delete(DeleteOperation { collection, id }))?;
        }
        ClientRequest::CreateCollection { collection } => {
            match store.create_collection(&collection).await {
                Ok(_) => engine.bus().publish(&Event::Collection {
                    collection,
                    op: CollectionOp::CreateCollection,
                }),
                Err(err) => warn!(collection = %collection, %err, "collection create failed"),
            }
        }
        ClientRequest::DeleteCollection { collection } => {
            match store.delete_collection(collection.as_str()).await {
                Ok(()) => engine.bus().publish(&Event::Collection {
                    collection,
                    op: CollectionOp::DeleteCollection,
                }),
                Err(err) => warn!(collection = %collection, %err, "collection delete failed"),
            }
        }
    }

    stream.shutdown().await?;
    Ok(())
}

/// Accumulate one request frame: everything up to the terminator byte or
/// EOF, whichever comes first.
async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(4 * 1024);
    let mut buf = vec![0_u8; 16 * 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(frame);
        }
        let chunk = &buf[..n];
        if let Some(pos) = chunk.iter().position(|&b| b == FRAME_TERMINATOR) {
            frame.extend_from_slice(&chunk[..pos]);
            return Ok(frame);
        }
        frame.extend_from_slice(chunk);
        anyhow::ensure!(frame.len() <= MAX_FRAME, "client frame too large");
    }
}

/// Load the cluster config file (JSON, the documented shape).
pub async fn load_aae_config(path: &Path) -> Result<AaeConfig> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(config)
}
