// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The TCP document receiver.

use murmur_proto::aae::DocumentPush;
use murmur_store::{Store, StoreError};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::{debug, warn};

/// Accepts one pushed document per connection, read to EOF.
pub(crate) struct DocumentReceiver {
    listener: TcpListener,
    store: Arc<Store>,
}

impl DocumentReceiver {
    pub(crate) async fn bind(addr: &str, store: Arc<Store>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, store })
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve forever; failures are logged and the loop resumes.
    pub(crate) async fn run(self) {
        loop {
            if let Err(err) = self.serve_once().await {
                warn!(%err, "document receiver iteration failed");
            }
        }
    }

    async fn serve_once(&self) -> anyhow::Result<()> {
        let (mut stream, peer) = self.listener.accept().await?;
        let mut payload = Vec::new();
        stream.read_to_end(&mut payload).await?;

        let push = DocumentPush::parse(&payload)?;
        debug!(
            %peer,
            collection = %push.collection,
            document = %push.doc_id,
            "received document push"
        );
        apply_push(&self.store, &push).await?;
        Ok(())
    }
}

/// Apply a pushed document under last-writer-wins.
///
/// An unknown document is created with the sender's clock preserved; a known
/// one is overwritten only when the pushed clock is strictly greater. Ties
/// keep the local copy.
pub(crate) async fn apply_push(store: &Store, push: &DocumentPush) -> Result<(), StoreError> {
    let collection = store.get_or_create(&push.collection).await?;

    if collection.get_snapshot(push.doc_id).await.is_none() {
        return collection
            .create_document(push.doc_id, &push.document, push.updated_at)
            .await;
    }

    let local = collection.get_updated_at(push.doc_id).await?;
    if local >= push.updated_at {
        return Ok(());
    }
    collection
        .update_document(push.doc_id, &push.document, push.updated_at)
        .await
}
