// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed driver for the murmur client wire protocol.
//!
//! One TCP connection per request, framed by the `0x00` terminator and the
//! connection's EOF (see [`murmur_proto::wire`]). The driver converts the
//! wire-level miss sentinel into a typed [`DriverError::DocumentMissing`]
//! instead of handing callers a magic string.

use murmur_proto::wire::{ClientRequest, FRAME_TERMINATOR, MISSING_BODY};
use murmur_proto::{CollectionName, DocumentId, IdError};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Failures surfaced to driver callers.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Network failure talking to the node.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The node's response could not be interpreted.
    #[error("malformed response: {0}")]
    BadResponse(&'static str),
    /// The created document's id did not parse.
    #[error(transparent)]
    Id(#[from] IdError),
    /// A read named a document the node does not hold.
    #[error("document does not exist")]
    DocumentMissing,
}

/// A client of one murmur node.
#[derive(Debug, Clone, Copy)]
pub struct Driver {
    addr: SocketAddr,
}

impl Driver {
    /// A driver talking to the node's client endpoint at `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Create a document and return its node-assigned id.
    pub async fn create_document(
        &self,
        collection: &CollectionName,
        document: &[u8],
    ) -> Result<DocumentId, DriverError> {
        let request = ClientRequest::CreateDocument {
            collection: collection.clone(),
            document: document.to_vec(),
        };
        let response = self.round_trip(&request).await?;
        if response.len() != DocumentId::WIRE_LEN {
            return Err(DriverError::BadResponse("create reply is not a 26-byte id"));
        }
        Ok(DocumentId::from_wire(&response)?)
    }

    /// Fetch a document's bytes.
    ///
    /// # Errors
    ///
    /// [`DriverError::DocumentMissing`] when the node answers with the miss
    /// sentinel.
    pub async fn read_document(
        &self,
        collection: &CollectionName,
        id: DocumentId,
    ) -> Result<Vec<u8>, DriverError> {
        let request = ClientRequest::ReadDocument {
            collection: collection.clone(),
            id,
        };
        let response = self.round_trip(&request).await?;
        if response == MISSING_BODY {
            return Err(DriverError::DocumentMissing);
        }
        Ok(response)
    }

    /// Overwrite a document. One-way: the node sends no response body.
    pub async fn update_document(
        &self,
        collection: &CollectionName,
        id: DocumentId,
        document: &[u8],
    ) -> Result<(), DriverError> {
        let request = ClientRequest::UpdateDocument {
            collection: collection.clone(),
            id,
            document: document.to_vec(),
        };
        self.send_only(&request).await
    }

    /// Delete a document. One-way.
    pub async fn delete_document(
        &self,
        collection: &CollectionName,
        id: DocumentId,
    ) -> Result<(), DriverError> {
        let request = ClientRequest::DeleteDocument {
            collection: collection.clone(),
            id,
        };
        self.send_only(&request).await
    }

    /// Explicitly create a collection. One-way.
    pub async fn create_collection(
        &self,
        collection: &CollectionName,
    ) -> Result<(), DriverError> {
        let request = ClientRequest::CreateCollection {
            collection: collection.clone(),
        };
        self.send_only(&request).await
    }

    /// Recursively delete a collection. One-way.
    pub async fn delete_collection(
        &self,
        collection: &CollectionName,
    ) -> Result<(), DriverError> {
        let request = ClientRequest::DeleteCollection {
            collection: collection.clone(),
        };
        self.send_only(&request).await
    }

    async fn connect_and_send(&self, request: &ClientRequest) -> Result<TcpStream, DriverError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        let mut frame = request.encode();
        frame.push(FRAME_TERMINATOR);
        stream.write_all(&frame).await?;
        Ok(stream)
    }

    async fn send_only(&self, request: &ClientRequest) -> Result<(), DriverError> {
        let mut stream = self.connect_and_send(request).await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Send the request and read the response until EOF, stripping a
    /// trailing terminator if the node sent one.
    async fn round_trip(&self, request: &ClientRequest) -> Result<Vec<u8>, DriverError> {
        let mut stream = self.connect_and_send(request).await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        if response.last() == Some(&FRAME_TERMINATOR) {
            response.pop();
        }
        Ok(response)
    }
}
