// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Endpoint behavior over real sockets.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use murmur_aae::{AaeConfig, AaeHandle, ActiveAntiEntropy, Endpoint, NodeEndpoints};
use murmur_engine::bus::EventBus;
use murmur_proto::aae::{CheckSnapshot, DocumentPush, SnapshotReply, MAX_REPLY_FRAME};
use murmur_proto::fingerprint::DocumentFingerprint;
use murmur_proto::{canonical, CollectionName, DocumentId, Timestamp};
use murmur_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};

const DOC: &[u8] = br#"{"firstname":"Valerii"}"#;
const DOC2: &[u8] = br#"{"firstname":"Maryna"}"#;

fn users() -> CollectionName {
    CollectionName::new("users").unwrap()
}

fn ephemeral() -> NodeEndpoints {
    NodeEndpoints {
        snapshot_receiver: Endpoint {
            addr: "127.0.0.1".to_owned(),
            port: 0,
        },
        document_receiver: Endpoint {
            addr: "127.0.0.1".to_owned(),
            port: 0,
        },
    }
}

async fn spawn_node(store: Arc<Store>, neighbors: Vec<NodeEndpoints>) -> (AaeHandle, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new());
    let config = AaeConfig {
        current: ephemeral(),
        neighbors,
    };
    let handle = ActiveAntiEntropy::spawn(config, store, &bus).await.unwrap();
    (handle, bus)
}

fn fingerprint_of(doc: &[u8]) -> DocumentFingerprint {
    DocumentFingerprint::compute(&canonical::leaf_bytes(doc).unwrap())
}

async fn ask(
    responder: std::net::SocketAddr,
    check: &CheckSnapshot,
) -> Option<SnapshotReply> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&check.encode(), responder).await.unwrap();
    let mut buf = [0_u8; MAX_REPLY_FRAME];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .ok()?
        .unwrap();
    Some(SnapshotReply::parse(&buf[..len]).unwrap())
}

#[tokio::test]
async fn responder_answers_epoch_for_unknown_documents() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(root.path()).await.unwrap());
    let (handle, _bus) = spawn_node(store, Vec::new()).await;

    let check = CheckSnapshot {
        collection: users(),
        doc_id: DocumentId::generate(),
        fingerprint: fingerprint_of(DOC),
    };
    let reply = ask(handle.snapshot_addr(), &check).await.unwrap();
    assert_eq!(reply, SnapshotReply::Timestamp(Timestamp::epoch()));
}

#[tokio::test]
async fn responder_terminates_on_matching_fingerprints() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(root.path()).await.unwrap());
    let id = DocumentId::generate();
    store
        .get_or_create(&users())
        .await
        .unwrap()
        .create_document(id, DOC, Timestamp::now())
        .await
        .unwrap();
    let (handle, _bus) = spawn_node(store, Vec::new()).await;

    let check = CheckSnapshot {
        collection: users(),
        doc_id: id,
        fingerprint: fingerprint_of(DOC),
    };
    let reply = ask(handle.snapshot_addr(), &check).await.unwrap();
    assert_eq!(reply, SnapshotReply::InSync);
}

#[tokio::test]
async fn responder_answers_local_clock_on_mismatch() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(root.path()).await.unwrap());
    let id = DocumentId::generate();
    let written_at = Timestamp::now();
    let collection = store.get_or_create(&users()).await.unwrap();
    collection
        .create_document(id, DOC, written_at)
        .await
        .unwrap();
    let (handle, _bus) = spawn_node(store, Vec::new()).await;

    let check = CheckSnapshot {
        collection: users(),
        doc_id: id,
        fingerprint: fingerprint_of(DOC2),
    };
    let reply = ask(handle.snapshot_addr(), &check).await.unwrap();
    assert_eq!(reply, SnapshotReply::Timestamp(written_at));
}

async fn push_to(document_addr: std::net::SocketAddr, push: &DocumentPush) {
    let mut stream = TcpStream::connect(document_addr).await.unwrap();
    stream.write_all(&push.encode()).await.unwrap();
    stream.shutdown().await.unwrap();
}

#[tokio::test]
async fn receiver_creates_unknown_documents_with_the_sent_clock() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(root.path()).await.unwrap());
    let (handle, _bus) = spawn_node(Arc::clone(&store), Vec::new()).await;

    let id = DocumentId::generate();
    let sent_at = Timestamp::parse("2024_02_07_08_32_20_594746").unwrap();
    push_to(
        handle.document_addr(),
        &DocumentPush {
            collection: users(),
            doc_id: id,
            updated_at: sent_at,
            document: DOC.to_vec(),
        },
    )
    .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if let Some(collection) = store.get("users").await {
            if let Ok((data, clock)) = collection.read_document_with_updated_at(id).await {
                assert_eq!(data, DOC);
                assert_eq!(clock, sent_at);
                break;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "push never applied");
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn receiver_applies_last_writer_wins() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(root.path()).await.unwrap());
    let id = DocumentId::generate();
    let local_clock = Timestamp::parse("2024_06_01_00_00_00_000000").unwrap();
    let collection = store.get_or_create(&users()).await.unwrap();
    collection
        .create_document(id, DOC, local_clock)
        .await
        .unwrap();
    let (handle, _bus) = spawn_node(Arc::clone(&store), Vec::new()).await;

    // Older push: ignored.
    push_to(
        handle.document_addr(),
        &DocumentPush {
            collection: users(),
            doc_id: id,
            updated_at: Timestamp::parse("2024_01_01_00_00_00_000000").unwrap(),
            document: DOC2.to_vec(),
        },
    )
    .await;
    sleep(Duration::from_millis(200)).await;
    assert_eq!(collection.read_document(id).await.unwrap(), DOC);

    // Equal push: ties keep local.
    push_to(
        handle.document_addr(),
        &DocumentPush {
            collection: users(),
            doc_id: id,
            updated_at: local_clock,
            document: DOC2.to_vec(),
        },
    )
    .await;
    sleep(Duration::from_millis(200)).await;
    assert_eq!(collection.read_document(id).await.unwrap(), DOC);

    // Newer push: applied, clock preserved.
    let newer = Timestamp::parse("2024_12_01_00_00_00_000000").unwrap();
    push_to(
        handle.document_addr(),
        &DocumentPush {
            collection: users(),
            doc_id: id,
            updated_at: newer,
            document: DOC2.to_vec(),
        },
    )
    .await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let (data, clock) = collection.read_document_with_updated_at(id).await.unwrap();
        if data == DOC2 {
            assert_eq!(clock, newer);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "newer push ignored");
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn sweep_replicates_to_an_empty_neighbor() {
    let root_a = tempfile::tempdir().unwrap();
    let root_b = tempfile::tempdir().unwrap();
    let store_a = Arc::new(Store::open(root_a.path()).await.unwrap());
    let store_b = Arc::new(Store::open(root_b.path()).await.unwrap());

    let id = DocumentId::generate();
    let written_at = Timestamp::now();
    store_a
        .get_or_create(&users())
        .await
        .unwrap()
        .create_document(id, DOC, written_at)
        .await
        .unwrap();

    // B first, so A can name B's real ports as its neighbor.
    let (handle_b, _bus_b) = spawn_node(Arc::clone(&store_b), Vec::new()).await;
    let neighbor_b = NodeEndpoints {
        snapshot_receiver: Endpoint {
            addr: "127.0.0.1".to_owned(),
            port: handle_b.snapshot_addr().port(),
        },
        document_receiver: Endpoint {
            addr: "127.0.0.1".to_owned(),
            port: handle_b.document_addr().port(),
        },
    };
    let (_handle_a, _bus_a) = spawn_node(Arc::clone(&store_a), vec![neighbor_b]).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(collection) = store_b.get("users").await {
            if let Ok((data, clock)) = collection.read_document_with_updated_at(id).await {
                assert_eq!(data, DOC);
                assert_eq!(clock, written_at);
                break;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "sweep never replicated the document"
        );
        sleep(Duration::from_millis(50)).await;
    }
}
