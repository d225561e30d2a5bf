// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Two-node clusters: anti-entropy end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use murmur_aae::AaeConfig;
use murmur_client::Driver;
use murmur_node::{Endpoint, Node, NodeEndpoints, NodeSettings};
use murmur_proto::{CollectionName, DocumentId, Timestamp};
use murmur_store::Store;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const DOC: &[u8] = br#"{"firstname":"Valerii"}"#;
const DOC2: &[u8] = br#"{"firstname":"Maryna"}"#;

fn users() -> CollectionName {
    CollectionName::new("users").unwrap()
}

fn localhost(port: u16) -> Endpoint {
    Endpoint {
        addr: "127.0.0.1".to_owned(),
        port,
    }
}

/// Reserve distinct ports by holding all the sockets at once, then freeing
/// them just before the nodes bind.
fn reserve_ports() -> (u16, u16) {
    let udp = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let tcp = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    (
        udp.local_addr().unwrap().port(),
        tcp.local_addr().unwrap().port(),
    )
}

fn endpoints(snapshot_port: u16, document_port: u16) -> NodeEndpoints {
    NodeEndpoints {
        snapshot_receiver: localhost(snapshot_port),
        document_receiver: localhost(document_port),
    }
}

async fn start_node(data_dir: &Path, current: NodeEndpoints, neighbors: Vec<NodeEndpoints>) -> Node {
    Node::start(NodeSettings {
        data_dir: data_dir.to_path_buf(),
        listen: "127.0.0.1:0".to_owned(),
        aae: AaeConfig { current, neighbors },
    })
    .await
    .unwrap()
}

async fn wait_for_document(
    client: SocketAddr,
    id: DocumentId,
    expected: &[u8],
    deadline: Duration,
) {
    let driver = Driver::new(client);
    let end = tokio::time::Instant::now() + deadline;
    loop {
        if let Ok(data) = driver.read_document(&users(), id).await {
            if data == expected {
                return;
            }
        }
        assert!(
            tokio::time::Instant::now() < end,
            "document {id} never converged on {client}"
        );
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn create_is_pushed_to_the_neighbor() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let (a_snap, a_doc) = reserve_ports();
    let (b_snap, b_doc) = reserve_ports();

    let node_a = start_node(
        dir_a.path(),
        endpoints(a_snap, a_doc),
        vec![endpoints(b_snap, b_doc)],
    )
    .await;
    let node_b = start_node(
        dir_b.path(),
        endpoints(b_snap, b_doc),
        vec![endpoints(a_snap, a_doc)],
    )
    .await;

    let driver_a = Driver::new(node_a.client_addr());
    let id = driver_a.create_document(&users(), DOC).await.unwrap();

    wait_for_document(node_b.client_addr(), id, DOC, Duration::from_secs(5)).await;
    let collection_b = node_b.store().get("users").await.unwrap();
    assert!(collection_b.doc_ids().await.contains(&id));

    node_a.shutdown().await;
    node_b.shutdown().await;
}

#[tokio::test]
async fn update_is_pushed_to_the_neighbor() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let (a_snap, a_doc) = reserve_ports();
    let (b_snap, b_doc) = reserve_ports();

    let node_a = start_node(
        dir_a.path(),
        endpoints(a_snap, a_doc),
        vec![endpoints(b_snap, b_doc)],
    )
    .await;
    let node_b = start_node(
        dir_b.path(),
        endpoints(b_snap, b_doc),
        vec![endpoints(a_snap, a_doc)],
    )
    .await;

    let driver_a = Driver::new(node_a.client_addr());
    let id = driver_a.create_document(&users(), DOC).await.unwrap();
    wait_for_document(node_b.client_addr(), id, DOC, Duration::from_secs(5)).await;

    driver_a.update_document(&users(), id, DOC2).await.unwrap();
    wait_for_document(node_b.client_addr(), id, DOC2, Duration::from_secs(5)).await;

    node_a.shutdown().await;
    node_b.shutdown().await;
}

#[tokio::test]
async fn sweep_reconciles_divergent_replicas_last_writer_wins() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    // Same id on both nodes, different bytes, A strictly newer.
    let id = DocumentId::generate();
    let newer = Timestamp::parse("2024_06_01_00_00_00_000000").unwrap();
    let older = Timestamp::parse("2024_01_01_00_00_00_000000").unwrap();
    {
        let store_a = Store::open(dir_a.path()).await.unwrap();
        store_a
            .get_or_create(&users())
            .await
            .unwrap()
            .create_document(id, DOC, newer)
            .await
            .unwrap();
        let store_b = Store::open(dir_b.path()).await.unwrap();
        store_b
            .get_or_create(&users())
            .await
            .unwrap()
            .create_document(id, DOC2, older)
            .await
            .unwrap();
    }

    let (a_snap, a_doc) = reserve_ports();
    let (b_snap, b_doc) = reserve_ports();
    let node_a = start_node(
        dir_a.path(),
        endpoints(a_snap, a_doc),
        vec![endpoints(b_snap, b_doc)],
    )
    .await;
    let node_b = start_node(
        dir_b.path(),
        endpoints(b_snap, b_doc),
        vec![endpoints(a_snap, a_doc)],
    )
    .await;

    // B converges on A's copy; A keeps it.
    wait_for_document(node_b.client_addr(), id, DOC, Duration::from_secs(10)).await;
    wait_for_document(node_a.client_addr(), id, DOC, Duration::from_secs(5)).await;
    let collection_b = node_b.store().get("users").await.unwrap();
    assert_eq!(collection_b.get_updated_at(id).await.unwrap(), newer);

    node_a.shutdown().await;
    node_b.shutdown().await;
}

#[tokio::test]
async fn equal_fingerprints_cause_no_document_transfer() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    // Byte-identical replicas with identical clocks.
    let id = DocumentId::generate();
    let clock = Timestamp::parse("2024_06_01_00_00_00_000000").unwrap();
    {
        let store_a = Store::open(dir_a.path()).await.unwrap();
        store_a
            .get_or_create(&users())
            .await
            .unwrap()
            .create_document(id, DOC, clock)
            .await
            .unwrap();
        let store_b = Store::open(dir_b.path()).await.unwrap();
        store_b
            .get_or_create(&users())
            .await
            .unwrap()
            .create_document(id, DOC, clock)
            .await
            .unwrap();
    }

    // B answers fingerprint checks; A's document pushes (if any) land on a
    // test-owned listener standing in as the neighbor's document receiver.
    let (b_snap, b_doc) = reserve_ports();
    let node_b = start_node(dir_b.path(), endpoints(b_snap, b_doc), Vec::new()).await;

    let decoy = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let decoy_port = decoy.local_addr().unwrap().port();

    let (a_snap, a_doc) = reserve_ports();
    let node_a = start_node(
        dir_a.path(),
        endpoints(a_snap, a_doc),
        vec![NodeEndpoints {
            snapshot_receiver: localhost(node_b.snapshot_addr().port()),
            document_receiver: localhost(decoy_port),
        }],
    )
    .await;

    // Several sweep rounds happen inside this window; none may open a
    // document connection.
    assert!(
        timeout(Duration::from_millis(1500), decoy.accept()).await.is_err(),
        "document transfer attempted despite equal fingerprints"
    );

    // Control: a real mutation on A must reach the (decoy) receiver, which
    // proves the push path is wired through the very listener we watched.
    let driver_a = Driver::new(node_a.client_addr());
    driver_a.update_document(&users(), id, DOC2).await.unwrap();
    assert!(
        timeout(Duration::from_secs(5), decoy.accept()).await.is_ok(),
        "push path never exercised the watched listener"
    );

    node_a.shutdown().await;
    node_b.shutdown().await;
}
