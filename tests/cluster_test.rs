//! Two-node end-to-end test: both nodes run the real content endpoint on a
//! loopback listener and share one durable registry database, the way a
//! deployed pool shares its metadata store. The nodes are addressed as
//! `127.0.0.1` and `localhost` so their identities stay distinct.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use clusterfs::api;
use clusterfs::cluster::node::{
    NodeDescriptor, NodePool, RandomSelection, Redundancy, Scheme,
};
use clusterfs::config::Config;
use clusterfs::engine::Engine;
use clusterfs::error::ClusterError;
use clusterfs::registry::RegistryManager;
use clusterfs::registry::cache::MokaRegistryCache;
use clusterfs::registry::record::FileRecord;
use clusterfs::registry::store::SqliteRegistryStore;
use clusterfs::session::{FileSession, OpenMode, SessionStatus};
use clusterfs::transfer::PeerTransfer;
use clusterfs::utils::state::AppState;

const NODE_A: &str = "127.0.0.1";
const NODE_B: &str = "localhost";

struct TestNode {
    engine: Arc<Engine>,
    root: tempfile::TempDir,
}

async fn spawn_node(
    identity: &str,
    listener: tokio::net::TcpListener,
    members: &[(String, u16)],
    db_url: &str,
    redundancy: Redundancy,
) -> TestNode {
    let root = tempfile::tempdir().unwrap();

    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(db_url)
        .await
        .unwrap();
    SqliteRegistryStore::ensure_schema(&db).await.unwrap();

    let mut pool = NodePool::new(
        identity,
        Scheme::Http,
        redundancy,
        Arc::new(RandomSelection),
    );
    for (member, port) in members {
        pool.add_node(NodeDescriptor::new(member.clone(), *port, "", "/"));
    }

    let registry = RegistryManager::new(
        Arc::new(MokaRegistryCache::new(1024, format!("{identity}/"))),
        Arc::new(SqliteRegistryStore::new(Arc::new(db))),
        identity,
        Duration::ZERO,
    );
    let engine = Arc::new(
        Engine::new(
            pool,
            registry,
            PeerTransfer::new(Scheme::Http),
            root.path().to_path_buf(),
            0o644,
        )
        .unwrap(),
    );

    let config = Config {
        host: "127.0.0.1".to_string(),
        port: listener.local_addr().unwrap().port(),
        identity: identity.to_string(),
        root: root.path().to_path_buf(),
        db_url: db_url.to_string(),
        cache_prefix: format!("{identity}/"),
        cache_capacity: 1024,
        redundancy,
        scheme: Scheme::Http,
        peers: Vec::new(),
        reconcile_interval: Duration::ZERO,
        file_mode: 0o644,
    };
    let state = Arc::new(AppState::new(engine.clone(), Arc::new(config)));
    let app = api::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestNode { engine, root }
}

async fn two_node_pool(redundancy: Redundancy) -> (TestNode, TestNode) {
    let listener_a = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener_b = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port_a = listener_a.local_addr().unwrap().port();
    let port_b = listener_b.local_addr().unwrap().port();
    let members = vec![(NODE_A.to_string(), port_a), (NODE_B.to_string(), port_b)];

    let db_dir = tempfile::tempdir().unwrap();
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        db_dir.path().join("registry.db").display()
    );
    // Keep the database directory alive for the whole test.
    std::mem::forget(db_dir);

    let node_a = spawn_node(NODE_A, listener_a, &members, &db_url, redundancy).await;
    let node_b = spawn_node(NODE_B, listener_b, &members, &db_url, redundancy).await;
    (node_a, node_b)
}

fn identities(nodes: &BTreeSet<String>) -> Vec<&str> {
    nodes.iter().map(String::as_str).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn write_on_one_node_replicates_to_the_peer() {
    let (node_a, node_b) = two_node_pool(Redundancy::Count(2)).await;
    let content = b"replicated payload ".repeat(512);

    let mut session = FileSession::open(node_a.engine.clone(), "a/1.bin", OpenMode::Write).await.unwrap();
    assert_eq!(session.status(), SessionStatus::New);
    session.write(&content).await.unwrap();
    session.close().await.unwrap();

    // The push recipient registered itself, so the durable record lists
    // both nodes.
    let record = node_b
        .engine
        .registry()
        .lookup("a/1.bin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identities(&record.nodes), vec![NODE_A, NODE_B]);

    // The replica landed on B's local disk, byte for byte.
    let replica = tokio::fs::read(node_b.root.path().join("a/1.bin"))
        .await
        .unwrap();
    assert_eq!(replica, content);

    // B holds a copy, so its open is purely local.
    let mut session = FileSession::open(node_b.engine.clone(), "a/1.bin", OpenMode::Read).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Open);
    let mut read_back = Vec::new();
    session.read_to_end(&mut read_back).await.unwrap();
    assert_eq!(read_back, content);
    session.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn a_node_missing_the_content_pulls_it_from_a_holder() {
    let (node_a, node_b) = two_node_pool(Redundancy::Count(1)).await;
    let content = b"pull me over";

    // Redundancy 1: the write stays on A only.
    let mut session = FileSession::open(node_a.engine.clone(), "b/2.bin", OpenMode::Write).await.unwrap();
    session.write(content).await.unwrap();
    session.close().await.unwrap();
    assert!(!node_b.root.path().join("b/2.bin").exists());

    let record = node_b
        .engine
        .registry()
        .lookup("b/2.bin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identities(&record.nodes), vec![NODE_A]);

    // B opens the path: content is fetched from A and B joins the record.
    let mut session = FileSession::open(node_b.engine.clone(), "b/2.bin", OpenMode::Read).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Open);
    let mut read_back = Vec::new();
    session.read_to_end(&mut read_back).await.unwrap();
    assert_eq!(read_back, content);
    session.close().await.unwrap();

    assert!(node_b.root.path().join("b/2.bin").exists());
    let record = node_b
        .engine
        .registry()
        .lookup("b/2.bin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identities(&record.nodes), vec![NODE_A, NODE_B]);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_listed_node_with_a_missing_file_refetches() {
    let (node_a, node_b) = two_node_pool(Redundancy::Count(2)).await;
    let content = b"come back";

    let mut session = FileSession::open(node_a.engine.clone(), "c/3.bin", OpenMode::Write).await.unwrap();
    session.write(content).await.unwrap();
    session.close().await.unwrap();

    // Simulate B losing its replica and its warm cache entry.
    tokio::fs::remove_file(node_b.root.path().join("c/3.bin"))
        .await
        .unwrap();
    node_b.engine.registry().unregister("c/3.bin").await.unwrap();

    let mut session = FileSession::open(node_b.engine.clone(), "c/3.bin", OpenMode::Read).await.unwrap();
    let mut read_back = Vec::new();
    session.read_to_end(&mut read_back).await.unwrap();
    assert_eq!(read_back, content);
    session.close().await.unwrap();
    assert!(node_b.root.path().join("c/3.bin").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn unlink_clears_the_registry_but_leaves_remote_orphans() {
    let (node_a, node_b) = two_node_pool(Redundancy::Count(2)).await;

    let mut session = FileSession::open(node_a.engine.clone(), "d/4.bin", OpenMode::Write).await.unwrap();
    session.write(b"short-lived").await.unwrap();
    session.close().await.unwrap();
    assert!(node_b.root.path().join("d/4.bin").exists());

    node_a.engine.unlink("d/4.bin").await.unwrap();

    assert_eq!(
        node_a.engine.registry().lookup("d/4.bin").await.unwrap(),
        None
    );
    assert!(!node_a.root.path().join("d/4.bin").exists());
    assert!(matches!(
        node_a.engine.stat("d/4.bin").await.unwrap_err(),
        ClusterError::NotFound(_)
    ));

    // Remote copies are not chased: B's file is now orphaned.
    assert!(node_b.root.path().join("d/4.bin").exists());

    // A re-open behaves as a brand-new file.
    let session = FileSession::open(node_a.engine.clone(), "d/4.bin", OpenMode::Write).await.unwrap();
    assert_eq!(session.status(), SessionStatus::New);
}

#[tokio::test(flavor = "multi_thread")]
async fn redundancy_all_reaches_every_peer() {
    let (node_a, node_b) = two_node_pool(Redundancy::All).await;

    let mut session = FileSession::open(node_a.engine.clone(), "e/5.bin", OpenMode::Write).await.unwrap();
    session.write(b"everywhere").await.unwrap();
    session.close().await.unwrap();

    assert!(node_b.root.path().join("e/5.bin").exists());
    let record = node_a
        .engine
        .registry()
        .lookup("e/5.bin")
        .await
        .unwrap()
        .unwrap();
    assert!(record.holds(NODE_A));
}

#[tokio::test(flavor = "multi_thread")]
async fn an_empty_node_set_fails_the_open_with_source_unavailable() {
    let (node_a, _node_b) = two_node_pool(Redundancy::Count(2)).await;

    node_a
        .engine
        .registry()
        .persist("f/6.bin", Some(&FileRecord::new("f/6.bin")))
        .await
        .unwrap();

    let err = FileSession::open(node_a.engine.clone(), "f/6.bin", OpenMode::Write)
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::SourceUnavailable(_)));
    assert!(!node_a.root.path().join("f/6.bin").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn a_pull_from_an_unreachable_peer_fails_the_open_cleanly() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port_a = listener.local_addr().unwrap().port();
    // Reserve a port for B and drop it so the peer is genuinely dead.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port_b = dead.local_addr().unwrap().port();
    drop(dead);

    let members = vec![(NODE_A.to_string(), port_a), (NODE_B.to_string(), port_b)];
    let db_dir = tempfile::tempdir().unwrap();
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        db_dir.path().join("registry.db").display()
    );
    let node_a = spawn_node(NODE_A, listener, &members, &db_url, Redundancy::Count(1)).await;

    // The registry claims the dead peer holds the file.
    let mut record = FileRecord::new("g/7.bin");
    record.nodes.insert(NODE_B.to_string());
    node_a
        .engine
        .registry()
        .persist("g/7.bin", Some(&record))
        .await
        .unwrap();

    let err = FileSession::open(node_a.engine.clone(), "g/7.bin", OpenMode::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::PeerUnreachable { .. }));
    // The partial local file was discarded.
    assert!(!node_a.root.path().join("g/7.bin").exists());
}
