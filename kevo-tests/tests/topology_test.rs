/// Topology discovery tests for the Kevo client
///
/// Node roles, capability negotiation with servers that do not report
/// topology, and routing decisions derived from node info.

use kevo_client::{NodeInfo, NodeRole, OperationKind, ReplicaInfo, Route};
use kevo_test_utils::{seed, TestServer};
use std::collections::HashMap;

fn replica(address: &str, available: bool, last_sequence: u64, region: Option<&str>) -> ReplicaInfo {
    ReplicaInfo {
        address: address.to_string(),
        available,
        last_sequence,
        region: region.map(str::to_string),
        meta: HashMap::new(),
    }
}

#[tokio::test]
async fn test_standalone_by_default() {
    let server = TestServer::new();
    let client = server.client().await;
    seed(&client, &[("a", "1"), ("b", "2")]).await;

    let info = client.get_node_info().await.unwrap().unwrap();
    assert_eq!(info.role, NodeRole::Standalone);
    assert!(info.replicas.is_empty());
    assert_eq!(info.last_sequence, 2);
    assert!(info.accepts_writes());
}

#[tokio::test]
async fn test_node_info_is_fresh_unless_cached() {
    let server = TestServer::new();
    let client = server.client().await;
    let router = client.topology().unwrap();

    let before = router.get_node_info().await.unwrap().unwrap();
    client.put(b"k", b"v", false).await.unwrap();
    let after = router.get_node_info().await.unwrap().unwrap();
    assert_eq!(after.last_sequence, before.last_sequence + 1);

    let cached = router.cached_node_info().await.unwrap().unwrap();
    client.put(b"k", b"w", false).await.unwrap();
    let still_cached = router.cached_node_info().await.unwrap().unwrap();
    assert_eq!(cached, still_cached);
    assert_eq!(server.store.call_count("GetNodeInfo"), 3);
}

#[tokio::test]
async fn test_unsupported_topology_is_decided_once() {
    let server = TestServer::new();
    server.store.disable_node_info();
    let client = server.client().await;

    assert_eq!(client.get_node_info().await.unwrap(), None);
    assert_eq!(client.get_node_info().await.unwrap(), None);
    assert_eq!(client.topology().unwrap().role().await.unwrap(), NodeRole::Standalone);
    assert_eq!(server.store.call_count("GetNodeInfo"), 1);

    // A new connection negotiates again
    client.close().await.unwrap();
    client.connect().await.unwrap();
    assert_eq!(client.get_node_info().await.unwrap(), None);
    assert_eq!(server.store.call_count("GetNodeInfo"), 2);
}

#[tokio::test]
async fn test_primary_reports_replicas() {
    let server = TestServer::new();
    server.store.set_node_info(NodeInfo {
        role: NodeRole::Primary,
        replicas: vec![
            replica("10.0.0.2:50051", true, 95, Some("eu-west")),
            replica("10.0.0.3:50051", false, 99, None),
            replica("10.0.0.4:50051", true, 97, Some("us-east")),
        ],
        primary_address: None,
        last_sequence: 100,
        read_only: false,
    });
    let client = server.client().await;
    let router = client.topology().unwrap();

    let info = router.get_node_info().await.unwrap().unwrap();
    assert_eq!(info.role, NodeRole::Primary);
    assert_eq!(info.replicas.len(), 3);
    assert_eq!(info.available_replicas().count(), 2);
    assert_eq!(info.replicas[0].region.as_deref(), Some("eu-west"));

    assert_eq!(
        router.route(OperationKind::Read).await.unwrap(),
        Route::Replica("10.0.0.4:50051".to_string())
    );
    assert_eq!(router.route(OperationKind::Write).await.unwrap(), Route::Current);
}

#[tokio::test]
async fn test_replica_routes_writes_to_primary() {
    let server = TestServer::new();
    server.store.set_node_info(NodeInfo {
        role: NodeRole::Replica,
        replicas: Vec::new(),
        primary_address: Some("10.0.0.1:50051".to_string()),
        last_sequence: 80,
        read_only: true,
    });
    let client = server.client().await;
    let router = client.topology().unwrap();

    assert_eq!(router.role().await.unwrap(), NodeRole::Replica);
    assert_eq!(
        router.route(OperationKind::Write).await.unwrap(),
        Route::Primary("10.0.0.1:50051".to_string())
    );
    assert_eq!(router.route(OperationKind::Read).await.unwrap(), Route::Current);
}

#[tokio::test]
async fn test_topology_requires_connection() {
    let server = TestServer::new();
    let client = server.client_with(server.options());

    assert!(client.topology().is_err());
    assert_eq!(server.store.total_calls(), 0);
}
