//! Connection lifecycle tests
//!
//! Pin the established → terminated state machine: the transition happens
//! exactly once, termination is not idempotent, and reads never mutate.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use edgemesh_control::Error;
use edgemesh_control::connections::ConnectionManager;
use edgemesh_control::store::{
    Connection, ConnectionFilter, ConnectionStatus, ConnectionStore, MemoryStore,
};

fn connection(id: &str, device_id: &str, user_id: &str, service: &str) -> Connection {
    Connection {
        connection_id: id.to_string(),
        device_id: device_id.to_string(),
        user_id: user_id.to_string(),
        service_name: service.to_string(),
        status: ConnectionStatus::Established,
        established_at: Utc::now(),
        terminated_at: None,
    }
}

async fn manager_with(connections: Vec<Connection>) -> (ConnectionManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for c in connections {
        store.insert_connection(c).await.unwrap();
    }
    (ConnectionManager::new(Arc::clone(&store) as _), store)
}

#[tokio::test]
async fn get_returns_stored_connection() {
    let (manager, _store) = manager_with(vec![connection("c1", "d1", "u1", "database")]).await;

    let fetched = manager.get("c1").await.unwrap();
    assert_eq!(fetched.connection_id, "c1");
    assert_eq!(fetched.status, ConnectionStatus::Established);
}

#[tokio::test]
async fn get_unknown_is_not_found() {
    let (manager, _store) = manager_with(vec![]).await;
    let err = manager.get("ghost").await.unwrap_err();
    assert!(matches!(err, Error::NotFound("Connection")));
}

#[tokio::test]
async fn terminate_sets_status_and_timestamp() {
    let (manager, store) = manager_with(vec![connection("c1", "d1", "u1", "database")]).await;

    let terminated = manager.terminate("c1").await.unwrap();
    assert_eq!(terminated.status, ConnectionStatus::Terminated);
    assert!(terminated.terminated_at.is_some());

    let stored = store.connection_by_id("c1").await.unwrap().unwrap();
    assert_eq!(stored.status, ConnectionStatus::Terminated);
}

/// Termination is not idempotent: the second attempt is rejected and the
/// original termination timestamp survives.
#[tokio::test]
async fn second_termination_is_rejected() {
    let (manager, store) = manager_with(vec![connection("c1", "d1", "u1", "database")]).await;

    let first = manager.terminate("c1").await.unwrap();
    let err = manager.terminate("c1").await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    let stored = store.connection_by_id("c1").await.unwrap().unwrap();
    assert_eq!(stored.terminated_at, first.terminated_at);
}

#[tokio::test]
async fn terminate_unknown_is_not_found() {
    let (manager, _store) = manager_with(vec![]).await;
    let err = manager.terminate("ghost").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

/// Listing filters by device, user, and status, conjunctively.
#[tokio::test]
async fn list_filters_compose() {
    let (manager, _store) = manager_with(vec![
        connection("c1", "d1", "u1", "database"),
        connection("c2", "d1", "u2", "git"),
        connection("c3", "d2", "u1", "database"),
    ])
    .await;

    manager.terminate("c2").await.unwrap();

    let d1_established = manager
        .list(&ConnectionFilter {
            device_id: Some("d1".to_string()),
            status: Some(ConnectionStatus::Established),
            ..ConnectionFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(d1_established.len(), 1);
    assert_eq!(d1_established[0].connection_id, "c1");

    let u1 = manager
        .list(&ConnectionFilter {
            user_id: Some("u1".to_string()),
            ..ConnectionFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(u1.len(), 2);

    let terminated = manager
        .list(&ConnectionFilter {
            status: Some(ConnectionStatus::Terminated),
            ..ConnectionFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(terminated.len(), 1);
    assert_eq!(terminated[0].connection_id, "c2");
}

/// A terminated connection remains readable with its full history.
#[tokio::test]
async fn terminated_connection_remains_readable() {
    let (manager, _store) = manager_with(vec![connection("c1", "d1", "u1", "database")]).await;
    let established_at = manager.get("c1").await.unwrap().established_at;

    manager.terminate("c1").await.unwrap();

    let fetched = manager.get("c1").await.unwrap();
    assert_eq!(fetched.established_at, established_at);
    assert!(fetched.terminated_at.unwrap() + Duration::seconds(1) > Utc::now());
}
