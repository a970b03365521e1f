//! End-to-end HTTP API tests
//!
//! Serve the real router over a loopback listener with a fake policy engine
//! behind it, and pin the status-code contract of every endpoint.

use std::sync::{Arc, OnceLock};

use axum::{Json, Router, routing::post};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use edgemesh_control::authz::AuthorizationPipeline;
use edgemesh_control::config::Config;
use edgemesh_control::connections::ConnectionManager;
use edgemesh_control::enrollment::EnrollmentService;
use edgemesh_control::policy::PolicyClient;
use edgemesh_control::server::{AppState, create_router};
use edgemesh_control::store::MemoryStore;

/// One recorder per test process; every server instance shares the handle.
fn metrics_handle() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| PrometheusBuilder::new().install_recorder().unwrap())
        .clone()
}

/// Spawn a fake policy engine that always answers `response`.
async fn spawn_engine(response: Value) -> String {
    let response = Arc::new(response);
    let app = Router::new().route(
        "/v1/data/edgemesh/authz/allow",
        post(move |Json(_body): Json<Value>| {
            let response = Arc::clone(&response);
            async move { Json((*response).clone()) }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Spawn the control plane against the given policy engine URL.
async fn spawn_server(policy_url: &str) -> String {
    let mut config = Config::default();
    config.policy.url = policy_url.to_string();

    let store = Arc::new(MemoryStore::new());
    let policy = Arc::new(PolicyClient::new(&config.policy).unwrap());
    let state = Arc::new(AppState {
        pipeline: AuthorizationPipeline::new(
            Arc::clone(&store) as _,
            Arc::clone(&policy) as _,
            &config,
        ),
        connections: ConnectionManager::new(Arc::clone(&store) as _),
        enrollment: EnrollmentService::new(Arc::clone(&store) as _, &config.enrollment).unwrap(),
        store,
        metrics_handle: metrics_handle(),
    });

    let app = create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn enroll_device(client: &reqwest::Client, base: &str, device_id: &str) {
    let response = client
        .post(format!("{base}/api/v1/enroll"))
        .json(&json!({
            "device_id": device_id,
            "device_type": "laptop",
            "enrollment_token": "change-me-in-production"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

async fn create_user(client: &reqwest::Client, base: &str, user_id: &str, device_id: &str) {
    let response = client
        .post(format!("{base}/api/v1/users"))
        .json(&json!({
            "user_id": user_id,
            "device_id": device_id,
            "full_name": "Alice Example",
            "email": format!("{user_id}@example.com"),
            "role": "developer"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

async fn report_health(client: &reqwest::Client, base: &str, device_id: &str) {
    let response = client
        .post(format!("{base}/api/v1/health"))
        .json(&json!({
            "device_id": device_id,
            "cpu_usage": 30.0,
            "os_patches_current": true,
            "antivirus_enabled": true,
            "disk_encrypted": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Health report received");
}

#[tokio::test]
async fn liveness_and_root() {
    let engine = spawn_engine(json!({"result": true})).await;
    let base = spawn_server(&engine).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let root: Value = client
        .get(format!("{base}/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(root["service"], "edgemesh-control");
}

#[tokio::test]
async fn full_connection_flow() {
    let engine = spawn_engine(json!({"result": {"allowed": true, "decision": "allow"}})).await;
    let base = spawn_server(&engine).await;
    let client = reqwest::Client::new();

    enroll_device(&client, &base, "d1").await;
    create_user(&client, &base, "u1", "d1").await;
    report_health(&client, &base, "d1").await;

    // Authorize
    let response = client
        .post(format!("{base}/api/v1/connections/request"))
        .json(&json!({"device_id": "d1", "user_id": "u1", "service_name": "database"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let grant: Value = response.json().await.unwrap();
    assert_eq!(grant["status"], "authorized");
    assert_eq!(grant["virtual_tunnel"]["type"], "wireguard");
    assert_eq!(
        grant["virtual_tunnel"]["endpoint"],
        "wg://database.edgemesh.local"
    );
    let connection_id = grant["connection_id"].as_str().unwrap().to_string();

    // Fetch and list
    let fetched: Value = client
        .get(format!("{base}/api/v1/connections/{connection_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["status"], "established");

    let listed: Value = client
        .get(format!("{base}/api/v1/connections?device_id=d1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Terminate once: 200
    let response = client
        .delete(format!("{base}/api/v1/connections/{connection_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Connection terminated");

    // Terminate twice: 400
    let response = client
        .delete(format!("{base}/api/v1/connections/{connection_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Connection already terminated");
}

#[tokio::test]
async fn policy_deny_is_403() {
    let engine = spawn_engine(json!({"result": {"allowed": false, "decision": "deny"}})).await;
    let base = spawn_server(&engine).await;
    let client = reqwest::Client::new();

    enroll_device(&client, &base, "d1").await;
    create_user(&client, &base, "u1", "d1").await;
    report_health(&client, &base, "d1").await;

    let response = client
        .post(format!("{base}/api/v1/connections/request"))
        .json(&json!({"device_id": "d1", "user_id": "u1", "service_name": "database"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Access denied by policy");
}

#[tokio::test]
async fn unknown_device_is_404() {
    let engine = spawn_engine(json!({"result": true})).await;
    let base = spawn_server(&engine).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/v1/connections/request"))
        .json(&json!({"device_id": "ghost", "user_id": "u1", "service_name": "database"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Device not found");
}

#[tokio::test]
async fn missing_health_data_is_503() {
    let engine = spawn_engine(json!({"result": true})).await;
    let base = spawn_server(&engine).await;
    let client = reqwest::Client::new();

    enroll_device(&client, &base, "d1").await;
    create_user(&client, &base, "u1", "d1").await;

    let response = client
        .post(format!("{base}/api/v1/connections/request"))
        .json(&json!({"device_id": "d1", "user_id": "u1", "service_name": "database"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn bad_enrollment_token_is_401_and_duplicate_is_409() {
    let engine = spawn_engine(json!({"result": true})).await;
    let base = spawn_server(&engine).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/v1/enroll"))
        .json(&json!({
            "device_id": "d1",
            "device_type": "laptop",
            "enrollment_token": "wrong"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    enroll_device(&client, &base, "d1").await;
    let response = client
        .post(format!("{base}/api/v1/enroll"))
        .json(&json!({
            "device_id": "d1",
            "device_type": "laptop",
            "enrollment_token": "change-me-in-production"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn health_report_for_unknown_device_is_404() {
    let engine = spawn_engine(json!({"result": true})).await;
    let base = spawn_server(&engine).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/v1/health"))
        .json(&json!({"device_id": "ghost"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn unreachable_policy_engine_denies_with_403() {
    // No engine behind this address
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let base = spawn_server(&format!("http://{addr}")).await;
    let client = reqwest::Client::new();

    enroll_device(&client, &base, "d1").await;
    create_user(&client, &base, "u1", "d1").await;
    report_health(&client, &base, "d1").await;

    let response = client
        .post(format!("{base}/api/v1/connections/request"))
        .json(&json!({"device_id": "d1", "user_id": "u1", "service_name": "database"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Nothing was established
    let listed: Value = client
        .get(format!("{base}/api/v1/connections"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let engine = spawn_engine(json!({"result": true})).await;
    let base = spawn_server(&engine).await;
    let client = reqwest::Client::new();

    enroll_device(&client, &base, "d-metrics").await;

    let body = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("edgemesh_device_enrollments_total"));
}
