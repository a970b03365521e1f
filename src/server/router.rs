//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};
use tracing::debug;

use super::schemas::{
    ConnectionListQuery, ConnectionRequest, HealthReportRequest, HealthReportResponse,
    TerminationResponse, UserCreateRequest,
};
use crate::authz::{AuthorizationPipeline, ConnectionGrant};
use crate::connections::ConnectionManager;
use crate::enrollment::{EnrollmentRequest, EnrollmentResponse, EnrollmentService};
use crate::metrics;
use crate::store::{
    Connection, ConnectionFilter, DeviceStore, EntityStore, HealthCheck, HealthStore, User,
    UserStore,
};
use crate::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Connection authorization pipeline
    pub pipeline: AuthorizationPipeline,
    /// Connection lifecycle manager
    pub connections: ConnectionManager,
    /// Device enrollment service
    pub enrollment: EnrollmentService,
    /// Entity store, used directly by the health and user handlers
    pub store: Arc<dyn EntityStore>,
    /// Prometheus render handle backing `/metrics`
    pub metrics_handle: PrometheusHandle,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/enroll", post(enroll_handler))
        .route("/api/v1/users", post(create_user_handler))
        .route("/api/v1/health", post(health_report_handler))
        .route("/api/v1/connections/request", post(request_connection_handler))
        .route(
            "/api/v1/connections",
            get(list_connections_handler),
        )
        .route(
            "/api/v1/connections/{id}",
            get(get_connection_handler).delete(terminate_connection_handler),
        )
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - service identity
async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "edgemesh-control",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// GET /healthz - liveness probe
async fn healthz_handler() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// GET /metrics - Prometheus exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

/// POST /api/v1/enroll - enroll a device and issue its certificate
async fn enroll_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnrollmentRequest>,
) -> Result<Json<EnrollmentResponse>> {
    let response = state.enrollment.enroll(request).await?;
    Ok(Json(response))
}

/// POST /api/v1/users - register a user
async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserCreateRequest>,
) -> Result<Json<User>> {
    let user = state
        .store
        .insert_user(User {
            user_id: request.user_id,
            device_id: request.device_id,
            full_name: request.full_name,
            email: request.email,
            role: request.role,
            status: "active".to_string(),
            created_at: Utc::now(),
        })
        .await?;
    Ok(Json(user))
}

/// POST /api/v1/health - record a device health report
async fn health_report_handler(
    State(state): State<Arc<AppState>>,
    Json(report): Json<HealthReportRequest>,
) -> Result<Json<HealthReportResponse>> {
    // Reject reports from unknown devices
    state
        .store
        .device_by_id(&report.device_id)
        .await?
        .ok_or(Error::NotFound("Device"))?;

    let now = Utc::now();
    state
        .store
        .insert_health_check(HealthCheck {
            id: 0,
            device_id: report.device_id.clone(),
            status: report.status,
            cpu_usage: report.cpu_usage,
            memory_usage: report.memory_usage,
            disk_usage: report.disk_usage,
            os_patches_current: report.os_patches_current,
            antivirus_enabled: report.antivirus_enabled,
            disk_encrypted: report.disk_encrypted,
            metrics: report.metrics,
            reported_at: now,
        })
        .await?;
    state.store.touch_device(&report.device_id, now).await?;

    metrics::record_health_check();
    debug!(device_id = %report.device_id, "Health report received");

    Ok(Json(HealthReportResponse {
        message: "Health report received".to_string(),
        device_id: report.device_id,
    }))
}

/// POST /api/v1/connections/request - run the authorization pipeline
async fn request_connection_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConnectionRequest>,
) -> Result<Json<ConnectionGrant>> {
    let grant = state
        .pipeline
        .request_connection(&request.device_id, &request.user_id, &request.service_name)
        .await?;
    Ok(Json(grant))
}

/// GET /api/v1/connections - list connections, newest first
async fn list_connections_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectionListQuery>,
) -> Result<Json<Vec<Connection>>> {
    let filter = ConnectionFilter {
        device_id: query.device_id,
        user_id: query.user_id,
        status: query.status,
    };
    let connections = state.connections.list(&filter).await?;
    Ok(Json(connections))
}

/// GET /api/v1/connections/{id} - fetch a connection
async fn get_connection_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Connection>> {
    let connection = state.connections.get(&id).await?;
    Ok(Json(connection))
}

/// DELETE /api/v1/connections/{id} - terminate a connection
async fn terminate_connection_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TerminationResponse>> {
    let connection = state.connections.terminate(&id).await?;
    Ok(Json(TerminationResponse {
        message: "Connection terminated".to_string(),
        connection_id: connection.connection_id,
        terminated_at: connection
            .terminated_at
            .ok_or_else(|| Error::Internal("Terminated connection missing timestamp".to_string()))?,
    }))
}
