//! HTTP request/response schemas
//!
//! Wire types for the control plane API. Enrollment types live in
//! [`crate::enrollment`] next to the service that owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::ConnectionStatus;

/// Connection authorization request
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionRequest {
    /// Device requesting the connection
    pub device_id: String,
    /// User requesting the connection
    pub user_id: String,
    /// Target service name
    pub service_name: String,
}

/// Health report submitted by a device
#[derive(Debug, Clone, Deserialize)]
pub struct HealthReportRequest {
    /// Reporting device
    pub device_id: String,
    /// Overall health status (healthy, degraded, unhealthy)
    #[serde(default = "default_health_status")]
    pub status: String,
    /// CPU usage percentage
    #[serde(default)]
    pub cpu_usage: Option<f64>,
    /// Memory usage percentage
    #[serde(default)]
    pub memory_usage: Option<f64>,
    /// Disk usage percentage
    #[serde(default)]
    pub disk_usage: Option<f64>,
    /// OS patches up to date
    #[serde(default)]
    pub os_patches_current: Option<bool>,
    /// Antivirus enabled
    #[serde(default)]
    pub antivirus_enabled: Option<bool>,
    /// Disk encrypted
    #[serde(default)]
    pub disk_encrypted: Option<bool>,
    /// Free-form metric bag
    #[serde(default)]
    pub metrics: Option<Value>,
}

fn default_health_status() -> String {
    "healthy".to_string()
}

/// Health report confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReportResponse {
    /// Confirmation message
    pub message: String,
    /// Device that sent the report
    pub device_id: String,
}

/// Administrative user creation request
#[derive(Debug, Clone, Deserialize)]
pub struct UserCreateRequest {
    /// Unique user identifier
    pub user_id: String,
    /// Associated device identifier
    pub device_id: String,
    /// Display name
    pub full_name: String,
    /// Unique email address
    pub email: String,
    /// Role, interpreted by the policy engine
    pub role: String,
}

/// Query filters for connection listing; compose conjunctively
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionListQuery {
    /// Only connections for this device
    pub device_id: Option<String>,
    /// Only connections for this user
    pub user_id: Option<String>,
    /// Only connections in this state
    pub status: Option<ConnectionStatus>,
}

/// Termination confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationResponse {
    /// Confirmation message
    pub message: String,
    /// Terminated connection identifier
    pub connection_id: String,
    /// Termination timestamp
    pub terminated_at: DateTime<Utc>,
}
