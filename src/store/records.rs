//! Entity records
//!
//! Plain data structs for the five record types the store owns. The
//! authorization pipeline reads and writes these only through the repository
//! traits in [`crate::store`] and never caches them across requests.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An enrolled device holding a control-plane-issued certificate identity.
///
/// `device_id` and `certificate_serial` are each globally unique. Devices are
/// created once at enrollment and never deleted; `status` may be mutated by
/// administrative action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Unique device identifier
    pub device_id: String,
    /// Type of device (laptop, server, iot, ...)
    pub device_type: String,
    /// Unique certificate serial (hex)
    pub certificate_serial: String,
    /// Device certificate (PEM)
    pub certificate_pem: String,
    /// Operating system name
    pub os: Option<String>,
    /// Operating system version
    pub os_version: Option<String>,
    /// Device status; only the literal "active" authorizes connections
    pub status: String,
    /// Enrollment timestamp
    pub enrolled_at: DateTime<Utc>,
    /// Last time the device was seen
    pub last_seen: Option<DateTime<Utc>>,
}

/// A principal that can request connections.
///
/// Created administratively; immutable during the authorization flow. The
/// associated `device_id` is informational and is not an authorization gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
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
    /// User status (not checked by the authorization pipeline)
    pub status: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A point-in-time device posture sample.
///
/// Append-only; the "current" health for a device is the row with the newest
/// `reported_at`. `id` is assigned by the store on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Store-assigned row id
    pub id: i64,
    /// Reporting device
    pub device_id: String,
    /// Overall health label (healthy, degraded, unhealthy)
    pub status: String,
    /// CPU usage percentage
    pub cpu_usage: Option<f64>,
    /// Memory usage percentage
    pub memory_usage: Option<f64>,
    /// Disk usage percentage
    pub disk_usage: Option<f64>,
    /// OS patches up to date
    pub os_patches_current: Option<bool>,
    /// Antivirus enabled
    pub antivirus_enabled: Option<bool>,
    /// Disk encrypted
    pub disk_encrypted: Option<bool>,
    /// Free-form metric bag
    pub metrics: Option<Value>,
    /// Report timestamp
    pub reported_at: DateTime<Utc>,
}

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Authorized and active
    Established,
    /// Terminated; terminal state
    Terminated,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Established => write!(f, "established"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "established" => Ok(Self::Established),
            "terminated" => Ok(Self::Terminated),
            other => Err(format!("unknown connection status: {other}")),
        }
    }
}

/// An authorization grant record (not a live network tunnel).
///
/// Created only as the side effect of an allow decision. `terminated_at` is
/// non-null iff `status` is terminated, and the established → terminated
/// transition happens exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Unique connection identifier (generated at grant time)
    pub connection_id: String,
    /// Device the grant was issued to
    pub device_id: String,
    /// User the grant was issued to
    pub user_id: String,
    /// Target service
    pub service_name: String,
    /// Lifecycle state
    pub status: ConnectionStatus,
    /// Grant creation timestamp
    pub established_at: DateTime<Utc>,
    /// Termination timestamp, set exactly once
    pub terminated_at: Option<DateTime<Utc>>,
}

/// Immutable decision-trail row.
///
/// Written for every authorization attempt regardless of outcome, before the
/// HTTP response is produced. `id` is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    /// Store-assigned auto-incrementing id
    pub id: i64,
    /// Event type (e.g. `connection_request`)
    pub event_type: String,
    /// Action performed (e.g. `request_connection`)
    pub action: String,
    /// Decision outcome ("allow" or "deny")
    pub decision: String,
    /// Referenced device, when applicable
    pub device_id: Option<String>,
    /// Referenced user, when applicable
    pub user_id: Option<String>,
    /// Referenced service, when applicable
    pub service_name: Option<String>,
    /// Free-text reason
    pub reason: Option<String>,
    /// Policy version tag
    pub policy_version: Option<String>,
    /// Structured payload; retains the raw policy response for forensic replay
    pub extra_data: Option<Value>,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
}
