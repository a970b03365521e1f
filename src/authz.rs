//! Authorization pipeline
//!
//! Orchestrates the per-connection decision: ordered validation gates
//! (device identity and state, user identity, health presence and freshness),
//! policy-input construction, the fail-closed policy evaluation, and the
//! audit/metrics/connection persistence that follows the decision.
//!
//! The pipeline is stateless per request: entity state is read through the
//! store traits on every call and never cached, and no store lock is held
//! across the remote policy call; the decision is evaluated first and
//! persisted afterward.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::metrics;
use crate::policy::{
    DeviceContext, PolicyEvaluator, PolicyInput, ServiceContext, TimeContext, UserContext,
};
use crate::store::{
    AuditLog, AuditStore, Connection, ConnectionStatus, ConnectionStore, Device, DeviceStore,
    EntityStore, HealthCheck, HealthStore, User, UserStore,
};
use crate::{Error, Result};

/// Granted connection, returned on an allow decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionGrant {
    /// Unique connection identifier
    pub connection_id: String,
    /// Always "authorized"
    pub status: String,
    /// Target service
    pub service_name: String,
    /// Opaque transport metadata associated with the grant
    pub virtual_tunnel: VirtualTunnel,
}

/// Virtual tunnel descriptor.
///
/// Non-normative transport metadata: only its presence and association with
/// the connection id is contractual. The content describes a notional
/// WireGuard binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualTunnel {
    /// Tunnel type
    #[serde(rename = "type")]
    pub tunnel_type: String,
    /// Target endpoint, derived from the service name
    pub endpoint: String,
    /// Placeholder peer key
    pub public_key: String,
    /// Placeholder allowed ranges
    pub allowed_ips: Vec<String>,
}

impl VirtualTunnel {
    fn for_service(service_name: &str) -> Self {
        Self {
            tunnel_type: "wireguard".to_string(),
            endpoint: format!("wg://{service_name}.edgemesh.local"),
            public_key: "mock-public-key".to_string(),
            allowed_ips: vec!["10.0.0.0/8".to_string()],
        }
    }
}

/// The connection-authorization pipeline.
pub struct AuthorizationPipeline {
    store: Arc<dyn EntityStore>,
    policy: Arc<dyn PolicyEvaluator>,
    health_max_age: Duration,
    policy_version: String,
}

impl AuthorizationPipeline {
    /// Create a pipeline over the given store and policy evaluator.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        policy: Arc<dyn PolicyEvaluator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            policy,
            health_max_age: Duration::from_std(config.health.max_age)
                .unwrap_or_else(|_| Duration::minutes(5)),
            policy_version: config.policy.version.clone(),
        }
    }

    /// Request authorization for a connection to a service.
    ///
    /// Validation gates run in order and the first failure short-circuits:
    /// no later gate executes, no policy call is made, and no audit or
    /// connection row is written. Once the policy engine is consulted,
    /// exactly one audit row is committed whatever the outcome, before this
    /// function returns.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`]: unknown device or user
    /// - [`Error::Forbidden`]: device not active, or policy denies
    /// - [`Error::Unavailable`]: no health data, or health data stale
    pub async fn request_connection(
        &self,
        device_id: &str,
        user_id: &str,
        service_name: &str,
    ) -> Result<ConnectionGrant> {
        // Gate 1-2: device exists and is active
        let device = self
            .store
            .device_by_id(device_id)
            .await?
            .ok_or(Error::NotFound("Device"))?;

        if device.status != "active" {
            return Err(Error::Forbidden("Device is not active".to_string()));
        }

        // Gate 3: user exists. User status is deliberately not checked here;
        // the policy engine sees the role, not the account state.
        let user = self
            .store
            .user_by_id(user_id)
            .await?
            .ok_or(Error::NotFound("User"))?;

        // Gate 4-5: fresh health data
        let health = self
            .store
            .latest_health_check(device_id)
            .await?
            .ok_or_else(|| {
                Error::Unavailable("No health check data available for device".to_string())
            })?;

        let age = Utc::now() - health.reported_at;
        if age > self.health_max_age {
            return Err(Error::Unavailable(
                "Health check data is stale (older than maximum age)".to_string(),
            ));
        }

        // All gates passed; consult the policy engine
        let input = build_policy_input(&device, &user, service_name, &health);

        let started = Instant::now();
        let decision = self.policy.evaluate(&input).await;
        let latency = started.elapsed();

        // One audit row per attempt, committed before any response
        self.store
            .insert_audit_log(AuditLog {
                id: 0,
                event_type: "connection_request".to_string(),
                action: "request_connection".to_string(),
                decision: decision.decision.to_string(),
                device_id: Some(device_id.to_string()),
                user_id: Some(user_id.to_string()),
                service_name: Some(service_name.to_string()),
                reason: decision.error.clone(),
                policy_version: Some(self.policy_version.clone()),
                extra_data: Some(json!({ "opa_result": decision })),
                timestamp: Utc::now(),
            })
            .await?;

        metrics::record_authorization_decision(decision.allowed, latency);
        metrics::record_connection_request(service_name, decision.allowed);

        if !decision.allowed {
            warn!(
                device_id = %device_id,
                user_id = %user_id,
                service = %service_name,
                reason = ?decision.error,
                "Connection denied by policy"
            );
            return Err(Error::Forbidden("Access denied by policy".to_string()));
        }

        let connection_id = Uuid::new_v4().to_string();
        self.store
            .insert_connection(Connection {
                connection_id: connection_id.clone(),
                device_id: device_id.to_string(),
                user_id: user_id.to_string(),
                service_name: service_name.to_string(),
                status: ConnectionStatus::Established,
                established_at: Utc::now(),
                terminated_at: None,
            })
            .await?;

        // Gauge moves only once the row is committed
        metrics::record_connection_established(service_name);

        info!(
            connection_id = %connection_id,
            device_id = %device_id,
            user_id = %user_id,
            service = %service_name,
            "Connection authorized"
        );

        Ok(ConnectionGrant {
            connection_id,
            status: "authorized".to_string(),
            service_name: service_name.to_string(),
            virtual_tunnel: VirtualTunnel::for_service(service_name),
        })
    }
}

/// Assemble the policy input document from validated entity state.
///
/// Compliance booleans default to false and usage gauges to 0.0 when the
/// health report left them unset; the time section is evaluated at decision
/// time.
fn build_policy_input(
    device: &Device,
    user: &User,
    service_name: &str,
    health: &HealthCheck,
) -> PolicyInput {
    let now = Utc::now();
    PolicyInput {
        device: DeviceContext {
            device_id: device.device_id.clone(),
            authenticated: true,
            status: device.status.clone(),
            os_patches_current: health.os_patches_current.unwrap_or(false),
            antivirus_enabled: health.antivirus_enabled.unwrap_or(false),
            disk_encrypted: health.disk_encrypted.unwrap_or(false),
            cpu_usage: health.cpu_usage.unwrap_or(0.0),
            memory_usage: health.memory_usage.unwrap_or(0.0),
        },
        user: UserContext {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        },
        service: ServiceContext {
            name: service_name.to_string(),
        },
        time: TimeContext {
            hour: now.hour(),
            day_of_week: now.weekday().number_from_monday(),
        },
    }
}
