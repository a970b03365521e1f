//! Policy engine client
//!
//! Wraps the remote OPA decision request with a bounded timeout and a
//! fail-closed contract: [`PolicyEvaluator::evaluate`] never surfaces a
//! transport error: timeout, connection failure, HTTP error status, and
//! malformed response all normalize to a deny decision. This is the single
//! most important correctness property of the control plane: a degraded or
//! unreachable policy engine must never result in access being granted.

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::config::PolicyConfig;
use crate::{Error, Result};

/// Normalized decision outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Access granted
    Allow,
    /// Access denied
    Deny,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// Normalized policy decision.
///
/// Whatever shape the engine responds with is decoded into this one type
/// before any business logic inspects it. Serializes to the audit payload
/// shape (`allowed` / `decision` / optional `error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Whether access is granted
    pub allowed: bool,
    /// Decision label recorded in the audit trail
    pub decision: Decision,
    /// Failure description when the decision was forced closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PolicyDecision {
    /// A deny decision carrying a failure description.
    #[must_use]
    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            allowed: false,
            decision: Decision::Deny,
            error: Some(error.into()),
        }
    }

    /// Normalize an engine result value.
    ///
    /// Two response generations are in the field and both must decode:
    /// the current shape `{"allowed": bool, "decision": "allow"|"deny"}` and
    /// the legacy shape `{"allow": bool}`. A bare boolean (raw OPA `result`)
    /// is also accepted. `allowed` wins over `allow` when both are present;
    /// an explicit `decision` string wins over the derived one. Anything
    /// unrecognized is a deny.
    #[must_use]
    pub fn from_result(result: &Value) -> Self {
        let allowed = match result {
            Value::Bool(b) => *b,
            Value::Object(map) => map
                .get("allowed")
                .and_then(Value::as_bool)
                .or_else(|| map.get("allow").and_then(Value::as_bool))
                .unwrap_or(false),
            _ => false,
        };

        let decision = result
            .get("decision")
            .and_then(Value::as_str)
            .and_then(|s| match s {
                "allow" => Some(Decision::Allow),
                "deny" => Some(Decision::Deny),
                _ => None,
            })
            .unwrap_or(if allowed {
                Decision::Allow
            } else {
                Decision::Deny
            });

        let error = result
            .get("error")
            .and_then(Value::as_str)
            .map(String::from);

        Self {
            allowed,
            decision,
            error,
        }
    }
}

/// Structured input document for policy evaluation.
///
/// Assembled by the authorization pipeline after all validation gates pass;
/// field names are part of the wire contract with the policy rules.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyInput {
    /// Device section
    pub device: DeviceContext,
    /// User section
    pub user: UserContext,
    /// Service section
    pub service: ServiceContext,
    /// Time section, evaluated at decision time
    pub time: TimeContext,
}

/// Device identity and posture as presented to the policy engine
#[derive(Debug, Clone, Serialize)]
pub struct DeviceContext {
    /// Device identifier
    pub device_id: String,
    /// Always true; the pipeline only runs post-authentication
    pub authenticated: bool,
    /// Device status
    pub status: String,
    /// OS patches up to date (false when unreported)
    pub os_patches_current: bool,
    /// Antivirus enabled (false when unreported)
    pub antivirus_enabled: bool,
    /// Disk encrypted (false when unreported)
    pub disk_encrypted: bool,
    /// CPU usage percentage (0.0 when unreported)
    pub cpu_usage: f64,
    /// Memory usage percentage (0.0 when unreported)
    pub memory_usage: f64,
}

/// User identity as presented to the policy engine
#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    /// User identifier
    pub user_id: String,
    /// Email address
    pub email: String,
    /// Role, interpreted by the policy rules
    pub role: String,
}

/// Requested service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceContext {
    /// Service name
    pub name: String,
}

/// Decision-time clock context, enabling time-of-day and day-of-week rules
#[derive(Debug, Clone, Serialize)]
pub struct TimeContext {
    /// Hour of day, 0-23
    pub hour: u32,
    /// ISO day of week, 1=Monday .. 7=Sunday
    pub day_of_week: u32,
}

/// Seam between the authorization pipeline and the policy engine.
///
/// Implementations must be fail-closed: `evaluate` always returns a decision
/// and `check_compliance` defaults to non-compliant on any failure.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate the connection-authorization policy.
    async fn evaluate(&self, input: &PolicyInput) -> PolicyDecision;

    /// Check whether a device snapshot meets compliance requirements.
    async fn check_compliance(&self, device: &Value) -> bool;
}

/// HTTP client for an OPA-style policy engine.
pub struct PolicyClient {
    client: Client,
    base_url: String,
    decision_path: String,
    compliance_path: String,
}

impl PolicyClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &PolicyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build policy HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            decision_path: config.decision_path.clone(),
            compliance_path: config.compliance_path.clone(),
        })
    }

    /// POST `{"input": ...}` to a data path and return the `result` value.
    async fn query(&self, path: &str, input: &Value) -> reqwest::Result<Value> {
        let url = format!("{}/v1/data/{path}", self.base_url);
        let body: Value = self
            .client
            .post(&url)
            .json(&json!({ "input": input }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PolicyEvaluator for PolicyClient {
    async fn evaluate(&self, input: &PolicyInput) -> PolicyDecision {
        let input_value = match serde_json::to_value(input) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "Failed to serialize policy input");
                return PolicyDecision::denied("Policy evaluation failed");
            }
        };

        match self.query(&self.decision_path, &input_value).await {
            Ok(result) => {
                let decision = PolicyDecision::from_result(&result);
                debug!(decision = %decision.decision, "Policy evaluated");
                decision
            }
            Err(e) if e.is_timeout() => {
                error!(error = %e, "Policy engine timeout");
                PolicyDecision::denied("Policy service timeout - access denied for safety")
            }
            Err(e) => {
                error!(error = %e, "Policy engine unreachable");
                PolicyDecision::denied("Policy service unavailable")
            }
        }
    }

    async fn check_compliance(&self, device: &Value) -> bool {
        match self.query(&self.compliance_path, device).await {
            Ok(result) => result.as_bool().unwrap_or(false),
            Err(e) => {
                error!(error = %e, "Compliance check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn current_shape_decodes() {
        let d = PolicyDecision::from_result(&json!({"allowed": true, "decision": "allow"}));
        assert!(d.allowed);
        assert_eq!(d.decision, Decision::Allow);
        assert!(d.error.is_none());
    }

    #[test]
    fn legacy_allow_shape_decodes() {
        let d = PolicyDecision::from_result(&json!({"allow": true}));
        assert!(d.allowed);
        assert_eq!(d.decision, Decision::Allow);
    }

    #[test]
    fn allowed_wins_over_legacy_allow() {
        let d = PolicyDecision::from_result(&json!({"allowed": false, "allow": true}));
        assert!(!d.allowed);
        assert_eq!(d.decision, Decision::Deny);
    }

    #[test]
    fn explicit_decision_wins_over_derived() {
        let d = PolicyDecision::from_result(&json!({"allowed": true, "decision": "deny"}));
        assert!(d.allowed);
        assert_eq!(d.decision, Decision::Deny);
    }

    #[test]
    fn bare_boolean_result_decodes() {
        assert!(PolicyDecision::from_result(&json!(true)).allowed);
        assert!(!PolicyDecision::from_result(&json!(false)).allowed);
    }

    #[test]
    fn unrecognized_result_is_deny() {
        assert!(!PolicyDecision::from_result(&Value::Null).allowed);
        assert!(!PolicyDecision::from_result(&json!("yes")).allowed);
        assert!(!PolicyDecision::from_result(&json!({})).allowed);
        assert!(!PolicyDecision::from_result(&json!({"allowed": "true"})).allowed);
    }

    #[test]
    fn error_field_is_carried() {
        let d = PolicyDecision::from_result(&json!({"allow": false, "error": "engine down"}));
        assert!(!d.allowed);
        assert_eq!(d.error.as_deref(), Some("engine down"));
    }

    #[test]
    fn audit_payload_shape() {
        let d = PolicyDecision::denied("Policy service unavailable");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(
            v,
            json!({
                "allowed": false,
                "decision": "deny",
                "error": "Policy service unavailable"
            })
        );
    }

    #[test]
    fn allow_payload_omits_error() {
        let d = PolicyDecision::from_result(&json!({"allowed": true}));
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v, json!({"allowed": true, "decision": "allow"}));
    }
}
