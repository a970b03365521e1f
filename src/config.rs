//! Configuration management
//!
//! Configuration is an explicit struct built once at startup (YAML file plus
//! `EDGEMESH_` environment variables) and injected into the components that
//! need it. Nothing reads ambient global state.

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Policy engine configuration
    pub policy: PolicyConfig,
    /// Device enrollment configuration
    pub enrollment: EnrollmentConfig,
    /// Health check freshness configuration
    pub health: HealthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Policy engine (OPA) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Base URL of the policy engine
    pub url: String,
    /// Decision path for connection authorization
    pub decision_path: String,
    /// Decision path for device compliance checks
    pub compliance_path: String,
    /// Remote call timeout; expiry is a deny, never a crash
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Policy version tag recorded with every audit row
    pub version: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            url: "http://opa:8181".to_string(),
            decision_path: "edgemesh/authz/allow".to_string(),
            compliance_path: "edgemesh/compliance/device_compliant".to_string(),
            timeout: Duration::from_secs(5),
            version: "v1.0".to_string(),
        }
    }
}

/// Device enrollment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    /// Shared secret required to enroll a device
    pub token_secret: String,
    /// Device certificate validity in days
    pub cert_validity_days: u32,
    /// CA certificate validity in days
    pub ca_validity_days: u32,
    /// Common Name for the self-signed CA
    pub ca_common_name: String,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            token_secret: "change-me-in-production".to_string(),
            cert_validity_days: 90,
            ca_validity_days: 3650,
            ca_common_name: "EdgeMesh CA".to_string(),
        }
    }
}

/// Health check freshness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Maximum age of the latest health check before a device is denied.
    /// The comparison is strict: a report exactly this old still passes.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("EDGEMESH_").split("__"));

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }
}
