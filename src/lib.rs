//! EdgeMesh Control Plane
//!
//! Zero-trust access control plane: devices enroll to receive identity
//! certificates, report health posture, and request per-connection
//! authorization to named services.
//!
//! # Components
//!
//! - **Authorization Pipeline**: ordered device/user/health validation gates
//!   followed by a policy-engine decision ([`authz`])
//! - **Policy Client**: fail-closed OPA client; a degraded or unreachable
//!   policy engine never results in access being granted ([`policy`])
//! - **Connection Lifecycle**: established → terminated state machine
//!   ([`connections`])
//! - **Enrollment**: token-gated device certificate issuance ([`enrollment`])
//! - **Audit/Metrics**: one audit row per authorization attempt, Prometheus
//!   metrics for decisions, connections, and health reports

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authz;
pub mod cli;
pub mod config;
pub mod connections;
pub mod enrollment;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod server;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
