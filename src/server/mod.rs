//! Control plane HTTP server

mod router;
pub mod schemas;

pub use router::{AppState, create_router};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::authz::AuthorizationPipeline;
use crate::config::Config;
use crate::connections::ConnectionManager;
use crate::enrollment::EnrollmentService;
use crate::metrics;
use crate::policy::PolicyClient;
use crate::store::MemoryStore;
use crate::{Error, Result};

/// EdgeMesh control plane server
pub struct Server {
    /// Configuration
    config: Config,
}

impl Server {
    /// Create a new server
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the server until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error when the metrics recorder, policy client, enrollment
    /// CA, or listener fail to initialize, or when serving fails.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let metrics_handle = metrics::install_recorder()?;

        let store = Arc::new(MemoryStore::new());
        let policy = Arc::new(PolicyClient::new(&self.config.policy)?);
        let state = Arc::new(AppState {
            pipeline: AuthorizationPipeline::new(
                Arc::clone(&store) as _,
                Arc::clone(&policy) as _,
                &self.config,
            ),
            connections: ConnectionManager::new(Arc::clone(&store) as _),
            enrollment: EnrollmentService::new(
                Arc::clone(&store) as _,
                &self.config.enrollment,
            )?,
            store,
            metrics_handle,
        });

        let app = create_router(state);
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("EDGEMESH CONTROL PLANE v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            policy_url = %self.config.policy.url,
            decision_path = %self.config.policy.decision_path,
            "Policy engine (fail-closed)"
        );
        info!(
            max_age = ?self.config.health.max_age,
            "Health freshness window"
        );
        if self.config.enrollment.token_secret == "change-me-in-production" {
            warn!("Enrollment token is the default value - set EDGEMESH_ENROLLMENT__TOKEN_SECRET");
        }
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
