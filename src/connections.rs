//! Connection lifecycle management
//!
//! Thin state machine over the connection repository: connections are created
//! as `established` by the authorization pipeline and transition to
//! `terminated` exactly once. Reads are pure queries.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::metrics;
use crate::store::{Connection, ConnectionFilter, ConnectionStore, EntityStore};
use crate::{Error, Result};

/// Manager for established connections.
pub struct ConnectionManager {
    store: Arc<dyn EntityStore>,
}

impl ConnectionManager {
    /// Create a manager over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Fetch a connection by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the connection does not exist.
    pub async fn get(&self, connection_id: &str) -> Result<Connection> {
        self.store
            .connection_by_id(connection_id)
            .await?
            .ok_or(Error::NotFound("Connection"))
    }

    /// List connections matching `filter`, newest first.
    pub async fn list(&self, filter: &ConnectionFilter) -> Result<Vec<Connection>> {
        self.store.list_connections(filter).await
    }

    /// Terminate an established connection.
    ///
    /// Not idempotent: a second attempt on an already-terminated connection
    /// is rejected, and the active-connections gauge is decremented exactly
    /// once per connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown connection and
    /// [`Error::BadRequest`] when it is already terminated.
    pub async fn terminate(&self, connection_id: &str) -> Result<Connection> {
        let connection = self
            .store
            .terminate_connection(connection_id, Utc::now())
            .await?;

        metrics::record_connection_terminated(&connection.service_name);
        info!(
            connection_id = %connection.connection_id,
            service = %connection.service_name,
            "Connection terminated"
        );
        Ok(connection)
    }
}
