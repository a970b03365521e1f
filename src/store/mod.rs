//! Entity store: repository traits and the in-memory implementation
//!
//! One repository trait per record type so the authorization pipeline depends
//! on an interface rather than a concrete database binding; tests substitute
//! fakes freely. Every call is a single logical transaction: unique-constraint
//! checks and read-then-write transitions happen atomically inside the store.

mod memory;
mod records;

pub use memory::MemoryStore;
pub use records::{AuditLog, Connection, ConnectionStatus, Device, HealthCheck, User};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;

/// Filters for [`ConnectionStore::list_connections`]; compose conjunctively.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFilter {
    /// Only connections for this device
    pub device_id: Option<String>,
    /// Only connections for this user
    pub user_id: Option<String>,
    /// Only connections in this state
    pub status: Option<ConnectionStatus>,
}

/// Device repository
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Insert a device. Fails with [`crate::Error::Conflict`] when the device
    /// id or certificate serial is already taken.
    async fn insert_device(&self, device: Device) -> Result<Device>;

    /// Fetch a device by id.
    async fn device_by_id(&self, device_id: &str) -> Result<Option<Device>>;

    /// Update a device's `last_seen` timestamp.
    ///
    /// Fails with [`crate::Error::NotFound`] for an unknown device.
    async fn touch_device(&self, device_id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// User repository
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with [`crate::Error::Conflict`] when the user id
    /// or email is already taken.
    async fn insert_user(&self, user: User) -> Result<User>;

    /// Fetch a user by id.
    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>>;
}

/// Health check repository (append-only)
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Append a health check row. The store assigns `id` and returns the
    /// stored row.
    async fn insert_health_check(&self, check: HealthCheck) -> Result<HealthCheck>;

    /// The most-recently-reported health check for a device, if any.
    async fn latest_health_check(&self, device_id: &str) -> Result<Option<HealthCheck>>;
}

/// Connection repository
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Insert a connection. Fails with [`crate::Error::Conflict`] on a
    /// duplicate connection id.
    async fn insert_connection(&self, connection: Connection) -> Result<Connection>;

    /// Fetch a connection by id.
    async fn connection_by_id(&self, connection_id: &str) -> Result<Option<Connection>>;

    /// List connections matching `filter`, newest `established_at` first.
    async fn list_connections(&self, filter: &ConnectionFilter) -> Result<Vec<Connection>>;

    /// Atomically transition a connection from established to terminated,
    /// setting `terminated_at` to `at`.
    ///
    /// Fails with [`crate::Error::NotFound`] when the connection does not
    /// exist, and with [`crate::Error::BadRequest`] when it is already
    /// terminated; the transition happens exactly once and is not idempotent.
    async fn terminate_connection(
        &self,
        connection_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Connection>;
}

/// Audit log repository (append-only)
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an audit row. The store assigns `id` and returns the stored
    /// row.
    async fn insert_audit_log(&self, entry: AuditLog) -> Result<AuditLog>;

    /// All audit rows in insertion order.
    async fn list_audit_logs(&self) -> Result<Vec<AuditLog>>;
}

/// The full entity store capability set.
pub trait EntityStore:
    DeviceStore + UserStore + HealthStore + ConnectionStore + AuditStore
{
}

impl<T> EntityStore for T where
    T: DeviceStore + UserStore + HealthStore + ConnectionStore + AuditStore
{
}
