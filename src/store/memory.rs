//! In-memory entity store
//!
//! A single `RwLock` over all five tables keeps each repository call atomic,
//! mirroring the per-call transaction the traits promise. This is the default
//! backing store (the reference deployment runs against an in-memory
//! database); a relational store would implement the same traits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::records::{AuditLog, Connection, ConnectionStatus, Device, HealthCheck, User};
use super::{AuditStore, ConnectionFilter, ConnectionStore, DeviceStore, HealthStore, UserStore};
use crate::{Error, Result};

#[derive(Default)]
struct Tables {
    devices: HashMap<String, Device>,
    users: HashMap<String, User>,
    health_checks: Vec<HealthCheck>,
    connections: HashMap<String, Connection>,
    audit_logs: Vec<AuditLog>,
    next_health_id: i64,
    next_audit_id: i64,
}

/// In-memory implementation of all repository traits.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn insert_device(&self, device: Device) -> Result<Device> {
        let mut tables = self.tables.write();
        if tables.devices.contains_key(&device.device_id) {
            return Err(Error::Conflict("Device already enrolled".to_string()));
        }
        if tables
            .devices
            .values()
            .any(|d| d.certificate_serial == device.certificate_serial)
        {
            return Err(Error::Conflict(
                "Certificate serial already in use".to_string(),
            ));
        }
        tables
            .devices
            .insert(device.device_id.clone(), device.clone());
        Ok(device)
    }

    async fn device_by_id(&self, device_id: &str) -> Result<Option<Device>> {
        Ok(self.tables.read().devices.get(device_id).cloned())
    }

    async fn touch_device(&self, device_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write();
        let device = tables
            .devices
            .get_mut(device_id)
            .ok_or(Error::NotFound("Device"))?;
        device.last_seen = Some(at);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<User> {
        let mut tables = self.tables.write();
        if tables.users.contains_key(&user.user_id) {
            return Err(Error::Conflict("User already exists".to_string()));
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(Error::Conflict("Email already in use".to_string()));
        }
        tables.users.insert(user.user_id.clone(), user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().users.get(user_id).cloned())
    }
}

#[async_trait]
impl HealthStore for MemoryStore {
    async fn insert_health_check(&self, mut check: HealthCheck) -> Result<HealthCheck> {
        let mut tables = self.tables.write();
        tables.next_health_id += 1;
        check.id = tables.next_health_id;
        tables.health_checks.push(check.clone());
        Ok(check)
    }

    async fn latest_health_check(&self, device_id: &str) -> Result<Option<HealthCheck>> {
        let tables = self.tables.read();
        Ok(tables
            .health_checks
            .iter()
            .filter(|h| h.device_id == device_id)
            // Newest report wins; row id breaks ties between equal timestamps
            .max_by_key(|h| (h.reported_at, h.id))
            .cloned())
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn insert_connection(&self, connection: Connection) -> Result<Connection> {
        let mut tables = self.tables.write();
        if tables.connections.contains_key(&connection.connection_id) {
            return Err(Error::Conflict("Connection id already exists".to_string()));
        }
        tables
            .connections
            .insert(connection.connection_id.clone(), connection.clone());
        Ok(connection)
    }

    async fn connection_by_id(&self, connection_id: &str) -> Result<Option<Connection>> {
        Ok(self.tables.read().connections.get(connection_id).cloned())
    }

    async fn list_connections(&self, filter: &ConnectionFilter) -> Result<Vec<Connection>> {
        let tables = self.tables.read();
        let mut matches: Vec<Connection> = tables
            .connections
            .values()
            .filter(|c| {
                filter
                    .device_id
                    .as_ref()
                    .is_none_or(|d| &c.device_id == d)
                    && filter.user_id.as_ref().is_none_or(|u| &c.user_id == u)
                    && filter.status.is_none_or(|s| c.status == s)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.established_at.cmp(&a.established_at));
        Ok(matches)
    }

    async fn terminate_connection(
        &self,
        connection_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Connection> {
        let mut tables = self.tables.write();
        let connection = tables
            .connections
            .get_mut(connection_id)
            .ok_or(Error::NotFound("Connection"))?;
        if connection.status == ConnectionStatus::Terminated {
            return Err(Error::BadRequest(
                "Connection already terminated".to_string(),
            ));
        }
        connection.status = ConnectionStatus::Terminated;
        connection.terminated_at = Some(at);
        Ok(connection.clone())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit_log(&self, mut entry: AuditLog) -> Result<AuditLog> {
        let mut tables = self.tables.write();
        tables.next_audit_id += 1;
        entry.id = tables.next_audit_id;
        tables.audit_logs.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit_logs(&self) -> Result<Vec<AuditLog>> {
        Ok(self.tables.read().audit_logs.clone())
    }
}
