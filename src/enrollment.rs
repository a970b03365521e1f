//! Device enrollment: token validation and certificate issuance
//!
//! A device presents the shared enrollment token and receives an identity:
//! a leaf certificate signed by the control plane's self-signed CA, the
//! matching private key, and the CA certificate for verification. The CA is
//! generated once at process start and lives for the process lifetime.

use std::sync::Arc;

use chrono::Utc;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber, date_time_ymd,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::info;

use crate::config::EnrollmentConfig;
use crate::metrics;
use crate::store::{Device, DeviceStore, EntityStore};
use crate::{Error, Result};

/// Device enrollment request
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentRequest {
    /// Unique device identifier
    pub device_id: String,
    /// Type of device (laptop, server, iot, ...)
    pub device_type: String,
    /// Secret token authorizing enrollment
    pub enrollment_token: String,
    /// Operating system name
    #[serde(default)]
    pub os: Option<String>,
    /// Operating system version
    #[serde(default)]
    pub os_version: Option<String>,
}

/// Device enrollment response: the issued identity material (PEM).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    /// Enrolled device identifier
    pub device_id: String,
    /// Device certificate
    pub certificate: String,
    /// Device private key
    pub private_key: String,
    /// CA certificate for verification
    pub ca_certificate: String,
}

/// Issued leaf certificate material.
struct IssuedCert {
    cert_pem: String,
    key_pem: String,
    serial: String,
}

/// Process-lifetime certificate authority backed by rcgen.
pub struct CertificateAuthority {
    cert: Certificate,
    key: KeyPair,
    cert_pem: String,
}

impl CertificateAuthority {
    /// Generate a self-signed CA.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or certificate serialization fails.
    pub fn generate(common_name: &str, validity_days: u32) -> Result<Self> {
        let key = KeyPair::generate()
            .map_err(|e| Error::Config(format!("Failed to generate CA key: {e}")))?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "EdgeMesh");
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.not_after = validity_to_date(validity_days)?;

        let cert = params
            .self_signed(&key)
            .map_err(|e| Error::Config(format!("CA cert generation failed: {e}")))?;
        let cert_pem = cert.pem();

        Ok(Self {
            cert,
            key,
            cert_pem,
        })
    }

    /// CA certificate in PEM format.
    #[must_use]
    pub fn ca_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Issue a client/server leaf certificate for a device, signed by this CA.
    fn issue_device_cert(
        &self,
        device_id: &str,
        device_type: &str,
        validity_days: u32,
    ) -> Result<IssuedCert> {
        use rand::Rng;

        let leaf_key = KeyPair::generate()
            .map_err(|e| Error::Config(format!("Failed to generate device key: {e}")))?;

        let serial_bytes: [u8; 16] = rand::rng().random();
        let serial = hex::encode(serial_bytes);

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "EdgeMesh");
        dn.push(DnType::OrganizationalUnitName, device_type);
        dn.push(DnType::CommonName, device_id);
        params.distinguished_name = dn;
        params.serial_number = Some(SerialNumber::from_slice(&serial_bytes));
        params.not_after = validity_to_date(validity_days)?;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];

        let cert = params
            .signed_by(&leaf_key, &self.cert, &self.key)
            .map_err(|e| Error::Config(format!("Device cert signing failed: {e}")))?;

        Ok(IssuedCert {
            cert_pem: cert.pem(),
            key_pem: leaf_key.serialize_pem(),
            serial,
        })
    }
}

/// Enrollment service: validates tokens, issues certificates, records devices.
pub struct EnrollmentService {
    store: Arc<dyn EntityStore>,
    ca: CertificateAuthority,
    token_secret: String,
    cert_validity_days: u32,
}

impl EnrollmentService {
    /// Create the service, generating the process-lifetime CA.
    ///
    /// # Errors
    ///
    /// Returns an error if CA generation fails.
    pub fn new(store: Arc<dyn EntityStore>, config: &EnrollmentConfig) -> Result<Self> {
        let ca = CertificateAuthority::generate(&config.ca_common_name, config.ca_validity_days)?;
        Ok(Self {
            store,
            ca,
            token_secret: config.token_secret.clone(),
            cert_validity_days: config.cert_validity_days,
        })
    }

    /// Enroll a new device.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`]: enrollment token mismatch
    /// - [`Error::Conflict`]: device id or certificate serial already taken
    pub async fn enroll(&self, request: EnrollmentRequest) -> Result<EnrollmentResponse> {
        // Constant-time token comparison
        let token_ok: bool = request
            .enrollment_token
            .as_bytes()
            .ct_eq(self.token_secret.as_bytes())
            .into();
        if !token_ok {
            return Err(Error::Unauthorized("Invalid enrollment token".to_string()));
        }

        let issued = self.ca.issue_device_cert(
            &request.device_id,
            &request.device_type,
            self.cert_validity_days,
        )?;

        self.store
            .insert_device(Device {
                device_id: request.device_id.clone(),
                device_type: request.device_type,
                certificate_serial: issued.serial,
                certificate_pem: issued.cert_pem.clone(),
                os: request.os,
                os_version: request.os_version,
                status: "active".to_string(),
                enrolled_at: Utc::now(),
                last_seen: None,
            })
            .await?;

        metrics::record_device_enrollment();
        info!(device_id = %request.device_id, "Device enrolled");

        Ok(EnrollmentResponse {
            device_id: request.device_id,
            certificate: issued.cert_pem,
            private_key: issued.key_pem,
            ca_certificate: self.ca.ca_pem().to_string(),
        })
    }
}

/// Convert a validity period in days into a future date for rcgen.
fn validity_to_date(days: u32) -> Result<time::OffsetDateTime> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Config(format!("System time error: {e}")))?
        .as_secs();

    let future_secs = now_secs.saturating_add(u64::from(days) * 86_400);
    let dt = time::OffsetDateTime::from_unix_timestamp(
        i64::try_from(future_secs).unwrap_or(i64::MAX),
    )
    .map_err(|e| Error::Config(format!("Date calculation error: {e}")))?;

    Ok(date_time_ymd(dt.year(), dt.month() as u8, dt.day()))
}
