//! Issued certificate domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::certificate_group::UsageType;
use super::jwk::Jwk;

/// One signed X.509 certificate.
///
/// Created by issuance and mutated only to set the revocation fields.
/// Records are never physically deleted so that the JWKS history and
/// audit trail stay intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCertificate {
    pub id: Uuid,
    /// Unique key identifier, published as the JWK `kid`.
    pub kid: String,
    /// PEM-encoded certificate.
    pub certificate_pem: String,
    pub usage_type: UsageType,
    /// Public key representation derived from the certificate.
    pub jwk: Jwk,
    /// RFC 4514-style subject string (e.g. `CN=svc,O=Acme`).
    pub subject: String,
    /// Hex-encoded certificate serial number.
    pub serial_number: String,
    /// SHA-256 fingerprint of the DER certificate, hex-encoded.
    pub fingerprint: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    /// Owning group; `None` for standalone issuance.
    pub group_id: Option<Uuid>,
    /// `kid` of the certificate this one replaced during auto-rotation.
    pub auto_rotated_from_kid: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl IssuedCertificate {
    /// Revocation is terminal: once set, `revoked_at` is never cleared.
    pub fn is_revoked_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_some_and(|at| at <= now)
    }

    /// Not revoked AND (no expiry OR expiry in the future).
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }
}

#[derive(Debug, Clone)]
pub struct CreateIssuedCertificate {
    pub kid: String,
    pub certificate_pem: String,
    pub usage_type: UsageType,
    pub jwk: Jwk,
    pub subject: String,
    pub serial_number: String,
    pub fingerprint: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub group_id: Option<Uuid>,
    pub auto_rotated_from_kid: Option<String>,
}

/// Search filters for the certificate management surface.
#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub kid_contains: Option<String>,
    pub group_id: Option<Uuid>,
    pub usage_type: Option<UsageType>,
    pub revoked: Option<bool>,
    pub issued_from: Option<DateTime<Utc>>,
    pub issued_to: Option<DateTime<Utc>>,
    pub expires_from: Option<DateTime<Utc>>,
    pub expires_to: Option<DateTime<Utc>>,
    pub subject_contains: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::jwk::Jwk;

    fn cert(expires_at: Option<DateTime<Utc>>, revoked_at: Option<DateTime<Utc>>) -> IssuedCertificate {
        let now = Utc::now();
        IssuedCertificate {
            id: Uuid::new_v4(),
            kid: "k1".into(),
            certificate_pem: String::new(),
            usage_type: UsageType::ClientSigning,
            jwk: Jwk::default(),
            subject: "CN=test".into(),
            serial_number: "01".into(),
            fingerprint: String::new(),
            issued_at: now,
            expires_at,
            revoked_at,
            revocation_reason: None,
            group_id: None,
            auto_rotated_from_kid: None,
            updated_at: now,
        }
    }

    #[test]
    fn certificate_without_expiry_is_active() {
        assert!(cert(None, None).is_active_at(Utc::now()));
    }

    #[test]
    fn expired_certificate_is_inactive() {
        let now = Utc::now();
        assert!(!cert(Some(now - Duration::days(1)), None).is_active_at(now));
    }

    #[test]
    fn revoked_certificate_is_inactive() {
        let now = Utc::now();
        let c = cert(Some(now + Duration::days(10)), Some(now));
        assert!(!c.is_active_at(now));
        assert!(c.is_revoked_at(now));
    }
}
