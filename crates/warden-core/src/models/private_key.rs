//! Server-held private key material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Private key for a certificate whose key pair was generated by the
/// server. Keyed 1:1 by the certificate's `kid`.
///
/// `private_key` holds either the sealed (AES-256-GCM) or the plain PEM,
/// as indicated by `sealed`. The material is returned to the caller once,
/// at issuance; later reads are only used by the signing path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateKeyRecord {
    pub id: Uuid,
    pub kid: String,
    pub group_id: Option<Uuid>,
    pub private_key: String,
    pub sealed: bool,
    /// Mirrors the certificate's expiry.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatePrivateKeyRecord {
    pub kid: String,
    pub group_id: Option<Uuid>,
    pub private_key: String,
    pub sealed: bool,
    pub expires_at: Option<DateTime<Utc>>,
}
