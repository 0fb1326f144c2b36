//! Certificate group domain models.
//!
//! A certificate group is a logical key family: every certificate issued
//! for the group shares its usage, key shape, and subject template, and
//! the group's rotation policy drives automatic replacement.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What certificates of a group (or a standalone certificate) are for.
///
/// Each usage maps to its own CA and its own extended key usage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    ServerSigning,
    ClientSigning,
    Encryption,
}

impl UsageType {
    pub const ALL: [UsageType; 3] = [
        UsageType::ServerSigning,
        UsageType::ClientSigning,
        UsageType::Encryption,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::ServerSigning => "server_signing",
            UsageType::ClientSigning => "client_signing",
            UsageType::Encryption => "encryption",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "server_signing" => Some(UsageType::ServerSigning),
            "client_signing" => Some(UsageType::ClientSigning),
            "encryption" => Some(UsageType::Encryption),
            _ => None,
        }
    }
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum KeyType {
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "EC")]
    Ec,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa => "RSA",
            KeyType::Ec => "EC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RSA" => Some(KeyType::Rsa),
            "EC" => Some(KeyType::Ec),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationPolicy {
    pub auto_rotate: bool,
    /// Days before expiry at which a replacement is issued. Always > 0.
    pub rotation_threshold_days: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            auto_rotate: false,
            rotation_threshold_days: 30,
        }
    }
}

/// Subject template: RFC 4514-style attribute name to value
/// (`CN`, `O`, `C`, ...).
pub type SubjectTemplate = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateGroup {
    pub id: Uuid,
    /// Unique, immutable identifier.
    pub group_code: String,
    pub display_name: String,
    pub description: Option<String>,
    pub usage_type: UsageType,
    pub key_type: KeyType,
    /// EC curve name (`P-256`, `P-384`, `P-521`); only for EC groups.
    pub key_curve: Option<String>,
    /// RSA modulus size in bits; only for RSA groups.
    pub key_size: Option<u32>,
    pub subject: SubjectTemplate,
    pub rotation_policy: RotationPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCertificateGroup {
    pub group_code: String,
    pub display_name: String,
    pub description: Option<String>,
    pub usage_type: UsageType,
    pub key_type: KeyType,
    pub key_curve: Option<String>,
    pub key_size: Option<u32>,
    pub subject: SubjectTemplate,
    pub rotation_policy: RotationPolicy,
}

/// Partial update. The group is addressed by `id` when present, otherwise
/// by `group_code`. `usage_type` cannot be changed once created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCertificateGroup {
    pub id: Option<Uuid>,
    pub group_code: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub key_type: Option<KeyType>,
    pub key_curve: Option<String>,
    pub key_size: Option<u32>,
    pub subject: Option<SubjectTemplate>,
    pub rotation_policy: Option<RotationPolicy>,
}
