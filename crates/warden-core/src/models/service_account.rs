//! Service account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceAccountStatus {
    Active,
    Disabled,
}

/// A non-human caller that authenticates with JWT assertions signed by a
/// key from its certificate group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub id: Uuid,
    /// Used as token issuer/subject.
    pub name: String,
    /// Must reference a `client_signing` group.
    pub certificate_group_code: Option<String>,
    /// Allow-listed scopes.
    pub scopes: Vec<String>,
    pub status: ServiceAccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceAccount {
    pub fn is_active(&self) -> bool {
        self.status == ServiceAccountStatus::Active
    }

    pub fn has_scopes<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> bool {
        required
            .into_iter()
            .all(|scope| self.scopes.iter().any(|s| s == scope))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceAccount {
    pub name: String,
    pub certificate_group_code: Option<String>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateServiceAccount {
    pub certificate_group_code: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub status: Option<ServiceAccountStatus>,
}
