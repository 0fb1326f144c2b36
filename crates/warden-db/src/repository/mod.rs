//! SurrealDB repository implementations.

mod audit;
mod certificate;
mod certificate_group;
mod private_key;
mod service_account;

pub use audit::SurrealAuditLogRepository;
pub use certificate::SurrealCertificateRepository;
pub use certificate_group::SurrealCertificateGroupRepository;
pub use private_key::SurrealPrivateKeyRepository;
pub use service_account::SurrealServiceAccountRepository;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub total: u64,
}

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::Decode(format!("invalid {what} UUID: {e}")))
}

pub(crate) fn parse_optional_uuid(raw: Option<&str>, what: &str) -> Result<Option<Uuid>, DbError> {
    raw.map(|r| parse_uuid(r, what)).transpose()
}

/// True when a query error stems from a UNIQUE index violation.
pub(crate) fn is_unique_violation(err: &impl std::fmt::Display) -> bool {
    err.to_string().contains("already contains")
}
