//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations live in
//! `warden-db`; services in `warden-pki` and `warden-auth` are generic
//! over these traits so they carry no dependency on the database crate.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::WardenResult;
use crate::models::{
    audit::{AuditAction, AuditEvent, CreateAuditEvent},
    certificate::{CertificateFilter, CreateIssuedCertificate, IssuedCertificate},
    certificate_group::{CertificateGroup, CreateCertificateGroup, UpdateCertificateGroup},
    private_key::{CreatePrivateKeyRecord, PrivateKeyRecord},
    service_account::{CreateServiceAccount, ServiceAccount, UpdateServiceAccount},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Certificate groups
// ---------------------------------------------------------------------------

pub trait CertificateGroupRepository: Send + Sync {
    /// Fails with `GroupConflict` if `group_code` already exists.
    fn create(
        &self,
        input: CreateCertificateGroup,
    ) -> impl Future<Output = WardenResult<CertificateGroup>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<CertificateGroup>> + Send;
    fn get_by_code(
        &self,
        group_code: &str,
    ) -> impl Future<Output = WardenResult<CertificateGroup>> + Send;
    /// Addresses the group by `input.id`, falling back to
    /// `input.group_code`. Preserves `created_at`.
    fn update(
        &self,
        input: UpdateCertificateGroup,
    ) -> impl Future<Output = WardenResult<CertificateGroup>> + Send;
    /// Fails with `GroupNotFound` if absent and with `GroupConflict` while
    /// any certificate of the group is active. The check and the delete
    /// happen atomically.
    fn delete(&self, group_code: &str) -> impl Future<Output = WardenResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<CertificateGroup>>> + Send;
    /// Groups whose rotation policy has `auto_rotate = true`.
    fn list_auto_rotating(&self) -> impl Future<Output = WardenResult<Vec<CertificateGroup>>> + Send;
}

// ---------------------------------------------------------------------------
// Issued certificates
// ---------------------------------------------------------------------------

pub trait CertificateRepository: Send + Sync {
    fn create(
        &self,
        input: CreateIssuedCertificate,
    ) -> impl Future<Output = WardenResult<IssuedCertificate>> + Send;
    fn get_by_kid(&self, kid: &str) -> impl Future<Output = WardenResult<IssuedCertificate>> + Send;
    /// Sets `revoked_at` and `revocation_reason`. Re-revoking only
    /// refreshes those two fields.
    fn revoke(
        &self,
        kid: &str,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<IssuedCertificate>> + Send;
    /// Most recently issued certificate of a group, revoked or not.
    fn latest_for_group(
        &self,
        group_id: Uuid,
    ) -> impl Future<Output = WardenResult<Option<IssuedCertificate>>> + Send;
    fn count_active_for_group(
        &self,
        group_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<u64>> + Send;
    /// All certificates of a group, newest-issued first.
    fn list_for_group(
        &self,
        group_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<IssuedCertificate>>> + Send;
    fn search(
        &self,
        filter: CertificateFilter,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<IssuedCertificate>>> + Send;
}

// ---------------------------------------------------------------------------
// Private keys
// ---------------------------------------------------------------------------

pub trait PrivateKeyRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePrivateKeyRecord,
    ) -> impl Future<Output = WardenResult<PrivateKeyRecord>> + Send;
    /// Fails with `PrivateKeyNotFound` when no record exists for `kid`.
    fn get_by_kid(&self, kid: &str) -> impl Future<Output = WardenResult<PrivateKeyRecord>> + Send;
    /// Remove records whose `expires_at` is before `now`. Returns the
    /// number of removed records.
    fn purge_expired(&self, now: DateTime<Utc>) -> impl Future<Output = WardenResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Service accounts
// ---------------------------------------------------------------------------

pub trait ServiceAccountRepository: Send + Sync {
    fn create(
        &self,
        input: CreateServiceAccount,
    ) -> impl Future<Output = WardenResult<ServiceAccount>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<ServiceAccount>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = WardenResult<ServiceAccount>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateServiceAccount,
    ) -> impl Future<Output = WardenResult<ServiceAccount>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<ServiceAccount>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub actor: Option<String>,
    pub kid: Option<String>,
    pub group_code: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit event. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditEvent,
    ) -> impl Future<Output = WardenResult<AuditEvent>> + Send;
    fn list(
        &self,
        filter: AuditFilter,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<AuditEvent>>> + Send;
}
