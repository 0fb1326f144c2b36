//! Certificate group registry service.
//!
//! Validates group definitions before they reach storage and keeps the
//! audit log and the published JWKS in step with group mutations.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use warden_core::error::WardenResult;
use warden_core::models::audit::{AuditAction, AuditOutcome};
use warden_core::models::certificate_group::{
    CertificateGroup, CreateCertificateGroup, KeyType, RotationPolicy, UpdateCertificateGroup,
};
use warden_core::repository::{
    AuditLogRepository, CertificateGroupRepository, CertificateRepository, PaginatedResult,
    Pagination,
};

use crate::audit::{Actor, AuditRecorder};
use crate::error::{PkiError, PkiResult};
use crate::issuance::MAX_VALID_DAYS;
use crate::jwks::JwksPublisher;
use crate::keys::KeySpec;
use crate::subject::build_subject;

fn validate_group_code(group_code: &str) -> PkiResult<()> {
    let valid = !group_code.is_empty()
        && group_code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(PkiError::Validation(format!(
            "group_code must be non-empty and use only [A-Za-z0-9._-], got {group_code:?}"
        )));
    }
    Ok(())
}

/// Keeps twice the threshold, the default group validity, under
/// [`MAX_VALID_DAYS`].
pub const MAX_ROTATION_THRESHOLD_DAYS: u32 = MAX_VALID_DAYS / 10;

fn validate_rotation_policy(policy: &RotationPolicy) -> PkiResult<()> {
    if policy.rotation_threshold_days == 0 {
        return Err(PkiError::Validation(
            "rotation_threshold_days must be greater than zero".into(),
        ));
    }
    if policy.rotation_threshold_days > MAX_ROTATION_THRESHOLD_DAYS {
        return Err(PkiError::Validation(format!(
            "rotation_threshold_days must not exceed {MAX_ROTATION_THRESHOLD_DAYS}"
        )));
    }
    Ok(())
}

fn validate_key_shape(
    key_type: KeyType,
    key_size: Option<u32>,
    key_curve: Option<&str>,
) -> PkiResult<()> {
    KeySpec::from_group(key_type, key_size, key_curve).map(|_| ())
}

pub struct CertificateGroupService<G, C, A> {
    groups: G,
    jwks: Arc<JwksPublisher<G, C>>,
    audit: AuditRecorder<A>,
}

impl<G, C, A> CertificateGroupService<G, C, A>
where
    G: CertificateGroupRepository,
    C: CertificateRepository,
    A: AuditLogRepository,
{
    pub fn new(groups: G, jwks: Arc<JwksPublisher<G, C>>, audit: AuditRecorder<A>) -> Self {
        Self {
            groups,
            jwks,
            audit,
        }
    }

    /// Fails with `GroupConflict` when `group_code` is taken.
    pub async fn create(
        &self,
        mut input: CreateCertificateGroup,
        actor: &Actor,
    ) -> WardenResult<CertificateGroup> {
        validate_group_code(&input.group_code)?;
        if input.display_name.trim().is_empty() {
            return Err(PkiError::Validation("display_name must not be empty".into()).into());
        }
        validate_rotation_policy(&input.rotation_policy)?;
        validate_key_shape(input.key_type, input.key_size, input.key_curve.as_deref())?;
        input.subject = build_subject(&input.subject)?.template;

        let group = self.groups.create(input).await?;
        info!(group_code = %group.group_code, usage = %group.usage_type, "Created certificate group");

        self.audit
            .record(
                actor
                    .event(AuditAction::GroupCreated)
                    .group_code(&group.group_code)
                    .details(json!({
                        "usage_type": group.usage_type.as_str(),
                        "key_type": group.key_type.as_str(),
                    })),
            )
            .await;
        Ok(group)
    }

    /// Applies a partial update. The group is addressed by `input.id`,
    /// falling back to `input.group_code`. `group_code` and `usage_type`
    /// never change.
    pub async fn update(
        &self,
        mut input: UpdateCertificateGroup,
        actor: &Actor,
    ) -> WardenResult<CertificateGroup> {
        let current = match input.id {
            Some(id) => self.groups.get_by_id(id).await?,
            None => self.groups.get_by_code(&input.group_code).await?,
        };

        if let Some(name) = &input.display_name {
            if name.trim().is_empty() {
                return Err(PkiError::Validation("display_name must not be empty".into()).into());
            }
        }
        if let Some(policy) = &input.rotation_policy {
            validate_rotation_policy(policy)?;
        }

        validate_key_shape(
            input.key_type.unwrap_or(current.key_type),
            input.key_size.or(current.key_size),
            input.key_curve.as_deref().or(current.key_curve.as_deref()),
        )?;

        if let Some(subject) = &input.subject {
            input.subject = Some(build_subject(subject)?.template);
        }

        let group = self.groups.update(input).await?;
        info!(group_code = %group.group_code, "Updated certificate group");

        self.audit
            .record(
                actor
                    .event(AuditAction::GroupUpdated)
                    .group_code(&group.group_code),
            )
            .await;
        Ok(group)
    }

    /// Fails with `GroupNotFound` when absent and `GroupConflict` while
    /// the group has an active certificate.
    pub async fn delete(&self, group_code: &str, actor: &Actor) -> WardenResult<()> {
        self.groups.delete(group_code).await?;
        self.jwks.invalidate(group_code);
        info!(group_code, "Deleted certificate group");

        self.audit
            .record(
                actor
                    .event(AuditAction::GroupDeleted)
                    .group_code(group_code)
                    .outcome(AuditOutcome::Success),
            )
            .await;
        Ok(())
    }

    pub async fn get(&self, group_code: &str) -> WardenResult<CertificateGroup> {
        self.groups.get_by_code(group_code).await
    }

    pub async fn list(&self, pagination: Pagination) -> WardenResult<PaginatedResult<CertificateGroup>> {
        self.groups.list(pagination).await
    }

    pub async fn list_auto_rotating(&self) -> WardenResult<Vec<CertificateGroup>> {
        self.groups.list_auto_rotating().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_code_charset() {
        assert!(validate_group_code("billing-api_v2.prod").is_ok());
        assert!(validate_group_code("").is_err());
        assert!(validate_group_code("has space").is_err());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let policy = RotationPolicy {
            auto_rotate: true,
            rotation_threshold_days: 0,
        };
        assert!(validate_rotation_policy(&policy).is_err());
    }

    #[test]
    fn threshold_is_capped() {
        let policy = |days| RotationPolicy {
            auto_rotate: true,
            rotation_threshold_days: days,
        };
        assert!(validate_rotation_policy(&policy(MAX_ROTATION_THRESHOLD_DAYS)).is_ok());
        assert!(validate_rotation_policy(&policy(MAX_ROTATION_THRESHOLD_DAYS + 1)).is_err());
        assert!(validate_rotation_policy(&policy(100_000_000)).is_err());
    }

    #[test]
    fn key_shape_is_checked() {
        assert!(validate_key_shape(KeyType::Rsa, Some(2048), None).is_ok());
        assert!(validate_key_shape(KeyType::Ec, None, Some("brainpoolP256r1")).is_err());
        assert!(matches!(
            validate_key_shape(KeyType::Rsa, Some(1024), None),
            Err(PkiError::KeyGeneration(_))
        ));
    }
}
