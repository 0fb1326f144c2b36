//! Policy-driven certificate rotation.
//!
//! A rotation pass walks every auto-rotating group and issues a
//! replacement certificate when the latest one is missing, revoked,
//! without expiry or inside the rotation threshold. A group never holds
//! more than two active certificates: the outgoing one and its
//! replacement. Failures are reported per group and never abort the
//! pass.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use warden_core::error::WardenResult;
use warden_core::models::audit::AuditAction;
use warden_core::models::certificate::IssuedCertificate;
use warden_core::models::certificate_group::CertificateGroup;
use warden_core::repository::{
    AuditLogRepository, CertificateGroupRepository, CertificateRepository, PrivateKeyRepository,
};

use crate::audit::{Actor, AuditRecorder};
use crate::issuance::{IssuanceService, IssueForGroupRequest};
use crate::jwk::inspect_certificate_pem;

pub const REASON_AUTO_ROTATE_DISABLED: &str = "auto-rotate-disabled";
pub const REASON_WITHIN_THRESHOLD: &str = "within-threshold";
pub const REASON_ACTIVE_LIMIT: &str = "active-certificates-limit";

/// Active certificates a group may hold before rotation stops.
pub const MAX_ACTIVE_CERTIFICATES: u64 = 2;

/// Validity floor when no previous window can be derived.
const FALLBACK_MIN_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStatus {
    Rotated,
    Skipped,
    Noop,
    Error,
}

impl RotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationStatus::Rotated => "rotated",
            RotationStatus::Skipped => "skipped",
            RotationStatus::Noop => "noop",
            RotationStatus::Error => "error",
        }
    }
}

/// Outcome of evaluating one group.
#[derive(Debug, Clone, Serialize)]
pub struct RotationResult {
    pub group_code: String,
    pub status: RotationStatus,
    pub certificate: Option<IssuedCertificate>,
    pub reason: Option<String>,
}

impl RotationResult {
    fn new(group: &CertificateGroup, status: RotationStatus, reason: impl Into<String>) -> Self {
        Self {
            group_code: group.group_code.clone(),
            status,
            certificate: None,
            reason: Some(reason.into()),
        }
    }
}

fn expiry_of(certificate: &IssuedCertificate) -> Option<DateTime<Utc>> {
    certificate.expires_at.or_else(|| {
        inspect_certificate_pem(&certificate.certificate_pem)
            .ok()
            .map(|info| info.not_after)
    })
}

fn window_days(certificate: &IssuedCertificate) -> Option<i64> {
    match inspect_certificate_pem(&certificate.certificate_pem) {
        Ok(info) => Some(info.validity_days()),
        Err(_) => certificate
            .expires_at
            .map(|exp| (exp - certificate.issued_at).num_days()),
    }
}

/// Whether a group whose newest certificate is `latest` needs a new one.
pub fn rotation_due(
    latest: Option<&IssuedCertificate>,
    threshold_days: u32,
    now: DateTime<Utc>,
) -> bool {
    let Some(latest) = latest else {
        return true;
    };
    if latest.is_revoked_at(now) {
        return true;
    }
    match expiry_of(latest) {
        None => true,
        // A threshold reaching past the calendar range is always due.
        Some(expires_at) => expires_at
            .checked_sub_signed(Duration::days(i64::from(threshold_days)))
            .is_none_or(|due_at| now >= due_at),
    }
}

/// Validity of a replacement: the previous window, floored at
/// `threshold + 1` days, else `max(2 × threshold, 30)`.
pub fn replacement_validity_days(latest: Option<&IssuedCertificate>, threshold_days: u32) -> u32 {
    let floor = threshold_days.saturating_add(1);
    latest
        .and_then(window_days)
        .filter(|days| *days > 0)
        .and_then(|days| u32::try_from(days).ok())
        .map(|days| days.max(floor))
        .unwrap_or_else(|| threshold_days.saturating_mul(2).max(FALLBACK_MIN_DAYS))
}

pub struct RotationEngine<G, C, K, A> {
    groups: G,
    certificates: C,
    issuance: Arc<IssuanceService<G, C, K, A>>,
    audit: AuditRecorder<A>,
}

impl<G, C, K, A> RotationEngine<G, C, K, A>
where
    G: CertificateGroupRepository,
    C: CertificateRepository,
    K: PrivateKeyRepository,
    A: AuditLogRepository,
{
    pub fn new(
        groups: G,
        certificates: C,
        issuance: Arc<IssuanceService<G, C, K, A>>,
        audit: AuditRecorder<A>,
    ) -> Self {
        Self {
            groups,
            certificates,
            issuance,
            audit,
        }
    }

    /// Evaluate every auto-rotating group. Only a failure to list the
    /// groups is returned as an error.
    pub async fn run_once(&self) -> WardenResult<Vec<RotationResult>> {
        let groups = self.groups.list_auto_rotating().await?;
        let now = Utc::now();

        let mut results = Vec::with_capacity(groups.len());
        for group in &groups {
            results.push(self.evaluate(group, now).await);
        }

        let rotated = results
            .iter()
            .filter(|r| r.status == RotationStatus::Rotated)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.status == RotationStatus::Error)
            .count();
        info!(groups = results.len(), rotated, failed, "Rotation pass finished");
        Ok(results)
    }

    /// Evaluate a single group as of `now`.
    pub async fn evaluate(&self, group: &CertificateGroup, now: DateTime<Utc>) -> RotationResult {
        match self.try_evaluate(group, now).await {
            Ok(result) => result,
            Err(e) => {
                warn!(group_code = %group.group_code, error = %e, "Rotation failed");
                RotationResult::new(group, RotationStatus::Error, e.to_string())
            }
        }
    }

    async fn try_evaluate(
        &self,
        group: &CertificateGroup,
        now: DateTime<Utc>,
    ) -> WardenResult<RotationResult> {
        let policy = &group.rotation_policy;
        if !policy.auto_rotate {
            return Ok(RotationResult::new(
                group,
                RotationStatus::Skipped,
                REASON_AUTO_ROTATE_DISABLED,
            ));
        }

        let active = self.certificates.count_active_for_group(group.id, now).await?;
        if active >= MAX_ACTIVE_CERTIFICATES {
            return Ok(RotationResult::new(
                group,
                RotationStatus::Skipped,
                REASON_ACTIVE_LIMIT,
            ));
        }

        let latest = self.certificates.latest_for_group(group.id).await?;
        if !rotation_due(latest.as_ref(), policy.rotation_threshold_days, now) {
            return Ok(RotationResult::new(
                group,
                RotationStatus::Noop,
                REASON_WITHIN_THRESHOLD,
            ));
        }

        let valid_days = replacement_validity_days(latest.as_ref(), policy.rotation_threshold_days);
        let previous_kid = latest.map(|c| c.kid);
        let issued = self
            .issuance
            .issue_for_group(
                IssueForGroupRequest {
                    group_code: group.group_code.clone(),
                    valid_days: Some(valid_days),
                    auto_rotated_from_kid: previous_kid.clone(),
                    ..Default::default()
                },
                &Actor::system(),
            )
            .await?;

        let certificate = issued.certificate;
        info!(
            group_code = %group.group_code,
            kid = %certificate.kid,
            valid_days,
            "Rotated certificate"
        );
        self.audit
            .record(
                Actor::system()
                    .event(AuditAction::CertificateRotated)
                    .kid(&certificate.kid)
                    .group_code(&group.group_code)
                    .details(json!({
                        "auto_rotated_from_kid": previous_kid,
                        "valid_days": valid_days,
                    })),
            )
            .await;

        Ok(RotationResult {
            group_code: group.group_code.clone(),
            status: RotationStatus::Rotated,
            certificate: Some(certificate),
            reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;
    use warden_core::models::certificate_group::UsageType;
    use warden_core::models::jwk::Jwk;

    use super::*;

    fn cert(
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        revoked_at: Option<DateTime<Utc>>,
    ) -> IssuedCertificate {
        IssuedCertificate {
            id: Uuid::new_v4(),
            kid: "k1".into(),
            certificate_pem: String::new(),
            usage_type: UsageType::ClientSigning,
            jwk: Jwk::default(),
            subject: "CN=test".into(),
            serial_number: "01".into(),
            fingerprint: String::new(),
            issued_at,
            expires_at,
            revoked_at,
            revocation_reason: None,
            group_id: None,
            auto_rotated_from_kid: None,
            updated_at: issued_at,
        }
    }

    #[test]
    fn oversized_threshold_is_due_without_overflow() {
        let now = Utc::now();
        let latest = cert(now, Some(now + Duration::days(90)), None);
        assert!(rotation_due(Some(&latest), u32::MAX, now));
    }

    #[test]
    fn due_without_certificate() {
        assert!(rotation_due(None, 30, Utc::now()));
    }

    #[test]
    fn due_when_revoked_or_without_expiry() {
        let now = Utc::now();
        let revoked = cert(now, Some(now + Duration::days(90)), Some(now));
        assert!(rotation_due(Some(&revoked), 30, now));
        let open_ended = cert(now, None, None);
        assert!(rotation_due(Some(&open_ended), 30, now));
    }

    #[test]
    fn threshold_boundary() {
        let now = Utc::now();
        let fresh = cert(now, Some(now + Duration::days(31)), None);
        assert!(!rotation_due(Some(&fresh), 30, now));
        let expiring = cert(now, Some(now + Duration::days(30)), None);
        assert!(rotation_due(Some(&expiring), 30, now));
    }

    #[test]
    fn replacement_mirrors_previous_window() {
        let now = Utc::now();
        let previous = cert(now, Some(now + Duration::days(90)), None);
        assert_eq!(replacement_validity_days(Some(&previous), 30), 90);
    }

    #[test]
    fn replacement_is_floored_above_threshold() {
        let now = Utc::now();
        let previous = cert(now, Some(now + Duration::days(10)), None);
        assert_eq!(replacement_validity_days(Some(&previous), 30), 31);
    }

    #[test]
    fn replacement_fallback() {
        assert_eq!(replacement_validity_days(None, 7), 30);
        assert_eq!(replacement_validity_days(None, 45), 90);
    }
}
