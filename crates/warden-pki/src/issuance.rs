//! Certificate issuance, revocation and the management read surface.
//!
//! Certificates are signed either from a caller-supplied CSR (the caller
//! keeps the private key) or from a group's template with a key the
//! server generates. Server-generated keys are stored sealed under the
//! certificate's `kid` and handed to the caller exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, IsCa, KeyUsagePurpose,
    PublicKeyData, SerialNumber,
};
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::audit::AuditAction;
use warden_core::models::certificate::{
    CertificateFilter, CreateIssuedCertificate, IssuedCertificate,
};
use warden_core::models::certificate_group::{CertificateGroup, SubjectTemplate, UsageType};
use warden_core::models::private_key::CreatePrivateKeyRecord;
use warden_core::repository::{
    AuditLogRepository, CertificateGroupRepository, CertificateRepository, PaginatedResult,
    Pagination, PrivateKeyRepository,
};

use crate::audit::{Actor, AuditRecorder};
use crate::ca::{CaKeyStore, offset_datetime, validity_window};
use crate::csr::{parse_csr, request_params};
use crate::error::PkiError;
use crate::extensions::{default_key_usage, extended_key_usage, parse_key_usage};
use crate::jwk::{certificate_to_jwk, inspect_certificate};
use crate::jwks::JwksPublisher;
use crate::keys::{KeySpec, generate_private_key};
use crate::seal::KeySealer;
use crate::subject::merge_subject;

/// Longest certificate validity accepted by either issuance path.
pub const MAX_VALID_DAYS: u32 = 36_500;

/// Sign a caller-supplied CSR.
#[derive(Debug, Clone)]
pub struct SignCsrRequest {
    pub csr_pem: String,
    pub usage_type: UsageType,
    /// When set, the group's `usage_type` must equal `usage_type`.
    pub group_code: Option<String>,
    pub valid_days: u32,
    pub is_ca: bool,
    /// Key usage names; empty omits the KeyUsage extension.
    pub key_usage: Vec<String>,
}

/// Issue a certificate with a server-generated key for a group.
#[derive(Debug, Clone, Default)]
pub struct IssueForGroupRequest {
    pub group_code: String,
    /// Merged over the group's subject template.
    pub subject_overrides: SubjectTemplate,
    /// Defaults to `max(2 × rotation_threshold_days, 1)` when absent or 0.
    pub valid_days: Option<u32>,
    /// Key usage names; empty applies the usage type's defaults.
    pub key_usage: Vec<String>,
    pub auto_rotated_from_kid: Option<String>,
}

/// A freshly issued certificate together with its private key.
///
/// This is the only place the private key PEM is ever returned.
#[derive(Debug, Clone)]
pub struct IssuedWithKey {
    pub certificate: IssuedCertificate,
    pub private_key_pem: String,
}

/// Management search over issued certificates.
#[derive(Debug, Clone, Default)]
pub struct CertificateSearch {
    pub kid_contains: Option<String>,
    pub group_code: Option<String>,
    pub usage_type: Option<UsageType>,
    pub revoked: Option<bool>,
    pub issued_from: Option<DateTime<Utc>>,
    pub issued_to: Option<DateTime<Utc>>,
    pub expires_from: Option<DateTime<Utc>>,
    pub expires_to: Option<DateTime<Utc>>,
    pub subject_contains: Option<String>,
}

struct SigningContext<'a> {
    usage: UsageType,
    group: Option<&'a CertificateGroup>,
    valid_days: u32,
    is_ca: bool,
    key_usages: Vec<KeyUsagePurpose>,
    auto_rotated_from_kid: Option<String>,
    kid: String,
}

fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    // Positive INTEGER.
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

/// Default validity for group issuance.
pub fn default_group_validity_days(group: &CertificateGroup) -> u32 {
    group
        .rotation_policy
        .rotation_threshold_days
        .saturating_mul(2)
        .max(1)
}

pub struct IssuanceService<G, C, K, A> {
    groups: G,
    certificates: C,
    private_keys: K,
    ca: Arc<CaKeyStore>,
    jwks: Arc<JwksPublisher<G, C>>,
    sealer: KeySealer,
    audit: AuditRecorder<A>,
}

impl<G, C, K, A> IssuanceService<G, C, K, A>
where
    G: CertificateGroupRepository,
    C: CertificateRepository,
    K: PrivateKeyRepository,
    A: AuditLogRepository,
{
    pub fn new(
        groups: G,
        certificates: C,
        private_keys: K,
        ca: Arc<CaKeyStore>,
        jwks: Arc<JwksPublisher<G, C>>,
        sealer: KeySealer,
        audit: AuditRecorder<A>,
    ) -> Self {
        Self {
            groups,
            certificates,
            private_keys,
            ca,
            jwks,
            sealer,
            audit,
        }
    }

    /// Sign a CSR whose private key stays with the caller.
    pub async fn sign_csr(
        &self,
        request: SignCsrRequest,
        actor: &Actor,
    ) -> WardenResult<IssuedCertificate> {
        let CertificateSigningRequestParams { params, public_key } =
            parse_csr(&request.csr_pem)?;

        let group = match &request.group_code {
            Some(code) => {
                let group = self.groups.get_by_code(code).await?;
                if group.usage_type != request.usage_type {
                    return Err(PkiError::Validation(format!(
                        "group {code} is {} but {} was requested",
                        group.usage_type, request.usage_type
                    ))
                    .into());
                }
                Some(group)
            }
            None => None,
        };

        let context = SigningContext {
            usage: request.usage_type,
            group: group.as_ref(),
            valid_days: request.valid_days,
            is_ca: request.is_ca,
            key_usages: parse_key_usage(&request.key_usage)?,
            auto_rotated_from_kid: None,
            kid: Uuid::new_v4().to_string(),
        };
        self.sign_and_store(params, &public_key, context, actor).await
    }

    /// Generate a key for the group, sign a certificate from its subject
    /// template and persist the key under the new `kid`.
    pub async fn issue_for_group(
        &self,
        request: IssueForGroupRequest,
        actor: &Actor,
    ) -> WardenResult<IssuedWithKey> {
        let group = self.groups.get_by_code(&request.group_code).await?;

        // 1. Key and subject from the group definition.
        let spec = KeySpec::from_group(group.key_type, group.key_size, group.key_curve.as_deref())?;
        let key_pair = generate_private_key(&spec)?;
        let subject = merge_subject(&group.subject, &request.subject_overrides)?;

        let key_usages = if request.key_usage.is_empty() {
            default_key_usage(group.usage_type, group.key_type)
        } else {
            parse_key_usage(&request.key_usage)?
        };
        let valid_days = request
            .valid_days
            .filter(|days| *days > 0)
            .unwrap_or_else(|| default_group_validity_days(&group));

        // 2. Seal the private key under its kid before anything is stored.
        let kid = Uuid::new_v4().to_string();
        let private_key_pem = key_pair.serialize_pem();
        let (stored, sealed) = self.sealer.seal(&kid, &private_key_pem)?;

        // 3. Sign. The request is built from the key pair directly, the
        //    proof of possession is implicit.
        let params = request_params(&subject, group.usage_type, key_usages.clone());
        let context = SigningContext {
            usage: group.usage_type,
            group: Some(&group),
            valid_days,
            is_ca: false,
            key_usages,
            auto_rotated_from_kid: request.auto_rotated_from_kid,
            kid,
        };
        let certificate = self.sign_and_store(params, &key_pair, context, actor).await?;

        // 4. Keep the private key for server-side signing. A certificate
        //    without its key must not stay published.
        let stored_key = self
            .private_keys
            .create(CreatePrivateKeyRecord {
                kid: certificate.kid.clone(),
                group_id: Some(group.id),
                private_key: stored,
                sealed,
                expires_at: certificate.expires_at,
            })
            .await;
        if let Err(e) = stored_key {
            error!(kid = %certificate.kid, error = %e, "Storing private key failed, revoking certificate");
            if let Err(revoke_err) = self
                .revoke(
                    &certificate.kid,
                    Some("private key could not be stored".into()),
                    &Actor::system(),
                )
                .await
            {
                error!(kid = %certificate.kid, error = %revoke_err, "Revoking orphaned certificate failed");
            }
            return Err(e);
        }

        Ok(IssuedWithKey {
            certificate,
            private_key_pem,
        })
    }

    async fn sign_and_store(
        &self,
        mut params: CertificateParams,
        public_key: &(impl PublicKeyData + Sync),
        context: SigningContext<'_>,
        actor: &Actor,
    ) -> WardenResult<IssuedCertificate> {
        if context.valid_days == 0 {
            return Err(PkiError::Validation("valid_days must be greater than zero".into()).into());
        }
        if context.valid_days > MAX_VALID_DAYS {
            return Err(PkiError::Validation(format!(
                "valid_days must not exceed {MAX_VALID_DAYS}"
            ))
            .into());
        }
        let ca = self.ca.get_or_create(context.usage).await?;

        let issued_at = Utc::now();
        let (not_before, not_after) = validity_window(issued_at, context.valid_days)?;
        params.not_before = offset_datetime(not_before)?;
        params.not_after = offset_datetime(not_after)?;
        params.serial_number = Some(random_serial());
        params.is_ca = if context.is_ca {
            IsCa::Ca(BasicConstraints::Unconstrained)
        } else {
            IsCa::ExplicitNoCa
        };
        params.key_usages = context.key_usages;
        params.extended_key_usages = vec![extended_key_usage(context.usage)];
        params.use_authority_key_identifier_extension = true;

        let signed = params
            .signed_by(public_key, &ca.certificate, &ca.key_pair)
            .map_err(|e| PkiError::Signing(format!("certificate signing failed: {e}")))?;
        let der = signed.der().to_vec();
        let info = inspect_certificate(&der)?;

        let kid = context.kid;
        let jwk = certificate_to_jwk(&der, &kid, context.usage)?;

        let certificate = self
            .certificates
            .create(CreateIssuedCertificate {
                kid,
                certificate_pem: signed.pem(),
                usage_type: context.usage,
                jwk,
                subject: info.subject,
                serial_number: info.serial_number,
                fingerprint: info.fingerprint,
                issued_at,
                expires_at: Some(info.not_after),
                group_id: context.group.map(|g| g.id),
                auto_rotated_from_kid: context.auto_rotated_from_kid,
            })
            .await?;

        if let Some(group) = context.group {
            self.jwks.rebuild(group).await?;
        }

        let group_code = context.group.map(|g| g.group_code.clone());
        info!(
            kid = %certificate.kid,
            usage = %certificate.usage_type,
            group_code = group_code.as_deref().unwrap_or("-"),
            "Issued certificate"
        );

        let mut event = actor
            .event(AuditAction::CertificateIssued)
            .kid(&certificate.kid)
            .details(json!({
                "serial_number": certificate.serial_number,
                "subject": certificate.subject,
                "usage_type": certificate.usage_type.as_str(),
                "auto_rotated_from_kid": certificate.auto_rotated_from_kid,
            }));
        if let Some(code) = group_code {
            event = event.group_code(code);
        }
        self.audit.record(event).await;

        Ok(certificate)
    }

    /// Revoke a certificate. Revoking again only refreshes the timestamp
    /// and reason.
    pub async fn revoke(
        &self,
        kid: &str,
        reason: Option<String>,
        actor: &Actor,
    ) -> WardenResult<IssuedCertificate> {
        let certificate = self.certificates.revoke(kid, reason, Utc::now()).await?;

        let mut group_code = None;
        if let Some(group_id) = certificate.group_id {
            match self.groups.get_by_id(group_id).await {
                Ok(group) => {
                    self.jwks.rebuild(&group).await?;
                    group_code = Some(group.group_code);
                }
                Err(WardenError::GroupNotFound { .. }) => {
                    debug!(kid, %group_id, "Revoked certificate of a deleted group");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            kid,
            reason = certificate.revocation_reason.as_deref().unwrap_or("-"),
            "Revoked certificate"
        );
        let mut event = actor
            .event(AuditAction::CertificateRevoked)
            .kid(kid)
            .details(json!({ "reason": certificate.revocation_reason }));
        if let Some(code) = group_code {
            event = event.group_code(code);
        }
        self.audit.record(event).await;

        Ok(certificate)
    }

    /// Fails with `CertificateNotFound` for an unknown `kid`.
    pub async fn get(&self, kid: &str) -> WardenResult<IssuedCertificate> {
        self.certificates.get_by_kid(kid).await
    }

    pub async fn list(&self, pagination: Pagination) -> WardenResult<PaginatedResult<IssuedCertificate>> {
        self.certificates
            .search(CertificateFilter::default(), pagination)
            .await
    }

    /// Every certificate of a group, newest first.
    pub async fn list_for_group(&self, group_code: &str) -> WardenResult<Vec<IssuedCertificate>> {
        let group = self.groups.get_by_code(group_code).await?;
        self.certificates.list_for_group(group.id).await
    }

    pub async fn search(
        &self,
        search: CertificateSearch,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<IssuedCertificate>> {
        let group_id = match &search.group_code {
            Some(code) => Some(self.groups.get_by_code(code).await?.id),
            None => None,
        };
        let filter = CertificateFilter {
            kid_contains: search.kid_contains,
            group_id,
            usage_type: search.usage_type,
            revoked: search.revoked,
            issued_from: search.issued_from,
            issued_to: search.issued_to,
            expires_from: search.expires_from,
            expires_to: search.expires_to,
            subject_contains: search.subject_contains,
        };
        self.certificates.search(filter, pagination).await
    }

    /// Remove stored private keys whose certificate has expired.
    pub async fn purge_expired_private_keys(&self, now: DateTime<Utc>) -> WardenResult<u64> {
        self.private_keys.purge_expired(now).await
    }
}

#[cfg(test)]
mod tests {
    use warden_core::models::certificate_group::{KeyType, RotationPolicy};

    use super::*;

    fn group(threshold: u32) -> CertificateGroup {
        let now = Utc::now();
        CertificateGroup {
            id: Uuid::new_v4(),
            group_code: "g".into(),
            display_name: "G".into(),
            description: None,
            usage_type: UsageType::ClientSigning,
            key_type: KeyType::Ec,
            key_curve: None,
            key_size: None,
            subject: SubjectTemplate::new(),
            rotation_policy: RotationPolicy {
                auto_rotate: true,
                rotation_threshold_days: threshold,
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn default_validity_is_twice_threshold() {
        assert_eq!(default_group_validity_days(&group(30)), 60);
        assert_eq!(default_group_validity_days(&group(0)), 1);
    }

    #[test]
    fn serials_are_positive_and_distinct() {
        let a = random_serial();
        let b = random_serial();
        assert_ne!(a, b);
        assert!(a.to_bytes()[0] < 0x80);
    }
}
