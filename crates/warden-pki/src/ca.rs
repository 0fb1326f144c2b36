//! Per-usage certificate authorities.
//!
//! Each usage type owns one self-signed RSA-2048 CA. The CA is created on
//! first use and lives for the lifetime of the process; concurrent first
//! calls for the same usage observe the same CA.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose,
};
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::info;
use warden_core::error::WardenResult;
use warden_core::models::certificate_group::UsageType;

use crate::config::PkiConfig;
use crate::error::{PkiError, PkiResult};
use crate::keys::{KeySpec, generate_private_key};

/// Key pair and certificate of one usage's CA.
pub struct CaMaterial {
    pub usage: UsageType,
    pub key_pair: KeyPair,
    pub certificate: Certificate,
}

impl CaMaterial {
    pub fn certificate_pem(&self) -> String {
        self.certificate.pem()
    }
}

pub(crate) fn offset_datetime(at: DateTime<Utc>) -> PkiResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| PkiError::Signing(format!("validity out of range: {e}")))
}

/// `notBefore` one minute before `now`, `notAfter` `days` after that.
pub(crate) fn validity_window(
    now: DateTime<Utc>,
    days: u32,
) -> PkiResult<(DateTime<Utc>, DateTime<Utc>)> {
    let not_before = now
        .checked_sub_signed(Duration::minutes(1))
        .ok_or_else(|| PkiError::Validation("notBefore out of range".into()))?;
    let not_after = Duration::try_days(i64::from(days))
        .and_then(|validity| not_before.checked_add_signed(validity))
        .ok_or_else(|| PkiError::Validation(format!("validity of {days} days is out of range")))?;
    Ok((not_before, not_after))
}

/// Lazily created CA key material, one slot per usage type.
pub struct CaKeyStore {
    organization: String,
    validity_days: u32,
    slots: HashMap<UsageType, OnceCell<Arc<CaMaterial>>>,
}

impl CaKeyStore {
    pub fn new(config: &PkiConfig) -> Self {
        Self {
            organization: config.ca_organization.clone(),
            validity_days: config.ca_validity_days,
            slots: UsageType::ALL
                .into_iter()
                .map(|usage| (usage, OnceCell::new()))
                .collect(),
        }
    }

    /// Return the CA for `usage`, creating it on first call.
    pub async fn get_or_create(&self, usage: UsageType) -> WardenResult<Arc<CaMaterial>> {
        let slot = self
            .slots
            .get(&usage)
            .ok_or_else(|| PkiError::Signing(format!("no CA slot for usage {usage}")))?;
        let material = slot
            .get_or_try_init(|| async {
                // RSA generation is CPU-bound; keep it off the async workers.
                let key_pair = tokio::task::spawn_blocking(|| {
                    generate_private_key(&KeySpec::Rsa { bits: 2048 })
                })
                .await
                .map_err(|e| PkiError::KeyGeneration(format!("CA key task failed: {e}")))??;
                self.create(usage, key_pair).map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(material))
    }

    fn create(&self, usage: UsageType, key_pair: KeyPair) -> PkiResult<CaMaterial> {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, format!("Warden {usage} CA"));
        dn.push(DnType::OrganizationName, self.organization.clone());

        let now = Utc::now();
        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let (not_before, not_after) = validity_window(now, self.validity_days)?;
        params.not_before = offset_datetime(not_before)?;
        params.not_after = offset_datetime(not_after)?;

        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| PkiError::Signing(format!("CA self-signing failed: {e}")))?;

        info!(usage = %usage, "Created certificate authority");
        Ok(CaMaterial {
            usage,
            key_pair,
            certificate,
        })
    }
}
