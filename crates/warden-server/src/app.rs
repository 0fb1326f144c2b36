//! Service wiring over a single SurrealDB connection.

use std::sync::Arc;

use chrono::Utc;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tracing::{error, info, warn};
use warden_auth::{ReplayBackend, ServiceAccountTokenValidator, TokenExchangeService};
use warden_db::repository::{
    SurrealAuditLogRepository, SurrealCertificateGroupRepository, SurrealCertificateRepository,
    SurrealPrivateKeyRepository, SurrealServiceAccountRepository,
};
use warden_pki::rotation::RotationStatus;
use warden_pki::seal::KeySealer;
use warden_pki::{
    AuditRecorder, CaKeyStore, CertificateGroupService, IssuanceService, JwksPublisher,
    RotationEngine, SigningService,
};

use crate::config::WardenConfig;
use crate::error::ServerError;

pub type Groups = SurrealCertificateGroupRepository<Any>;
pub type Certificates = SurrealCertificateRepository<Any>;
pub type PrivateKeys = SurrealPrivateKeyRepository<Any>;
pub type Accounts = SurrealServiceAccountRepository<Any>;
pub type AuditLog = SurrealAuditLogRepository<Any>;

/// Every service exposed to the API layer.
pub struct Warden {
    pub registry: CertificateGroupService<Groups, Certificates, AuditLog>,
    pub issuance: Arc<IssuanceService<Groups, Certificates, PrivateKeys, AuditLog>>,
    pub rotation: RotationEngine<Groups, Certificates, PrivateKeys, AuditLog>,
    pub signing: SigningService<Groups, Certificates, PrivateKeys, AuditLog>,
    pub jwks: Arc<JwksPublisher<Groups, Certificates>>,
    pub validator: Arc<ServiceAccountTokenValidator<Accounts, Groups, Certificates>>,
    pub exchange: TokenExchangeService<Accounts, Groups, Certificates, AuditLog>,
    pub accounts: Accounts,
    pub audit: AuditLog,
}

/// Outcome counts of one rotation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationSummary {
    pub rotated: usize,
    pub skipped: usize,
    pub noop: usize,
    pub failed: usize,
    pub purged_keys: u64,
}

impl Warden {
    pub async fn build(db: Surreal<Any>, config: &WardenConfig) -> Result<Self, ServerError> {
        if config.pki.key_sealing_key.is_none() {
            warn!("WARDEN_KEY_SEALING_KEY is not set; private keys will be stored unencrypted");
        }
        if config.validator.allowed_audiences.is_empty() {
            warn!("no token audiences configured; every service-account token will be rejected");
        }

        let groups = SurrealCertificateGroupRepository::new(db.clone());
        let certificates = SurrealCertificateRepository::new(db.clone());
        let private_keys = SurrealPrivateKeyRepository::new(db.clone());
        let accounts = SurrealServiceAccountRepository::new(db.clone());
        let audit = SurrealAuditLogRepository::new(db);
        let recorder = AuditRecorder::new(audit.clone());
        let sealer = KeySealer::new(config.pki.key_sealing_key);

        let jwks = Arc::new(JwksPublisher::new(
            groups.clone(),
            certificates.clone(),
            &config.pki,
        ));
        let issuance = Arc::new(IssuanceService::new(
            groups.clone(),
            certificates.clone(),
            private_keys.clone(),
            Arc::new(CaKeyStore::new(&config.pki)),
            Arc::clone(&jwks),
            sealer.clone(),
            recorder.clone(),
        ));
        let rotation = RotationEngine::new(
            groups.clone(),
            certificates.clone(),
            Arc::clone(&issuance),
            recorder.clone(),
        );
        let signing = SigningService::new(
            groups.clone(),
            certificates,
            private_keys,
            sealer,
            recorder.clone(),
            config.signing.clone(),
        );

        let replay = ReplayBackend::from_config(&config.replay).await?;
        let validator = Arc::new(ServiceAccountTokenValidator::new(
            accounts.clone(),
            Arc::clone(&jwks),
            Arc::new(replay),
            config.validator.clone(),
        )?);
        let exchange = TokenExchangeService::new(
            Arc::clone(&validator),
            recorder.clone(),
            config.exchange.clone(),
        );
        let registry = CertificateGroupService::new(groups, Arc::clone(&jwks), recorder);

        Ok(Self {
            registry,
            issuance,
            rotation,
            signing,
            jwks,
            validator,
            exchange,
            accounts,
            audit,
        })
    }

    /// One scheduled maintenance pass: rotate due groups, then drop
    /// private keys whose certificates have expired.
    pub async fn rotation_tick(&self) -> RotationSummary {
        let mut summary = RotationSummary::default();

        match self.rotation.run_once().await {
            Ok(results) => {
                for result in &results {
                    match result.status {
                        RotationStatus::Rotated => summary.rotated += 1,
                        RotationStatus::Skipped => summary.skipped += 1,
                        RotationStatus::Noop => summary.noop += 1,
                        RotationStatus::Error => {
                            summary.failed += 1;
                            error!(
                                group_code = %result.group_code,
                                reason = result.reason.as_deref().unwrap_or(""),
                                "Rotation failed"
                            );
                        }
                    }
                }
            }
            Err(e) => error!(error = %e, "Rotation pass failed"),
        }

        match self.issuance.purge_expired_private_keys(Utc::now()).await {
            Ok(purged) => summary.purged_keys = purged,
            Err(e) => error!(error = %e, "Failed to purge expired private keys"),
        }

        info!(
            rotated = summary.rotated,
            skipped = summary.skipped,
            noop = summary.noop,
            failed = summary.failed,
            purged_keys = summary.purged_keys,
            "Rotation pass complete"
        );
        summary
    }
}
