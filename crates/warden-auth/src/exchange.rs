//! JWT-bearer token exchange (RFC 7523): a service-account assertion in,
//! a short-lived access token out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warden_core::error::WardenResult;
use warden_core::models::audit::{AuditAction, AuditOutcome};
use warden_core::repository::{
    AuditLogRepository, CertificateGroupRepository, CertificateRepository,
    ServiceAccountRepository,
};
use warden_pki::{Actor, AuditRecorder};

use crate::config::TokenExchangeConfig;
use crate::error::AuthError;
use crate::token::issue_access_token;
use crate::validator::{ServiceAccountTokenValidator, peek_claims};

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeRequest {
    pub grant_type: String,
    pub assertion: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub scope: String,
}

pub struct TokenExchangeService<S, G, C, A> {
    validator: Arc<ServiceAccountTokenValidator<S, G, C>>,
    audit: AuditRecorder<A>,
    config: TokenExchangeConfig,
}

impl<S, G, C, A> TokenExchangeService<S, G, C, A>
where
    S: ServiceAccountRepository,
    G: CertificateGroupRepository,
    C: CertificateRepository,
    A: AuditLogRepository,
{
    pub fn new(
        validator: Arc<ServiceAccountTokenValidator<S, G, C>>,
        audit: AuditRecorder<A>,
        config: TokenExchangeConfig,
    ) -> Self {
        Self {
            validator,
            audit,
            config,
        }
    }

    pub async fn exchange(
        &self,
        request: TokenExchangeRequest,
    ) -> WardenResult<TokenExchangeResponse> {
        if request.grant_type != JWT_BEARER_GRANT {
            return Err(AuthError::UnsupportedGrantType(request.grant_type).into());
        }

        // Requested scopes come from the assertion itself.
        let unverified = peek_claims(&request.assertion).unwrap_or_default();
        let caller = unverified.account_name().unwrap_or("unknown").to_string();
        let requested = unverified.scopes();

        let verified = match self.validator.verify(&request.assertion, &requested).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!(account = %caller, error = %e, "Token exchange rejected");
                self.audit
                    .record(
                        Actor::service_account(&caller)
                            .event(AuditAction::TokenExchanged)
                            .outcome(AuditOutcome::Denied)
                            .details(serde_json::json!({
                                "code": e.jwt_code(),
                                "reason": e.to_string(),
                            })),
                    )
                    .await;
                return Err(e);
            }
        };

        let scope = if requested.is_empty() {
            verified.account.scopes.join(" ")
        } else {
            requested.join(" ")
        };

        let (access_token, _) =
            issue_access_token(&verified.account.name, &scope, &verified.kid, &self.config)?;

        let mut event = Actor::service_account(&verified.account.name)
            .event(AuditAction::TokenExchanged)
            .kid(&verified.kid)
            .details(serde_json::json!({ "scope": scope }));
        if let Some(group_code) = &verified.account.certificate_group_code {
            event = event.group_code(group_code);
        }
        self.audit.record(event).await;

        info!(account = %verified.account.name, kid = %verified.kid, "Exchanged service-account token");
        Ok(TokenExchangeResponse {
            access_token,
            token_type: "Bearer",
            expires_in: self.config.access_token_lifetime_secs,
            scope,
        })
    }
}
