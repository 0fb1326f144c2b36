//! Verification of bearer assertions signed by a service account's
//! certificate group.

use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::jwk::Jwk;
use warden_core::models::service_account::ServiceAccount;
use warden_core::repository::{
    CertificateGroupRepository, CertificateRepository, ServiceAccountRepository,
};
use warden_pki::{JwksMode, JwksPublisher};

use crate::config::TokenValidatorConfig;
use crate::error::AuthError;
use crate::replay::{ReplayBackend, ReplayCheck};

/// Claims of a service-account assertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceAccountClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// A string or an array of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Space-separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServiceAccountClaims {
    /// The account name the token speaks for: `iss`, else `sub`.
    pub fn account_name(&self) -> Option<&str> {
        self.iss
            .as_deref()
            .or(self.sub.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// `(iat, exp)`; a token missing either is not a valid assertion.
    pub fn lifetime(&self) -> Result<(i64, i64), AuthError> {
        let iat = self
            .iat
            .ok_or_else(|| AuthError::InvalidSignature("missing required claim iat".into()))?;
        let exp = self
            .exp
            .ok_or_else(|| AuthError::InvalidSignature("missing required claim exp".into()))?;
        Ok((iat, exp))
    }

    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// A successfully verified assertion.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub account: ServiceAccount,
    pub claims: ServiceAccountClaims,
    pub kid: String,
}

/// Decode the claim segment without checking the signature.
pub fn peek_claims(token: &str) -> Result<ServiceAccountClaims, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::InvalidSignature("malformed token".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidSignature(format!("claims are not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidSignature(format!("claims are not JSON: {e}")))
}

/// Lifetime and clock-skew checks on verified `iat`/`exp`. Returns the
/// token lifetime in seconds.
pub fn check_lifetime(
    claims: &ServiceAccountClaims,
    now: i64,
    config: &TokenValidatorConfig,
) -> Result<i64, AuthError> {
    let (iat, exp) = claims.lifetime()?;
    if exp <= iat {
        return Err(AuthError::ExpiredToken("exp must be after iat".into()));
    }
    let lifetime = exp.saturating_sub(iat);
    if lifetime > config.max_token_lifetime_secs {
        return Err(AuthError::ExpiredToken(format!(
            "token lifetime exceeds {} seconds",
            config.max_token_lifetime_secs
        )));
    }
    if iat > now.saturating_add(config.clock_skew_secs) {
        return Err(AuthError::InvalidSignature("iat is in the future".into()));
    }
    Ok(lifetime)
}

/// Replay cache TTL for a token lifetime: capped and at least one second.
pub fn replay_ttl(lifetime: i64, config: &TokenValidatorConfig) -> u64 {
    lifetime.min(config.max_token_lifetime_secs).max(1) as u64
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    let invalid = |e: jsonwebtoken::errors::Error| {
        AuthError::InvalidSignature(format!("unusable key {}: {e}", jwk.kid))
    };
    match jwk.kty.as_str() {
        "RSA" => match (&jwk.n, &jwk.e) {
            (Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e).map_err(invalid),
            _ => Err(AuthError::InvalidSignature("RSA key without n/e".into())),
        },
        "EC" => match (&jwk.x, &jwk.y) {
            (Some(x), Some(y)) => DecodingKey::from_ec_components(x, y).map_err(invalid),
            _ => Err(AuthError::InvalidSignature("EC key without x/y".into())),
        },
        other => Err(AuthError::InvalidSignature(format!("unsupported kty {other}"))),
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken("token has expired".into()),
        ErrorKind::InvalidAudience => AuthError::InvalidAudience("aud is not accepted".into()),
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
            AuthError::InvalidAudience("token has no aud".into())
        }
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::InvalidSignature(format!("token has no {claim}"))
        }
        _ => AuthError::InvalidSignature(err.to_string()),
    }
}

/// Verifies service-account assertions against the JWKS of the
/// account's certificate group.
pub struct ServiceAccountTokenValidator<S, G, C> {
    accounts: S,
    jwks: Arc<JwksPublisher<G, C>>,
    replay: Arc<ReplayBackend>,
    algorithms: Vec<Algorithm>,
    config: TokenValidatorConfig,
}

impl<S, G, C> ServiceAccountTokenValidator<S, G, C>
where
    S: ServiceAccountRepository,
    G: CertificateGroupRepository,
    C: CertificateRepository,
{
    pub fn new(
        accounts: S,
        jwks: Arc<JwksPublisher<G, C>>,
        replay: Arc<ReplayBackend>,
        config: TokenValidatorConfig,
    ) -> WardenResult<Self> {
        let algorithms = config
            .allowed_algorithms
            .iter()
            .map(|name| {
                Algorithm::from_str(name).map_err(|_| {
                    WardenError::Configuration(format!("unknown JWT algorithm: {name}"))
                })
            })
            .collect::<WardenResult<Vec<_>>>()?;

        Ok(Self {
            accounts,
            jwks,
            replay,
            algorithms,
            config,
        })
    }

    /// Verify `token` and require every scope in `required_scopes`.
    pub async fn verify(
        &self,
        token: &str,
        required_scopes: &[&str],
    ) -> WardenResult<VerifiedToken> {
        // 1. Header algorithm allow-list
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::InvalidSignature(format!("bad header: {e}")))?;
        if !self.algorithms.contains(&header.alg) {
            return Err(
                AuthError::InvalidSignature(format!("algorithm {:?} not allowed", header.alg))
                    .into(),
            );
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidSignature("token header has no kid".into()))?;

        // 2. Resolve the account from unverified claims
        let unverified = peek_claims(token)?;
        let name = unverified
            .account_name()
            .ok_or_else(|| AuthError::UnknownAccount("token names no account".into()))?;
        let account = match self.accounts.get_by_name(name).await {
            Ok(account) => account,
            Err(WardenError::NotFound { .. }) => {
                return Err(AuthError::UnknownAccount(name.to_string()).into());
            }
            Err(e) => return Err(e),
        };
        if !account.is_active() {
            return Err(AuthError::DisabledAccount(account.name).into());
        }

        // 3. Resolve the signing key from the group's JWKS
        let group_code = account.certificate_group_code.as_deref().ok_or_else(|| {
            AuthError::InvalidSignature(format!("{} has no certificate group", account.name))
        })?;
        let jwks = match self.jwks.list_jwks_for_group(group_code, JwksMode::Full).await {
            Ok(set) => set,
            Err(WardenError::GroupNotFound { .. }) => {
                return Err(
                    AuthError::InvalidSignature(format!("group {group_code} not found")).into(),
                );
            }
            Err(e) => return Err(e),
        };
        let jwk = jwks
            .find(&kid)
            .ok_or_else(|| AuthError::InvalidSignature(format!("no key {kid} in {group_code}")))?;
        if Algorithm::from_str(&jwk.alg).ok() != Some(header.alg) {
            return Err(
                AuthError::InvalidSignature(format!("key {kid} is not a {:?} key", header.alg))
                    .into(),
            );
        }

        // 4. Signature, audience and expiry
        let key = decoding_key(jwk)?;
        let mut validation = Validation::new(header.alg);
        validation.leeway = self.config.clock_skew_secs.max(0) as u64;
        validation.set_audience(&self.config.allowed_audiences);
        validation.set_required_spec_claims(&["iat", "exp", "aud"]);
        let claims = jsonwebtoken::decode::<ServiceAccountClaims>(token, &key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        // 5. Lifetime and clock skew
        let lifetime = check_lifetime(&claims, Utc::now().timestamp(), &self.config)?;

        // 6. Single use
        let jti = claims.jti.as_deref().ok_or(AuthError::MissingJti)?;
        let jti = Uuid::parse_str(jti).map_err(|_| AuthError::InvalidJti(jti.to_string()))?;
        match self
            .replay
            .check(&jti.to_string(), replay_ttl(lifetime, &self.config))
            .await?
        {
            ReplayCheck::Replayed => {
                info!(account = %account.name, %jti, "Replayed service-account token");
                return Err(AuthError::ReplayDetected.into());
            }
            ReplayCheck::Fresh | ReplayCheck::Skipped => {}
        }

        // 7. Scopes
        if !account.has_scopes(required_scopes.iter().copied()) {
            return Err(AuthError::InvalidScope(required_scopes.join(" ")).into());
        }

        debug!(account = %account.name, %kid, "Verified service-account token");
        Ok(VerifiedToken {
            account,
            claims,
            kid,
        })
    }
}
