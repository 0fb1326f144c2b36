//! EdDSA access tokens minted by the token exchange.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenExchangeConfig;
use crate::error::AuthError;

/// Claims of an exchanged access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Service account name.
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    /// Space-separated granted scopes.
    pub scope: String,
    /// `kid` of the assertion the token was exchanged for.
    pub assertion_kid: String,
}

/// Issue a signed EdDSA (Ed25519) access token.
pub fn issue_access_token(
    account_name: &str,
    scope: &str,
    assertion_kid: &str,
    config: &TokenExchangeConfig,
) -> Result<(String, AccessTokenClaims), AuthError> {
    let now = Utc::now().timestamp();
    let claims = AccessTokenClaims {
        sub: account_name.to_string(),
        iss: config.issuer.clone(),
        iat: now,
        exp: now + config.access_token_lifetime_secs as i64,
        jti: Uuid::new_v4().to_string(),
        scope: scope.to_string(),
        assertion_kid: assertion_kid.to_string(),
    };

    let key = EncodingKey::from_ed_pem(config.signing_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad access token signing key: {e}")))?;

    let token = jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), &claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))?;
    Ok((token, claims))
}

/// Decode and verify an access token issued by [`issue_access_token`].
pub fn decode_access_token(
    token: &str,
    config: &TokenExchangeConfig,
) -> Result<AccessTokenClaims, AuthError> {
    let key = DecodingKey::from_ed_pem(config.verification_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad access token verification key: {e}")))?;

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

    jsonwebtoken::decode::<AccessTokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AuthError::ExpiredToken("access token has expired".into())
            }
            _ => AuthError::InvalidSignature(e.to_string()),
        })
}
