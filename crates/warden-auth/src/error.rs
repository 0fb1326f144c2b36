//! Service-account token error types.

use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown service account: {0}")]
    UnknownAccount(String),

    #[error("service account is disabled: {0}")]
    DisabledAccount(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid audience: {0}")]
    InvalidAudience(String),

    #[error("expired token: {0}")]
    ExpiredToken(String),

    #[error("token carries no jti")]
    MissingJti,

    #[error("jti is not a UUID: {0}")]
    InvalidJti(String),

    #[error("jti has already been used")]
    ReplayDetected,

    #[error("scope not granted: {0}")]
    InvalidScope(String),

    #[error("replay check failed: {0}")]
    JtiCheckFailed(String),

    #[error("unsupported grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl AuthError {
    /// Machine-readable code of a token verification failure.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            AuthError::UnknownAccount(_) => Some("UnknownAccount"),
            AuthError::DisabledAccount(_) => Some("DisabledAccount"),
            AuthError::InvalidSignature(_) => Some("InvalidSignature"),
            AuthError::InvalidAudience(_) => Some("InvalidAudience"),
            AuthError::ExpiredToken(_) => Some("ExpiredToken"),
            AuthError::MissingJti => Some("MissingJTI"),
            AuthError::InvalidJti(_) => Some("InvalidJTI"),
            AuthError::ReplayDetected => Some("ReplayDetected"),
            AuthError::InvalidScope(_) => Some("InvalidScope"),
            AuthError::JtiCheckFailed(_) => Some("JTICheckFailed"),
            AuthError::UnsupportedGrantType(_) | AuthError::Crypto(_) => None,
        }
    }
}

impl From<AuthError> for WardenError {
    fn from(err: AuthError) -> Self {
        if let Some(code) = err.code() {
            return WardenError::ServiceAccountJwt {
                code,
                message: err.to_string(),
            };
        }
        match err {
            AuthError::UnsupportedGrantType(_) => WardenError::CertificateValidation(err.to_string()),
            AuthError::Crypto(msg) => WardenError::Crypto(msg),
            other => WardenError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_failures_carry_codes() {
        let err: WardenError = AuthError::ReplayDetected.into();
        assert_eq!(err.jwt_code(), Some("ReplayDetected"));
        assert_eq!(err.status_code(), 401);

        let err: WardenError = AuthError::MissingJti.into();
        assert_eq!(err.jwt_code(), Some("MissingJTI"));
    }

    #[test]
    fn cache_failure_is_server_side() {
        let err: WardenError = AuthError::JtiCheckFailed("timeout".into()).into();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn unsupported_grant_is_validation_error() {
        let err: WardenError = AuthError::UnsupportedGrantType("password".into()).into();
        assert!(matches!(err, WardenError::CertificateValidation(_)));
    }
}
