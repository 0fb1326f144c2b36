//! Error types for the Warden system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    /// Malformed input: bad subject, bad key usage name, CSR or claim
    /// structure problems, scope/audience mismatches.
    #[error("Certificate validation failed: {0}")]
    CertificateValidation(String),

    /// The underlying signing operation failed.
    #[error("Certificate signing failed: {0}")]
    CertificateSigning(String),

    /// Unsupported key type/curve or undersized key.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Certificate group not found: {group_code}")]
    GroupNotFound { group_code: String },

    #[error("Certificate group conflict: {0}")]
    GroupConflict(String),

    #[error("Certificate not found: {kid}")]
    CertificateNotFound { kid: String },

    #[error("Private key not found for certificate: {kid}")]
    PrivateKeyNotFound { kid: String },

    /// Service-account token verification failure with a machine-readable
    /// code (`UnknownAccount`, `ReplayDetected`, ...).
    #[error("Service account token rejected ({code}): {message}")]
    ServiceAccountJwt { code: &'static str, message: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// HTTP-style status class for the error at the service boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            WardenError::CertificateValidation(_) => 400,
            WardenError::GroupNotFound { .. }
            | WardenError::CertificateNotFound { .. }
            | WardenError::PrivateKeyNotFound { .. }
            | WardenError::NotFound { .. } => 404,
            WardenError::GroupConflict(_) | WardenError::AlreadyExists { .. } => 409,
            WardenError::ServiceAccountJwt { code, .. } => match *code {
                "JTICheckFailed" => 500,
                "InvalidScope" | "DisabledAccount" => 403,
                _ => 401,
            },
            WardenError::KeyGeneration(_) => 400,
            WardenError::CertificateSigning(_)
            | WardenError::Database(_)
            | WardenError::Crypto(_)
            | WardenError::Configuration(_)
            | WardenError::Internal(_) => 500,
        }
    }

    /// Machine-readable code for service-account token errors.
    pub fn jwt_code(&self) -> Option<&'static str> {
        match self {
            WardenError::ServiceAccountJwt { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type WardenResult<T> = Result<T, WardenError>;
