//! PKI error types.

use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum PkiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Signing(String),

    #[error("{0}")]
    KeyGeneration(String),

    #[error("{0}")]
    Crypto(String),
}

pub type PkiResult<T> = Result<T, PkiError>;

impl From<PkiError> for WardenError {
    fn from(err: PkiError) -> Self {
        match err {
            PkiError::Validation(msg) => WardenError::CertificateValidation(msg),
            PkiError::Signing(msg) => WardenError::CertificateSigning(msg),
            PkiError::KeyGeneration(msg) => WardenError::KeyGeneration(msg),
            PkiError::Crypto(msg) => WardenError::Crypto(msg),
        }
    }
}
