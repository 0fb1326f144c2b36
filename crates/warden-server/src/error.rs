//! Startup errors.

use thiserror::Error;
use warden_auth::AuthError;
use warden_core::error::WardenError;
use warden_db::DbError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Warden(#[from] WardenError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}
