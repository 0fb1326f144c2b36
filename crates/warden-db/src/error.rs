//! Database-specific error types and conversions.

use warden_core::error::WardenError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict on {entity}: {message}")]
    Conflict { entity: String, message: String },

    #[error("Corrupt record: {0}")]
    Decode(String),
}

impl From<DbError> for WardenError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => match entity.as_str() {
                "certificate_group" => WardenError::GroupNotFound { group_code: id },
                "issued_certificate" => WardenError::CertificateNotFound { kid: id },
                "private_key" => WardenError::PrivateKeyNotFound { kid: id },
                _ => WardenError::NotFound { entity, id },
            },
            DbError::Conflict { entity, message } => match entity.as_str() {
                "certificate_group" => WardenError::GroupConflict(message),
                _ => WardenError::AlreadyExists { entity },
            },
            other => WardenError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_group_maps_to_group_not_found() {
        let err: WardenError = DbError::NotFound {
            entity: "certificate_group".into(),
            id: "g1".into(),
        }
        .into();
        assert!(matches!(err, WardenError::GroupNotFound { group_code } if group_code == "g1"));
    }

    #[test]
    fn missing_private_key_maps_to_private_key_not_found() {
        let err: WardenError = DbError::NotFound {
            entity: "private_key".into(),
            id: "k1".into(),
        }
        .into();
        assert!(matches!(err, WardenError::PrivateKeyNotFound { .. }));
    }

    #[test]
    fn decode_errors_are_database_errors() {
        let err: WardenError = DbError::Decode("bad uuid".into()).into();
        assert!(matches!(err, WardenError::Database(_)));
    }
}
