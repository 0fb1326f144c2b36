//! SurrealDB implementation of [`PrivateKeyRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::private_key::{CreatePrivateKeyRecord, PrivateKeyRecord};
use warden_core::repository::PrivateKeyRepository;

use super::{CountRow, is_unique_violation, parse_optional_uuid, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "private_key";

#[derive(Debug, SurrealValue)]
struct PrivateKeyRowWithId {
    record_id: String,
    kid: String,
    group_id: Option<String>,
    private_key: String,
    sealed: bool,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl PrivateKeyRowWithId {
    fn try_into_record(self) -> Result<PrivateKeyRecord, DbError> {
        Ok(PrivateKeyRecord {
            id: parse_uuid(&self.record_id, "private key")?,
            kid: self.kid,
            group_id: parse_optional_uuid(self.group_id.as_deref(), "group")?,
            private_key: self.private_key,
            sealed: self.sealed,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the server-held private key store.
#[derive(Clone)]
pub struct SurrealPrivateKeyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPrivateKeyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PrivateKeyRepository for SurrealPrivateKeyRepository<C> {
    async fn create(&self, input: CreatePrivateKeyRecord) -> WardenResult<PrivateKeyRecord> {
        let id_str = Uuid::new_v4().to_string();
        let kid = input.kid.clone();

        let result = self
            .db
            .query(
                "CREATE type::record('private_key', $id) SET \
                 kid = $kid, \
                 group_id = $group_id, \
                 private_key = $private_key, \
                 sealed = $sealed, \
                 expires_at = $expires_at; \
                 SELECT meta::id(id) AS record_id, * FROM type::record('private_key', $id);",
            )
            .bind(("id", id_str))
            .bind(("kid", input.kid))
            .bind(("group_id", input.group_id.map(|g| g.to_string())))
            .bind(("private_key", input.private_key))
            .bind(("sealed", input.sealed))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| {
            if is_unique_violation(&e) {
                DbError::Conflict {
                    entity: ENTITY.into(),
                    message: format!("private key for '{kid}' already stored"),
                }
            } else {
                DbError::from(e)
            }
        })?;

        let rows: Vec<PrivateKeyRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: kid,
        })?;
        row.try_into_record().map_err(Into::into)
    }

    async fn get_by_kid(&self, kid: &str) -> WardenResult<PrivateKeyRecord> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM private_key WHERE kid = $kid")
            .bind(("kid", kid.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PrivateKeyRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: kid.to_string(),
        })?;
        row.try_into_record().map_err(Into::into)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> WardenResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM private_key \
                 WHERE expires_at != NONE AND expires_at < $now GROUP ALL; \
                 DELETE private_key WHERE expires_at != NONE AND expires_at < $now;",
            )
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let purged = rows.first().map(|r| r.total).unwrap_or(0);
        if purged > 0 {
            info!(purged, "Purged expired private keys");
        }
        Ok(purged)
    }
}
