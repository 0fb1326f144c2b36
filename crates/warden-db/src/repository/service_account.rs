//! SurrealDB implementation of [`ServiceAccountRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::certificate_group::UsageType;
use warden_core::models::service_account::{
    CreateServiceAccount, ServiceAccount, ServiceAccountStatus, UpdateServiceAccount,
};
use warden_core::repository::{PaginatedResult, Pagination, ServiceAccountRepository};

use super::{CountRow, is_unique_violation, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "service_account";

fn parse_status(s: &str) -> Result<ServiceAccountStatus, DbError> {
    match s {
        "Active" => Ok(ServiceAccountStatus::Active),
        "Disabled" => Ok(ServiceAccountStatus::Disabled),
        other => Err(DbError::Decode(format!("unknown status: {other}"))),
    }
}

fn status_to_str(s: ServiceAccountStatus) -> &'static str {
    match s {
        ServiceAccountStatus::Active => "Active",
        ServiceAccountStatus::Disabled => "Disabled",
    }
}

#[derive(Debug, SurrealValue)]
struct ServiceAccountRowWithId {
    record_id: String,
    name: String,
    certificate_group_code: Option<String>,
    scopes: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceAccountRowWithId {
    fn try_into_service_account(self) -> Result<ServiceAccount, DbError> {
        Ok(ServiceAccount {
            id: parse_uuid(&self.record_id, "service account")?,
            name: self.name,
            certificate_group_code: self.certificate_group_code,
            scopes: self.scopes,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct UsageRow {
    usage_type: String,
}

/// SurrealDB implementation of the ServiceAccount repository.
#[derive(Clone)]
pub struct SurrealServiceAccountRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealServiceAccountRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Service accounts may only reference existing `client_signing`
    /// groups.
    async fn ensure_client_signing_group(&self, group_code: &str) -> WardenResult<()> {
        let mut result = self
            .db
            .query("SELECT usage_type FROM certificate_group WHERE group_code = $group_code")
            .bind(("group_code", group_code.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UsageRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| WardenError::GroupNotFound {
            group_code: group_code.to_string(),
        })?;

        if UsageType::parse(&row.usage_type) != Some(UsageType::ClientSigning) {
            return Err(WardenError::CertificateValidation(format!(
                "service accounts require a client_signing group, '{group_code}' is {}",
                row.usage_type
            )));
        }
        Ok(())
    }

    async fn select_one(&self, clause: &str, key: &'static str, value: String) -> WardenResult<ServiceAccount> {
        let mut result = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS record_id, * FROM service_account WHERE {clause}"
            ))
            .bind((key, value.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ServiceAccountRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: value,
        })?;
        row.try_into_service_account().map_err(Into::into)
    }
}

impl<C: Connection> ServiceAccountRepository for SurrealServiceAccountRepository<C> {
    async fn create(&self, input: CreateServiceAccount) -> WardenResult<ServiceAccount> {
        if let Some(code) = &input.certificate_group_code {
            self.ensure_client_signing_group(code).await?;
        }

        let id_str = Uuid::new_v4().to_string();
        let name = input.name.clone();

        let result = self
            .db
            .query(
                "CREATE type::record('service_account', $id) SET \
                 name = $name, \
                 certificate_group_code = $group_code, \
                 scopes = $scopes, \
                 status = 'Active'; \
                 SELECT meta::id(id) AS record_id, * FROM type::record('service_account', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("group_code", input.certificate_group_code))
            .bind(("scopes", input.scopes))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| {
            if is_unique_violation(&e) {
                DbError::Conflict {
                    entity: ENTITY.into(),
                    message: format!("service account '{name}' already exists"),
                }
            } else {
                DbError::from(e)
            }
        })?;

        let rows: Vec<ServiceAccountRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;
        row.try_into_service_account().map_err(Into::into)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<ServiceAccount> {
        self.select_one("id = type::record('service_account', $id)", "id", id.to_string())
            .await
    }

    async fn get_by_name(&self, name: &str) -> WardenResult<ServiceAccount> {
        self.select_one("name = $name", "name", name.to_string()).await
    }

    async fn update(&self, id: Uuid, input: UpdateServiceAccount) -> WardenResult<ServiceAccount> {
        if let Some(code) = &input.certificate_group_code {
            self.ensure_client_signing_group(code).await?;
        }

        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.certificate_group_code.is_some() {
            sets.push("certificate_group_code = $group_code");
        }
        if input.scopes.is_some() {
            sets.push("scopes = $scopes");
        }
        if input.status.is_some() {
            sets.push("status = $status");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('service_account', $id) SET {}; \
             SELECT meta::id(id) AS record_id, * FROM type::record('service_account', $id);",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(code) = input.certificate_group_code {
            builder = builder.bind(("group_code", code));
        }
        if let Some(scopes) = input.scopes {
            builder = builder.bind(("scopes", scopes));
        }
        if let Some(status) = input.status {
            builder = builder.bind(("status", status_to_str(status)));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from)?;

        let rows: Vec<ServiceAccountRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;
        row.try_into_service_account().map_err(Into::into)
    }

    async fn list(&self, pagination: Pagination) -> WardenResult<PaginatedResult<ServiceAccount>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM service_account GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM service_account \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ServiceAccountRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_service_account())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
