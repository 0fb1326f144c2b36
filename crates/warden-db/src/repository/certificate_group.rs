//! SurrealDB implementation of [`CertificateGroupRepository`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::certificate_group::{
    CertificateGroup, CreateCertificateGroup, KeyType, RotationPolicy, SubjectTemplate,
    UpdateCertificateGroup, UsageType,
};
use warden_core::repository::{CertificateGroupRepository, PaginatedResult, Pagination};

use super::{CountRow, is_unique_violation, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "certificate_group";

/// Marker thrown by the delete transaction when active certificates exist.
const ACTIVE_CERTIFICATES: &str = "certificate_group_has_active_certificates";
/// Marker thrown by the delete transaction when the group is absent.
const GROUP_MISSING: &str = "certificate_group_missing";

#[derive(Debug, SurrealValue)]
struct GroupRowWithId {
    record_id: String,
    group_code: String,
    display_name: String,
    description: Option<String>,
    usage_type: String,
    key_type: String,
    key_curve: Option<String>,
    key_size: Option<u32>,
    subject: serde_json::Value,
    auto_rotate: bool,
    rotation_threshold_days: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GroupRowWithId {
    fn try_into_group(self) -> Result<CertificateGroup, DbError> {
        let usage_type = UsageType::parse(&self.usage_type)
            .ok_or_else(|| DbError::Decode(format!("unknown usage_type: {}", self.usage_type)))?;
        let key_type = KeyType::parse(&self.key_type)
            .ok_or_else(|| DbError::Decode(format!("unknown key_type: {}", self.key_type)))?;
        let subject: SubjectTemplate = serde_json::from_value(self.subject)
            .map_err(|e| DbError::Decode(format!("subject template: {e}")))?;

        Ok(CertificateGroup {
            id: parse_uuid(&self.record_id, "group")?,
            group_code: self.group_code,
            display_name: self.display_name,
            description: self.description,
            usage_type,
            key_type,
            key_curve: self.key_curve,
            key_size: self.key_size,
            subject,
            rotation_policy: RotationPolicy {
                auto_rotate: self.auto_rotate,
                rotation_threshold_days: self.rotation_threshold_days,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn subject_value(subject: &SubjectTemplate) -> serde_json::Value {
    serde_json::Value::Object(
        subject
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

/// SurrealDB implementation of the certificate group registry.
#[derive(Clone)]
pub struct SurrealCertificateGroupRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCertificateGroupRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_one(&self, clause: &str, key: &str, value: String) -> WardenResult<Option<CertificateGroup>> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM certificate_group WHERE {clause}"
        );
        let mut result = self
            .db
            .query(query)
            .bind((key.to_string(), value))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(GroupRowWithId::try_into_group)
            .transpose()
            .map_err(Into::into)
    }
}

/// Classify the statement errors of a failed delete transaction.
fn delete_failure(group_code: &str, messages: &[String]) -> DbError {
    if messages.iter().any(|m| m.contains(GROUP_MISSING)) {
        return DbError::NotFound {
            entity: ENTITY.into(),
            id: group_code.to_string(),
        };
    }
    if messages.iter().any(|m| m.contains(ACTIVE_CERTIFICATES)) {
        return DbError::Conflict {
            entity: ENTITY.into(),
            message: format!("group '{group_code}' still has active certificates"),
        };
    }
    DbError::Query(messages.join("; "))
}

impl<C: Connection> CertificateGroupRepository for SurrealCertificateGroupRepository<C> {
    async fn create(&self, input: CreateCertificateGroup) -> WardenResult<CertificateGroup> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let group_code = input.group_code.clone();

        let result = self
            .db
            .query(
                "CREATE type::record('certificate_group', $id) SET \
                 group_code = $group_code, \
                 display_name = $display_name, \
                 description = $description, \
                 usage_type = $usage_type, \
                 key_type = $key_type, \
                 key_curve = $key_curve, \
                 key_size = $key_size, \
                 subject = $subject, \
                 auto_rotate = $auto_rotate, \
                 rotation_threshold_days = $threshold; \
                 SELECT meta::id(id) AS record_id, * FROM type::record('certificate_group', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("group_code", input.group_code))
            .bind(("display_name", input.display_name))
            .bind(("description", input.description))
            .bind(("usage_type", input.usage_type.as_str()))
            .bind(("key_type", input.key_type.as_str()))
            .bind(("key_curve", input.key_curve))
            .bind(("key_size", input.key_size))
            .bind(("subject", subject_value(&input.subject)))
            .bind(("auto_rotate", input.rotation_policy.auto_rotate))
            .bind(("threshold", input.rotation_policy.rotation_threshold_days))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| {
            if is_unique_violation(&e) {
                DbError::Conflict {
                    entity: ENTITY.into(),
                    message: format!("group_code '{group_code}' already exists"),
                }
            } else {
                DbError::from(e)
            }
        })?;

        let rows: Vec<GroupRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        debug!(group_code = %group_code, "Certificate group created");
        row.try_into_group().map_err(Into::into)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<CertificateGroup> {
        self.select_one("id = type::record('certificate_group', $id)", "id", id.to_string())
            .await?
            .ok_or_else(|| {
                DbError::NotFound {
                    entity: ENTITY.into(),
                    id: id.to_string(),
                }
                .into()
            })
    }

    async fn get_by_code(&self, group_code: &str) -> WardenResult<CertificateGroup> {
        self.select_one("group_code = $group_code", "group_code", group_code.to_string())
            .await?
            .ok_or_else(|| {
                DbError::NotFound {
                    entity: ENTITY.into(),
                    id: group_code.to_string(),
                }
                .into()
            })
    }

    async fn update(&self, input: UpdateCertificateGroup) -> WardenResult<CertificateGroup> {
        let existing = match input.id {
            Some(id) => self.get_by_id(id).await?,
            None => self.get_by_code(&input.group_code).await?,
        };
        let id_str = existing.id.to_string();

        let mut sets = Vec::new();
        if input.display_name.is_some() {
            sets.push("display_name = $display_name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.key_type.is_some() {
            sets.push("key_type = $key_type");
        }
        if input.key_curve.is_some() {
            sets.push("key_curve = $key_curve");
        }
        if input.key_size.is_some() {
            sets.push("key_size = $key_size");
        }
        if input.subject.is_some() {
            sets.push("subject = $subject");
        }
        if input.rotation_policy.is_some() {
            sets.push("auto_rotate = $auto_rotate");
            sets.push("rotation_threshold_days = $threshold");
        }
        // created_at is never part of the SET list.
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('certificate_group', $id) SET {}; \
             SELECT meta::id(id) AS record_id, * FROM type::record('certificate_group', $id);",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(display_name) = input.display_name {
            builder = builder.bind(("display_name", display_name));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(key_type) = input.key_type {
            builder = builder.bind(("key_type", key_type.as_str()));
        }
        if let Some(key_curve) = input.key_curve {
            builder = builder.bind(("key_curve", key_curve));
        }
        if let Some(key_size) = input.key_size {
            builder = builder.bind(("key_size", key_size));
        }
        if let Some(subject) = &input.subject {
            builder = builder.bind(("subject", subject_value(subject)));
        }
        if let Some(policy) = input.rotation_policy {
            builder = builder
                .bind(("auto_rotate", policy.auto_rotate))
                .bind(("threshold", policy.rotation_threshold_days));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from)?;

        let rows: Vec<GroupRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: id_str,
        })?;

        row.try_into_group().map_err(Into::into)
    }

    async fn delete(&self, group_code: &str) -> WardenResult<()> {
        let query = format!(
            "BEGIN TRANSACTION; \
             LET $group = (SELECT meta::id(id) AS record_id FROM certificate_group \
                 WHERE group_code = $group_code); \
             IF array::len($group) = 0 {{ THROW '{GROUP_MISSING}'; }}; \
             LET $active = (SELECT count() AS total FROM issued_certificate \
                 WHERE group_id = $group[0].record_id \
                 AND revoked_at = NONE \
                 AND (expires_at = NONE OR expires_at > time::now()) \
                 GROUP ALL); \
             IF array::len($active) > 0 AND $active[0].total > 0 {{ \
                 THROW '{ACTIVE_CERTIFICATES}'; \
             }}; \
             DELETE certificate_group WHERE group_code = $group_code; \
             COMMIT TRANSACTION;"
        );

        let mut response = self
            .db
            .query(query)
            .bind(("group_code", group_code.to_string()))
            .await
            .map_err(DbError::from)?;

        // A thrown error cancels every statement of the transaction, so
        // look for the marker across all of them.
        let errors: HashMap<usize, surrealdb::Error> = response.take_errors();
        if errors.is_empty() {
            return Ok(());
        }
        let messages: Vec<String> = errors.values().map(ToString::to_string).collect();
        Err(delete_failure(group_code, &messages).into())
    }

    async fn list(&self, pagination: Pagination) -> WardenResult<PaginatedResult<CertificateGroup>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM certificate_group GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM certificate_group \
                 ORDER BY group_code ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(GroupRowWithId::try_into_group)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_auto_rotating(&self) -> WardenResult<Vec<CertificateGroup>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM certificate_group \
                 WHERE auto_rotate = true \
                 ORDER BY group_code ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(GroupRowWithId::try_into_group)
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }
}
