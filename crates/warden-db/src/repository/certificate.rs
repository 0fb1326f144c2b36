//! SurrealDB implementation of [`CertificateRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::certificate::{
    CertificateFilter, CreateIssuedCertificate, IssuedCertificate,
};
use warden_core::models::certificate_group::UsageType;
use warden_core::models::jwk::Jwk;
use warden_core::repository::{CertificateRepository, PaginatedResult, Pagination};

use super::{CountRow, is_unique_violation, parse_optional_uuid, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "issued_certificate";

const SELECT_COLUMNS: &str = "SELECT meta::id(id) AS record_id, * FROM issued_certificate";

#[derive(Debug, SurrealValue)]
struct CertificateRowWithId {
    record_id: String,
    kid: String,
    certificate_pem: String,
    usage_type: String,
    jwk: serde_json::Value,
    subject: String,
    serial_number: String,
    fingerprint: String,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    revocation_reason: Option<String>,
    group_id: Option<String>,
    auto_rotated_from_kid: Option<String>,
    updated_at: DateTime<Utc>,
}

impl CertificateRowWithId {
    fn try_into_certificate(self) -> Result<IssuedCertificate, DbError> {
        let usage_type = UsageType::parse(&self.usage_type)
            .ok_or_else(|| DbError::Decode(format!("unknown usage_type: {}", self.usage_type)))?;
        let jwk: Jwk = serde_json::from_value(self.jwk)
            .map_err(|e| DbError::Decode(format!("jwk for {}: {e}", self.kid)))?;

        Ok(IssuedCertificate {
            id: parse_uuid(&self.record_id, "certificate")?,
            kid: self.kid,
            certificate_pem: self.certificate_pem,
            usage_type,
            jwk,
            subject: self.subject,
            serial_number: self.serial_number,
            fingerprint: self.fingerprint,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
            revocation_reason: self.revocation_reason,
            group_id: parse_optional_uuid(self.group_id.as_deref(), "group")?,
            auto_rotated_from_kid: self.auto_rotated_from_kid,
            updated_at: self.updated_at,
        })
    }
}

fn decode_rows(rows: Vec<CertificateRowWithId>) -> Result<Vec<IssuedCertificate>, DbError> {
    rows.into_iter()
        .map(CertificateRowWithId::try_into_certificate)
        .collect()
}

/// Builds the WHERE clause for a [`CertificateFilter`]. Returns the
/// clause (possibly empty) and the parameters to bind.
fn filter_clause(filter: &CertificateFilter) -> (String, Vec<(&'static str, serde_json::Value)>) {
    let mut conditions = Vec::new();
    let mut params: Vec<(&'static str, serde_json::Value)> = Vec::new();

    if let Some(kid) = &filter.kid_contains {
        conditions.push("string::contains(string::lowercase(kid), $kid_contains)");
        params.push(("kid_contains", kid.to_lowercase().into()));
    }
    if let Some(group_id) = filter.group_id {
        conditions.push("group_id = $group_id");
        params.push(("group_id", group_id.to_string().into()));
    }
    if let Some(usage) = filter.usage_type {
        conditions.push("usage_type = $usage_type");
        params.push(("usage_type", usage.as_str().into()));
    }
    match filter.revoked {
        Some(true) => conditions.push("revoked_at != NONE"),
        Some(false) => conditions.push("revoked_at = NONE"),
        None => {}
    }
    if let Some(subject) = &filter.subject_contains {
        conditions.push("string::contains(string::lowercase(subject), $subject_contains)");
        params.push(("subject_contains", subject.to_lowercase().into()));
    }
    let range = [
        ("issued_at >= <datetime>$issued_from", "issued_from", filter.issued_from),
        ("issued_at <= <datetime>$issued_to", "issued_to", filter.issued_to),
        ("expires_at >= <datetime>$expires_from", "expires_from", filter.expires_from),
        ("expires_at <= <datetime>$expires_to", "expires_to", filter.expires_to),
    ];
    for (condition, name, value) in range {
        if let Some(at) = value {
            conditions.push(condition);
            params.push((name, at.to_rfc3339().into()));
        }
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (clause, params)
}

/// SurrealDB implementation of the issued certificate store.
#[derive(Clone)]
pub struct SurrealCertificateRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCertificateRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CertificateRepository for SurrealCertificateRepository<C> {
    async fn create(&self, input: CreateIssuedCertificate) -> WardenResult<IssuedCertificate> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let kid = input.kid.clone();
        let jwk = serde_json::to_value(&input.jwk)
            .map_err(|e| DbError::Decode(format!("jwk encode: {e}")))?;

        let result = self
            .db
            .query(
                "CREATE type::record('issued_certificate', $id) SET \
                 kid = $kid, \
                 certificate_pem = $certificate_pem, \
                 usage_type = $usage_type, \
                 jwk = $jwk, \
                 subject = $subject, \
                 serial_number = $serial_number, \
                 fingerprint = $fingerprint, \
                 issued_at = $issued_at, \
                 expires_at = $expires_at, \
                 group_id = $group_id, \
                 auto_rotated_from_kid = $auto_rotated_from_kid; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('issued_certificate', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("kid", input.kid))
            .bind(("certificate_pem", input.certificate_pem))
            .bind(("usage_type", input.usage_type.as_str()))
            .bind(("jwk", jwk))
            .bind(("subject", input.subject))
            .bind(("serial_number", input.serial_number))
            .bind(("fingerprint", input.fingerprint))
            .bind(("issued_at", input.issued_at))
            .bind(("expires_at", input.expires_at))
            .bind(("group_id", input.group_id.map(|g| g.to_string())))
            .bind(("auto_rotated_from_kid", input.auto_rotated_from_kid))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| {
            if is_unique_violation(&e) {
                DbError::Conflict {
                    entity: ENTITY.into(),
                    message: format!("kid '{kid}' already issued"),
                }
            } else {
                DbError::from(e)
            }
        })?;

        let rows: Vec<CertificateRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: kid,
        })?;
        row.try_into_certificate().map_err(Into::into)
    }

    async fn get_by_kid(&self, kid: &str) -> WardenResult<IssuedCertificate> {
        let mut result = self
            .db
            .query(format!("{SELECT_COLUMNS} WHERE kid = $kid"))
            .bind(("kid", kid.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: kid.to_string(),
        })?;
        row.try_into_certificate().map_err(Into::into)
    }

    async fn revoke(
        &self,
        kid: &str,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> WardenResult<IssuedCertificate> {
        let result = self
            .db
            .query(
                "UPDATE issued_certificate SET \
                 revoked_at = $at, \
                 revocation_reason = $reason, \
                 updated_at = time::now() \
                 WHERE kid = $kid; \
                 SELECT meta::id(id) AS record_id, * FROM issued_certificate \
                 WHERE kid = $kid;",
            )
            .bind(("kid", kid.to_string()))
            .bind(("reason", reason))
            .bind(("at", at))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(DbError::from)?;
        let rows: Vec<CertificateRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: kid.to_string(),
        })?;
        row.try_into_certificate().map_err(Into::into)
    }

    async fn latest_for_group(&self, group_id: Uuid) -> WardenResult<Option<IssuedCertificate>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_COLUMNS} WHERE group_id = $group_id \
                 ORDER BY issued_at DESC LIMIT 1"
            ))
            .bind(("group_id", group_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(CertificateRowWithId::try_into_certificate)
            .transpose()
            .map_err(Into::into)
    }

    async fn count_active_for_group(&self, group_id: Uuid, now: DateTime<Utc>) -> WardenResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM issued_certificate \
                 WHERE group_id = $group_id \
                 AND revoked_at = NONE \
                 AND (expires_at = NONE OR expires_at > $now) \
                 GROUP ALL",
            )
            .bind(("group_id", group_id.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn list_for_group(&self, group_id: Uuid) -> WardenResult<Vec<IssuedCertificate>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_COLUMNS} WHERE group_id = $group_id ORDER BY issued_at DESC"
            ))
            .bind(("group_id", group_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRowWithId> = result.take(0).map_err(DbError::from)?;
        decode_rows(rows).map_err(Into::into)
    }

    async fn search(
        &self,
        filter: CertificateFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<IssuedCertificate>> {
        let (clause, params) = filter_clause(&filter);

        let count_query =
            format!("SELECT count() AS total FROM issued_certificate{clause} GROUP ALL");
        let mut count_builder = self.db.query(count_query);
        for (name, value) in params.clone() {
            count_builder = count_builder.bind((name, value));
        }
        let mut count_result = count_builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let query = format!(
            "{SELECT_COLUMNS}{clause} ORDER BY issued_at DESC LIMIT $limit START $offset"
        );
        let mut builder = self
            .db
            .query(query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        for (name, value) in params {
            builder = builder.bind((name, value));
        }
        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<CertificateRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: decode_rows(rows)?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_has_no_where_clause() {
        let (clause, params) = filter_clause(&CertificateFilter::default());
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn revoked_filter_binds_nothing() {
        let (clause, params) = filter_clause(&CertificateFilter {
            revoked: Some(true),
            ..Default::default()
        });
        assert_eq!(clause, " WHERE revoked_at != NONE");
        assert!(params.is_empty());
    }

    #[test]
    fn substring_filters_are_lowercased() {
        let (clause, params) = filter_clause(&CertificateFilter {
            kid_contains: Some("ABC".into()),
            subject_contains: Some("Acme".into()),
            ..Default::default()
        });
        assert!(clause.contains("$kid_contains"));
        assert!(clause.contains(" AND "));
        assert_eq!(params[0].1, serde_json::json!("abc"));
        assert_eq!(params[1].1, serde_json::json!("acme"));
    }
}
