//! SurrealDB implementation of [`AuditLogRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::audit::{
    ActorType, AuditAction, AuditEvent, AuditOutcome, CreateAuditEvent,
};
use warden_core::repository::{AuditFilter, AuditLogRepository, PaginatedResult, Pagination};

use super::{CountRow, parse_uuid};
use crate::error::DbError;

fn actor_type_to_str(t: ActorType) -> &'static str {
    match t {
        ActorType::Operator => "Operator",
        ActorType::ServiceAccount => "ServiceAccount",
        ActorType::System => "System",
    }
}

fn parse_actor_type(s: &str) -> Result<ActorType, DbError> {
    match s {
        "Operator" => Ok(ActorType::Operator),
        "ServiceAccount" => Ok(ActorType::ServiceAccount),
        "System" => Ok(ActorType::System),
        other => Err(DbError::Decode(format!("unknown actor_type: {other}"))),
    }
}

fn outcome_to_str(o: AuditOutcome) -> &'static str {
    match o {
        AuditOutcome::Success => "Success",
        AuditOutcome::Failure => "Failure",
        AuditOutcome::Denied => "Denied",
    }
}

fn parse_outcome(s: &str) -> Result<AuditOutcome, DbError> {
    match s {
        "Success" => Ok(AuditOutcome::Success),
        "Failure" => Ok(AuditOutcome::Failure),
        "Denied" => Ok(AuditOutcome::Denied),
        other => Err(DbError::Decode(format!("unknown outcome: {other}"))),
    }
}

#[derive(Debug, SurrealValue)]
struct AuditRowWithId {
    record_id: String,
    action: String,
    actor: String,
    actor_type: String,
    kid: Option<String>,
    group_code: Option<String>,
    outcome: String,
    details: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl AuditRowWithId {
    fn try_into_event(self) -> Result<AuditEvent, DbError> {
        let action = AuditAction::parse(&self.action)
            .ok_or_else(|| DbError::Decode(format!("unknown action: {}", self.action)))?;
        Ok(AuditEvent {
            id: parse_uuid(&self.record_id, "audit event")?,
            action,
            actor: self.actor,
            actor_type: parse_actor_type(&self.actor_type)?,
            kid: self.kid,
            group_code: self.group_code,
            outcome: parse_outcome(&self.outcome)?,
            details: self.details,
            timestamp: self.timestamp,
        })
    }
}

/// SurrealDB implementation of the append-only audit log.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditEvent) -> WardenResult<AuditEvent> {
        let id_str = Uuid::new_v4().to_string();
        let details = input
            .details
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let result = self
            .db
            .query(
                "CREATE type::record('audit_event', $id) SET \
                 action = $action, \
                 actor = $actor, \
                 actor_type = $actor_type, \
                 kid = $kid, \
                 group_code = $group_code, \
                 outcome = $outcome, \
                 details = $details; \
                 SELECT meta::id(id) AS record_id, * FROM type::record('audit_event', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("action", input.action.as_str()))
            .bind(("actor", input.actor))
            .bind(("actor_type", actor_type_to_str(input.actor_type)))
            .bind(("kid", input.kid))
            .bind(("group_code", input.group_code))
            .bind(("outcome", outcome_to_str(input.outcome)))
            .bind(("details", details))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(DbError::from)?;
        let rows: Vec<AuditRowWithId> = result.take(1).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_event".into(),
            id: id_str,
        })?;
        row.try_into_event().map_err(Into::into)
    }

    async fn list(
        &self,
        filter: AuditFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<AuditEvent>> {
        let mut conditions = Vec::new();
        if filter.action.is_some() {
            conditions.push("action = $action");
        }
        if filter.actor.is_some() {
            conditions.push("actor = $actor");
        }
        if filter.kid.is_some() {
            conditions.push("kid = $kid");
        }
        if filter.group_code.is_some() {
            conditions.push("group_code = $group_code");
        }
        if filter.from.is_some() {
            conditions.push("timestamp >= $from");
        }
        if filter.to.is_some() {
            conditions.push("timestamp <= $to");
        }
        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT count() AS total FROM audit_event{clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM audit_event{clause} \
             ORDER BY timestamp DESC LIMIT $limit START $offset;"
        );

        let mut builder = self
            .db
            .query(query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(action) = filter.action {
            builder = builder.bind(("action", action.as_str()));
        }
        if let Some(actor) = filter.actor {
            builder = builder.bind(("actor", actor));
        }
        if let Some(kid) = filter.kid {
            builder = builder.bind(("kid", kid));
        }
        if let Some(group_code) = filter.group_code {
            builder = builder.bind(("group_code", group_code));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);
        let rows: Vec<AuditRowWithId> = result.take(1).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(AuditRowWithId::try_into_event)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
