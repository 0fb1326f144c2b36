//! Audit log domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActorType {
    Operator,
    ServiceAccount,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// Privileged operations recorded in the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditAction {
    GroupCreated,
    GroupUpdated,
    GroupDeleted,
    CertificateIssued,
    CertificateRevoked,
    CertificateRotated,
    PayloadSigned,
    TokenExchanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::GroupCreated => "GroupCreated",
            AuditAction::GroupUpdated => "GroupUpdated",
            AuditAction::GroupDeleted => "GroupDeleted",
            AuditAction::CertificateIssued => "CertificateIssued",
            AuditAction::CertificateRevoked => "CertificateRevoked",
            AuditAction::CertificateRotated => "CertificateRotated",
            AuditAction::PayloadSigned => "PayloadSigned",
            AuditAction::TokenExchanged => "TokenExchanged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GroupCreated" => Some(AuditAction::GroupCreated),
            "GroupUpdated" => Some(AuditAction::GroupUpdated),
            "GroupDeleted" => Some(AuditAction::GroupDeleted),
            "CertificateIssued" => Some(AuditAction::CertificateIssued),
            "CertificateRevoked" => Some(AuditAction::CertificateRevoked),
            "CertificateRotated" => Some(AuditAction::CertificateRotated),
            "PayloadSigned" => Some(AuditAction::PayloadSigned),
            "TokenExchanged" => Some(AuditAction::TokenExchanged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub action: AuditAction,
    /// Account name, operator identity, or `system`.
    pub actor: String,
    pub actor_type: ActorType,
    pub kid: Option<String>,
    pub group_code: Option<String>,
    pub outcome: AuditOutcome,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAuditEvent {
    pub action: AuditAction,
    pub actor: String,
    pub actor_type: ActorType,
    pub kid: Option<String>,
    pub group_code: Option<String>,
    pub outcome: AuditOutcome,
    pub details: Option<serde_json::Value>,
}

impl CreateAuditEvent {
    /// A successful operation performed by the system itself
    /// (rotation passes, implicit JWKS rebuilds).
    pub fn system(action: AuditAction) -> Self {
        Self {
            action,
            actor: "system".into(),
            actor_type: ActorType::System,
            kid: None,
            group_code: None,
            outcome: AuditOutcome::Success,
            details: None,
        }
    }

    pub fn by(action: AuditAction, actor: impl Into<String>, actor_type: ActorType) -> Self {
        Self {
            actor: actor.into(),
            actor_type,
            ..Self::system(action)
        }
    }

    pub fn kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn group_code(mut self, group_code: impl Into<String>) -> Self {
        self.group_code = Some(group_code.into());
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
