//! Audit recording for PKI operations.

use tracing::error;
use warden_core::models::audit::{ActorType, AuditAction, CreateAuditEvent};
use warden_core::repository::AuditLogRepository;

/// Who performed an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub actor_type: ActorType,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            name: "system".into(),
            actor_type: ActorType::System,
        }
    }

    pub fn operator(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actor_type: ActorType::Operator,
        }
    }

    pub fn service_account(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actor_type: ActorType::ServiceAccount,
        }
    }

    pub fn event(&self, action: AuditAction) -> CreateAuditEvent {
        CreateAuditEvent::by(action, self.name.clone(), self.actor_type)
    }
}

/// Appends audit events without letting a storage failure undo the
/// operation being audited.
#[derive(Clone)]
pub struct AuditRecorder<A> {
    repo: A,
}

impl<A: AuditLogRepository> AuditRecorder<A> {
    pub fn new(repo: A) -> Self {
        Self { repo }
    }

    pub async fn record(&self, event: CreateAuditEvent) {
        let action = event.action;
        if let Err(e) = self.repo.append(event).await {
            error!(action = action.as_str(), error = %e, "Failed to write audit event");
        }
    }

    pub fn repository(&self) -> &A {
        &self.repo
    }
}
