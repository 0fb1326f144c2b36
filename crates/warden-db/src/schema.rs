//! Schema definitions and migration runner for SurrealDB.
//!
//! Tables are SCHEMAFULL. UUIDs are stored as strings and enums as
//! strings guarded by ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct AppliedVersion {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "pki_schema",
    sql: SCHEMA_V1,
}];

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Certificate groups
-- =======================================================================
DEFINE TABLE certificate_group SCHEMAFULL;
DEFINE FIELD group_code ON TABLE certificate_group TYPE string \
    ASSERT string::len($value) > 0;
DEFINE FIELD display_name ON TABLE certificate_group TYPE string;
DEFINE FIELD description ON TABLE certificate_group TYPE option<string>;
DEFINE FIELD usage_type ON TABLE certificate_group TYPE string \
    ASSERT $value IN ['server_signing', 'client_signing', 'encryption'];
DEFINE FIELD key_type ON TABLE certificate_group TYPE string \
    ASSERT $value IN ['RSA', 'EC'];
DEFINE FIELD key_curve ON TABLE certificate_group TYPE option<string>;
DEFINE FIELD key_size ON TABLE certificate_group TYPE option<int>;
DEFINE FIELD subject ON TABLE certificate_group TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD auto_rotate ON TABLE certificate_group TYPE bool \
    DEFAULT false;
DEFINE FIELD rotation_threshold_days ON TABLE certificate_group TYPE int \
    ASSERT $value > 0;
DEFINE FIELD created_at ON TABLE certificate_group TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE certificate_group TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_certificate_group_code ON TABLE certificate_group \
    COLUMNS group_code UNIQUE;
DEFINE INDEX idx_certificate_group_auto_rotate ON TABLE certificate_group \
    COLUMNS auto_rotate;

-- =======================================================================
-- Issued certificates (never deleted; revocation is terminal)
-- =======================================================================
DEFINE TABLE issued_certificate SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update FULL
        FOR delete NONE;
DEFINE FIELD kid ON TABLE issued_certificate TYPE string;
DEFINE FIELD certificate_pem ON TABLE issued_certificate TYPE string;
DEFINE FIELD usage_type ON TABLE issued_certificate TYPE string \
    ASSERT $value IN ['server_signing', 'client_signing', 'encryption'];
DEFINE FIELD jwk ON TABLE issued_certificate TYPE object FLEXIBLE;
DEFINE FIELD subject ON TABLE issued_certificate TYPE string;
DEFINE FIELD serial_number ON TABLE issued_certificate TYPE string;
DEFINE FIELD fingerprint ON TABLE issued_certificate TYPE string;
DEFINE FIELD issued_at ON TABLE issued_certificate TYPE datetime;
DEFINE FIELD expires_at ON TABLE issued_certificate TYPE option<datetime>;
DEFINE FIELD revoked_at ON TABLE issued_certificate TYPE option<datetime>;
DEFINE FIELD revocation_reason ON TABLE issued_certificate \
    TYPE option<string>;
DEFINE FIELD group_id ON TABLE issued_certificate TYPE option<string>;
DEFINE FIELD auto_rotated_from_kid ON TABLE issued_certificate \
    TYPE option<string>;
DEFINE FIELD updated_at ON TABLE issued_certificate TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_issued_certificate_kid ON TABLE issued_certificate \
    COLUMNS kid UNIQUE;
DEFINE INDEX idx_issued_certificate_group ON TABLE issued_certificate \
    COLUMNS group_id, issued_at;

-- =======================================================================
-- Server-held private keys (1:1 with issued_certificate by kid)
-- =======================================================================
DEFINE TABLE private_key SCHEMAFULL;
DEFINE FIELD kid ON TABLE private_key TYPE string;
DEFINE FIELD group_id ON TABLE private_key TYPE option<string>;
DEFINE FIELD private_key ON TABLE private_key TYPE string;
DEFINE FIELD sealed ON TABLE private_key TYPE bool;
DEFINE FIELD expires_at ON TABLE private_key TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE private_key TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_private_key_kid ON TABLE private_key \
    COLUMNS kid UNIQUE;

-- =======================================================================
-- Service accounts
-- =======================================================================
DEFINE TABLE service_account SCHEMAFULL;
DEFINE FIELD name ON TABLE service_account TYPE string \
    ASSERT string::len($value) > 0;
DEFINE FIELD certificate_group_code ON TABLE service_account \
    TYPE option<string>;
DEFINE FIELD scopes ON TABLE service_account TYPE array<string> \
    DEFAULT [];
DEFINE FIELD status ON TABLE service_account TYPE string \
    ASSERT $value IN ['Active', 'Disabled'];
DEFINE FIELD created_at ON TABLE service_account TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE service_account TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_service_account_name ON TABLE service_account \
    COLUMNS name UNIQUE;

-- =======================================================================
-- Audit events (append-only)
-- =======================================================================
DEFINE TABLE audit_event SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD action ON TABLE audit_event TYPE string \
    ASSERT $value IN ['GroupCreated', 'GroupUpdated', 'GroupDeleted', \
        'CertificateIssued', 'CertificateRevoked', 'CertificateRotated', \
        'PayloadSigned', 'TokenExchanged'];
DEFINE FIELD actor ON TABLE audit_event TYPE string;
DEFINE FIELD actor_type ON TABLE audit_event TYPE string \
    ASSERT $value IN ['Operator', 'ServiceAccount', 'System'];
DEFINE FIELD kid ON TABLE audit_event TYPE option<string>;
DEFINE FIELD group_code ON TABLE audit_event TYPE option<string>;
DEFINE FIELD outcome ON TABLE audit_event TYPE string \
    ASSERT $value IN ['Success', 'Failure', 'Denied'];
DEFINE FIELD details ON TABLE audit_event TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD timestamp ON TABLE audit_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_event_time ON TABLE audit_event \
    COLUMNS timestamp;
DEFINE INDEX idx_audit_event_kid ON TABLE audit_event \
    COLUMNS kid;
";

async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let rows: Vec<AppliedVersion> = result.take(0)?;
    Ok(rows.first().map(|m| m.version).unwrap_or(0))
}

async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    info!(
        version = migration.version,
        name = migration.name,
        "Applying migration"
    );

    db.query(migration.sql).await?.check().map_err(|e| {
        DbError::Migration(format!(
            "v{} '{}': {e}",
            migration.version, migration.name
        ))
    })?;

    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await?
        .check()
        .map_err(|e| {
            DbError::Migration(format!("recording v{}: {e}", migration.version))
        })?;

    Ok(())
}

/// Bring the schema up to the latest version. Idempotent.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let current = applied_version(db).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(db, migration).await?;
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
