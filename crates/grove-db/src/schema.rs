//! SurrealDB schema for groups, users and memberships, plus the
//! versioned migration runner.
//!
//! Tables are SCHEMAFULL. UUIDs are stored as strings and enums as
//! strings guarded by ASSERT clauses. Group and membership uniqueness is
//! enforced by UNIQUE indexes so that concurrent writers lose with a
//! conflict instead of producing duplicates.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

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
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "groups_and_memberships",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "membership_lookup_indexes",
        sql: SCHEMA_V2,
    },
];

// -----------------------------------------------------------------------
// Schema v1: groups, users, memberships, sub-group mirror
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Groups
-- =======================================================================
DEFINE TABLE group SCHEMAFULL;
DEFINE FIELD old_id ON TABLE group TYPE option<string>;
DEFINE FIELD name ON TABLE group TYPE string;
DEFINE FIELD name_key ON TABLE group TYPE string;
DEFINE FIELD description ON TABLE group TYPE option<string>;
DEFINE FIELD organization_id ON TABLE group TYPE string DEFAULT '';
DEFINE FIELD domain ON TABLE group TYPE string DEFAULT '';
DEFINE FIELD sso_id ON TABLE group TYPE string DEFAULT '';
DEFINE FIELD private_group ON TABLE group TYPE bool DEFAULT false;
DEFINE FIELD self_register ON TABLE group TYPE bool DEFAULT false;
DEFINE FIELD status ON TABLE group TYPE string \
    ASSERT $value IN ['active', 'inactive'];
DEFINE FIELD created_by ON TABLE group TYPE string;
DEFINE FIELD created_at ON TABLE group TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_by ON TABLE group TYPE option<string>;
DEFINE FIELD updated_at ON TABLE group TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_group_name_key ON TABLE group COLUMNS name_key UNIQUE;
DEFINE INDEX idx_group_old_id ON TABLE group COLUMNS old_id;

-- =======================================================================
-- Users (created lazily on first reference)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD universal_uid ON TABLE user TYPE string;
DEFINE FIELD created_by ON TABLE user TYPE string;
DEFINE FIELD created_at ON TABLE user TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_user_universal_uid ON TABLE user COLUMNS universal_uid;

-- =======================================================================
-- Memberships (member_id points at a user or a group)
-- =======================================================================
DEFINE TABLE group_membership SCHEMAFULL;
DEFINE FIELD group_id ON TABLE group_membership TYPE string;
DEFINE FIELD member_id ON TABLE group_membership TYPE string;
DEFINE FIELD membership_type ON TABLE group_membership TYPE string \
    ASSERT $value IN ['user', 'group'];
DEFINE FIELD roles ON TABLE group_membership TYPE option<array<object>>;
DEFINE FIELD roles.*.role ON TABLE group_membership TYPE string \
    ASSERT $value IN ['groupManager', 'groupAdmin'];
DEFINE FIELD roles.*.created_by ON TABLE group_membership TYPE string;
DEFINE FIELD roles.*.created_at ON TABLE group_membership TYPE string;
DEFINE FIELD created_by ON TABLE group_membership TYPE string;
DEFINE FIELD created_at ON TABLE group_membership TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_by ON TABLE group_membership TYPE option<string>;
DEFINE FIELD updated_at ON TABLE group_membership TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_membership_pair ON TABLE group_membership \
    COLUMNS group_id, member_id UNIQUE;

-- =======================================================================
-- Sub-group mirror of group-type memberships (parent -> child)
-- =======================================================================
DEFINE TABLE has_sub_group TYPE RELATION SCHEMAFULL;
";

// -----------------------------------------------------------------------
// Schema v2: reverse lookups by member
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
DEFINE INDEX idx_membership_member ON TABLE group_membership \
    COLUMNS member_id;
DEFINE INDEX idx_membership_type ON TABLE group_membership \
    COLUMNS membership_type;
DEFINE INDEX idx_group_organization ON TABLE group \
    COLUMNS organization_id;
";

/// Highest version recorded in `_migration`, or 0 on a fresh database.
async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map_or(0, |record| record.version))
}

async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    let failed = |stage: &str, e: surrealdb::Error| {
        DbError::Migration(format!(
            "{stage} v{} ({}): {e}",
            migration.version, migration.name
        ))
    };

    db.query(migration.sql)
        .await?
        .check()
        .map_err(|e| failed("applying", e))?;
    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await?
        .check()
        .map_err(|e| failed("recording", e))?;
    Ok(())
}

/// Brings the schema up to the latest version. Applied versions are
/// skipped, so this runs on every startup.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let from = applied_version(db).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    for migration in &pending {
        info!(version = migration.version, name = migration.name, "Applying migration");
        apply(db, migration).await?;
    }

    info!(from, to = latest_version(), applied = pending.len(), "Schema up to date");
    Ok(())
}

/// Latest schema version known to this build.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
