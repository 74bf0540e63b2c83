//! Schema bootstrap and verification

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{RegistryError, Result};

const MIGRATIONS: [&str; 1] = [include_str!("../../migrations/001_model_registry.sql")];

pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Tables the registry cannot operate without.
pub const REGISTRY_TABLES: [&str; 2] = ["registered_models", "model_versions"];

const MIGRATION_MISMATCH: &str = "Database migration in unexpected state. Run manual upgrade.";

/// Apply pending migrations in one transaction. Returns the schema version.
///
/// The transaction takes the write lock before reading `user_version`, so
/// processes bootstrapping the same file at once apply each migration once.
pub fn run_migrations(conn: &mut Connection) -> Result<u32> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current_version = user_version(&tx)?;
    if current_version > SCHEMA_VERSION {
        return Err(RegistryError::SchemaMismatch(format!(
            "database schema version {current_version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let target_version = (idx + 1) as u32;
        if current_version >= target_version {
            continue;
        }
        tx.execute_batch(sql).map_err(|err| {
            RegistryError::SchemaMismatch(format!("migration {target_version} failed: {err}"))
        })?;
        tx.pragma_update(None, "user_version", target_version)?;
        info!(version = target_version, "applied registry migration");
    }
    tx.commit()?;

    Ok(SCHEMA_VERSION)
}

/// Fail unless every registry table is present.
pub fn verify_registry_tables_exist(conn: &Connection) -> Result<()> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    for table in REGISTRY_TABLES {
        if !stmt.exists([table])? {
            debug!(table, "registry table missing");
            return Err(RegistryError::SchemaMismatch(MIGRATION_MISMATCH.to_string()));
        }
    }
    Ok(())
}

/// Migrate then verify. Safe to call on every store construction.
pub fn bootstrap(conn: &mut Connection) -> Result<u32> {
    let version = run_migrations(conn)?;
    verify_registry_tables_exist(conn)?;
    Ok(version)
}

fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}
