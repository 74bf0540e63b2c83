//! Client-server engines (PostgreSQL, MySQL) behind the blocking store API.
//!
//! sqlx drives the wire protocols on a small private tokio runtime; every
//! call blocks the calling thread until its statement finishes. Store
//! methods must not be called from inside an async task.

use std::borrow::Cow;

use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, AnyPool, Row};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};

use super::backend::{RegistryTx, SqlParam};
use super::migrations::{REGISTRY_TABLES, SCHEMA_VERSION};
use super::rows::{SqlModelVersion, SqlRegisteredModel};
use super::session::PoolOptions;
use super::uri::{DbUri, Dialect};

const POSTGRES_MIGRATIONS: [&str; 1] = [include_str!("../../migrations/postgres/001_model_registry.sql")];

const MYSQL_MIGRATIONS: [&str; 1] = [include_str!("../../migrations/mysql/001_model_registry.sql")];

/// Applied server migrations, one row per version.
const VERSION_TABLE: &str = "mreg_schema_version";

/// Advisory lock key serializing PostgreSQL bootstrap ("mreg").
const POSTGRES_SCHEMA_LOCK: i64 = 0x6d72_6567;

/// Named lock serializing MySQL bootstrap.
const MYSQL_SCHEMA_LOCK: &str = "mreg_schema_bootstrap";

const MIGRATION_MISMATCH: &str = "Database migration in unexpected state. Run manual upgrade.";

/// Pooled transactions against a PostgreSQL or MySQL server.
pub struct ServerSessions {
    // Dropped before the runtime that serves its connections.
    pool: AnyPool,
    runtime: Runtime,
    dialect: Dialect,
}

impl std::fmt::Debug for ServerSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSessions")
            .field("dialect", &self.dialect)
            .field("pool_size", &self.pool.options().get_max_connections())
            .finish_non_exhaustive()
    }
}

impl ServerSessions {
    /// Connect a pool to the server named by `uri`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnsupportedBackend`] for dialects without a driver,
    /// [`RegistryError::Transient`] when the server cannot be reached within
    /// the busy timeout.
    pub fn open(uri: &DbUri, options: &PoolOptions) -> Result<Self> {
        let url = uri.server_url()?;
        if options.pool_size == 0 {
            return Err(RegistryError::InvalidArgument(
                "connection pool size must be at least 1".to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("mreg-db")
            .enable_all()
            .build()?;

        sqlx::any::install_default_drivers();
        let pool = runtime.block_on(
            AnyPoolOptions::new()
                .max_connections(options.pool_size)
                .acquire_timeout(options.busy_timeout)
                .connect(&url),
        )?;
        debug!(dialect = %uri.dialect, capacity = options.pool_size, "opened server pool");

        Ok(Self {
            pool,
            runtime,
            dialect: uri.dialect,
        })
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Run `f` in a read-only transaction.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&mut dyn RegistryTx) -> Result<T>) -> Result<T> {
        self.run(true, f)
    }

    /// Run `f` in a read-write transaction.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut dyn RegistryTx) -> Result<T>) -> Result<T> {
        self.run(false, f)
    }

    fn run<T>(
        &self,
        read_only: bool,
        f: impl FnOnce(&mut dyn RegistryTx) -> Result<T>,
    ) -> Result<T> {
        // Connections dropped on unwind go back to the pool through the runtime.
        let _context = self.runtime.enter();
        let mut tx = self.runtime.block_on(self.pool.begin())?;
        if read_only && self.dialect == Dialect::Postgresql {
            self.runtime.block_on(
                sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
                    .execute(&mut *tx),
            )?;
        }

        let outcome = f(&mut ServerTx {
            runtime: &self.runtime,
            conn: &mut *tx,
            dialect: self.dialect,
        });
        match outcome {
            Ok(value) => {
                self.runtime.block_on(tx.commit())?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.runtime.block_on(tx.rollback()) {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Apply pending migrations and verify the registry tables.
    ///
    /// Concurrent bootstraps against one database serialize on a server
    /// lock, so each migration is applied once.
    pub(crate) fn bootstrap(&self) -> Result<u32> {
        let version = match self.dialect {
            Dialect::Postgresql => self.write(|tx| {
                tx.query_i64(
                    "SELECT COUNT(*) FROM (SELECT pg_advisory_xact_lock(?)) AS held",
                    &[SqlParam::Int(POSTGRES_SCHEMA_LOCK)],
                )?;
                migrate(tx, &POSTGRES_MIGRATIONS)
            })?,
            Dialect::Mysql => self.bootstrap_mysql()?,
            Dialect::Sqlite | Dialect::Mssql => {
                return Err(RegistryError::UnsupportedBackend {
                    dialect: self.dialect.to_string(),
                });
            }
        };
        self.read(|tx| verify_tables(tx, self.dialect))?;
        Ok(version)
    }

    /// MySQL DDL commits implicitly, so bootstrap holds a session lock on one
    /// connection instead of wrapping the migration in a transaction.
    fn bootstrap_mysql(&self) -> Result<u32> {
        let _context = self.runtime.enter();
        let mut conn = self.runtime.block_on(self.pool.acquire())?;
        let wait_secs = i64::try_from(self.pool.options().get_acquire_timeout().as_secs())
            .unwrap_or(i64::MAX)
            .max(1);

        let mut tx = ServerTx {
            runtime: &self.runtime,
            conn: &mut *conn,
            dialect: self.dialect,
        };
        let locked = tx.query_opt_i64(
            "SELECT CAST(GET_LOCK(?, ?) AS SIGNED)",
            &[SqlParam::Text(MYSQL_SCHEMA_LOCK), SqlParam::Int(wait_secs)],
        )?;
        if locked != Some(1) {
            return Err(RegistryError::Transient(format!(
                "timed out after {wait_secs}s waiting for lock {MYSQL_SCHEMA_LOCK}"
            )));
        }

        let outcome = migrate(&mut tx, &MYSQL_MIGRATIONS);
        if let Err(err) = tx.execute("SELECT RELEASE_LOCK(?)", &[SqlParam::Text(MYSQL_SCHEMA_LOCK)]) {
            warn!(error = %err, "failed to release schema lock");
        }
        outcome
    }
}

/// Apply every migration newer than the recorded version.
fn migrate(tx: &mut dyn RegistryTx, migrations: &[&str]) -> Result<u32> {
    tx.execute(
        &format!("CREATE TABLE IF NOT EXISTS {VERSION_TABLE} (version BIGINT NOT NULL)"),
        &[],
    )?;
    let current = tx.query_i64(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {VERSION_TABLE}"),
        &[],
    )?;
    let known = i64::from(SCHEMA_VERSION);
    if current > known {
        return Err(RegistryError::SchemaMismatch(format!(
            "database schema version {current} is newer than supported version {known}"
        )));
    }

    for (idx, script) in migrations.iter().enumerate() {
        let target = idx as i64 + 1;
        if current >= target {
            continue;
        }
        for statement in split_statements(script) {
            tx.execute(statement, &[]).map_err(|err| {
                RegistryError::SchemaMismatch(format!("migration {target} failed: {err}"))
            })?;
        }
        tx.execute(
            &format!("INSERT INTO {VERSION_TABLE} (version) VALUES (?)"),
            &[SqlParam::Int(target)],
        )?;
        info!(version = target, "applied registry migration");
    }
    Ok(SCHEMA_VERSION)
}

fn verify_tables(tx: &mut dyn RegistryTx, dialect: Dialect) -> Result<()> {
    let sql = match dialect {
        Dialect::Postgresql => {
            "SELECT COUNT(*) FROM pg_catalog.pg_tables
             WHERE schemaname = current_schema() AND CAST(tablename AS TEXT) = CAST(? AS TEXT)"
        }
        _ => {
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = DATABASE() AND table_name = ?"
        }
    };
    for table in REGISTRY_TABLES {
        if tx.query_i64(sql, &[SqlParam::Text(table)])? == 0 {
            debug!(table, "registry table missing");
            return Err(RegistryError::SchemaMismatch(MIGRATION_MISMATCH.to_string()));
        }
    }
    Ok(())
}

/// Statements of a migration script, skipping comment-only chunks.
fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|chunk| {
            chunk
                .lines()
                .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
        })
        .collect()
}

/// Rewrite `?` placeholders as `$1, $2, ...`, leaving quoted text alone.
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut next = 1;
    let mut quoted = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                quoted = !quoted;
                out.push(ch);
            }
            '?' if !quoted => {
                out.push('$');
                out.push_str(&next.to_string());
                next += 1;
            }
            _ => out.push(ch),
        }
    }
    out
}

fn bind<'q>(sql: &'q str, params: &'q [SqlParam<'q>]) -> Query<'q, Any, AnyArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match *param {
            SqlParam::Text(value) => query.bind(value),
            SqlParam::OptText(value) => query.bind(value),
            SqlParam::Int(value) => query.bind(value),
        })
}

/// [`RegistryTx`] over one server connection.
struct ServerTx<'a> {
    runtime: &'a Runtime,
    conn: &'a mut AnyConnection,
    dialect: Dialect,
}

impl ServerTx<'_> {
    fn sql<'s>(&self, sql: &'s str) -> Cow<'s, str> {
        match self.dialect {
            Dialect::Postgresql => Cow::Owned(numbered_placeholders(sql)),
            _ => Cow::Borrowed(sql),
        }
    }

    fn fetch_all(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<Vec<sqlx::any::AnyRow>> {
        let sql = self.sql(sql);
        let rows = self
            .runtime
            .block_on(bind(&sql, params).fetch_all(&mut *self.conn))?;
        Ok(rows)
    }

    fn query_opt_i64(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<Option<i64>> {
        let rows = self.fetch_all(sql, params)?;
        match rows.first() {
            Some(row) => Ok(row.try_get::<Option<i64>, _>(0)?),
            None => Ok(None),
        }
    }
}

impl RegistryTx for ServerTx<'_> {
    fn execute(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<u64> {
        let sql = self.sql(sql);
        let done = self
            .runtime
            .block_on(bind(&sql, params).execute(&mut *self.conn))?;
        Ok(done.rows_affected())
    }

    fn query_i64(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<i64> {
        let sql = self.sql(sql);
        let row = self
            .runtime
            .block_on(bind(&sql, params).fetch_one(&mut *self.conn))?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    fn query_models(
        &mut self,
        sql: &str,
        params: &[SqlParam<'_>],
    ) -> Result<Vec<SqlRegisteredModel>> {
        let rows = self.fetch_all(sql, params)?;
        Ok(rows
            .iter()
            .map(SqlRegisteredModel::from_any_row)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?)
    }

    fn query_versions(
        &mut self,
        sql: &str,
        params: &[SqlParam<'_>],
    ) -> Result<Vec<SqlModelVersion>> {
        let rows = self.fetch_all(sql, params)?;
        Ok(rows
            .iter()
            .map(SqlModelVersion::from_any_row)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?)
    }
}
