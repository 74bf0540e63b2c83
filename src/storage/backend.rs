//! Engine seam under the registry store.
//!
//! Registry SQL is written once with `?` placeholders and runs through
//! [`RegistryTx`]. The embedded engine executes it on a pooled rusqlite
//! connection; client-server engines go through [`ServerSessions`].

use rusqlite::types::ToSqlOutput;
use rusqlite::{Connection, ToSql, params_from_iter};

use crate::error::Result;

use super::migrations;
use super::rows::{SqlModelVersion, SqlRegisteredModel};
use super::server::ServerSessions;
use super::session::{PoolOptions, SessionManager};
use super::uri::{DbUri, Dialect};

/// A bound statement parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlParam<'a> {
    Text(&'a str),
    OptText(Option<&'a str>),
    Int(i64),
}

impl ToSql for SqlParam<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Text(value) => value.to_sql(),
            Self::OptText(value) => value.to_sql(),
            Self::Int(value) => value.to_sql(),
        }
    }
}

/// Statements available inside one open transaction.
pub(crate) trait RegistryTx {
    /// Run a statement, returning the affected row count.
    fn execute(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<u64>;

    /// First column of the single row a query returns.
    fn query_i64(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<i64>;

    fn query_models(
        &mut self,
        sql: &str,
        params: &[SqlParam<'_>],
    ) -> Result<Vec<SqlRegisteredModel>>;

    fn query_versions(&mut self, sql: &str, params: &[SqlParam<'_>])
    -> Result<Vec<SqlModelVersion>>;
}

/// [`RegistryTx`] over a rusqlite transaction.
pub(crate) struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTx<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl RegistryTx for SqliteTx<'_> {
    fn execute(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let changed = stmt.execute(params_from_iter(params.iter()))?;
        Ok(changed as u64)
    }

    fn query_i64(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<i64> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let value = stmt.query_row(params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(value)
    }

    fn query_models(
        &mut self,
        sql: &str,
        params: &[SqlParam<'_>],
    ) -> Result<Vec<SqlRegisteredModel>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), SqlRegisteredModel::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn query_versions(
        &mut self,
        sql: &str,
        params: &[SqlParam<'_>],
    ) -> Result<Vec<SqlModelVersion>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), SqlModelVersion::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// The engine a store runs on.
#[derive(Debug)]
pub(crate) enum Backend {
    Sqlite(SessionManager),
    Server(ServerSessions),
}

impl Backend {
    /// Connect, bootstrap the schema, and return the schema version.
    pub fn open(uri: &DbUri, pool: &PoolOptions) -> Result<(Self, u32)> {
        match uri.dialect {
            Dialect::Sqlite => {
                let sessions = SessionManager::open(uri.sqlite_target()?, pool)?;
                let schema_version = {
                    let mut conn = sessions.connection()?;
                    migrations::bootstrap(&mut conn)?
                };
                Ok((Self::Sqlite(sessions), schema_version))
            }
            Dialect::Postgresql | Dialect::Mysql | Dialect::Mssql => {
                let sessions = ServerSessions::open(uri, pool)?;
                let schema_version = sessions.bootstrap()?;
                Ok((Self::Server(sessions), schema_version))
            }
        }
    }

    /// Run `f` in a read transaction.
    pub fn read<T>(&self, f: impl FnOnce(&mut dyn RegistryTx) -> Result<T>) -> Result<T> {
        match self {
            Self::Sqlite(sessions) => sessions.read(|tx| f(&mut SqliteTx::new(tx))),
            Self::Server(sessions) => sessions.read(f),
        }
    }

    /// Run `f` in a write transaction.
    ///
    /// SQLite takes its write lock at `BEGIN`; server engines lock rows as
    /// statements touch them.
    pub fn write<T>(&self, f: impl FnOnce(&mut dyn RegistryTx) -> Result<T>) -> Result<T> {
        match self {
            Self::Sqlite(sessions) => sessions.write(|tx| f(&mut SqliteTx::new(tx))),
            Self::Server(sessions) => sessions.write(f),
        }
    }
}
