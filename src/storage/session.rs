//! Scoped units of work over a bounded SQLite connection pool.
//!
//! Every registry operation borrows one connection, opens one transaction on
//! it, and either commits (closure returned `Ok`) or rolls back (closure
//! returned `Err`, or unwound). The connection goes back to the pool on every
//! exit path because [`PooledConnection`] returns it from `Drop`.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};

use super::uri::SqliteTarget;

/// Default number of pooled connections for file-backed stores.
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Default time a statement waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

/// Bounded pool of configured SQLite connections.
///
/// In-memory databases exist only as long as their connection, so an
/// in-memory pool holds exactly one connection and never closes it.
pub struct ConnectionPool {
    target: SqliteTarget,
    busy_timeout: Duration,
    capacity: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.target)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Open a pool and eagerly establish its first connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArgument`] for a zero pool size and
    /// propagates any failure opening the first connection.
    pub fn open(target: SqliteTarget, options: &PoolOptions) -> Result<Self> {
        if options.pool_size == 0 {
            return Err(RegistryError::InvalidArgument(
                "connection pool size must be at least 1".to_string(),
            ));
        }
        let capacity = match target {
            SqliteTarget::Memory => 1,
            SqliteTarget::File(_) => options.pool_size as usize,
        };

        let first = open_connection(&target, options.busy_timeout)?;
        debug!(?target, capacity, "opened connection pool");

        Ok(Self {
            target,
            busy_timeout: options.busy_timeout,
            capacity,
            state: Mutex::new(PoolState {
                idle: vec![first],
                open: 1,
            }),
            available: Condvar::new(),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn target(&self) -> &SqliteTarget {
        &self.target
    }

    /// Borrow a connection, blocking while all of them are in use.
    ///
    /// # Errors
    ///
    /// Propagates failures opening a new connection.
    pub fn acquire(&self) -> Result<PooledConnection<'_>> {
        let mut state = self.state.lock();
        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: self,
                });
            }
            if state.open < self.capacity {
                state.open += 1;
                drop(state);
                return match open_connection(&self.target, self.busy_timeout) {
                    Ok(conn) => Ok(PooledConnection {
                        conn: Some(conn),
                        pool: self,
                    }),
                    Err(err) => {
                        self.state.lock().open -= 1;
                        self.available.notify_one();
                        Err(err)
                    }
                };
            }
            self.available.wait(&mut state);
        }
    }

    fn release(&self, conn: Connection) {
        self.state.lock().idle.push(conn);
        self.available.notify_one();
    }
}

/// A connection on loan from a [`ConnectionPool`].
pub struct PooledConnection<'pool> {
    conn: Option<Connection>,
    pool: &'pool ConnectionPool,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .unwrap_or_else(|| unreachable!("pooled connection used after release"))
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .unwrap_or_else(|| unreachable!("pooled connection used after release"))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Runs closures inside scoped transactions.
#[derive(Debug)]
pub struct SessionManager {
    pool: ConnectionPool,
}

impl SessionManager {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open a pool for `target` and wrap it.
    ///
    /// # Errors
    ///
    /// Propagates pool construction failures.
    pub fn open(target: SqliteTarget, options: &PoolOptions) -> Result<Self> {
        Ok(Self::new(ConnectionPool::open(target, options)?))
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `f` in a deferred transaction.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or the failure to begin or commit.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }

    /// Run `f` in an immediate transaction, taking the write lock up front so
    /// concurrent writers serialize on `BEGIN` instead of failing mid-way.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or the failure to begin or commit.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Borrow a raw connection outside any transaction.
    ///
    /// # Errors
    ///
    /// Propagates pool failures.
    pub fn connection(&self) -> Result<PooledConnection<'_>> {
        self.pool.acquire()
    }

    fn run<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.pool.acquire()?;
        let tx = conn.transaction_with_behavior(behavior)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn open_connection(target: &SqliteTarget, busy_timeout: Duration) -> Result<Connection> {
    let conn = match target {
        SqliteTarget::Memory => Connection::open_in_memory()?,
        SqliteTarget::File(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_URI,
            )?
        }
    };
    configure_pragmas(&conn, target, busy_timeout)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection, target: &SqliteTarget, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if matches!(target, SqliteTarget::File(_)) {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
    }
    Ok(())
}
