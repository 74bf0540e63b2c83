//! Storage layer for the model registry
//!
//! Relational persistence with every operation scoped to one transaction.
//! SQLite runs in-process behind a bounded connection pool; PostgreSQL and
//! MySQL are reached through a sqlx pool.

mod backend;
pub mod migrations;
pub mod registry;
mod rows;
pub mod server;
pub mod session;
pub mod uri;

pub use registry::{DEFAULT_CREATE_MODEL_VERSION_RETRIES, RegistryOptions, RegistryStore};
pub use server::ServerSessions;
pub use session::{ConnectionPool, PoolOptions, PooledConnection, SessionManager};
pub use uri::{DbUri, Dialect, SqliteTarget};
