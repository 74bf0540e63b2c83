//! Error handling for the model registry.
//!
//! This module provides:
//! - [`RegistryError`]: The main error enum for all registry operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Rich error type with suggestions and context

mod codes;
mod suggestions;

use std::io;

use rusqlite::ErrorCode as SqliteCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;
pub use suggestions::suggest_for_error;

/// Main error type for registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Model Version creation error (name={name}). Giving up after {attempts} attempts.")]
    RetriesExhausted { name: String, attempts: u32 },

    #[error("Transient database error: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Database error: {0}")]
    Server(sqlx::Error),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Unsupported backend dialect '{dialect}': no driver for it is compiled into this build")]
    UnsupportedBackend { dialect: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        match sqlite_code(&err) {
            Some(SqliteCode::DatabaseBusy | SqliteCode::DatabaseLocked) => {
                Self::Transient(err.to_string())
            }
            _ => Self::Database(err),
        }
    }
}

/// Extract the primary SQLite result code, if the error carries one.
pub(crate) fn sqlite_code(err: &rusqlite::Error) -> Option<SqliteCode> {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => Some(inner.code),
        _ => None,
    }
}

/// True when the error is a uniqueness/foreign-key constraint violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    sqlite_code(err) == Some(SqliteCode::ConstraintViolation)
}

/// Coarse class of a client-server database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServerFailure {
    /// Integrity constraint violated (unique key, foreign key, check).
    Constraint,
    /// Lock wait, deadlock, serialization failure or lost connection.
    Transient,
    Other,
}

/// Classify a server error from its SQLSTATE and, for MySQL, its error number.
pub(crate) fn classify_server_failure(
    sqlstate: Option<&str>,
    mysql_errno: Option<u16>,
) -> ServerFailure {
    // ER_LOCK_WAIT_TIMEOUT, ER_LOCK_DEADLOCK
    if matches!(mysql_errno, Some(1205 | 1213)) {
        return ServerFailure::Transient;
    }
    match sqlstate {
        Some(state) if state.starts_with("23") => ServerFailure::Constraint,
        Some("40001" | "40P01" | "55P03" | "57014") => ServerFailure::Transient,
        Some(state) if state.starts_with("08") => ServerFailure::Transient,
        _ => ServerFailure::Other,
    }
}

/// Classify any sqlx error.
pub(crate) fn server_failure(err: &sqlx::Error) -> ServerFailure {
    match err {
        sqlx::Error::Database(db) => {
            let errno = db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(sqlx::mysql::MySqlDatabaseError::number);
            classify_server_failure(db.code().as_deref(), errno)
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
            ServerFailure::Transient
        }
        _ => ServerFailure::Other,
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        match server_failure(&err) {
            ServerFailure::Transient => Self::Transient(err.to_string()),
            _ => Self::Server(err),
        }
    }
}

impl RegistryError {
    /// Get the error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound(_) => ErrorCode::ResourceNotFound,
            Self::AlreadyExists(_) => ErrorCode::ResourceAlreadyExists,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::RetriesExhausted { .. } => ErrorCode::ConflictRetriesExhausted,
            Self::Transient(_) => ErrorCode::Transient,
            Self::Database(_) | Self::Server(_) => ErrorCode::DatabaseError,
            Self::SchemaMismatch(_) => ErrorCode::SchemaMismatch,
            Self::UnsupportedBackend { .. } => ErrorCode::UnsupportedBackend,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::SerializationError,
        }
    }

    /// True for a constraint violation raised by the backing engine.
    ///
    /// Inserts race on unique keys; a conflict means another writer won.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Database(err) => is_constraint_violation(err),
            Self::Server(err) => server_failure(err) == ServerFailure::Constraint,
            _ => false,
        }
    }

    /// Whether a caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::RetriesExhausted { name, attempts } => {
                Some(serde_json::json!({ "name": name, "attempts": attempts }))
            }
            Self::UnsupportedBackend { dialect } => {
                Some(serde_json::json!({ "dialect": dialect }))
            }
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_registry_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
///
/// Emitted in robot mode so scripts can tell "my request was invalid" apart
/// from "try again later" without parsing messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "RESOURCE_NOT_FOUND")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 201)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Whether the identical request may succeed if retried
    pub retryable: bool,

    /// Error category (e.g., "argument", "lookup", "storage")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            retryable: code.is_retryable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from a [`RegistryError`].
    #[must_use]
    pub fn from_registry_error(err: &RegistryError) -> Self {
        let code = err.code();
        let context = err.context();
        let suggestion = suggest_for_error(code, context.as_ref());

        Self {
            code,
            numeric_code: code.numeric(),
            message: err.to_string(),
            suggestion,
            context,
            recoverable: code.is_recoverable(),
            retryable: code.is_retryable(),
            category: code.category().to_string(),
        }
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self.suggestion = suggest_for_error(self.code, self.context.as_ref());
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&RegistryError> for StructuredError {
    fn from(err: &RegistryError) -> Self {
        Self::from_registry_error(err)
    }
}

/// Result type alias using [`RegistryError`].
pub type Result<T> = std::result::Result<T, RegistryError>;
