//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Argument errors
//! - 2xx: Lookup/uniqueness errors
//! - 3xx: Config errors
//! - 6xx: Storage errors
//! - 85x: Concurrency errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for robot mode output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Argument errors (1xx)
    // ========================================
    /// E101: Malformed input (empty name, unknown stage, bad filter)
    InvalidArgument,

    // ========================================
    // Lookup errors (2xx)
    // ========================================
    /// E201: Referenced model or version does not exist
    ResourceNotFound,
    /// E202: Name already taken on create or rename
    ResourceAlreadyExists,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E302: Config file has invalid syntax or values
    ConfigInvalid,
    /// E304: Required config value is missing
    ConfigMissingRequired,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E604: Database operation failed
    DatabaseError,
    /// E605: Serialization/deserialization failed
    SerializationError,
    /// E606: Registry tables missing after bootstrap
    SchemaMismatch,
    /// E607: Connection string names an engine this build does not embed
    UnsupportedBackend,

    // ========================================
    // Concurrency errors (85x)
    // ========================================
    /// E851: Busy/locked backing store, safe to retry
    Transient,
    /// E852: Version number assignment kept conflicting
    ConflictRetriesExhausted,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E904: Duplicate rows where uniqueness should prevent them
    InvalidState,
    /// E906: IO operation failed
    IoError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `ResourceNotFound` -> 201).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::InvalidArgument => 101,

            Self::ResourceNotFound => 201,
            Self::ResourceAlreadyExists => 202,

            Self::ConfigInvalid => 302,
            Self::ConfigMissingRequired => 304,

            Self::DatabaseError => 604,
            Self::SerializationError => 605,
            Self::SchemaMismatch => 606,
            Self::UnsupportedBackend => 607,

            Self::Transient => 851,
            Self::ConflictRetriesExhausted => 852,

            Self::InvalidState => 904,
            Self::IoError => 906,
        }
    }

    /// Get the error code as a formatted string (e.g., "E201").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "Check the arguments. Stages are None, Staging, Production or Archived; filters look like name = '<model>'",
            Self::ResourceNotFound => "Run `mreg model list` to see registered models, or `mreg search` to find versions",
            Self::ResourceAlreadyExists => "Choose a different name, or update the existing model with `mreg model update`",
            Self::ConfigInvalid => "Run `mreg config` to see current values. Check TOML syntax in config file",
            Self::ConfigMissingRequired => "Set the required value in config.toml or through its MREG_* environment variable",
            Self::DatabaseError => "Check the store URI, that the database is reachable and that its file or account is writable",
            Self::SerializationError => "The data format may be corrupted. Check input data for validity",
            Self::SchemaMismatch => "Database migration in unexpected state. Run a manual upgrade of the registry schema",
            Self::UnsupportedBackend => "Use a sqlite:///, postgresql:// or mysql:// store URI",
            Self::Transient => "The backing store was busy. Retry the request",
            Self::ConflictRetriesExhausted => "Concurrent registrations kept colliding. Retry the request once contention drops",
            Self::InvalidState => "Registry uniqueness was violated. This is a bug or manual tampering. Inspect the database",
            Self::IoError => "File operation failed. Check path exists and permissions are correct",
        }
    }

    /// Check if this error is potentially recoverable by the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidArgument
            | Self::ResourceNotFound
            | Self::ResourceAlreadyExists
            | Self::ConfigInvalid
            | Self::ConfigMissingRequired
            | Self::UnsupportedBackend
            | Self::Transient
            | Self::ConflictRetriesExhausted
            | Self::IoError => true,
            Self::DatabaseError
            | Self::SerializationError
            | Self::SchemaMismatch
            | Self::InvalidState => false,
        }
    }

    /// Check if the identical request may succeed when retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get the error category.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() {
            100..=199 => "argument",
            200..=299 => "lookup",
            300..=399 => "config",
            600..=699 => "storage",
            850..=859 => "concurrency",
            _ => "internal",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::InvalidArgument,
            Self::ResourceNotFound,
            Self::ResourceAlreadyExists,
            Self::ConfigInvalid,
            Self::ConfigMissingRequired,
            Self::DatabaseError,
            Self::SerializationError,
            Self::SchemaMismatch,
            Self::UnsupportedBackend,
            Self::Transient,
            Self::ConflictRetriesExhausted,
            Self::InvalidState,
            Self::IoError,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
