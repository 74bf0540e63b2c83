//! Backing-store connection strings.
//!
//! Format: `<dialect>[+<driver>]://[user[:password]@]host[:port]/database`.
//! SQLite uses `sqlite:///<path>` for a file and `sqlite://` (or
//! `sqlite:///:memory:`) for an in-memory database.

use std::fmt;
use std::path::PathBuf;

use crate::error::{RegistryError, Result};

/// Relational engines a connection string may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    Postgresql,
    Mysql,
    Mssql,
}

impl Dialect {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Mssql => "mssql",
        }
    }

    fn parse(scheme: &str) -> Result<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgresql" | "postgres" => Ok(Self::Postgresql),
            "mysql" => Ok(Self::Mysql),
            "mssql" => Ok(Self::Mssql),
            other => Err(RegistryError::InvalidArgument(format!(
                "Invalid database engine {other}. Supported engines: sqlite, postgresql, mysql, mssql"
            ))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a SQLite store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    File(PathBuf),
}

/// Parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbUri {
    pub dialect: Dialect,
    pub driver: Option<String>,
    pub user: Option<String>,
    password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: String,
}

impl DbUri {
    /// Parse a connection string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArgument`] for a missing scheme, an
    /// unknown dialect, a bad port, or a client-server URI without host or
    /// database.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (scheme, rest) = raw.split_once("://").ok_or_else(|| {
            RegistryError::InvalidArgument(format!(
                "Invalid database URI '{raw}': expected <dialect>://..."
            ))
        })?;

        let (dialect, driver) = match scheme.split_once('+') {
            Some((dialect, driver)) if !driver.is_empty() => {
                (Dialect::parse(dialect)?, Some(driver.to_string()))
            }
            Some((dialect, _)) => (Dialect::parse(dialect)?, None),
            None => (Dialect::parse(scheme)?, None),
        };

        if dialect == Dialect::Sqlite {
            let database = rest.strip_prefix('/').unwrap_or(rest).to_string();
            return Ok(Self {
                dialect,
                driver,
                user: None,
                password: None,
                host: None,
                port: None,
                database,
            });
        }

        let (authority, database) = rest.split_once('/').ok_or_else(|| {
            RegistryError::InvalidArgument(format!(
                "Invalid database URI '{}': missing database name",
                redact(raw)
            ))
        })?;
        let database = database.split('?').next().unwrap_or_default().to_string();
        if database.is_empty() {
            return Err(RegistryError::InvalidArgument(format!(
                "Invalid database URI '{}': missing database name",
                redact(raw)
            )));
        }

        let (credentials, host_port) = match authority.rsplit_once('@') {
            Some((creds, host)) => (Some(creds), host),
            None => (None, authority),
        };
        let (user, password) = match credentials {
            Some(creds) => match creds.split_once(':') {
                Some((user, password)) => (Some(user.to_string()), Some(password.to_string())),
                None => (Some(creds.to_string()), None),
            },
            None => (None, None),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|err| {
                    RegistryError::InvalidArgument(format!(
                        "Invalid port '{port}' in database URI: {err}"
                    ))
                })?;
                (host.to_string(), Some(port))
            }
            None => (host_port.to_string(), None),
        };
        if host.is_empty() {
            return Err(RegistryError::InvalidArgument(format!(
                "Invalid database URI '{}': missing host",
                redact(raw)
            )));
        }

        Ok(Self {
            dialect,
            driver,
            user,
            password,
            host: Some(host),
            port,
            database,
        })
    }

    /// Resolve the SQLite storage target.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArgument`] for any other dialect.
    pub fn sqlite_target(&self) -> Result<SqliteTarget> {
        if self.dialect != Dialect::Sqlite {
            return Err(RegistryError::InvalidArgument(format!(
                "{self} is not a sqlite connection string"
            )));
        }
        if self.database.is_empty() || self.database == ":memory:" {
            Ok(SqliteTarget::Memory)
        } else {
            Ok(SqliteTarget::File(PathBuf::from(&self.database)))
        }
    }

    /// Driver URL for a client-server engine, credentials included.
    ///
    /// The `+driver` suffix is dropped; the wire driver is chosen by dialect.
    /// Never log the result.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnsupportedBackend`] for dialects without a
    /// compiled-in driver and [`RegistryError::InvalidArgument`] for SQLite.
    pub fn server_url(&self) -> Result<String> {
        let scheme = match self.dialect {
            Dialect::Postgresql => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Mssql => {
                return Err(RegistryError::UnsupportedBackend {
                    dialect: self.dialect.to_string(),
                });
            }
            Dialect::Sqlite => {
                return Err(RegistryError::InvalidArgument(format!(
                    "{self} is not a client-server connection string"
                )));
            }
        };

        let mut url = format!("{scheme}://");
        if let Some(user) = &self.user {
            url.push_str(user);
            if let Some(password) = &self.password {
                url.push(':');
                url.push_str(password);
            }
            url.push('@');
        }
        url.push_str(self.host.as_deref().unwrap_or_default());
        if let Some(port) = self.port {
            url.push_str(&format!(":{port}"));
        }
        url.push('/');
        url.push_str(&self.database);
        Ok(url)
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

impl fmt::Display for DbUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dialect)?;
        if let Some(driver) = &self.driver {
            write!(f, "+{driver}")?;
        }
        f.write_str("://")?;
        if self.dialect == Dialect::Sqlite {
            return write!(f, "/{}", self.database);
        }
        if let Some(user) = &self.user {
            f.write_str(user)?;
            if self.password.is_some() {
                f.write_str(":***")?;
            }
            f.write_str("@")?;
        }
        if let Some(host) = &self.host {
            f.write_str(host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "/{}", self.database)
    }
}

/// Render a raw URI with any password masked, for error messages.
fn redact(raw: &str) -> String {
    let Some((scheme, rest)) = raw.split_once("://") else {
        return raw.to_string();
    };
    match rest.rsplit_once('@') {
        Some((creds, tail)) => {
            let user = creds.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{tail}")
        }
        None => raw.to_string(),
    }
}
