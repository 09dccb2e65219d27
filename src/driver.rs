//! The closed set of database drivers this store knows how to talk to.

use crate::error::SessionStoreError;
use std::fmt;

/// A supported database engine tag.
///
/// This mirrors the `DbEngine` enum in `db`/`modkit-db`, extended with the
/// two dialect-only drivers (`Oracle`, `SqlServer`) that this crate can
/// generate SQL for but cannot open a live connection to (see `gateway`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Driver {
    MySql,
    PostgreSql,
    Sqlite,
    Oracle,
    SqlServer,
}

impl Driver {
    /// The short tag used in PHP-style session handler configuration and in
    /// log output.
    pub fn tag(self) -> &'static str {
        match self {
            Driver::MySql => "mysql",
            Driver::PostgreSql => "pgsql",
            Driver::Sqlite => "sqlite",
            Driver::Oracle => "oci",
            Driver::SqlServer => "sqlsrv",
        }
    }

    /// Whether this crate can open a real connection for this driver.
    ///
    /// `sqlx`, the only SQL connector in this dependency stack, ships
    /// connectors for Postgres, MySQL and SQLite; Oracle and SQL Server stay
    /// dialect-only.
    pub fn has_live_connector(self) -> bool {
        matches!(self, Driver::MySql | Driver::PostgreSql | Driver::Sqlite)
    }

    /// Sniff a driver tag from a DSN's URI scheme.
    ///
    /// Only the scheme is inspected; the rest of the DSN is opaque to this
    /// crate and passed through verbatim to `sqlx`.
    pub fn detect(dsn: &str) -> Result<Driver, SessionStoreError> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(Driver::PostgreSql)
        } else if s.starts_with("mysql://") {
            Ok(Driver::MySql)
        } else if s.starts_with("sqlite:") || s.starts_with("sqlite://") {
            Ok(Driver::Sqlite)
        } else if s.starts_with("oci:") || s.starts_with("oracle://") {
            Ok(Driver::Oracle)
        } else if s.starts_with("sqlsrv:") || s.starts_with("sqlserver://") || s.starts_with("mssql://")
        {
            Ok(Driver::SqlServer)
        } else {
            Err(SessionStoreError::Configuration(format!(
                "cannot detect a known driver from DSN scheme: {dsn}"
            )))
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
