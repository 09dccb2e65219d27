//! Error taxonomy for the session store.

use crate::driver::Driver;
use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, SessionStoreError>;

/// Errors surfaced by the session handler.
///
/// `DuplicateKey` races are deliberately **not** a variant here: they are
/// classified internally (see [`is_duplicate_key`]) and consumed by the two
/// retry loops in the read and write paths. An unclassified duplicate-key
/// error that escapes those loops shows up as a plain [`SessionStoreError::Database`],
/// same as any other constraint violation.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The handler was misconfigured: an unrecognized DSN scheme, or a lock
    /// mode requested for a driver that does not support it (e.g. advisory
    /// locking on SQLite).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The dialect registry has no SQL for this driver/operation pair.
    #[error("driver {0} is not supported for this operation")]
    UnsupportedDriver(Driver),

    /// The operation is structurally unsupported on this driver (e.g.
    /// advisory locking on SQLite, Oracle or SQL Server).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// An advisory lock could not be acquired within its wait timeout. This
    /// is transient contention, not a capability gap, so it is kept separate
    /// from [`SessionStoreError::UnsupportedOperation`].
    #[error("timed out acquiring advisory lock: {0}")]
    LockTimeout(String),

    /// Any other database failure. Rolled back and re-raised unchanged,
    /// never silently swallowed.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Classify a `sqlx::Error` as a duplicate-key / unique-violation race.
///
/// Prefers `sqlx`'s cross-backend `ErrorKind::UniqueViolation`, which covers
/// Postgres, MySQL and SQLite uniformly as of `sqlx` 0.7+. Falls back to a
/// SQLSTATE-class-"23" prefix check for drivers or error shapes where
/// `ErrorKind` classification isn't available.
pub fn is_duplicate_key(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
        return true;
    }
    db_err
        .code()
        .map(|code| is_unique_violation_code(code.as_ref()))
        .unwrap_or(false)
}

/// SQLSTATE-class / vendor-code check for a unique constraint violation,
/// across the backends this crate targets:
/// - SQLSTATE class "23" (Postgres, Oracle, SQL Server, and MySQL's ANSI
///   SQLSTATE mapping all use this class for integrity-constraint violations).
/// - SQLite's own extended result codes for `UNIQUE`/`PRIMARY KEY` conflicts
///   (2067 / 1555), which are not SQLSTATE codes at all.
pub fn is_unique_violation_code(code: &str) -> bool {
    code.starts_with("23") || code == "2067" || code == "1555"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sqlstate_class_23() {
        assert!(is_unique_violation_code("23505"));
        assert!(is_unique_violation_code("23000"));
        assert!(!is_unique_violation_code("40001"));
    }

    #[test]
    fn classifies_sqlite_extended_codes() {
        assert!(is_unique_violation_code("2067"));
        assert!(is_unique_violation_code("1555"));
    }
}
