//! Dialect registry: per-driver SQL fragments for table creation,
//! locking/non-locking reads, atomic upsert, and advisory locks.
//!
//! Every function here is pure string generation over a [`Driver`] tag and
//! [`Columns`] — no I/O, no connection — so the whole registry is testable
//! without a database, unlike the `Connection Gateway` (`gateway.rs`), which
//! is the only place that actually needs a live driver.

use crate::config::Columns;
use crate::driver::Driver;
use crate::error::{Result, SessionStoreError};

/// `CREATE TABLE` DDL selecting binary-safe types for `id`/`data` on each
/// driver.
pub fn create_table_sql(driver: Driver, cols: &Columns) -> Result<String> {
    let Columns {
        table,
        id,
        data,
        expiry,
        time,
    } = cols;
    let sql = match driver {
        Driver::MySql => format!(
            "CREATE TABLE {table} (\
             {id} VARBINARY(128) NOT NULL PRIMARY KEY, \
             {data} BLOB NOT NULL, \
             {expiry} INTEGER UNSIGNED NOT NULL, \
             {time} INTEGER UNSIGNED NOT NULL\
             ) COLLATE utf8mb4_bin, ENGINE = InnoDB"
        ),
        Driver::PostgreSql => format!(
            "CREATE TABLE {table} (\
             {id} BYTEA NOT NULL PRIMARY KEY, \
             {data} BYTEA NOT NULL, \
             {expiry} BIGINT NOT NULL, \
             {time} BIGINT NOT NULL\
             )"
        ),
        Driver::Sqlite => format!(
            "CREATE TABLE {table} (\
             {id} BLOB NOT NULL PRIMARY KEY, \
             {data} BLOB NOT NULL, \
             {expiry} INTEGER NOT NULL, \
             {time} INTEGER NOT NULL\
             )"
        ),
        Driver::Oracle => format!(
            "CREATE TABLE {table} (\
             {id} VARCHAR2(128) NOT NULL PRIMARY KEY, \
             {data} BLOB NOT NULL, \
             {expiry} NUMBER(20) NOT NULL, \
             {time} NUMBER(20) NOT NULL\
             )"
        ),
        Driver::SqlServer => format!(
            "CREATE TABLE {table} (\
             {id} VARBINARY(128) NOT NULL PRIMARY KEY, \
             {data} VARBINARY(MAX) NOT NULL, \
             {expiry} BIGINT NOT NULL, \
             {time} BIGINT NOT NULL\
             )"
        ),
    };
    Ok(sql)
}

/// Placeholder style for bound parameters, by driver. `sqlx` requires `$n`
/// for Postgres and accepts plain `?` for MySQL/SQLite; Oracle and SQL
/// Server follow their own native conventions here (they have no live
/// connector in this crate, so these only ever need to read as correct SQL).
fn placeholders(driver: Driver, count: usize) -> Vec<String> {
    match driver {
        Driver::PostgreSql => (1..=count).map(|n| format!("${n}")).collect(),
        Driver::MySql | Driver::Sqlite => vec!["?".to_string(); count],
        Driver::Oracle => (1..=count).map(|n| format!(":{n}")).collect(),
        Driver::SqlServer => vec![
            "@id".to_string(),
            "@data".to_string(),
            "@expiry".to_string(),
            "@time".to_string(),
        ]
        .into_iter()
        .take(count)
        .collect(),
    }
}

/// The `SELECT` used to read a session row.
///
/// `locking == true` requests the form used under `LOCK_TRANSACTIONAL`:
/// `FOR UPDATE` on MySQL/Oracle/PostgreSQL, `WITH (UPDLOCK, ROWLOCK)` on SQL
/// Server. SQLite has no row-level locking hint — its transaction already
/// began with `BEGIN IMMEDIATE`, which reserves the whole database for
/// writing, so the plain and locking forms are identical.
pub fn select_sql(driver: Driver, cols: &Columns, locking: bool) -> String {
    let Columns {
        table, id, data, expiry, ..
    } = cols;
    let p = &placeholders(driver, 1)[0];
    match driver {
        Driver::MySql | Driver::Oracle | Driver::PostgreSql => {
            let hint = if locking { " FOR UPDATE" } else { "" };
            format!("SELECT {data}, {expiry} FROM {table} WHERE {id} = {p}{hint}")
        }
        Driver::SqlServer => {
            let hint = if locking { " WITH (UPDLOCK, ROWLOCK)" } else { "" };
            format!("SELECT {data}, {expiry} FROM {table}{hint} WHERE {id} = {p}")
        }
        Driver::Sqlite => format!("SELECT {data}, {expiry} FROM {table} WHERE {id} = {p}"),
    }
}

/// The placeholder-row `INSERT` used to materialize a lockable target for an
/// absent key under `LOCK_TRANSACTIONAL`. `expiry` and `time` are both `0`;
/// `data` is empty.
pub fn placeholder_insert_sql(driver: Driver, cols: &Columns) -> String {
    let Columns {
        table, id, data, expiry, time,
    } = cols;
    let p = placeholders(driver, 4);
    format!(
        "INSERT INTO {table} ({id}, {data}, {expiry}, {time}) VALUES ({}, {}, {}, {})",
        p[0], p[1], p[2], p[3]
    )
}

/// Plain `UPDATE` used by the UPDATE-then-INSERT write fallback.
pub fn update_sql(driver: Driver, cols: &Columns) -> String {
    let Columns {
        table, id, data, expiry, time,
    } = cols;
    match driver {
        Driver::SqlServer => {
            format!(
                "UPDATE {table} SET {data} = @data, {expiry} = @expiry, {time} = @time WHERE {id} = @id"
            )
        }
        Driver::Oracle => {
            format!(
                "UPDATE {table} SET {data} = :1, {expiry} = :2, {time} = :3 WHERE {id} = :4"
            )
        }
        Driver::PostgreSql => format!(
            "UPDATE {table} SET {data} = $1, {expiry} = $2, {time} = $3 WHERE {id} = $4"
        ),
        Driver::MySql | Driver::Sqlite => format!(
            "UPDATE {table} SET {data} = ?, {expiry} = ?, {time} = ? WHERE {id} = ?"
        ),
    }
}

/// Plain `INSERT` used by the UPDATE-then-INSERT write fallback, and by
/// `write`'s steady-state insert when no UPSERT is available.
pub fn insert_sql(driver: Driver, cols: &Columns) -> String {
    placeholder_insert_sql(driver, cols)
}

/// `DELETE … WHERE id = ?`, used by `destroy`.
pub fn delete_sql(driver: Driver, cols: &Columns) -> String {
    let Columns { table, id, .. } = cols;
    let p = &placeholders(driver, 1)[0];
    format!("DELETE FROM {table} WHERE {id} = {p}")
}

/// `DELETE … WHERE expiry < ?`, the deferred GC sweep fired from `close`.
pub fn delete_expired_sql(driver: Driver, cols: &Columns) -> String {
    let Columns { table, expiry, .. } = cols;
    let p = match driver {
        Driver::PostgreSql => "$1".to_string(),
        Driver::MySql | Driver::Sqlite => "?".to_string(),
        Driver::Oracle => ":1".to_string(),
        Driver::SqlServer => "@now".to_string(),
    };
    format!("DELETE FROM {table} WHERE {expiry} < {p}")
}

/// The atomic UPSERT/MERGE for this driver, or `None` if no single-statement
/// atomic form exists and the caller must fall back to UPDATE-then-INSERT.
///
/// `server_version` is the driver's numeric version (libpq-style
/// `major*10000 + minor*100 + patch` for Postgres, plain major version for
/// SQL Server). `None` means "unknown" and is treated as "modern enough",
/// since a missing version probe shouldn't silently disable the fast path
/// for servers new enough to support it.
pub fn upsert_sql(driver: Driver, cols: &Columns, server_version: Option<u32>) -> Option<String> {
    let Columns {
        table, id, data, expiry, time,
    } = cols;
    match driver {
        Driver::MySql => Some(format!(
            "INSERT INTO {table} ({id}, {data}, {expiry}, {time}) VALUES (?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE {data} = VALUES({data}), {expiry} = VALUES({expiry}), {time} = VALUES({time})"
        )),
        Driver::Sqlite => Some(format!(
            "INSERT OR REPLACE INTO {table} ({id}, {data}, {expiry}, {time}) VALUES (?, ?, ?, ?)"
        )),
        Driver::PostgreSql => {
            if server_version.is_some_and(|v| v < 90500) {
                return None;
            }
            Some(format!(
                "INSERT INTO {table} ({id}, {data}, {expiry}, {time}) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT ({id}) DO UPDATE SET {data} = EXCLUDED.{data}, {expiry} = EXCLUDED.{expiry}, {time} = EXCLUDED.{time}"
            ))
        }
        Driver::Oracle => Some(format!(
            "MERGE INTO {table} USING DUAL ON ({table}.{id} = :1) \
             WHEN MATCHED THEN UPDATE SET {data} = :2, {expiry} = :3, {time} = :4 \
             WHEN NOT MATCHED THEN INSERT ({id}, {data}, {expiry}, {time}) VALUES (:1, :2, :3, :4)"
        )),
        Driver::SqlServer => {
            // HOLDLOCK is required to avoid the well-known MERGE race on SQL
            // Server where two concurrent MERGEs can both see "not matched"
            // and both attempt the INSERT branch.
            if server_version.is_some_and(|v| v < 10) {
                return None;
            }
            Some(format!(
                "MERGE INTO {table} WITH (HOLDLOCK) USING (SELECT @id AS {id}) AS src ON ({table}.{id} = src.{id}) \
                 WHEN MATCHED THEN UPDATE SET {data} = @data, {expiry} = @expiry, {time} = @time \
                 WHEN NOT MATCHED THEN INSERT ({id}, {data}, {expiry}, {time}) VALUES (@id, @data, @expiry, @time);"
            ))
        }
    }
}

/// SQL text for acquiring/releasing an advisory lock, or an error for
/// drivers that don't support one.
pub struct AdvisoryLockSql {
    pub acquire: &'static str,
    pub release: &'static str,
}

/// Engine-level key derived from a session id, to bind into the advisory
/// lock SQL. MySQL's `GET_LOCK`/`RELEASE_LOCK` take the raw id string as the
/// lock name; PostgreSQL's `pg_advisory_lock`/`pg_advisory_unlock` need
/// integer keys derived from the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvisoryLockKey {
    Name(String),
    Int64(i64),
    Int32Pair(i32, i32),
}

/// `GET_LOCK`'s timeout, matching the default `innodb_lock_wait_timeout`.
pub const MYSQL_LOCK_TIMEOUT_SECS: u32 = 50;

pub fn advisory_lock_sql(driver: Driver) -> Result<AdvisoryLockSql> {
    match driver {
        Driver::MySql => Ok(AdvisoryLockSql {
            acquire: "SELECT GET_LOCK(?, 50)",
            release: "SELECT RELEASE_LOCK(?)",
        }),
        Driver::PostgreSql => {
            #[cfg(target_pointer_width = "64")]
            {
                Ok(AdvisoryLockSql {
                    acquire: "SELECT pg_advisory_lock($1)",
                    release: "SELECT pg_advisory_unlock($1)",
                })
            }
            #[cfg(not(target_pointer_width = "64"))]
            {
                Ok(AdvisoryLockSql {
                    acquire: "SELECT pg_advisory_lock($1, $2)",
                    release: "SELECT pg_advisory_unlock($1, $2)",
                })
            }
        }
        Driver::Sqlite => Err(SessionStoreError::UnsupportedOperation(
            "SQLite has no advisory-lock primitive".to_string(),
        )),
        Driver::Oracle | Driver::SqlServer => Err(SessionStoreError::UnsupportedOperation(format!(
            "advisory locking is not implemented for {driver}"
        ))),
    }
}

/// Derive the advisory-lock key for `session_id` on `driver`.
///
/// For PostgreSQL the id's bytes are hex-encoded and the key is taken from a
/// width-sensitive hex prefix: a single signed 60-bit integer from the first
/// 15 hex chars on 64-bit hosts, or two signed 28-bit integers from the
/// first 7 hex chars of each half on 32-bit hosts. One hex char fewer than
/// would fill the native integer is used deliberately, so the value is
/// always representable as a *signed* integer.
pub fn advisory_lock_key(driver: Driver, session_id: &[u8]) -> Result<AdvisoryLockKey> {
    match driver {
        Driver::MySql => Ok(AdvisoryLockKey::Name(
            String::from_utf8_lossy(session_id).into_owned(),
        )),
        Driver::PostgreSql => {
            let hex = hex::encode(session_id);
            #[cfg(target_pointer_width = "64")]
            {
                let prefix: String = hex.chars().take(15).collect();
                let key = i64::from_str_radix(&prefix, 16).unwrap_or(0);
                Ok(AdvisoryLockKey::Int64(key))
            }
            #[cfg(not(target_pointer_width = "64"))]
            {
                let half1: String = hex.chars().take(7).collect();
                let half2: String = hex.chars().skip(7).take(7).collect();
                let k1 = i32::from_str_radix(&half1, 16).unwrap_or(0);
                let k2 = if half2.is_empty() {
                    0
                } else {
                    i32::from_str_radix(&half2, 16).unwrap_or(0)
                };
                Ok(AdvisoryLockKey::Int32Pair(k1, k2))
            }
        }
        other => Err(SessionStoreError::UnsupportedOperation(format!(
            "advisory locking is not implemented for {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Columns<'static> {
        Columns {
            table: "sessions",
            id: "sess_id",
            data: "sess_data",
            expiry: "sess_expiry",
            time: "sess_time",
        }
    }

    #[test]
    fn mysql_upsert_always_available() {
        assert!(upsert_sql(Driver::MySql, &cols(), None).is_some());
    }

    #[test]
    fn sqlite_upsert_is_insert_or_replace() {
        let sql = upsert_sql(Driver::Sqlite, &cols(), None).unwrap();
        assert!(sql.starts_with("INSERT OR REPLACE"));
    }

    #[test]
    fn postgres_upsert_requires_9_5() {
        assert!(upsert_sql(Driver::PostgreSql, &cols(), Some(90400)).is_none());
        assert!(upsert_sql(Driver::PostgreSql, &cols(), Some(90500)).is_some());
        assert!(upsert_sql(Driver::PostgreSql, &cols(), None).is_some());
    }

    #[test]
    fn sqlserver_upsert_requires_2008_and_uses_holdlock() {
        assert!(upsert_sql(Driver::SqlServer, &cols(), Some(9)).is_none());
        let sql = upsert_sql(Driver::SqlServer, &cols(), Some(10)).unwrap();
        assert!(sql.contains("HOLDLOCK"));
        assert!(sql.trim_end().ends_with(';'));
    }

    #[test]
    fn oracle_upsert_is_merge_using_dual() {
        let sql = upsert_sql(Driver::Oracle, &cols(), None).unwrap();
        assert!(sql.contains("MERGE INTO"));
        assert!(sql.contains("USING DUAL"));
    }

    #[test]
    fn locking_select_uses_for_update_on_mysql_oracle_postgres() {
        for driver in [Driver::MySql, Driver::Oracle, Driver::PostgreSql] {
            let sql = select_sql(driver, &cols(), true);
            assert!(sql.ends_with("FOR UPDATE"), "{driver}: {sql}");
            let plain = select_sql(driver, &cols(), false);
            assert!(!plain.contains("FOR UPDATE"));
        }
    }

    #[test]
    fn locking_select_uses_updlock_rowlock_on_sqlserver() {
        let sql = select_sql(Driver::SqlServer, &cols(), true);
        assert!(sql.contains("WITH (UPDLOCK, ROWLOCK)"));
    }

    #[test]
    fn sqlite_select_has_no_locking_hint_either_way() {
        assert_eq!(
            select_sql(Driver::Sqlite, &cols(), true),
            select_sql(Driver::Sqlite, &cols(), false)
        );
    }

    #[test]
    fn sqlite_and_oracle_sqlserver_reject_advisory_locks() {
        assert!(advisory_lock_sql(Driver::Sqlite).is_err());
        assert!(advisory_lock_sql(Driver::Oracle).is_err());
        assert!(advisory_lock_sql(Driver::SqlServer).is_err());
        assert!(advisory_lock_sql(Driver::MySql).is_ok());
        assert!(advisory_lock_sql(Driver::PostgreSql).is_ok());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn pg_key_derivation_uses_15_hex_chars_on_64_bit() {
        // 20-byte id -> 40 hex chars; only the first 15 matter.
        let id = b"0123456789abcdefghij";
        let key = advisory_lock_key(Driver::PostgreSql, id).unwrap();
        let hex = hex::encode(id);
        let expected = i64::from_str_radix(&hex[..15], 16).unwrap();
        assert_eq!(key, AdvisoryLockKey::Int64(expected));
        // Always non-negative: 15 hex chars is 60 bits, one short of 64.
        assert!(expected >= 0);
    }

    #[test]
    fn delete_sql_filters_by_id() {
        assert_eq!(
            delete_sql(Driver::MySql, &cols()),
            "DELETE FROM sessions WHERE sess_id = ?"
        );
        assert_eq!(
            delete_sql(Driver::PostgreSql, &cols()),
            "DELETE FROM sessions WHERE sess_id = $1"
        );
    }

    #[test]
    fn delete_expired_sql_filters_by_expiry() {
        assert_eq!(
            delete_expired_sql(Driver::Sqlite, &cols()),
            "DELETE FROM sessions WHERE sess_expiry < ?"
        );
    }

    #[test]
    fn mysql_key_is_the_raw_session_id() {
        let key = advisory_lock_key(Driver::MySql, b"abc-123").unwrap();
        assert_eq!(key, AdvisoryLockKey::Name("abc-123".to_string()));
    }
}
