//! Per-driver row I/O: the small bit of `sqlx` dispatch the session state
//! machine needs on top of the SQL text `dialect` generates. Kept separate
//! from `session.rs` so the state machine reads as the save-handler's
//! open/read/write/destroy/gc/close sequence, not a wall of
//! `match AnyConnection { .. }` arms.

use crate::gateway::AnyConnection;

/// One fetched session row: the raw payload and its absolute expiry, both
/// widened to the common Rust types the state machine works in regardless
/// of which driver's native column width produced them.
pub struct FetchedRow {
    pub data: Vec<u8>,
    pub expiry: i64,
}

/// `SELECT data, expiry FROM … WHERE id = ?`, locking or not per `sql`.
pub async fn select(
    conn: &mut AnyConnection,
    sql: &str,
    id: &[u8],
) -> sqlx::Result<Option<FetchedRow>> {
    match conn {
        #[cfg(feature = "mysql")]
        AnyConnection::MySql(c) => {
            // `sess_expiry`/`sess_time` are `INTEGER UNSIGNED` (32-bit) in
            // the MySQL DDL (`dialect::create_table_sql`), which `sqlx`
            // decodes as `u32`.
            let row: Option<(Vec<u8>, u32)> =
                sqlx::query_as(sql).bind(id).fetch_optional(&mut **c).await?;
            Ok(row.map(|(data, expiry)| FetchedRow {
                data,
                expiry: expiry as i64,
            }))
        }
        #[cfg(feature = "pg")]
        AnyConnection::Postgres(c) => {
            let row: Option<(Vec<u8>, i64)> =
                sqlx::query_as(sql).bind(id).fetch_optional(&mut **c).await?;
            Ok(row.map(|(data, expiry)| FetchedRow { data, expiry }))
        }
        #[cfg(feature = "sqlite")]
        AnyConnection::Sqlite(c) => {
            let row: Option<(Vec<u8>, i64)> =
                sqlx::query_as(sql).bind(id).fetch_optional(&mut **c).await?;
            Ok(row.map(|(data, expiry)| FetchedRow { data, expiry }))
        }
    }
}

/// The placeholder-row `INSERT` (`id`, empty data, `expiry=0`, `time=0`),
/// binding in the column order `dialect::placeholder_insert_sql` emits.
pub async fn insert_placeholder(conn: &mut AnyConnection, sql: &str, id: &[u8]) -> sqlx::Result<()> {
    let empty: Vec<u8> = Vec::new();
    match conn {
        #[cfg(feature = "mysql")]
        AnyConnection::MySql(c) => {
            sqlx::query(sql)
                .bind(id)
                .bind(&empty)
                .bind(0i64)
                .bind(0i64)
                .execute(&mut **c)
                .await?;
        }
        #[cfg(feature = "pg")]
        AnyConnection::Postgres(c) => {
            sqlx::query(sql)
                .bind(id)
                .bind(&empty)
                .bind(0i64)
                .bind(0i64)
                .execute(&mut **c)
                .await?;
        }
        #[cfg(feature = "sqlite")]
        AnyConnection::Sqlite(c) => {
            sqlx::query(sql)
                .bind(id)
                .bind(&empty)
                .bind(0i64)
                .bind(0i64)
                .execute(&mut **c)
                .await?;
        }
    }
    Ok(())
}

/// The atomic UPSERT/MERGE, binding `(id, data, expiry, time)` — the column
/// order every live driver's `dialect::upsert_sql` text uses.
pub async fn upsert(
    conn: &mut AnyConnection,
    sql: &str,
    id: &[u8],
    data: &[u8],
    expiry: i64,
    time: i64,
) -> sqlx::Result<()> {
    match conn {
        #[cfg(feature = "mysql")]
        AnyConnection::MySql(c) => {
            sqlx::query(sql)
                .bind(id)
                .bind(data)
                .bind(expiry)
                .bind(time)
                .execute(&mut **c)
                .await?;
        }
        #[cfg(feature = "pg")]
        AnyConnection::Postgres(c) => {
            sqlx::query(sql)
                .bind(id)
                .bind(data)
                .bind(expiry)
                .bind(time)
                .execute(&mut **c)
                .await?;
        }
        #[cfg(feature = "sqlite")]
        AnyConnection::Sqlite(c) => {
            sqlx::query(sql)
                .bind(id)
                .bind(data)
                .bind(expiry)
                .bind(time)
                .execute(&mut **c)
                .await?;
        }
    }
    Ok(())
}

/// Plain `UPDATE`, binding `(data, expiry, time, id)` — the order
/// `dialect::update_sql` text uses. Returns the affected row count so the
/// caller can fall back to `INSERT` on a miss.
pub async fn update(
    conn: &mut AnyConnection,
    sql: &str,
    id: &[u8],
    data: &[u8],
    expiry: i64,
    time: i64,
) -> sqlx::Result<u64> {
    let rows = match conn {
        #[cfg(feature = "mysql")]
        AnyConnection::MySql(c) => {
            sqlx::query(sql)
                .bind(data)
                .bind(expiry)
                .bind(time)
                .bind(id)
                .execute(&mut **c)
                .await?
                .rows_affected()
        }
        #[cfg(feature = "pg")]
        AnyConnection::Postgres(c) => {
            sqlx::query(sql)
                .bind(data)
                .bind(expiry)
                .bind(time)
                .bind(id)
                .execute(&mut **c)
                .await?
                .rows_affected()
        }
        #[cfg(feature = "sqlite")]
        AnyConnection::Sqlite(c) => {
            sqlx::query(sql)
                .bind(data)
                .bind(expiry)
                .bind(time)
                .bind(id)
                .execute(&mut **c)
                .await?
                .rows_affected()
        }
    };
    Ok(rows)
}

/// Plain `INSERT`, binding `(id, data, expiry, time)` — used by `write`'s
/// update-then-insert fallback once `update` reports zero rows affected.
pub async fn insert(
    conn: &mut AnyConnection,
    sql: &str,
    id: &[u8],
    data: &[u8],
    expiry: i64,
    time: i64,
) -> sqlx::Result<()> {
    match conn {
        #[cfg(feature = "mysql")]
        AnyConnection::MySql(c) => {
            sqlx::query(sql)
                .bind(id)
                .bind(data)
                .bind(expiry)
                .bind(time)
                .execute(&mut **c)
                .await?;
        }
        #[cfg(feature = "pg")]
        AnyConnection::Postgres(c) => {
            sqlx::query(sql)
                .bind(id)
                .bind(data)
                .bind(expiry)
                .bind(time)
                .execute(&mut **c)
                .await?;
        }
        #[cfg(feature = "sqlite")]
        AnyConnection::Sqlite(c) => {
            sqlx::query(sql)
                .bind(id)
                .bind(data)
                .bind(expiry)
                .bind(time)
                .execute(&mut **c)
                .await?;
        }
    }
    Ok(())
}

/// `DELETE … WHERE id = ?`.
pub async fn delete(conn: &mut AnyConnection, sql: &str, id: &[u8]) -> sqlx::Result<u64> {
    let rows = match conn {
        #[cfg(feature = "mysql")]
        AnyConnection::MySql(c) => sqlx::query(sql).bind(id).execute(&mut **c).await?.rows_affected(),
        #[cfg(feature = "pg")]
        AnyConnection::Postgres(c) => sqlx::query(sql).bind(id).execute(&mut **c).await?.rows_affected(),
        #[cfg(feature = "sqlite")]
        AnyConnection::Sqlite(c) => sqlx::query(sql).bind(id).execute(&mut **c).await?.rows_affected(),
    };
    Ok(rows)
}

/// `DELETE … WHERE expiry < ?`, the deferred GC sweep fired from `close`.
pub async fn delete_expired(conn: &mut AnyConnection, sql: &str, now: i64) -> sqlx::Result<u64> {
    let rows = match conn {
        #[cfg(feature = "mysql")]
        AnyConnection::MySql(c) => sqlx::query(sql).bind(now).execute(&mut **c).await?.rows_affected(),
        #[cfg(feature = "pg")]
        AnyConnection::Postgres(c) => sqlx::query(sql).bind(now).execute(&mut **c).await?.rows_affected(),
        #[cfg(feature = "sqlite")]
        AnyConnection::Sqlite(c) => sqlx::query(sql).bind(now).execute(&mut **c).await?.rows_affected(),
    };
    Ok(rows)
}

/// Probe the server version for dialects that version-gate their UPSERT.
/// Only Postgres needs this among the live
/// connectors — MySQL's and SQLite's fast paths are unconditional, and SQL
/// Server's is dialect-only (no live connector exists for it in this
/// stack). `None` means "unknown", treated as "modern enough" by
/// `dialect::upsert_sql`.
pub fn probe_server_version(conn: &AnyConnection) -> Option<u32> {
    #[cfg(feature = "pg")]
    {
        // `PoolConnection<Postgres>` derefs to `PgConnection`, which exposes
        // the server's numeric version directly — no round trip needed.
        if let AnyConnection::Postgres(c) = conn {
            return c.server_version_num();
        }
    }
    let _ = conn;
    None
}
