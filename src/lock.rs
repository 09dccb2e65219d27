//! Lock strategy: the NONE/ADVISORY/TRANSACTIONAL modes and the FIFO
//! pending-release queue.
//!
//! The release queue is modeled as plain data — an ordered `Vec` of
//! acquired-key/release-SQL pairs — rather than the RAII drop-guards
//! `db::advisory_locks::DbLockGuard` uses, because releases must drain in a
//! known order at `close`, not fire best-effort on drop.

#[cfg(feature = "mysql")]
use std::time::Duration;

use crate::dialect::{self, AdvisoryLockKey};
#[cfg(feature = "mysql")]
use crate::dialect::MYSQL_LOCK_TIMEOUT_SECS;
use crate::driver::Driver;
use crate::error::{Result, SessionStoreError};
use crate::gateway::AnyConnection;

/// Client-side deadline backing up MySQL's server-side `GET_LOCK(?, 50)`
/// wait. A few seconds of grace over the server's own timeout so a slow
/// network round trip doesn't race a client cutoff against the server's,
/// while still bounding the wait if the server itself wedges and never
/// returns.
#[cfg(feature = "mysql")]
const MYSQL_LOCK_CLIENT_TIMEOUT: Duration = Duration::from_secs(MYSQL_LOCK_TIMEOUT_SECS as u64 + 5);

struct PendingRelease {
    sql: &'static str,
    key: AdvisoryLockKey,
}

/// FIFO queue of advisory-lock release statements, drained at `close`.
#[derive(Default)]
pub struct PendingReleases(Vec<PendingRelease>);

impl PendingReleases {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, sql: &'static str, key: AdvisoryLockKey) {
        self.0.push(PendingRelease { sql, key });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drain every queued release in FIFO order. Failures are logged, not
    /// propagated — by the time `close` drains this queue there is no
    /// caller left to hand the error to, and one failed release must not
    /// stop the rest from firing.
    pub async fn drain(&mut self, conn: &mut AnyConnection) {
        for entry in self.0.drain(..) {
            if let Err(e) = execute_release(conn, &entry).await {
                tracing::warn!(error = %e, "failed to release advisory lock");
            }
        }
    }
}

async fn execute_release(conn: &mut AnyConnection, entry: &PendingRelease) -> Result<()> {
    match (conn, &entry.key) {
        #[cfg(feature = "mysql")]
        (AnyConnection::MySql(c), AdvisoryLockKey::Name(name)) => {
            sqlx::query(entry.sql).bind(name).execute(&mut **c).await?;
        }
        #[cfg(feature = "pg")]
        (AnyConnection::Postgres(c), AdvisoryLockKey::Int64(key)) => {
            sqlx::query(entry.sql).bind(key).execute(&mut **c).await?;
        }
        #[cfg(feature = "pg")]
        (AnyConnection::Postgres(c), AdvisoryLockKey::Int32Pair(a, b)) => {
            sqlx::query(entry.sql).bind(a).bind(b).execute(&mut **c).await?;
        }
        _ => {
            return Err(SessionStoreError::Configuration(
                "advisory-lock release key does not match the connection's driver".to_string(),
            ))
        }
    }
    Ok(())
}

/// Acquire an advisory lock for `session_id` on the given connection, and
/// enqueue its release into `pending`.
pub async fn acquire(
    conn: &mut AnyConnection,
    driver: Driver,
    session_id: &[u8],
    pending: &mut PendingReleases,
) -> Result<()> {
    let sql = dialect::advisory_lock_sql(driver)?;
    let key = dialect::advisory_lock_key(driver, session_id)?;

    tracing::debug!(driver = %driver, "acquiring advisory lock");

    match (conn, &key) {
        #[cfg(feature = "mysql")]
        (AnyConnection::MySql(c), AdvisoryLockKey::Name(name)) => {
            // GET_LOCK returns 1 on success, 0 on timeout, NULL on error.
            // The server already enforces its own 50s wait; `tokio::time::timeout`
            // backs that up client-side in case the connection itself wedges
            // and the server never gets to answer at all.
            let (ok,): (Option<i64>,) = match tokio::time::timeout(
                MYSQL_LOCK_CLIENT_TIMEOUT,
                sqlx::query_as(sql.acquire).bind(name).fetch_one(&mut **c),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(name = %name, "client-side timeout waiting on MySQL GET_LOCK");
                    return Err(SessionStoreError::LockTimeout(format!(
                        "client-side timeout acquiring MySQL advisory lock for session {name}"
                    )));
                }
            };
            if ok != Some(1) {
                tracing::warn!(name = %name, "MySQL GET_LOCK timed out");
                return Err(SessionStoreError::LockTimeout(format!(
                    "timed out acquiring MySQL advisory lock for session {name}"
                )));
            }
        }
        #[cfg(feature = "pg")]
        (AnyConnection::Postgres(c), AdvisoryLockKey::Int64(key)) => {
            sqlx::query(sql.acquire).bind(key).execute(&mut **c).await?;
        }
        #[cfg(feature = "pg")]
        (AnyConnection::Postgres(c), AdvisoryLockKey::Int32Pair(a, b)) => {
            sqlx::query(sql.acquire).bind(a).bind(b).execute(&mut **c).await?;
        }
        _ => {
            return Err(SessionStoreError::Configuration(
                "advisory-lock key does not match the connection's driver".to_string(),
            ))
        }
    }

    tracing::debug!(driver = %driver, "advisory lock acquired");
    pending.push(sql.release, key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_releases_start_empty() {
        assert!(PendingReleases::new().is_empty());
    }
}
