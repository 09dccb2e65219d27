//! Transaction manager: begin/commit/rollback with an `in_transaction` flag,
//! special-casing SQLite's manual `BEGIN IMMEDIATE` and MySQL's
//! `READ COMMITTED` isolation override.
//!
//! Transactions are driven as raw SQL statements against the
//! [`AnyConnection`](crate::gateway::AnyConnection) the handler already
//! holds, rather than `sqlx`'s borrowed `Transaction<'_, DB>` wrapper — that
//! type borrows its connection, which is incompatible with storing an
//! in-flight transaction as a field across the `read` → `write` → `close`
//! callback boundary a save-handler requires.

use crate::error::Result;
use crate::gateway::AnyConnection;

/// Tracks whether a transaction is open on the connection it's handed, and
/// issues the driver-appropriate begin/commit/rollback statements.
#[derive(Debug, Default)]
pub struct TransactionManager {
    in_transaction: bool,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Begin a transaction. A no-op if one is already open.
    pub async fn begin(&mut self, conn: &mut AnyConnection) -> Result<()> {
        if self.in_transaction {
            return Ok(());
        }
        match conn {
            #[cfg(feature = "sqlite")]
            AnyConnection::Sqlite(c) => {
                // SQLite has no row-level locking; BEGIN IMMEDIATE reserves
                // the whole database for writing, standing in for a row lock.
                sqlx::query("BEGIN IMMEDIATE TRANSACTION")
                    .execute(&mut **c)
                    .await?;
            }
            #[cfg(feature = "mysql")]
            AnyConnection::MySql(c) => {
                // The default REPEATABLE READ isolation level's gap locks
                // cause spurious deadlocks between two sessions contending
                // for the same placeholder row; READ COMMITTED avoids them.
                sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
                    .execute(&mut **c)
                    .await?;
                sqlx::query("START TRANSACTION").execute(&mut **c).await?;
            }
            #[cfg(feature = "pg")]
            AnyConnection::Postgres(c) => {
                sqlx::query("BEGIN").execute(&mut **c).await?;
            }
        }
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction. On failure, rolls back and re-raises —
    /// callers never see a connection left straddling an indeterminate state.
    pub async fn commit(&mut self, conn: &mut AnyConnection) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let result = match conn {
            #[cfg(feature = "sqlite")]
            AnyConnection::Sqlite(c) => sqlx::query("COMMIT").execute(&mut **c).await,
            #[cfg(feature = "mysql")]
            AnyConnection::MySql(c) => sqlx::query("COMMIT").execute(&mut **c).await,
            #[cfg(feature = "pg")]
            AnyConnection::Postgres(c) => sqlx::query("COMMIT").execute(&mut **c).await,
        };
        match result {
            Ok(_) => {
                self.in_transaction = false;
                Ok(())
            }
            Err(e) => {
                let _ = self.rollback(conn).await;
                Err(e.into())
            }
        }
    }

    /// Roll back, but only if a transaction is actually open — the guard
    /// that stops a redundant rollback from masking whatever error triggered
    /// it.
    pub async fn rollback(&mut self, conn: &mut AnyConnection) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        // Reset the flag unconditionally: even if the ROLLBACK statement
        // itself fails, the caller must not believe a transaction is still
        // open on this connection.
        self.in_transaction = false;
        match conn {
            #[cfg(feature = "sqlite")]
            AnyConnection::Sqlite(c) => {
                sqlx::query("ROLLBACK").execute(&mut **c).await?;
            }
            #[cfg(feature = "mysql")]
            AnyConnection::MySql(c) => {
                sqlx::query("ROLLBACK").execute(&mut **c).await?;
            }
            #[cfg(feature = "pg")]
            AnyConnection::Postgres(c) => {
                sqlx::query("ROLLBACK").execute(&mut **c).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_out_not_in_transaction() {
        assert!(!TransactionManager::new().in_transaction());
    }
}
