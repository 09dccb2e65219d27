//! One-shot schema creation helper.

use crate::config::Columns;
use crate::dialect;
use crate::driver::Driver;
use crate::error::Result;
use crate::gateway::AnyConnection;

/// Execute the per-driver `CREATE TABLE` DDL on an already-open connection.
///
/// Propagates the driver's error verbatim — in particular, "table already
/// exists" surfaces to the caller unchanged, same as any other DDL failure.
pub async fn create_table(conn: &mut AnyConnection, driver: Driver, cols: &Columns<'_>) -> Result<()> {
    let sql = dialect::create_table_sql(driver, cols)?;
    tracing::debug!(sql = %sql, "creating session table");
    execute(conn, &sql).await
}

async fn execute(conn: &mut AnyConnection, sql: &str) -> Result<()> {
    match conn {
        #[cfg(feature = "mysql")]
        AnyConnection::MySql(c) => {
            sqlx::query(sql).execute(&mut **c).await?;
        }
        #[cfg(feature = "pg")]
        AnyConnection::Postgres(c) => {
            sqlx::query(sql).execute(&mut **c).await?;
        }
        #[cfg(feature = "sqlite")]
        AnyConnection::Sqlite(c) => {
            sqlx::query(sql).execute(&mut **c).await?;
        }
    }
    Ok(())
}
