//! Session state machine: the `open`/`read`/`write`/`destroy`/`gc`/`close`
//! save-handler contract, the concurrent-insert retry loop, expiry
//! bookkeeping, and deferred GC.
//!
//! This is the one component that ties every other module together: the
//! dialect registry for SQL text, the connection gateway for the
//! connection a request holds start-to-finish, the transaction manager
//! and lock strategy for the three concurrency modes, and `rows` for the
//! actual bind/fetch against whichever `sqlx` backend is live.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{Columns, LockMode, SessionStoreConfig};
use crate::dialect;
use crate::driver::Driver;
use crate::error::{is_duplicate_key, Result, SessionStoreError};
use crate::gateway::{AnyConnection, ConnectionGateway};
use crate::lifetime::MaxLifetimeSource;
use crate::lock::{self, PendingReleases};
use crate::rows;
use crate::transaction::TransactionManager;

/// A session id is treated as a binary-safe key, never re-interpreted as
/// text. `128` matches the column width every dialect's `CREATE TABLE` uses.
pub const MAX_ID_LEN: usize = 128;

/// Fetch the live connection out of `self.conn`, as a direct field
/// expression rather than a `&mut self` helper method — so the borrow
/// checker sees it borrows only `self.conn`, leaving `self.txn`,
/// `self.pending` and friends free to be borrowed in the same statement
/// (needed by, e.g., the advisory-lock acquire call in `read`).
macro_rules! conn {
    ($self:ident) => {
        $self
            .conn
            .as_mut()
            .ok_or_else(|| SessionStoreError::Configuration("no connection is open".into()))?
    };
}

/// The full save-handler contract over a database-backed session table.
///
/// One instance is meant to be driven by a single request/task at a time —
/// it owns the live connection and any in-flight transaction or advisory
/// lock for the whole `open` → `close` span. It is not `Clone`; reuse
/// across requests means calling `open`/`close` again on the same instance,
/// not sharing one live session across concurrent tasks.
pub struct SessionHandler {
    config: SessionStoreConfig,
    gateway: ConnectionGateway,
    max_lifetime: Arc<dyn MaxLifetimeSource>,

    conn: Option<AnyConnection>,
    driver: Option<Driver>,
    server_version: Option<u32>,

    txn: TransactionManager,
    pending: PendingReleases,

    session_expired: bool,
    gc_called: bool,
    last_gc_count: Option<u64>,
}

/// Owned copy of [`Columns`] so the borrow of `self.config` that produces
/// the column names doesn't have to stay alive across the `.await` points
/// between computing SQL text and running it against `self.conn`.
struct OwnedColumns {
    table: String,
    id: String,
    data: String,
    expiry: String,
    time: String,
}

impl OwnedColumns {
    fn as_cols(&self) -> Columns<'_> {
        Columns {
            table: &self.table,
            id: &self.id,
            data: &self.data,
            expiry: &self.expiry,
            time: &self.time,
        }
    }
}

impl From<Columns<'_>> for OwnedColumns {
    fn from(c: Columns<'_>) -> Self {
        OwnedColumns {
            table: c.table.to_string(),
            id: c.id.to_string(),
            data: c.data.to_string(),
            expiry: c.expiry.to_string(),
            time: c.time.to_string(),
        }
    }
}

impl SessionHandler {
    pub fn new(
        config: SessionStoreConfig,
        gateway: ConnectionGateway,
        max_lifetime: Arc<dyn MaxLifetimeSource>,
    ) -> Self {
        Self {
            config,
            gateway,
            max_lifetime,
            conn: None,
            driver: None,
            server_version: None,
            txn: TransactionManager::new(),
            pending: PendingReleases::new(),
            session_expired: false,
            gc_called: false,
            last_gc_count: None,
        }
    }

    fn owned_columns(&self) -> OwnedColumns {
        OwnedColumns::from(self.config.columns())
    }

    fn lock_mode(&self) -> LockMode {
        self.config.lock_mode
    }

    /// Distinguishes a genuinely new session from one `read` just expired —
    /// both yield an empty payload, only this getter tells them apart.
    pub fn is_session_expired(&self) -> bool {
        self.session_expired
    }

    /// The row count the deferred GC sweep actually deleted at the most
    /// recent `close`, for hosts that want the real number rather than
    /// `gc`'s documented placeholder constant. `None` before the first
    /// GC-bearing `close`.
    pub fn gc_count_since_last_close(&self) -> Option<u64> {
        self.last_gc_count
    }

    fn validate_id(id: &[u8]) -> Result<()> {
        if id.is_empty() || id.len() > MAX_ID_LEN {
            return Err(SessionStoreError::Configuration(format!(
                "session id must be 1..={MAX_ID_LEN} bytes, got {}",
                id.len()
            )));
        }
        Ok(())
    }

    fn driver(&self) -> Result<Driver> {
        self.driver.ok_or_else(|| {
            SessionStoreError::Configuration("open() must be called before using the session store".into())
        })
    }

    fn now_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs() as i64
    }

    /// Opens the session store for a request, given the PHP-style
    /// `save_path`/`name` handler arguments.
    ///
    /// Lazily materializes the connection, adopting `save_path` as the DSN
    /// if the handler wasn't configured with one up front. Never fails
    /// soft: connection errors propagate straight to the caller.
    pub async fn open(&mut self, save_path: &str, name: &str) -> Result<bool> {
        tracing::debug!(name = %name, "opening session handler");
        self.gateway.set_dsn_if_unset(save_path);
        let driver = self.gateway.ensure_connected().await?;

        // Advisory locking on SQLite is rejected at the first `read`, not
        // here — `lock::acquire` (via `dialect::advisory_lock_sql`) already
        // raises `UnsupportedOperation` for it, and `open` otherwise never
        // fails soft.
        if self.conn.is_none() {
            let conn = self.gateway.acquire().await?;
            self.server_version = rows::probe_server_version(&conn);
            self.conn = Some(conn);
        }
        self.driver = Some(driver);
        Ok(true)
    }

    /// Reads the stored payload for `id`.
    ///
    /// Returns the raw stored payload, or an empty buffer if the session is
    /// new or expired — use [`Self::is_session_expired`] to tell those two
    /// apart.
    pub async fn read(&mut self, id: &[u8]) -> Result<Vec<u8>> {
        Self::validate_id(id)?;
        self.session_expired = false;
        let driver = self.driver()?;
        let cols = self.owned_columns();

        match self.lock_mode() {
            LockMode::None => {
                let sql = dialect::select_sql(driver, &cols.as_cols(), false);
                let row = rows::select(conn!(self), &sql, id).await?;
                Ok(self.interpret_row(row))
            }
            LockMode::Advisory => {
                let sql = dialect::select_sql(driver, &cols.as_cols(), false);
                lock::acquire(conn!(self), driver, id, &mut self.pending).await?;
                let row = rows::select(conn!(self), &sql, id).await?;
                Ok(self.interpret_row(row))
            }
            LockMode::Transactional => self.read_transactional(id, driver, &cols).await,
        }
    }

    /// The `LOCK_TRANSACTIONAL` read path: begin → locking `SELECT` → on a
    /// miss, insert a placeholder row to materialize a lockable target;
    /// retry on a duplicate-key race from a concurrent first-touch.
    async fn read_transactional(&mut self, id: &[u8], driver: Driver, cols: &OwnedColumns) -> Result<Vec<u8>> {
        let select = dialect::select_sql(driver, &cols.as_cols(), true);
        let insert = dialect::placeholder_insert_sql(driver, &cols.as_cols());

        loop {
            self.txn.begin(conn!(self)).await?;

            match rows::select(conn!(self), &select, id).await {
                Ok(Some(row)) => return Ok(self.interpret_row(Some(row))),
                Ok(None) => match rows::insert_placeholder(conn!(self), &insert, id).await {
                    Ok(()) => {
                        // We just materialized the row ourselves: a
                        // brand-new session, not an expired one.
                        self.session_expired = false;
                        return Ok(Vec::new());
                    }
                    Err(e) if is_duplicate_key(&e) => {
                        // Another request won the race to insert the
                        // placeholder first. Roll back (mandatory on
                        // PostgreSQL — a failed statement poisons the
                        // surrounding transaction) and retry: the winner's
                        // row is now visible to re-select.
                        tracing::debug!("lost placeholder-insert race, retrying read");
                        self.txn.rollback(conn!(self)).await?;
                        continue;
                    }
                    Err(e) => {
                        let _ = self.txn.rollback(conn!(self)).await;
                        return Err(e.into());
                    }
                },
                Err(e) => {
                    let _ = self.txn.rollback(conn!(self)).await;
                    return Err(e.into());
                }
            }
        }
    }

    /// Interpret a fetched row: no row or an expired/placeholder row both
    /// read as "empty, possibly expired"; only a row whose expiry is still
    /// in the future returns its payload.
    fn interpret_row(&mut self, row: Option<rows::FetchedRow>) -> Vec<u8> {
        match row {
            None => {
                self.session_expired = false;
                Vec::new()
            }
            Some(row) if row.expiry < Self::now_secs() => {
                // Covers both a genuinely expired row and a placeholder
                // (expiry=0) a concurrent reader is still holding the lock
                // on — both are indistinguishable to us.
                self.session_expired = true;
                Vec::new()
            }
            Some(row) => {
                self.session_expired = false;
                row.data
            }
        }
    }

    /// Writes `data` for `id`, stamping a fresh expiry.
    ///
    /// Prefers the dialect's atomic UPSERT; falls back to UPDATE, then
    /// INSERT on a miss, retrying the UPDATE if that INSERT loses a
    /// duplicate-key race to a concurrent first write.
    pub async fn write(&mut self, id: &[u8], data: &[u8]) -> Result<bool> {
        Self::validate_id(id)?;
        let driver = self.driver()?;
        let cols = self.owned_columns();

        let now = Self::now_secs();
        let expiry = now + self.max_lifetime.max_lifetime_secs() as i64;

        if let Some(sql) = dialect::upsert_sql(driver, &cols.as_cols(), self.server_version) {
            if let Err(e) = rows::upsert(conn!(self), &sql, id, data, expiry, now).await {
                let _ = self.txn.rollback(conn!(self)).await;
                return Err(e.into());
            }
            return Ok(true);
        }

        let update_sql = dialect::update_sql(driver, &cols.as_cols());
        let affected = match rows::update(conn!(self), &update_sql, id, data, expiry, now).await {
            Ok(n) => n,
            Err(e) => {
                let _ = self.txn.rollback(conn!(self)).await;
                return Err(e.into());
            }
        };

        if affected > 0 {
            return Ok(true);
        }

        let insert_sql = dialect::insert_sql(driver, &cols.as_cols());
        match rows::insert(conn!(self), &insert_sql, id, data, expiry, now).await {
            Ok(()) => Ok(true),
            Err(e) if is_duplicate_key(&e) => {
                // Lost the race: someone else inserted between our UPDATE
                // miss and our INSERT. Their row now exists, so UPDATE it.
                rows::update(conn!(self), &update_sql, id, data, expiry, now).await?;
                Ok(true)
            }
            Err(e) => {
                let _ = self.txn.rollback(conn!(self)).await;
                Err(e.into())
            }
        }
    }

    /// Deletes the row for `id`, if any.
    pub async fn destroy(&mut self, id: &[u8]) -> Result<bool> {
        Self::validate_id(id)?;
        let driver = self.driver()?;
        let cols = self.owned_columns();
        let sql = dialect::delete_sql(driver, &cols.as_cols());
        match rows::delete(conn!(self), &sql, id).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let _ = self.txn.rollback(conn!(self)).await;
                Err(e.into())
            }
        }
    }

    /// Flags an expired-row sweep to run at the next `close`.
    ///
    /// Actual deletion is deferred to `close` so it never runs inside a
    /// request's critical section. The return value is a documented
    /// constant for interface compatibility only — the real count, once
    /// known, is available afterwards via
    /// [`Self::gc_count_since_last_close`].
    pub async fn gc(&mut self, _maxlifetime: u64) -> Result<u64> {
        self.gc_called = true;
        Ok(1)
    }

    /// Closes the session, releasing everything `open` acquired.
    ///
    /// Commits any open transaction, drains queued advisory-lock releases
    /// FIFO, runs the deferred GC sweep if `gc()` was called, and drops the
    /// connection if it was opened lazily.
    pub async fn close(&mut self) -> Result<bool> {
        tracing::debug!(
            in_transaction = self.txn.in_transaction(),
            pending_releases = !self.pending.is_empty(),
            gc_called = self.gc_called,
            "closing session handler"
        );
        if self.conn.is_some() {
            self.txn.commit(conn!(self)).await?;
            self.pending.drain(conn!(self)).await;

            if self.gc_called {
                let driver = self.driver()?;
                let cols = self.owned_columns();
                let sql = dialect::delete_expired_sql(driver, &cols.as_cols());
                let now = Self::now_secs();
                let deleted = rows::delete_expired(conn!(self), &sql, now).await?;
                tracing::debug!(deleted, "deferred gc sweep at close");
                self.last_gc_count = Some(deleted);
            }
        }
        self.gc_called = false;

        self.conn = None;
        self.driver = None;
        self.gateway.close_if_lazy().await;
        Ok(true)
    }

    /// One-shot schema bootstrap, creating the sessions table if absent.
    pub async fn create_table(&mut self) -> Result<()> {
        let driver = self.driver()?;
        let cols = self.owned_columns();
        let result = crate::bootstrap::create_table(conn!(self), driver, &cols.as_cols()).await;
        if result.is_err() {
            let _ = self.txn.rollback(conn!(self)).await;
        }
        result
    }
}

// Manual `Debug`: never print credentials or leak the live connection
// handle into debug output.
impl fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandler")
            .field("table", &self.config.table)
            .field("lock_mode", &self.config.lock_mode)
            .field("driver", &self.driver)
            .field("in_transaction", &self.txn.in_transaction())
            .field("session_expired", &self.session_expired)
            .field("gc_called", &self.gc_called)
            .finish()
    }
}
