#![cfg_attr(
    not(any(feature = "pg", feature = "mysql", feature = "sqlite")),
    allow(unused_imports, unused_variables, dead_code, unreachable_code)
)]

//! A database-backed, concurrency-safe session save-handler.
//!
//! Implements the standard `open`/`read`/`write`/`destroy`/`gc`/`close`
//! save-handler contract over a single `sessions` table, portable across
//! MySQL, PostgreSQL, SQLite, Oracle and SQL Server. The hard part is
//! concurrency control: each session id behaves as a mutually exclusive
//! critical section spanning `read` → `write`, implemented with one of
//! three strategies — no locking, engine-level advisory locks, or a row
//! lock held by a locking `SELECT` inside a transaction.
//!
//! # Example
//! ```rust,no_run
//! use sql_session_store::{
//!     ConnectionGateway, FixedLifetime, SessionHandler, SessionStoreConfig,
//! };
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run() -> sql_session_store::Result<()> {
//! let gateway = ConnectionGateway::lazy("sqlite::memory:", &Default::default());
//! let lifetime = Arc::new(FixedLifetime(Duration::from_secs(1440)));
//! let mut handler = SessionHandler::new(SessionStoreConfig::default(), gateway, lifetime);
//!
//! handler.open("sqlite::memory:", "PHPSESSID").await?;
//! handler.create_table().await?;
//!
//! let payload = handler.read(b"abc123").await?;
//! assert!(payload.is_empty());
//! assert!(!handler.is_session_expired());
//!
//! handler.write(b"abc123", b"\x00\x01session-data").await?;
//! handler.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod lifetime;
pub mod lock;
mod rows;
pub mod session;
pub mod transaction;

pub use config::{Columns, LockMode, SessionStoreConfig};
pub use driver::Driver;
pub use error::{Result, SessionStoreError};
pub use gateway::{AnyConnection, AnyPool, ConnectOpts, ConnectionGateway};
pub use lifetime::{FixedLifetime, MaxLifetimeSource};
pub use session::{SessionHandler, MAX_ID_LEN};
