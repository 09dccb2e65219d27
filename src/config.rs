//! Construction-time configuration for a [`crate::session::SessionHandler`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Locking strategy used to serialize concurrent access to one session id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// Last-writer-wins; no explicit locking.
    None = 0,
    /// Engine-level advisory lock keyed on the session id.
    Advisory = 1,
    /// Row-level lock obtained via a locking `SELECT` inside a transaction.
    #[default]
    Transactional = 2,
}

/// Table and column names, credentials, and lock mode for one handler
/// instance. Immutable after construction, following the shape of
/// `modkit-db::config::DbConnConfig`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionStoreConfig {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_id_col")]
    pub id_col: String,
    #[serde(default = "default_data_col")]
    pub data_col: String,
    #[serde(default = "default_expiry_col")]
    pub expiry_col: String,
    #[serde(default = "default_time_col")]
    pub time_col: String,

    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub connection_options: HashMap<String, String>,

    #[serde(default)]
    pub lock_mode: LockMode,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            id_col: default_id_col(),
            data_col: default_data_col(),
            expiry_col: default_expiry_col(),
            time_col: default_time_col(),
            username: None,
            password: None,
            connection_options: HashMap::new(),
            lock_mode: LockMode::default(),
        }
    }
}

fn default_table() -> String {
    "sessions".to_string()
}
fn default_id_col() -> String {
    "sess_id".to_string()
}
fn default_data_col() -> String {
    "sess_data".to_string()
}
fn default_expiry_col() -> String {
    "sess_expiry".to_string()
}
fn default_time_col() -> String {
    "sess_time".to_string()
}

/// Column name bundle, threaded through the dialect registry without
/// repeating five positional string arguments everywhere.
#[derive(Clone, Debug)]
pub struct Columns<'a> {
    pub table: &'a str,
    pub id: &'a str,
    pub data: &'a str,
    pub expiry: &'a str,
    pub time: &'a str,
}

impl SessionStoreConfig {
    pub fn columns(&self) -> Columns<'_> {
        Columns {
            table: &self.table,
            id: &self.id_col,
            data: &self.data_col,
            expiry: &self.expiry_col,
            time: &self.time_col,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SessionStoreConfig::default();
        assert_eq!(cfg.table, "sessions");
        assert_eq!(cfg.id_col, "sess_id");
        assert_eq!(cfg.data_col, "sess_data");
        assert_eq!(cfg.expiry_col, "sess_expiry");
        assert_eq!(cfg.time_col, "sess_time");
        assert_eq!(cfg.lock_mode, LockMode::Transactional);
    }
}
