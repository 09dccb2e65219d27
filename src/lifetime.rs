//! The ambient `session_max_lifetime` collaborator.
//!
//! The handler never caches this value across calls — it is re-read at
//! `write` time, and again (implicitly, via the host's own GC hook) when
//! `close` purges expired rows — so a host can change it between requests
//! without restarting the handler.

use std::time::Duration;

/// Supplies the session max-lifetime in effect *right now*, for `write` to
/// stamp `expiry = now + max_lifetime`.
///
/// Implemented as a small injected trait rather than a free function or a
/// global so a host can back it with whatever configuration system it
/// already uses, matching this codebase's preference for small trait seams
/// over ambient statics (see `modkit-db::config` for the equivalent
/// construction-time pattern applied to connection settings).
pub trait MaxLifetimeSource: Send + Sync {
    fn max_lifetime_secs(&self) -> u64;
}

/// The common case: a lifetime fixed for the handler's whole lifetime.
#[derive(Clone, Copy, Debug)]
pub struct FixedLifetime(pub Duration);

impl FixedLifetime {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }
}

impl MaxLifetimeSource for FixedLifetime {
    fn max_lifetime_secs(&self) -> u64 {
        self.0.as_secs()
    }
}
