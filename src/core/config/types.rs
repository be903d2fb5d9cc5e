//! Resolved configuration types.

use std::fmt;
use std::path::PathBuf;

/// One user/application to provision at startup.
///
/// `Debug` never prints `key_secret`.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityDescriptor {
    pub name: String,
    pub key_id: String,
    pub key_secret: String,
}

impl fmt::Debug for IdentityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityDescriptor")
            .field("name", &self.name)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

/// Default state the store should hold after hydration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationConfig {
    /// `[db.default_user]`
    pub default_user: Option<IdentityDescriptor>,
    /// `[[db.users]]`
    pub users: Vec<IdentityDescriptor>,
    /// `db.scopes`
    pub scopes: Vec<String>,
}

impl HydrationConfig {
    /// `true` when there is nothing to hydrate.
    pub fn is_empty(&self) -> bool {
        self.default_user.is_none() && self.users.is_empty() && self.scopes.is_empty()
    }
}

/// Identity store configuration (`[db]`).
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Keep everything in process memory; nothing is written to disk.
    pub emulate: bool,
    /// Snapshot file used when not emulating (already expanded, no `~`).
    pub path: PathBuf,
    /// Upper bound on in-flight scope existence checks.
    pub scope_concurrency: usize,
    pub hydration: HydrationConfig,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    /// Working directory for persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub db: DbConfig,
}

/// Default cap on in-flight scope existence checks.
pub const DEFAULT_SCOPE_CONCURRENCY: usize = 16;
pub(super) const DEFAULT_DB_FILE: &str = "db.json";

impl Config {
    /// Built-in configuration used when no file is present: emulated store,
    /// nothing to hydrate.
    pub fn minimal(work_dir: PathBuf, log_level: String) -> Self {
        let path = work_dir.join(DEFAULT_DB_FILE);
        Self {
            name: "gateway".to_string(),
            work_dir,
            log_level,
            db: DbConfig {
                emulate: true,
                path,
                scope_concurrency: DEFAULT_SCOPE_CONCURRENCY,
                hydration: HydrationConfig::default(),
            },
        }
    }
}
