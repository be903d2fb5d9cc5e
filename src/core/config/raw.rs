//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

use super::types::DEFAULT_SCOPE_CONCURRENCY;

/// Raw TOML shape: serde target before resolution.
#[derive(Deserialize)]
pub(super) struct RawConfig {
    pub supervisor: RawSupervisor,
    #[serde(default)]
    pub db: RawDb,
}

#[derive(Deserialize)]
pub(super) struct RawSupervisor {
    #[serde(default = "default_name")]
    pub name: String,
    pub work_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Store + hydration ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawDb {
    #[serde(default)]
    pub emulate: bool,
    /// Absolute, `~`-prefixed, or relative to `work_dir`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_scope_concurrency")]
    pub scope_concurrency: usize,
    #[serde(default, alias = "defaultUser")]
    pub default_user: Option<RawIdentity>,
    #[serde(default)]
    pub users: Vec<RawIdentity>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Default for RawDb {
    fn default() -> Self {
        Self {
            emulate: false,
            path: None,
            scope_concurrency: default_scope_concurrency(),
            default_user: None,
            users: Vec::new(),
            scopes: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawIdentity {
    pub name: String,
    #[serde(alias = "keyId")]
    pub key_id: String,
    #[serde(alias = "keySecret")]
    pub key_secret: String,
}

fn default_name() -> String { "gateway".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_scope_concurrency() -> usize { DEFAULT_SCOPE_CONCURRENCY }
