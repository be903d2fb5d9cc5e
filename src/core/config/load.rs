//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! and applies `GATEWAY_WORK_DIR`, `GATEWAY_LOG_LEVEL` and
//! `GATEWAY_DB_EMULATE` env overrides.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

use super::raw::{RawConfig, RawIdentity};
use super::types::*;

/// Values that win over whatever the file says.
///
/// [`load`] fills this from the environment; tests build it directly
/// instead of mutating env vars.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub emulate: Option<bool>,
}

impl Overrides {
    fn from_env() -> Self {
        Self {
            work_dir: env::var("GATEWAY_WORK_DIR").ok(),
            log_level: env::var("GATEWAY_LOG_LEVEL").ok(),
            emulate: env::var("GATEWAY_DB_EMULATE").ok().map(|v| parse_flag(&v)),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Deep-merge two TOML values.
/// Tables are merged recursively; for every other type (string, integer,
/// array, …) the overlay value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// fully merged `toml::Value`. `visited` carries canonicalized paths already
/// seen in this chain so circular references are caught early.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply env-var overrides.
/// If no path is given and `config/default.toml` does not exist, returns [`Config::minimal`].
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides::from_env();

    if let Some(path) = config_path {
        return load_from(Path::new(path), &overrides);
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        return load_from(default_path, &overrides);
    }

    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or("~/.gateway"));
    let log_level = overrides.log_level.unwrap_or_else(|| "info".to_string());
    let mut config = Config::minimal(work_dir, log_level);
    if let Some(emulate) = overrides.emulate {
        config.db.emulate = emulate;
    }
    Ok(config)
}

/// Internal loader: accepts an explicit path and overrides.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let mut visited = HashSet::new();
    let merged = load_raw_merged(path, &mut visited)?;

    let parsed: RawConfig = merged
        .try_into()
        .map_err(|e| AppError::Config(format!("invalid config in {}: {e}", path.display())))?;

    let s = parsed.supervisor;
    let db = parsed.db;

    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or(&s.work_dir));
    let log_level = overrides.log_level.clone().unwrap_or(s.log_level);

    let db_path = match db.path.as_deref() {
        Some(p) => {
            let expanded = expand_home(p);
            if expanded.is_absolute() { expanded } else { work_dir.join(expanded) }
        }
        None => work_dir.join(DEFAULT_DB_FILE),
    };

    let default_user = db
        .default_user
        .map(|u| descriptor(u, "db.default_user"))
        .transpose()?;
    let users = db
        .users
        .into_iter()
        .enumerate()
        .map(|(i, u)| descriptor(u, &format!("db.users[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Config {
        name: s.name,
        work_dir,
        log_level,
        db: DbConfig {
            emulate: overrides.emulate.unwrap_or(db.emulate),
            path: db_path,
            scope_concurrency: db.scope_concurrency,
            hydration: HydrationConfig {
                default_user,
                users,
                scopes: db.scopes,
            },
        },
    })
}

fn descriptor(raw: RawIdentity, at: &str) -> Result<IdentityDescriptor, AppError> {
    if raw.name.trim().is_empty() {
        return Err(AppError::Config(format!("{at}.name must not be empty")));
    }
    if raw.key_id.trim().is_empty() {
        return Err(AppError::Config(format!("{at}.key_id must not be empty")));
    }
    Ok(IdentityDescriptor {
        name: raw.name,
        key_id: raw.key_id,
        key_secret: raw.key_secret,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
