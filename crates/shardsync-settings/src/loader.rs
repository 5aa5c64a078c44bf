//! Layered settings loading.
//!
//! Loading flow (later layers win):
//! 1. Compiled [`SyncSettings::default()`]
//! 2. The JSON settings file, if it exists (`~/.shardsync/settings.json`
//!    unless a path is given)
//! 3. `SHARDSYNC_*` environment variables, with `__` separating nested keys
//!    (`SHARDSYNC_COORDINATOR__TOTAL_SHARDS=32`)
//!
//! The merged result is validated before it is returned.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::Result;
use crate::types::SyncSettings;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SHARDSYNC_";

/// Resolve the path to the settings file (`~/.shardsync/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".shardsync").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SyncSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file means defaults plus env. A file that exists but does not
/// parse is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SyncSettings> {
    let settings: SyncSettings = figment_for(path).extract()?;
    settings.validate()?;
    Ok(settings)
}

/// Build the layered figment without extracting it.
pub fn figment_for(path: &Path) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(SyncSettings::default()));
    if path.exists() {
        debug!(?path, "loading settings from file");
        figment = figment.merge(Json::file(path));
    } else {
        debug!(?path, "settings file not found, using defaults");
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
