//! # shardsync-settings
//!
//! Configuration for the shardsync coordinator, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`SyncSettings::default()`]
//! 2. **Settings file**: `~/.shardsync/settings.json` or an explicit path
//! 3. **Environment variables**: `SHARDSYNC_*` overrides (highest priority)
//!
//! Layering is done with `figment`; the merged result is validated by
//! [`SyncSettings::validate`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{figment_for, load_settings, load_settings_from_path, settings_path};
pub use types::*;
