//! # vox-settings
//!
//! Configuration with layered sources:
//! 1. **Compiled defaults** — [`VoxSettings::default()`]
//! 2. **Settings file** — JSON, deep-merged over defaults
//!    (path from `VOX_SETTINGS`, default `./vox.settings.json`)
//! 3. **Environment variables** — `VOX_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::SettingsError;
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;
