//! # wdom-settings
//!
//! Configuration management with layered sources for the wdom server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WdomSettings::default()`]
//! 2. **Settings file**: `$WDOM_SETTINGS` or `~/.wdom/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WDOM_*` overrides (highest priority)
//!
//! The loaded value is handed to the server at startup and passed down by
//! reference; nothing reads settings through a global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
