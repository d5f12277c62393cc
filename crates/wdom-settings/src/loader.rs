//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WdomSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `WDOM_*` environment variable overrides (highest priority)
//! 4. [`WdomSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{AdapterKind, WdomSettings};

/// Resolve the settings file path.
///
/// `$WDOM_SETTINGS` when set, otherwise `~/.wdom/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string("WDOM_SETTINGS") {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".wdom").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WdomSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<WdomSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<WdomSettings> {
    let defaults = serde_json::to_value(WdomSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `WDOM_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut WdomSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Invalid values are ignored with a warning (file/default value kept).
pub fn apply_overrides_from(settings: &mut WdomSettings, lookup: impl Fn(&str) -> Option<String>) {
    let vars = EnvSource { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = vars.string("WDOM_ADDRESS") {
        settings.server.address = v;
    }
    if let Some(v) = vars.parsed("WDOM_PORT", |s| parse_u16_range(s, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = vars.parsed("WDOM_ADAPTER", |s| s.parse::<AdapterKind>().ok()) {
        settings.server.adapter = v;
    }
    if let Some(v) = vars.string("WDOM_WS_PATH") {
        settings.server.ws_path = v;
    }

    // ── Sync ────────────────────────────────────────────────────────
    if let Some(v) = vars.parsed("WDOM_MESSAGE_WAIT_MS", |s| parse_u64_range(s, 1, 60_000)) {
        settings.sync.message_wait_ms = v;
    }
    if let Some(v) = vars.parsed("WDOM_AUTO_SHUTDOWN", parse_bool) {
        settings.sync.auto_shutdown = v;
    }
    if let Some(v) = vars.parsed("WDOM_SHUTDOWN_WAIT_MS", |s| parse_u64_range(s, 0, 3_600_000)) {
        settings.sync.shutdown_wait_ms = v;
    }
    if let Some(v) = vars.parsed("WDOM_OUTBOUND_BUFFER", |s| {
        parse_usize_range(s, 1, 1_000_000)
    }) {
        settings.sync.outbound_buffer = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = vars.string("WDOM_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = vars.parsed("WDOM_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvSource<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
