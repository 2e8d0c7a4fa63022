//! Settings resolution.
//!
//! A plugin's effective settings are the user's stored overrides layered
//! over the defaults declared in its manifest. Values are always strings by
//! the time an execution sees them.

use std::collections::{BTreeMap, HashMap};

use dashmap::DashMap;
use serde_json::Value;

use crate::types::Manifest;

/// Prefix for settings exposed to subprocesses as environment variables.
pub const SETTINGS_ENV_PREFIX: &str = "OPENTOLK_SETTINGS_";

/// Concrete setting values for a single execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSettings {
    values: BTreeMap<String, String>,
}

impl ResolvedSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(OPENTOLK_SETTINGS_<KEY>, value)` pairs for a subprocess environment.
    pub fn env_vars(&self) -> impl Iterator<Item = (String, &str)> {
        self.values
            .iter()
            .map(|(k, v)| (settings_env_name(k), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResolvedSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Environment variable name for a setting key: uppercased, with every
/// character outside `[A-Z0-9_]` replaced by `_`.
pub fn settings_env_name(key: &str) -> String {
    let suffix: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{SETTINGS_ENV_PREFIX}{suffix}")
}

/// Merge user overrides over the manifest's declared defaults.
///
/// Only declared keys are resolved; stray overrides are ignored.
pub fn resolve_settings(manifest: &Manifest, overrides: &HashMap<String, String>) -> ResolvedSettings {
    manifest
        .settings
        .iter()
        .map(|def| {
            let value = overrides
                .get(&def.key)
                .cloned()
                .unwrap_or_else(|| default_to_string(&def.default));
            (def.key.clone(), value)
        })
        .collect()
}

/// The first `required` setting that resolved to an empty value.
pub fn missing_required<'a>(manifest: &'a Manifest, settings: &ResolvedSettings) -> Option<&'a str> {
    manifest
        .settings
        .iter()
        .filter(|def| def.required)
        .find(|def| settings.get(&def.key).is_none_or(|v| v.trim().is_empty()))
        .map(|def| def.key.as_str())
}

fn default_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Settings store
// ---------------------------------------------------------------------------

/// Source of user-configured setting overrides.
///
/// Persistence (files, keychain) lives behind this trait.
pub trait SettingsStore: Send + Sync {
    /// All overrides stored for a plugin.
    fn overrides(&self, plugin_id: &str) -> HashMap<String, String>;
}

/// In-memory settings store.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: DashMap<String, HashMap<String, String>>,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, plugin_id: &str, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .entry(plugin_id.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, plugin_id: &str, key: &str) {
        if let Some(mut entry) = self.values.get_mut(plugin_id) {
            entry.remove(key);
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn overrides(&self, plugin_id: &str) -> HashMap<String, String> {
        self.values
            .get(plugin_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
