//! Plugin loader: discovers manifests on the filesystem.
//!
//! Each plugin lives in its own directory containing a `manifest.json` and
//! whatever scripts or prompt files the manifest refers to.

use std::path::{Path, PathBuf};

use crate::error::{PluginError, Result};
use crate::parser::parse_manifest;
use crate::types::Manifest;

/// File name every plugin directory must contain.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Load every plugin below `dir`.
///
/// Subdirectories without a manifest are skipped silently; manifests that
/// fail to parse are skipped with a warning. Plugins are returned sorted by
/// directory name so registration order is stable across reloads.
pub fn load_plugins_from_dir(dir: &Path) -> Result<Vec<Manifest>> {
    if !dir.exists() {
        tracing::debug!(path = %dir.display(), "plugins directory does not exist");
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
            dirs.push(path);
        } else {
            tracing::trace!(path = %path.display(), "no manifest, skipping");
        }
    }
    dirs.sort();

    let mut plugins = Vec::with_capacity(dirs.len());
    for path in dirs {
        match load_plugin(&path) {
            Ok(manifest) => {
                tracing::info!(plugin_id = %manifest.id, kind = manifest.execution.kind(), "loaded plugin");
                plugins.push(manifest);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load plugin");
            }
        }
    }

    tracing::info!(count = plugins.len(), dir = %dir.display(), "plugins loaded");
    Ok(plugins)
}

/// Load a single plugin directory.
pub fn load_plugin(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path)?;

    let mut manifest = parse_manifest(&content).map_err(|e| match e {
        PluginError::Json(err) => PluginError::Malformed {
            path: path.clone(),
            reason: err.to_string(),
        },
        other => other,
    })?;
    manifest.dir = dir.to_path_buf();
    Ok(manifest)
}

/// Default plugins directory.
///
/// Priority:
/// 1. `$OPENTOLK_PLUGINS_DIR`
/// 2. `$HOME/.config/opentolk/plugins`
/// 3. `./plugins`
pub fn default_plugins_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("OPENTOLK_PLUGINS_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".config/opentolk/plugins"),
        Err(_) => PathBuf::from("plugins"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
