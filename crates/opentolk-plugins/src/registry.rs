//! Installed and enabled plugins.
//!
//! The registry keeps manifests in registration order; routing and
//! catch-all selection depend on that order. Only one catch-all plugin may
//! be enabled at a time.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{PluginError, Result};
use crate::types::Manifest;

#[derive(Debug, Default)]
struct RegistryState {
    installed: Vec<Arc<Manifest>>,
    enabled: HashSet<String>,
}

impl RegistryState {
    fn find(&self, id: &str) -> Option<&Arc<Manifest>> {
        self.installed.iter().find(|m| m.id == id)
    }

    fn enabled_catch_all(&self) -> Option<&Arc<Manifest>> {
        self.installed
            .iter()
            .find(|m| m.is_catch_all() && self.enabled.contains(&m.id))
    }

    fn enable(&mut self, id: &str) -> Result<()> {
        let manifest = self
            .find(id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;

        if manifest.is_catch_all()
            && let Some(existing) = self.enabled_catch_all()
            && existing.id != id
        {
            return Err(PluginError::CatchAllConflict {
                enabled: existing.id.clone(),
                requested: id.to_string(),
            });
        }

        self.enabled.insert(id.to_string());
        Ok(())
    }
}

/// Thread-safe plugin registry.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a manifest without enabling it.
    pub fn install(&self, manifest: Manifest) -> Result<Arc<Manifest>> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.find(&manifest.id).is_some() {
            return Err(PluginError::AlreadyInstalled(manifest.id));
        }
        let manifest = Arc::new(manifest);
        tracing::debug!(plugin_id = %manifest.id, "plugin installed");
        state.installed.push(Arc::clone(&manifest));
        Ok(manifest)
    }

    /// Install and enable in one step.
    pub fn register(&self, manifest: Manifest) -> Result<Arc<Manifest>> {
        let manifest = self.install(manifest)?;
        if let Err(e) = self.enable(&manifest.id) {
            self.uninstall(&manifest.id);
            return Err(e);
        }
        Ok(manifest)
    }

    pub fn enable(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.enable(id)?;
        tracing::debug!(plugin_id = %id, "plugin enabled");
        Ok(())
    }

    /// Returns `false` if the plugin was not enabled.
    pub fn disable(&self, id: &str) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.enabled.remove(id)
    }

    pub fn uninstall(&self, id: &str) -> Option<Arc<Manifest>> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.enabled.remove(id);
        let pos = state.installed.iter().position(|m| m.id == id)?;
        Some(state.installed.remove(pos))
    }

    /// Swap in a freshly loaded set of manifests (a reload cycle).
    ///
    /// Every manifest not listed in `disabled` is enabled. Duplicate ids and
    /// a second catch-all are skipped with a warning rather than failing the
    /// whole reload.
    pub fn replace_all(&self, manifests: Vec<Manifest>, disabled: &HashSet<String>) {
        let mut next = RegistryState::default();

        for manifest in manifests {
            if next.find(&manifest.id).is_some() {
                tracing::warn!(plugin_id = %manifest.id, "duplicate plugin id, skipping");
                continue;
            }
            let id = manifest.id.clone();
            next.installed.push(Arc::new(manifest));

            if disabled.contains(&id) {
                continue;
            }
            if let Err(e) = next.enable(&id) {
                tracing::warn!(plugin_id = %id, error = %e, "plugin left disabled");
            }
        }

        tracing::info!(
            installed = next.installed.len(),
            enabled = next.enabled.len(),
            "plugin registry reloaded"
        );
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn get(&self, id: &str) -> Option<Arc<Manifest>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.find(id).cloned()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.enabled.contains(id)
    }

    /// Enabled manifests in registration order.
    pub fn enabled(&self) -> Vec<Arc<Manifest>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .installed
            .iter()
            .filter(|m| state.enabled.contains(&m.id))
            .cloned()
            .collect()
    }

    /// All installed manifests in registration order.
    pub fn installed(&self) -> Vec<Arc<Manifest>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.installed.clone()
    }

    /// Look up a pipeline step target: enabled plugins first, then any
    /// installed plugin regardless of its enabled state.
    pub fn resolve_step(&self, id: &str) -> Option<Arc<Manifest>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .installed
            .iter()
            .find(|m| m.id == id && state.enabled.contains(&m.id))
            .or_else(|| state.find(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .installed
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
