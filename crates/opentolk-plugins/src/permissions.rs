//! Capability grants.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::types::{Capability, Manifest};

/// Records which capabilities each plugin has been granted.
#[derive(Debug, Default)]
pub struct PermissionStore {
    allow_all: bool,
    grants: DashMap<String, HashSet<Capability>>,
}

impl PermissionStore {
    /// A store that grants nothing until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that grants every capability to every plugin.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            grants: DashMap::new(),
        }
    }

    pub fn grant(&self, plugin_id: &str, capability: Capability) {
        self.grants
            .entry(plugin_id.to_string())
            .or_default()
            .insert(capability);
    }

    pub fn revoke(&self, plugin_id: &str, capability: Capability) {
        if let Some(mut caps) = self.grants.get_mut(plugin_id) {
            caps.remove(&capability);
        }
    }

    pub fn is_granted(&self, plugin_id: &str, capability: Capability) -> bool {
        self.allow_all
            || self
                .grants
                .get(plugin_id)
                .is_some_and(|caps| caps.contains(&capability))
    }

    /// The first capability the manifest declares but has not been granted.
    pub fn first_denied(&self, manifest: &Manifest) -> Option<Capability> {
        manifest
            .permissions
            .iter()
            .copied()
            .find(|cap| !self.is_granted(&manifest.id, *cap))
    }
}
