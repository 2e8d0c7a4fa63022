//! Configuration: `config.toml` plus environment overrides.
//!
//! ```toml
//! plugins_dir = "~/.config/opentolk/plugins"
//! disabled = ["com.example.noisy"]
//!
//! [llm]
//! base_url = "http://localhost:11434/v1"
//! model = "llama3.1"
//!
//! [settings."com.example.translate"]
//! lang = "de"
//!
//! [permissions]
//! allow_all = false
//! grants."com.example.search" = ["network"]
//!
//! [sinks]
//! clipboard = "wl-copy"
//! notify = "xargs -0 notify-send OpenTolk"
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use opentolk_agent::{LlmClient, LlmClientConfig};
use opentolk_plugins::{Capability, MemorySettingsStore, PermissionStore, default_plugins_dir};

/// Model used with the hosted OpenAI endpoint when none is configured.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub plugins_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    /// Plugin ids to leave disabled; everything else is enabled.
    pub disabled: Vec<String>,
    pub llm: Option<LlmSection>,
    /// Per-plugin setting overrides.
    pub settings: HashMap<String, HashMap<String, toml::Value>>,
    pub permissions: PermissionsSection,
    /// Output mode name to shell command; text arrives on stdin.
    pub sinks: HashMap<String, String>,
    pub desktop: DesktopSection,
    pub shortcut_command: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Environment variable holding the API key (default `OPENAI_API_KEY`).
    pub api_key_env: Option<String>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionsSection {
    pub allow_all: bool,
    pub grants: HashMap<String, Vec<Capability>>,
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            allow_all: true,
            grants: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DesktopSection {
    pub read_clipboard: Option<String>,
    pub paste: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub fn default_config_path() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".config/opentolk/config.toml"),
        Err(_) => PathBuf::from("config.toml"),
    }
}

fn default_data_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local/share/opentolk"),
        Err(_) => std::env::temp_dir().join("opentolk"),
    }
}

impl Config {
    /// Load `path` (or the default location), then apply environment
    /// overrides.  A missing default file is not an error; a missing
    /// explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        let mut config = if path.exists() || explicit {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            info!(path = %path.display(), "configuration loaded");
            Self::parse(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `OPENTOLK_*` overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("OPENTOLK_PLUGINS_DIR") {
            self.plugins_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = var("OPENTOLK_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(base_url) = var("OPENTOLK_LLM_BASE_URL") {
            self.llm.get_or_insert_with(LlmSection::default).base_url = Some(base_url);
        }
        if let Some(model) = var("OPENTOLK_MODEL") {
            self.llm.get_or_insert_with(LlmSection::default).model = Some(model);
        }
        let key_env = self
            .llm
            .as_ref()
            .and_then(|llm| llm.api_key_env.clone())
            .unwrap_or_else(|| "OPENAI_API_KEY".to_string());
        if self.llm.is_none() && var(&key_env).is_some() {
            self.llm = Some(LlmSection::default());
        }
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.plugins_dir.clone().unwrap_or_else(default_plugins_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn disabled(&self) -> HashSet<String> {
        self.disabled.iter().cloned().collect()
    }

    /// The configured language model client, if any.
    pub fn llm_client(&self) -> Result<Option<LlmClient>> {
        let Some(llm) = &self.llm else {
            return Ok(None);
        };
        let key_env = llm.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let api_key = std::env::var(key_env).unwrap_or_default();
        let model = llm.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut client_config = match &llm.base_url {
            Some(base_url) => LlmClientConfig::openai_compatible(api_key, model, base_url),
            None => LlmClientConfig::openai(api_key, model),
        };
        if let Some(max_tokens) = llm.max_tokens {
            client_config.max_tokens = max_tokens;
        }
        let client = LlmClient::new(client_config).context("failed to configure language model")?;
        Ok(Some(client))
    }

    pub fn settings_store(&self) -> MemorySettingsStore {
        let store = MemorySettingsStore::new();
        for (plugin_id, values) in &self.settings {
            for (key, value) in values {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                store.set(plugin_id, key.clone(), value);
            }
        }
        store
    }

    pub fn permission_store(&self) -> PermissionStore {
        let store = if self.permissions.allow_all {
            PermissionStore::allow_all()
        } else {
            PermissionStore::new()
        };
        for (plugin_id, capabilities) in &self.permissions.grants {
            for capability in capabilities {
                store.grant(plugin_id, *capability);
            }
        }
        store
    }
}
