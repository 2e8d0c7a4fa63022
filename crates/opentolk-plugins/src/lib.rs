//! Plugin model for OpenTolk.
//!
//! This crate provides:
//!
//! - **Manifest model** ([`types`]): triggers, execution backends, output
//!   policy, settings and permissions as closed sum types decoded from JSON.
//!
//! - **Parser** ([`parser`]): decoding plus the structural rules serde
//!   cannot express.
//!
//! - **Loader** ([`loader`]): discovers `manifest.json` files on disk.
//!
//! - **Template resolver** ([`template`]): `{{input}}` and
//!   `{{settings.KEY}}` substitution through strings and nested JSON.
//!
//! - **Settings** ([`settings`]): user overrides merged over manifest
//!   defaults.
//!
//! - **Permissions** ([`permissions`]) and the **registry** ([`registry`])
//!   of installed and enabled plugins.

pub mod error;
pub mod loader;
pub mod parser;
pub mod permissions;
pub mod registry;
pub mod settings;
pub mod template;
pub mod types;

pub use error::{PluginError, Result};
pub use loader::{MANIFEST_FILE, default_plugins_dir, load_plugin, load_plugins_from_dir};
pub use parser::{parse_manifest, validate};
pub use permissions::PermissionStore;
pub use registry::PluginRegistry;
pub use settings::{
    MemorySettingsStore, ResolvedSettings, SETTINGS_ENV_PREFIX, SettingsStore, missing_required,
    resolve_settings, settings_env_name,
};
pub use template::{TemplateContext, resolve_template};
pub use types::{
    AiConfig, BuiltinTool, Capability, DEFAULT_TIMEOUT_SECS, ExecutionConfig, HttpConfig,
    KeywordPosition, Manifest, OutputMode, OutputPolicy, PipelineConfig, PipelineStep,
    ScriptConfig, SettingDef, SettingType, ShortcutConfig, TextFormat, ToolSpec, Trigger,
    TriggerKind,
};
