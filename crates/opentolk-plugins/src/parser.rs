//! Manifest decoding and validation.
//!
//! Serde handles the shape of a manifest; [`validate`] enforces the rules a
//! schema cannot express, such as "exactly one of `command` / `inline`".

use std::collections::HashSet;

use regex::RegexBuilder;

use crate::error::{PluginError, Result};
use crate::types::{ExecutionConfig, Manifest, SettingType, ToolSpec, Trigger};

/// Decode a manifest from JSON text and validate it.
pub fn parse_manifest(json: &str) -> Result<Manifest> {
    let manifest: Manifest = serde_json::from_str(json)?;
    validate(&manifest)?;
    Ok(manifest)
}

/// Check the structural rules every manifest must satisfy.
pub fn validate(manifest: &Manifest) -> Result<()> {
    let id = manifest.id.as_str();

    if id.is_empty() {
        return Err(PluginError::invalid("<empty>", "`id` must not be empty"));
    }
    if !id.contains('.') || id.chars().any(char::is_whitespace) {
        return Err(PluginError::invalid(
            id,
            "`id` must be a reverse-domain identifier such as `com.example.plugin`",
        ));
    }
    if id.contains(['/', '\\']) || id.split('.').any(|segment| segment.is_empty()) {
        return Err(PluginError::invalid(
            id,
            "`id` segments must be non-empty and must not contain path separators",
        ));
    }
    if manifest.name.trim().is_empty() {
        return Err(PluginError::invalid(id, "`name` must not be empty"));
    }

    validate_trigger(id, &manifest.trigger)?;
    validate_execution(id, &manifest.execution)?;
    validate_settings(manifest)?;

    Ok(())
}

fn validate_trigger(id: &str, trigger: &Trigger) -> Result<()> {
    match trigger {
        Trigger::Keyword { keywords, .. } => {
            if keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(PluginError::invalid(
                    id,
                    "keyword trigger needs at least one keyword",
                ));
            }
        }
        Trigger::Regex { pattern, .. } => {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| PluginError::invalid(id, format!("invalid pattern: {e}")))?;
        }
        Trigger::Intent { intents, .. } => {
            if intents.is_empty() {
                return Err(PluginError::invalid(
                    id,
                    "intent trigger needs at least one intent",
                ));
            }
        }
        Trigger::CatchAll => {}
    }
    Ok(())
}

fn validate_execution(id: &str, execution: &ExecutionConfig) -> Result<()> {
    match execution {
        ExecutionConfig::Script(script) => {
            if script.command.is_some() == script.inline.is_some() {
                return Err(PluginError::invalid(
                    id,
                    "script execution needs exactly one of `command` or `inline`",
                ));
            }
        }
        ExecutionConfig::Http(http) => {
            if http.url.trim().is_empty() {
                return Err(PluginError::invalid(id, "http execution needs a `url`"));
            }
        }
        ExecutionConfig::Shortcut(shortcut) => {
            if shortcut.name.trim().is_empty() {
                return Err(PluginError::invalid(id, "shortcut execution needs a `name`"));
            }
        }
        ExecutionConfig::Ai(ai) => {
            if ai.system_prompt.is_some() == ai.system_prompt_file.is_some() {
                return Err(PluginError::invalid(
                    id,
                    "ai execution needs exactly one of `system_prompt` or `system_prompt_file`",
                ));
            }
            let mut names = HashSet::new();
            for tool in &ai.tools {
                if !names.insert(tool.name()) {
                    return Err(PluginError::invalid(
                        id,
                        format!("tool `{}` is declared twice", tool.name()),
                    ));
                }
                if let ToolSpec::Process { command, .. } = tool
                    && command.trim().is_empty()
                {
                    return Err(PluginError::invalid(
                        id,
                        format!("tool `{}` needs a `command`", tool.name()),
                    ));
                }
            }
        }
        ExecutionConfig::Pipeline(pipeline) => {
            if pipeline.steps.is_empty() {
                return Err(PluginError::invalid(id, "pipeline needs at least one step"));
            }
        }
    }
    Ok(())
}

fn validate_settings(manifest: &Manifest) -> Result<()> {
    let id = manifest.id.as_str();
    let mut keys = HashSet::new();

    for setting in &manifest.settings {
        if setting.key.trim().is_empty() {
            return Err(PluginError::invalid(id, "setting keys must not be empty"));
        }
        if !keys.insert(setting.key.as_str()) {
            return Err(PluginError::invalid(
                id,
                format!("setting `{}` is declared twice", setting.key),
            ));
        }
        if setting.kind == SettingType::Select {
            if setting.options.is_empty() {
                return Err(PluginError::invalid(
                    id,
                    format!("select setting `{}` needs options", setting.key),
                ));
            }
            if let Some(default) = setting.default.as_str()
                && !setting.options.iter().any(|o| o == default)
            {
                return Err(PluginError::invalid(
                    id,
                    format!(
                        "default `{default}` of setting `{}` is not one of its options",
                        setting.key
                    ),
                ));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
