//! `{{input}}` / `{{settings.KEY}}` placeholder substitution.
//!
//! Substitution is a single left-to-right pass, so placeholder syntax inside
//! the substituted values is never expanded again. Placeholders naming an
//! unknown setting are left exactly as written.

use serde_json::{Map, Value};

use crate::settings::ResolvedSettings;

/// Values available to a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub input: &'a str,
    pub settings: &'a ResolvedSettings,
}

impl<'a> TemplateContext<'a> {
    pub fn new(input: &'a str, settings: &'a ResolvedSettings) -> Self {
        Self { input, settings }
    }

    /// Substitute placeholders in a single string.
    pub fn resolve(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let Some(close) = after.find("}}") else {
                out.push_str(&rest[open..]);
                return out;
            };

            match self.lookup(after[..close].trim()) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[open..open + 2 + close + 2]),
            }
            rest = &after[close + 2..];
        }

        out.push_str(rest);
        out
    }

    /// Substitute placeholders in every string nested inside `value`.
    ///
    /// Object keys and non-string scalars are left untouched.
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.resolve_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect::<Map<String, Value>>(),
            ),
            other => other.clone(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a str> {
        if name == "input" {
            return Some(self.input);
        }
        name.strip_prefix("settings.")
            .and_then(|key| self.settings.get(key.trim()))
    }
}

/// Resolve a string template against an input and settings.
pub fn resolve_template(template: &str, input: &str, settings: &ResolvedSettings) -> String {
    TemplateContext::new(input, settings).resolve(template)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
