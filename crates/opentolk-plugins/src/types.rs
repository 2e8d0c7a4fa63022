//! Manifest type definitions.
//!
//! A manifest is a JSON document describing one plugin: the input that
//! activates it ([`Trigger`]), how it runs ([`ExecutionConfig`]), where its
//! result goes ([`OutputPolicy`]) and which values the user may configure
//! ([`SettingDef`]).
//!
//! ```json
//! {
//!   "id": "com.example.translate",
//!   "name": "Translate",
//!   "trigger": { "type": "keyword", "keywords": ["translate"] },
//!   "execution": { "type": "ai", "system_prompt": "Translate to {{settings.lang}}." },
//!   "output": { "mode": "paste", "fallback": "clipboard" },
//!   "settings": [{ "key": "lang", "type": "select", "default": "en", "options": ["en", "de"] }]
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timeout applied to subprocess and HTTP backends when a manifest sets none.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_true() -> bool {
    true
}

fn timeout_or_default(secs: Option<u64>) -> Duration {
    Duration::from_secs(secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// A fully decoded plugin manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Globally unique reverse-domain identifier (e.g. `com.example.translate`).
    pub id: String,

    /// Human-readable display name.
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    pub trigger: Trigger,

    pub execution: ExecutionConfig,

    #[serde(default)]
    pub output: Option<OutputPolicy>,

    /// User-configurable settings, in display order.
    #[serde(default)]
    pub settings: Vec<SettingDef>,

    /// Capabilities the plugin needs granted before it may run.
    #[serde(default)]
    pub permissions: Vec<Capability>,

    /// Directory the manifest was loaded from. Relative script paths and
    /// prompt files resolve against it.
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Manifest {
    /// The declared output policy, or the default (`paste`, plain text).
    pub fn output_policy(&self) -> OutputPolicy {
        self.output.clone().unwrap_or_default()
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self.trigger, Trigger::CatchAll)
    }

    /// Whether the manifest declares the given capability.
    pub fn declares(&self, capability: Capability) -> bool {
        self.permissions.contains(&capability)
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Condition under which a plugin activates for a given input text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// One or more literal keywords, matched case-insensitively.
    Keyword {
        keywords: Vec<String>,
        #[serde(default)]
        position: KeywordPosition,
        /// Remove the keyword from the text handed to the plugin.
        #[serde(default = "default_true")]
        strip: bool,
    },

    /// A regular expression, compiled case-insensitively.
    Regex {
        pattern: String,
        /// Remove the matched span from the text handed to the plugin.
        #[serde(default)]
        strip: bool,
    },

    /// Resolved by the language-model classifier.
    Intent {
        intents: Vec<String>,
        #[serde(default)]
        examples: Vec<String>,
    },

    /// Matches any input when nothing else does.
    CatchAll,
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Keyword { .. } => TriggerKind::Keyword,
            Self::Regex { .. } => TriggerKind::Regex,
            Self::Intent { .. } => TriggerKind::Intent,
            Self::CatchAll => TriggerKind::CatchAll,
        }
    }
}

/// Where a keyword must appear in the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordPosition {
    #[default]
    Start,
    End,
    Anywhere,
}

/// The variant of trigger that fired, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Keyword,
    Regex,
    Intent,
    CatchAll,
}

impl TriggerKind {
    /// Routing priority; higher wins.
    pub fn priority(self) -> u8 {
        match self {
            Self::Keyword => 10,
            Self::Regex => 5,
            Self::Intent => 3,
            Self::CatchAll => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Regex => "regex",
            Self::Intent => "intent",
            Self::CatchAll => "catch_all",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// How a plugin executes once matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionConfig {
    Script(ScriptConfig),
    Http(HttpConfig),
    Shortcut(ShortcutConfig),
    Ai(AiConfig),
    Pipeline(PipelineConfig),
}

impl ExecutionConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Script(_) => "script",
            Self::Http(_) => "http",
            Self::Shortcut(_) => "shortcut",
            Self::Ai(_) => "ai",
            Self::Pipeline(_) => "pipeline",
        }
    }
}

/// A local subprocess. Exactly one of `command` and `inline` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Script path, relative to the manifest directory.
    #[serde(default)]
    pub command: Option<String>,

    /// Script body written to a temporary executable before each run.
    #[serde(default)]
    pub inline: Option<String>,

    /// Explicit interpreter; inferred from the file extension when unset.
    #[serde(default)]
    pub interpreter: Option<String>,

    /// Timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ScriptConfig {
    pub fn timeout(&self) -> Duration {
        timeout_or_default(self.timeout)
    }
}

/// An HTTP request. URL, headers and body are templated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub url: String,

    /// HTTP method, `POST` when unset.
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body. Strings are sent verbatim, anything else as JSON.
    #[serde(default)]
    pub body: Option<Value>,

    /// Path into the JSON response, e.g. `data.items[0].text`.
    #[serde(default)]
    pub response_path: Option<String>,

    #[serde(default)]
    pub timeout: Option<u64>,
}

impl HttpConfig {
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("POST")
    }

    pub fn timeout(&self) -> Duration {
        timeout_or_default(self.timeout)
    }
}

/// A named OS automation, run with the input on stdin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShortcutConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ShortcutConfig {
    pub fn timeout(&self) -> Duration {
        timeout_or_default(self.timeout)
    }
}

/// A language-model chat, optionally streaming or running a tool loop.
///
/// Exactly one of `system_prompt` and `system_prompt_file` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Prompt file, relative to the manifest directory.
    #[serde(default)]
    pub system_prompt_file: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub streaming: bool,

    /// Keep per-plugin conversation history. Implies streaming.
    #[serde(default)]
    pub conversational: bool,

    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

impl AiConfig {
    pub fn is_streaming(&self) -> bool {
        self.streaming || self.conversational
    }
}

/// A tool an AI plugin may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSpec {
    /// One of the tools shipped with the engine.
    Builtin { name: BuiltinTool },

    /// An external executable receiving its arguments as JSON on stdin.
    Process {
        name: String,
        #[serde(default)]
        description: String,
        /// JSON schema of the arguments object.
        #[serde(default)]
        parameters: Option<Value>,
        command: String,
        #[serde(default)]
        interpreter: Option<String>,
        #[serde(default)]
        timeout: Option<u64>,
    },
}

impl ToolSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin { name } => name.as_str(),
            Self::Process { name, .. } => name,
        }
    }
}

/// Tools implemented by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinTool {
    WebSearch,
    ReadClipboard,
    Paste,
    RunPlugin,
    MailList,
    MailRead,
    MailSearch,
    MailSend,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 8] = [
        Self::WebSearch,
        Self::ReadClipboard,
        Self::Paste,
        Self::RunPlugin,
        Self::MailList,
        Self::MailRead,
        Self::MailSearch,
        Self::MailSend,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::ReadClipboard => "read_clipboard",
            Self::Paste => "paste",
            Self::RunPlugin => "run_plugin",
            Self::MailList => "mail_list",
            Self::MailRead => "mail_read",
            Self::MailSearch => "mail_search",
            Self::MailSend => "mail_send",
        }
    }

    /// Capability the calling plugin must declare to use this tool.
    pub fn required_capability(self) -> Option<Capability> {
        match self {
            Self::WebSearch => Some(Capability::Network),
            Self::ReadClipboard => Some(Capability::Clipboard),
            Self::Paste => Some(Capability::Accessibility),
            Self::RunPlugin => None,
            Self::MailList | Self::MailRead | Self::MailSearch | Self::MailSend => {
                Some(Capability::Mail)
            }
        }
    }
}

/// Composition of other plugins, run in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub steps: Vec<PipelineStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Id of the plugin to run for this step.
    pub plugin: String,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Where a result is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Paste into the active application.
    #[default]
    Paste,
    Clipboard,
    Notify,
    Speak,
    Panel,
    /// Record in history only.
    Store,
    Silent,
    /// Open or continue a conversation panel.
    Reply,
}

impl OutputMode {
    pub const ALL: [OutputMode; 8] = [
        Self::Paste,
        Self::Clipboard,
        Self::Notify,
        Self::Speak,
        Self::Panel,
        Self::Store,
        Self::Silent,
        Self::Reply,
    ];

    /// Parse a mode name, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paste => "paste",
            Self::Clipboard => "clipboard",
            Self::Notify => "notify",
            Self::Speak => "speak",
            Self::Panel => "panel",
            Self::Store => "store",
            Self::Silent => "silent",
            Self::Reply => "reply",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFormat {
    #[default]
    Plain,
    Markdown,
}

/// Delivery policy for a plugin's results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPolicy {
    #[serde(default)]
    pub mode: OutputMode,

    /// Used when delivery through `mode` fails.
    #[serde(default)]
    pub fallback: Option<OutputMode>,

    /// Extra modes that receive the same text after the primary delivery.
    #[serde(default)]
    pub side_effects: Vec<OutputMode>,

    #[serde(default)]
    pub format: TextFormat,
}

// ---------------------------------------------------------------------------
// Settings and permissions
// ---------------------------------------------------------------------------

/// A user-configurable value exposed by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingDef {
    pub key: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: SettingType,

    #[serde(default)]
    pub default: Value,

    /// Allowed values for `select` settings.
    #[serde(default)]
    pub options: Vec<String>,

    /// Execution fails with a configuration error when this resolves empty.
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    #[default]
    String,
    Secret,
    Select,
    #[serde(alias = "boolean")]
    Bool,
    Multiline,
    Number,
}

/// A capability a plugin may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Network,
    Clipboard,
    /// Synthesizing keystrokes into other applications.
    Accessibility,
    Notifications,
    Speech,
    Mail,
    Shortcuts,
    Filesystem,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Clipboard => "clipboard",
            Self::Accessibility => "accessibility",
            Self::Notifications => "notifications",
            Self::Speech => "speech",
            Self::Mail => "mail",
            Self::Shortcuts => "shortcuts",
            Self::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
