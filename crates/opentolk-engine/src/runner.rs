//! The Runner: executes a routed [`Match`] through its manifest's backend.
//!
//! Before dispatch the Runner checks declared capabilities against the
//! permission store, resolves settings and rejects missing required ones.
//! Pipelines and the `run_plugin` tool re-enter [`Runner::execute`] with a
//! greater depth; more than [`MAX_DEPTH`] nested levels fail.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use opentolk_adapters::{
    Adapter, CommandDesktop, Desktop, DesktopAdapter, MailAdapter, Mailbox, NoMailbox,
    WebSearchAdapter,
};
use opentolk_agent::{ChatModel, ConversationHistory};
use opentolk_kernel::Match;
use opentolk_plugins::{
    ExecutionConfig, Manifest, MemorySettingsStore, PermissionStore, PluginError, PluginRegistry,
    ResolvedSettings, SettingsStore, TemplateContext, missing_required, resolve_settings,
};

use crate::error::{EngineError, Result};
use crate::output::Outcome;
use crate::{ai, http, pipeline, script, shortcut};

/// Maximum nesting of pipelines and `run_plugin` calls.
pub const MAX_DEPTH: usize = 8;

/// Default command used to run a named OS automation.
pub const DEFAULT_SHORTCUT_COMMAND: [&str; 7] = [
    "shortcuts",
    "run",
    "{name}",
    "--input-path",
    "-",
    "--output-path",
    "-",
];

pub const ENV_INPUT: &str = "OPENTOLK_INPUT";
pub const ENV_RAW_INPUT: &str = "OPENTOLK_RAW_INPUT";
pub const ENV_TRIGGER: &str = "OPENTOLK_TRIGGER";
pub const ENV_PLUGIN_DIR: &str = "OPENTOLK_PLUGIN_DIR";
pub const ENV_DATA_DIR: &str = "OPENTOLK_DATA_DIR";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runner-wide settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Per-plugin data directories live under `data_root/<plugin id>`.
    pub data_root: PathBuf,
    /// Model for AI plugins that do not name one; empty uses the client's
    /// default.
    pub default_model: String,
    /// Argument vector for shortcut plugins; `{name}` is substituted.
    pub shortcut_command: Vec<String>,
    /// Number of nested levels allowed; the top-level invocation is level 1.
    pub max_depth: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            data_root: std::env::temp_dir().join("opentolk"),
            default_model: String::new(),
            shortcut_command: DEFAULT_SHORTCUT_COMMAND.map(String::from).to_vec(),
            max_depth: MAX_DEPTH,
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Executes plugins.  Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Runner {
    pub(crate) registry: Arc<PluginRegistry>,
    pub(crate) settings: Arc<dyn SettingsStore>,
    pub(crate) permissions: Arc<PermissionStore>,
    pub(crate) llm: Option<Arc<dyn ChatModel>>,
    pub(crate) history: ConversationHistory,
    pub(crate) http: reqwest::Client,
    pub(crate) web_search: Arc<dyn Adapter>,
    pub(crate) desktop: Arc<dyn Adapter>,
    pub(crate) mail: Arc<dyn Adapter>,
    pub(crate) config: Arc<RunnerConfig>,
}

impl Runner {
    /// A runner with in-memory settings, every permission granted, no
    /// language model and no desktop or mail collaborators.
    pub fn new(registry: Arc<PluginRegistry>, config: RunnerConfig) -> Self {
        Self {
            registry,
            settings: Arc::new(MemorySettingsStore::new()),
            permissions: Arc::new(PermissionStore::allow_all()),
            llm: None,
            history: ConversationHistory::new(),
            http: reqwest::Client::new(),
            web_search: Arc::new(WebSearchAdapter::new()),
            desktop: Arc::new(DesktopAdapter::new(Arc::new(CommandDesktop::default()))),
            mail: Arc::new(MailAdapter::new(Arc::new(NoMailbox))),
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: Arc<PermissionStore>) -> Self {
        self.permissions = permissions;
        self
    }

    #[must_use]
    pub fn with_llm(mut self, llm: Arc<dyn ChatModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn with_web_search(mut self, web_search: Arc<dyn Adapter>) -> Self {
        self.web_search = web_search;
        self
    }

    #[must_use]
    pub fn with_desktop(mut self, desktop: Arc<dyn Desktop>) -> Self {
        self.desktop = Arc::new(DesktopAdapter::new(desktop));
        self
    }

    #[must_use]
    pub fn with_mailbox(mut self, mailbox: Arc<dyn Mailbox>) -> Self {
        self.mail = Arc::new(MailAdapter::new(mailbox));
        self
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Execute a routed match.
    pub async fn run(&self, matched: Match) -> Result<Outcome> {
        self.execute(matched, 0).await
    }

    /// Execute a plugin by id, bypassing routing.  Disabled plugins can be
    /// run this way.
    pub async fn run_plugin(&self, plugin_id: &str, text: &str) -> Result<Outcome> {
        let manifest = self
            .registry
            .resolve_step(plugin_id)
            .ok_or_else(|| PluginError::NotFound(plugin_id.to_string()))?;
        self.run(Match::direct(manifest, text)).await
    }

    /// Execute `matched` at nesting `depth`.
    pub(crate) fn execute(&self, matched: Match, depth: usize) -> BoxFuture<'_, Result<Outcome>> {
        let invocation_id = Uuid::now_v7();
        let span = info_span!(
            "invocation",
            id = %invocation_id,
            plugin_id = %matched.manifest.id,
            depth
        );
        Box::pin(
            async move {
                if depth >= self.config.max_depth {
                    return Err(EngineError::RecursionLimit {
                        depth: self.config.max_depth,
                    });
                }

                let manifest = Arc::clone(&matched.manifest);
                if let Some(capability) = self.permissions.first_denied(&manifest) {
                    return Err(EngineError::PermissionDenied {
                        plugin_id: manifest.id.clone(),
                        capability,
                    });
                }

                let settings = resolve_settings(&manifest, &self.settings.overrides(&manifest.id));
                if let Some(field) = missing_required(&manifest, &settings) {
                    return Err(EngineError::missing(&manifest.id, field));
                }

                let started = Instant::now();
                info!(backend = manifest.execution.kind(), "executing plugin");

                let invocation = Invocation {
                    runner: self,
                    matched: &matched,
                    settings: &settings,
                    depth,
                };
                let outcome = match &manifest.execution {
                    ExecutionConfig::Script(config) => script::run(&invocation, config).await,
                    ExecutionConfig::Http(config) => http::run(&invocation, config).await,
                    ExecutionConfig::Shortcut(config) => shortcut::run(&invocation, config).await,
                    ExecutionConfig::Ai(config) => ai::run(&invocation, config).await,
                    ExecutionConfig::Pipeline(config) => pipeline::run(&invocation, config).await,
                };

                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "plugin finished"
                );
                outcome
            }
            .instrument(span),
        )
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("plugins", &self.registry.len())
            .field("llm", &self.llm.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// Everything a backend needs for one execution.
pub(crate) struct Invocation<'a> {
    pub runner: &'a Runner,
    pub matched: &'a Match,
    pub settings: &'a ResolvedSettings,
    pub depth: usize,
}

impl Invocation<'_> {
    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.matched.manifest
    }

    pub fn plugin_id(&self) -> &str {
        &self.matched.manifest.id
    }

    /// Template context over the handler input and resolved settings.
    pub fn template(&self) -> TemplateContext<'_> {
        TemplateContext::new(&self.matched.input, self.settings)
    }

    /// `data_root/<plugin id>`, created on first use.
    pub async fn data_dir(&self) -> Result<PathBuf> {
        let id = self.plugin_id();
        let mut components = Path::new(id).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(PluginError::InvalidManifest {
                id: id.to_string(),
                reason: "`id` cannot be used as a data directory name".into(),
            }
            .into());
        }
        let dir = self.runner.config.data_root.join(id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Environment shared by every subprocess this invocation spawns.
    pub async fn subprocess_env(&self) -> Result<BTreeMap<String, String>> {
        let data_dir = self.data_dir().await?;
        let mut env = BTreeMap::from([
            (ENV_INPUT.to_string(), self.matched.input.clone()),
            (ENV_RAW_INPUT.to_string(), self.matched.raw_input.clone()),
            (ENV_TRIGGER.to_string(), self.matched.trigger_text.clone()),
            (
                ENV_PLUGIN_DIR.to_string(),
                self.manifest().dir.display().to_string(),
            ),
            (ENV_DATA_DIR.to_string(), data_dir.display().to_string()),
        ]);
        env.extend(self.settings.env_vars().map(|(k, v)| (k, v.to_string())));
        Ok(env)
    }
}
