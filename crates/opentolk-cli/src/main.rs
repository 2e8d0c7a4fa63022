//! CLI entry point for OpenTolk.
//!
//! This binary provides the `opentolk` command with subcommands for routing
//! text, running plugins and inspecting the plugins directory.

mod cli;
mod config;
mod sinks;

use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use opentolk_adapters::CommandDesktop;
use opentolk_agent::ChatModel;
use opentolk_engine::{Engine, Runner, RunnerConfig};
use opentolk_kernel::{IntentClassifier, Router};
use opentolk_plugins::{PluginRegistry, load_plugin, load_plugins_from_dir};

use crate::cli::{Cli, Commands};
use crate::config::Config;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" }, cli.log_json);

    let load_config = || Config::load(cli.config.as_deref());

    match cli.command {
        Commands::Route { text } => cmd_route(&load_config()?, &input_text(text)?).await,
        Commands::Run { plugin, text } => {
            cmd_run(&load_config()?, plugin.as_deref(), &input_text(text)?).await
        }
        Commands::Plugins => cmd_plugins(&load_config()?),
        Commands::Check { dir } => cmd_check(&dir),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: route
// ---------------------------------------------------------------------------

async fn cmd_route(config: &Config, text: &str) -> Result<()> {
    let engine = build_engine(config)?;
    match engine.router().route(text).await {
        Some(matched) => println!("{}", serde_json::to_string_pretty(&matched)?),
        None => eprintln!("no plugin matches"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(config: &Config, plugin: Option<&str>, text: &str) -> Result<()> {
    let engine = build_engine(config)?;

    let delivery = match plugin {
        Some(plugin_id) => Some(engine.handle_with(plugin_id, text).await?),
        None => engine.handle(text).await?,
    };
    match delivery {
        Some(delivery) => info!(
            mode = %delivery.mode,
            streamed = delivery.streamed,
            fallback = delivery.used_fallback,
            "delivered"
        ),
        None => eprintln!("no plugin matches"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: plugins
// ---------------------------------------------------------------------------

fn cmd_plugins(config: &Config) -> Result<()> {
    let registry = load_registry(config)?;
    let mut manifests = registry.installed();
    manifests.sort_by(|a, b| a.id.cmp(&b.id));

    if manifests.is_empty() {
        println!("No plugins installed in {}", config.plugins_dir().display());
        return Ok(());
    }
    for manifest in manifests {
        let state = if registry.is_enabled(&manifest.id) { "enabled" } else { "disabled" };
        println!(
            "{:<40} {:<9} {:<8} {:<9} {}",
            manifest.id,
            state,
            manifest.trigger.kind().as_str(),
            manifest.execution.kind(),
            manifest.name,
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: check
// ---------------------------------------------------------------------------

fn cmd_check(dir: &Path) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    entries.sort();

    let mut failures = 0usize;
    for path in &entries {
        match load_plugin(path) {
            Ok(manifest) => println!("OK     {} ({})", path.display(), manifest.id),
            Err(e) => {
                failures += 1;
                println!("ERROR  {}: {e}", path.display());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} plugins failed validation", entries.len());
    }
    println!("{} plugins valid", entries.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn load_registry(config: &Config) -> Result<PluginRegistry> {
    let dir = config.plugins_dir();
    let manifests = load_plugins_from_dir(&dir)
        .with_context(|| format!("failed to load plugins from {}", dir.display()))?;
    let registry = PluginRegistry::new();
    registry.replace_all(manifests, &config.disabled());
    Ok(registry)
}

fn build_engine(config: &Config) -> Result<Engine> {
    let registry = Arc::new(load_registry(config)?);

    let llm: Option<Arc<dyn ChatModel>> = match config.llm_client()? {
        Some(client) => Some(Arc::new(client)),
        None => {
            warn!("no language model configured; intent routing and AI plugins are unavailable");
            None
        }
    };
    let model = config
        .llm
        .as_ref()
        .and_then(|llm| llm.model.clone())
        .unwrap_or_default();

    let classifier = llm
        .as_ref()
        .map(|llm| IntentClassifier::new(Arc::clone(llm), model.clone()));
    let router = Router::from_registry(&registry, classifier).context("failed to build router")?;

    let mut runner_config = RunnerConfig {
        data_root: config.data_dir(),
        default_model: model,
        ..RunnerConfig::default()
    };
    if let Some(command) = &config.shortcut_command {
        runner_config.shortcut_command = command.clone();
    }

    let desktop = CommandDesktop::new(
        config.desktop.read_clipboard.clone(),
        config.desktop.paste.clone(),
    );
    let mut runner = Runner::new(Arc::clone(&registry), runner_config)
        .with_settings(Arc::new(config.settings_store()))
        .with_permissions(Arc::new(config.permission_store()))
        .with_desktop(Arc::new(desktop));
    if let Some(llm) = llm {
        runner = runner.with_llm(llm);
    }

    let dispatcher = sinks::build_dispatcher(&config.sinks);
    info!(plugins = registry.len(), "engine ready");
    Ok(Engine::new(router, runner, dispatcher))
}

/// Join the positional words, or read stdin when there are none.
fn input_text(words: Vec<String>) -> Result<String> {
    if !words.is_empty() {
        return Ok(words.join(" "));
    }
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("failed to read input from stdin")?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
