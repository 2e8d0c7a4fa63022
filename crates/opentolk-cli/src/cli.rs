//! CLI argument definitions for OpenTolk.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// OpenTolk -- route text to plugins and deliver their results.
#[derive(Parser)]
#[command(
    name = "opentolk",
    version,
    about = "OpenTolk -- route text to plugins and deliver their results",
    long_about = "Matches input text against installed plugin manifests (keywords, \
                  patterns, intents, catch-all), runs the chosen plugin and delivers \
                  its output."
)]
pub struct Cli {
    /// Configuration file (default: ~/.config/opentolk/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show which plugin would handle the text, without running it.
    Route {
        /// Input text; read from stdin when omitted.
        text: Vec<String>,
    },

    /// Route the text, run the plugin and deliver its output.
    Run {
        /// Skip routing and hand the whole text to this plugin.
        #[arg(long, short)]
        plugin: Option<String>,

        /// Input text; read from stdin when omitted.
        text: Vec<String>,
    },

    /// List installed plugins.
    Plugins,

    /// Validate every manifest below a directory.
    Check {
        /// Plugins directory to validate.
        dir: PathBuf,
    },
}
