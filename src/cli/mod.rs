//! CLI argument definitions for forge-dash.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DashboardConfig;

/// forge-dash - a live dashboard over a project's `.forge/` directory.
///
/// Run `forge-dash` with no command to start the dashboard server, or use the
/// query commands to inspect PRDs, tasks and progress from the terminal.
#[derive(Parser, Debug)]
#[command(name = "forge-dash")]
#[command(author, version, about = "Live dashboard for .forge PRDs, TDD tasks and checkpoints", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Project root containing `.forge/` (default: current directory).
    /// Can also be set via FORGE_ROOT environment variable.
    #[arg(short = 'C', long = "root", global = true, env = "FORGE_ROOT")]
    pub root: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to stderr as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also append JSON logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the dashboard server (default)
    Serve {
        /// Port to listen on (default: 20555)
        #[arg(short, long, env = "FORGE_DASH_PORT")]
        port: Option<u16>,

        /// Host address to bind to (use 0.0.0.0 for network access)
        #[arg(long, env = "FORGE_DASH_HOST")]
        host: Option<String>,

        /// Serve without watching for file changes
        #[arg(long)]
        no_watch: bool,

        /// Quiet period before a file change is published
        #[arg(long, value_name = "MS")]
        debounce_ms: Option<u64>,

        /// PlantUML server used for diagram rendering
        #[arg(long, env = "FORGE_DASH_PLANTUML_SERVER", value_name = "URL")]
        plantuml_server: Option<String>,

        /// Fetch each rendered diagram to confirm the PlantUML server accepts it
        #[arg(long)]
        verify_render: bool,
    },

    /// List all PRDs with status and progress
    List,

    /// Show one PRD with its document, tasks and progress
    Show {
        /// PRD id (file name without `.md`)
        id: String,
    },

    /// Show the tasks of a PRD with their derived status
    Tasks {
        /// PRD id
        id: String,
    },

    /// Show the checkpoint of a PRD
    Progress {
        /// PRD id
        id: String,
    },

    /// List a PRD's diagrams, or print one diagram's source
    Diagrams {
        /// PRD id
        id: String,

        /// Diagram name (file name without `.puml`)
        name: Option<String>,
    },

    /// Produce PlantUML image URLs for a source file (`-` for stdin)
    Render {
        /// Path to a `.puml` file
        file: PathBuf,

        /// PlantUML server used for rendering
        #[arg(long, env = "FORGE_DASH_PLANTUML_SERVER", value_name = "URL")]
        plantuml_server: Option<String>,

        /// Fetch the rendered SVG to confirm the server accepts the source
        #[arg(long)]
        verify: bool,
    },

    /// Show global PRD and test counters
    Summary,

    /// Show resolved configuration and where each value came from
    Config,

    /// Follow a running dashboard and print the summary on every change
    Watch {
        /// Dashboard base URL (default: built from the resolved host and port)
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Delay between reconnect attempts
        #[arg(long, value_name = "MS")]
        reconnect_delay_ms: Option<u64>,

        /// Periodic refresh interval
        #[arg(long, value_name = "SECS")]
        refresh_secs: Option<u64>,

        /// Exit after this many change notifications
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,
    },
}

impl Commands {
    /// Config values set on the command line for this command.
    pub fn config_overrides(&self) -> DashboardConfig {
        match self {
            Commands::Serve {
                port,
                host,
                no_watch,
                debounce_ms,
                plantuml_server,
                verify_render,
            } => DashboardConfig {
                port: *port,
                host: host.clone(),
                watch: no_watch.then_some(false),
                debounce_ms: *debounce_ms,
                plantuml_server: plantuml_server.clone(),
                verify_render: verify_render.then_some(true),
                ..Default::default()
            },
            Commands::Render {
                plantuml_server,
                verify,
                ..
            } => DashboardConfig {
                plantuml_server: plantuml_server.clone(),
                verify_render: verify.then_some(true),
                ..Default::default()
            },
            Commands::Watch {
                reconnect_delay_ms,
                refresh_secs,
                ..
            } => DashboardConfig {
                reconnect_delay_ms: *reconnect_delay_ms,
                refresh_interval_secs: *refresh_secs,
                ..Default::default()
            },
            _ => DashboardConfig::default(),
        }
    }
}

/// The command to run; a bare `forge-dash` serves with defaults.
pub fn command_or_default(command: Option<Commands>) -> Commands {
    command.unwrap_or(Commands::Serve {
        port: None,
        host: None,
        no_watch: false,
        debounce_ms: None,
        plantuml_server: None,
        verify_render: false,
    })
}
