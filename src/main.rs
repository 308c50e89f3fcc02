//! forge-dash CLI - live dashboard over a project's `.forge/` directory.

use clap::Parser;
use forge_dashboard::cli::{Cli, Commands, command_or_default};
use forge_dashboard::client::{self, WatchOptions};
use forge_dashboard::commands::{self, Output};
use forge_dashboard::config::{ResolvedConfig, resolve_config};
use forge_dashboard::dashboard::{self, PlantUmlRenderer};
use forge_dashboard::logging::{LogOptions, init_logging};
use forge_dashboard::storage::SourceStore;
use forge_dashboard::{Error, Result};
use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;
    let command = command_or_default(cli.command);

    let log_options = LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
        file: cli.log_file,
    };
    // Keep the guard alive so the log file is flushed on exit.
    let _log_guard = match init_logging(&log_options) {
        Ok(guard) => guard,
        Err(e) => exit_with_error(&e, human),
    };

    let root = resolve_root(cli.root, human);
    tracing::debug!(root = %root.display(), "Resolved project root");

    if let Err(e) = run_command(command, &root, human) {
        exit_with_error(&e, human);
    }
}

fn exit_with_error(e: &Error, human: bool) -> ! {
    if human {
        eprintln!("Error: {}", e);
    } else {
        eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
    }
    process::exit(1);
}

/// Resolve the project root: --root flag > FORGE_ROOT env > current directory.
fn resolve_root(explicit_path: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit_path {
        Some(path) => {
            if !path.exists() {
                let e = Error::NotFound(format!(
                    "Specified project root does not exist: {}",
                    path.display()
                ));
                exit_with_error(&e, human);
            }
            path
        }
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn run_command(command: Commands, root: &Path, human: bool) -> Result<()> {
    let store = SourceStore::open(root);
    let overrides = command.config_overrides();
    // Only commands that use settings read the config files.
    let config = || resolve_config(&store, &overrides);

    match command {
        Commands::Serve { .. } => {
            let config = config()?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(dashboard::start_server(store, &config))?;
        }

        Commands::List => output(&commands::list_prds(&store), human),

        Commands::Show { id } => output(&commands::show_prd(&store, &id)?, human),

        Commands::Tasks { id } => output(&commands::prd_tasks(&store, &id)?, human),

        Commands::Progress { id } => output(&commands::prd_progress(&store, &id)?, human),

        Commands::Diagrams { id, name } => match name {
            Some(name) => output(&commands::show_diagram(&store, &id, &name)?, human),
            None => output(&commands::list_diagrams(&store, &id)?, human),
        },

        Commands::Render { file, .. } => {
            let config = config()?;
            let source = read_source(&file)?;
            let renderer = PlantUmlRenderer::new(config.plantuml_server(), config.verify_render());
            let runtime = tokio::runtime::Runtime::new()?;
            let rendered = runtime.block_on(renderer.render(&source))?;
            output(&rendered, human);
        }

        Commands::Summary => output(&commands::summary(&store), human),

        Commands::Config => output(&config()?, human),

        Commands::Watch { url, count, .. } => {
            let config = config()?;
            let options = WatchOptions {
                base_url: url.unwrap_or_else(|| default_dashboard_url(&config)),
                reconnect_delay: config.reconnect_delay(),
                refresh_interval: config.refresh_interval(),
                human,
                max_updates: count,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(client::run_watch(&options))?;
        }
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

fn read_source(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        return Ok(source);
    }
    std::fs::read_to_string(file).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(format!("{}", file.display())),
        _ => Error::Io(e),
    })
}

/// Where a local dashboard started with the same config would listen.
fn default_dashboard_url(config: &ResolvedConfig) -> String {
    let host = match config.host() {
        "0.0.0.0" | "::" => "127.0.0.1",
        host => host,
    };
    format!("http://{}:{}", host, config.port())
}
