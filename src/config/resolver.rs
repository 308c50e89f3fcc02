//! Precedence resolution for dashboard settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (including their `FORGE_DASH_*` environment variables)
//! 2. Project config (`<project>/.forge/dashboard.kdl`)
//! 3. System config (`~/.config/forge-dashboard/config.kdl`)
//! 4. Built-in defaults

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::Result;
use crate::commands::Output;
use crate::config::DashboardConfig;
use crate::storage::SourceStore;

/// Environment variable overriding the system config directory.
pub const CONFIG_DIR_ENV: &str = "FORGE_DASH_CONFIG_DIR";

/// File name of the project-level config inside `.forge/`.
pub const PROJECT_CONFIG_FILE: &str = "dashboard.kdl";

pub const DEFAULT_PORT: u16 = 20555;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_PLANTUML_SERVER: &str = "https://www.plantuml.com/plantuml";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// Value from CLI flag or its environment variable
    Cli,
    /// Value from the project's dashboard.kdl
    Project,
    /// Value from the system config.kdl
    System,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Cli => write!(f, "cli"),
            ValueSource::Project => write!(f, "project"),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub port: Resolved<u16>,
    pub host: Resolved<String>,
    pub watch: Resolved<bool>,
    pub debounce_ms: Resolved<u64>,
    pub plantuml_server: Resolved<String>,
    pub verify_render: Resolved<bool>,
    pub reconnect_delay_ms: Resolved<u64>,
    pub refresh_interval_secs: Resolved<u64>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        resolve_layers(
            &DashboardConfig::default(),
            &DashboardConfig::default(),
            &DashboardConfig::default(),
        )
    }
}

impl ResolvedConfig {
    pub fn port(&self) -> u16 {
        self.port.value
    }

    pub fn host(&self) -> &str {
        &self.host.value
    }

    pub fn watch(&self) -> bool {
        self.watch.value
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.value)
    }

    pub fn plantuml_server(&self) -> &str {
        &self.plantuml_server.value
    }

    pub fn verify_render(&self) -> bool {
        self.verify_render.value
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.value)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.value)
    }
}

impl Output for ResolvedConfig {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
    }

    fn to_human(&self) -> String {
        let rows = [
            ("port", self.port.value.to_string(), &self.port.source),
            ("host", self.host.value.clone(), &self.host.source),
            ("watch", self.watch.value.to_string(), &self.watch.source),
            (
                "debounce-ms",
                self.debounce_ms.value.to_string(),
                &self.debounce_ms.source,
            ),
            (
                "plantuml-server",
                self.plantuml_server.value.clone(),
                &self.plantuml_server.source,
            ),
            (
                "verify-render",
                self.verify_render.value.to_string(),
                &self.verify_render.source,
            ),
            (
                "reconnect-delay-ms",
                self.reconnect_delay_ms.value.to_string(),
                &self.reconnect_delay_ms.source,
            ),
            (
                "refresh-interval-secs",
                self.refresh_interval_secs.value.to_string(),
                &self.refresh_interval_secs.source,
            ),
        ];
        rows.iter()
            .map(|(key, value, source)| format!("{:<22} {:<36} ({})", key, value, source))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Pick the highest-precedence value that is set.
fn pick<T: Clone>(
    cli: &Option<T>,
    project: &Option<T>,
    system: &Option<T>,
    default: T,
) -> Resolved<T> {
    if let Some(v) = cli {
        Resolved::new(v.clone(), ValueSource::Cli)
    } else if let Some(v) = project {
        Resolved::new(v.clone(), ValueSource::Project)
    } else if let Some(v) = system {
        Resolved::new(v.clone(), ValueSource::System)
    } else {
        Resolved::new(default, ValueSource::Default)
    }
}

/// Resolve already-loaded layers. CLI overrides use the same shape as files.
pub fn resolve_layers(
    system: &DashboardConfig,
    project: &DashboardConfig,
    cli: &DashboardConfig,
) -> ResolvedConfig {
    ResolvedConfig {
        port: pick(&cli.port, &project.port, &system.port, DEFAULT_PORT),
        host: pick(
            &cli.host,
            &project.host,
            &system.host,
            DEFAULT_HOST.to_string(),
        ),
        watch: pick(&cli.watch, &project.watch, &system.watch, true),
        debounce_ms: pick(
            &cli.debounce_ms,
            &project.debounce_ms,
            &system.debounce_ms,
            DEFAULT_DEBOUNCE_MS,
        ),
        plantuml_server: pick(
            &cli.plantuml_server,
            &project.plantuml_server,
            &system.plantuml_server,
            DEFAULT_PLANTUML_SERVER.to_string(),
        ),
        verify_render: pick(
            &cli.verify_render,
            &project.verify_render,
            &system.verify_render,
            false,
        ),
        reconnect_delay_ms: pick(
            &cli.reconnect_delay_ms,
            &project.reconnect_delay_ms,
            &system.reconnect_delay_ms,
            DEFAULT_RECONNECT_DELAY_MS,
        ),
        refresh_interval_secs: pick(
            &cli.refresh_interval_secs,
            &project.refresh_interval_secs,
            &system.refresh_interval_secs,
            DEFAULT_REFRESH_INTERVAL_SECS,
        ),
    }
}

/// Path of the system-wide config file, if a config directory is known.
pub fn system_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join("config.kdl"));
        }
    }
    dirs::config_dir().map(|d| d.join("forge-dashboard").join("config.kdl"))
}

/// Path of the project config file for a store.
pub fn project_config_path(store: &SourceStore) -> PathBuf {
    store.root().join(PROJECT_CONFIG_FILE)
}

/// Resolve configuration with full precedence chain.
pub fn resolve_config(store: &SourceStore, overrides: &DashboardConfig) -> Result<ResolvedConfig> {
    overrides
        .validate()
        .map_err(|e| crate::Error::Config(format!("command line: {}", e)))?;

    let system = match system_config_path() {
        Some(path) => DashboardConfig::load(&path)?,
        None => DashboardConfig::default(),
    };
    let project = DashboardConfig::load(&project_config_path(store))?;

    Ok(resolve_layers(&system, &project, overrides))
}
