//! Configuration for the dashboard.
//!
//! Settings live in KDL files:
//!
//! - System: `~/.config/forge-dashboard/config.kdl`
//!   (or `$FORGE_DASH_CONFIG_DIR/config.kdl`)
//! - Project: `<project>/.forge/dashboard.kdl`
//!
//! For every setting: CLI flag > project config > system config > defaults.
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_DIR_ENV, DEFAULT_HOST, DEFAULT_PORT, PROJECT_CONFIG_FILE, Resolved, ResolvedConfig,
    ValueSource, project_config_path, resolve_config, resolve_layers, system_config_path,
};
pub use schema::DashboardConfig;
