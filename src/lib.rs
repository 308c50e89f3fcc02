//! forge-dashboard - live read model over a project's `.forge/` directory.
//!
//! This library aggregates PRD documents, task manifests and progress
//! checkpoints into per-PRD records and global summaries, serves them over
//! HTTP, and pushes file-change notifications to WebSocket subscribers.

pub mod aggregate;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod logging;
pub mod models;
pub mod storage;


/// Library-level error type for dashboard operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File watching unavailable: {0}")]
    WatchUnavailable(String),

    #[error("Diagram rendering failed: {0}")]
    RenderFailure(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for dashboard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build timestamp injected by `build.rs`.
pub const BUILD_TIMESTAMP: &str = match option_env!("FORGE_DASH_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => "unknown",
};

/// Short git commit injected by `build.rs`.
pub const GIT_COMMIT: &str = match option_env!("FORGE_DASH_GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};
