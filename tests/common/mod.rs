//! Common test utilities for forge-dash integration tests.
//!
//! Provides `TestEnv`, a throwaway project with a `.forge/` directory and an
//! isolated system config directory.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test project with isolated configuration.
///
/// Each `TestEnv` creates two temporary directories:
/// - `project_dir`: the project root that holds `.forge/`
/// - `config_dir`: the system config directory (via `FORGE_DASH_CONFIG_DIR`)
///
/// The `forge_dash()` method returns a `Command` that sets the environment
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub project_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    /// Create an empty project with no `.forge/` directory.
    pub fn new() -> Self {
        Self {
            project_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// A project with two PRDs, one of them mid-build.
    ///
    /// - `auth`: 3 tasks, T1 done, T2 in the green phase, 8/10 tests passing,
    ///   one diagram named `flow`
    /// - `billing`: completed, no tasks or checkpoint
    pub fn sample() -> Self {
        let env = Self::new();
        env.prd(
            "auth",
            "---\ntitle: User authentication\nstatus: approved\npriority: high\ncreated: 2024-03-01\n---\n# Auth\n\nLogin and sessions.\n",
        );
        env.prd(
            "billing",
            "---\ntitle: Billing\nstatus: completed\npriority: low\n---\n# Billing\n",
        );
        env.tasks(
            "auth",
            r#"{"total_tasks": 3, "tasks": [
                {"id": "T1", "title": "User schema"},
                {"id": "T2", "title": "Login endpoint"},
                {"id": "T3", "title": "Session expiry"}
            ]}"#,
        );
        env.checkpoint(
            "auth",
            r#"{
                "status": "building",
                "current_task": "T2",
                "current_phase": "green",
                "completed_tasks": ["T1"],
                "pending_tasks": ["T3"],
                "test_summary": {"total": 10, "passed": 8, "failed": 2, "coverage": 64.0}
            }"#,
        );
        env.diagram("auth", "flow", "@startuml\nUser -> API: login\n@enduml\n");
        env
    }

    /// Get a Command for the forge-dash binary run from the project root.
    pub fn forge_dash(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_forge-dash"));
        cmd.current_dir(self.project_dir.path());
        cmd.env("FORGE_DASH_CONFIG_DIR", self.config_dir.path());
        for var in [
            "FORGE_ROOT",
            "FORGE_DASH_PORT",
            "FORGE_DASH_HOST",
            "FORGE_DASH_PLANTUML_SERVER",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    pub fn path(&self) -> &Path {
        self.project_dir.path()
    }

    pub fn forge_dir(&self) -> PathBuf {
        self.project_dir.path().join(".forge")
    }

    /// Write a file relative to `.forge/`, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.forge_dir().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn prd(&self, id: &str, content: &str) -> PathBuf {
        self.write(&format!("prds/{}.md", id), content)
    }

    pub fn tasks(&self, id: &str, json: &str) -> PathBuf {
        self.write(&format!("tasks/{}/tasks.json", id), json)
    }

    pub fn checkpoint(&self, id: &str, json: &str) -> PathBuf {
        self.write(&format!("progress/{}/checkpoint.json", id), json)
    }

    pub fn diagram(&self, id: &str, name: &str, source: &str) -> PathBuf {
        self.write(&format!("design/{}/diagrams/{}.puml", id, name), source)
    }

    /// Write the system-level `config.kdl`.
    pub fn system_config(&self, kdl: &str) {
        fs::write(self.config_dir.path().join("config.kdl"), kdl).unwrap();
    }

    /// Write the project-level `.forge/dashboard.kdl`.
    pub fn project_config(&self, kdl: &str) {
        self.write("dashboard.kdl", kdl);
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse stdout of a successful command as JSON.
pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}
