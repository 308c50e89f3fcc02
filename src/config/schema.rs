//! KDL schema for `config.kdl` / `dashboard.kdl`.
//!
//! This module provides:
//! - The `DashboardConfig` struct mirroring the KDL schema
//! - Conversion to/from KDL documents
//! - Validation and merging

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::{Error, Result};

/// Dashboard settings. Every field is optional so files can be layered.
///
/// # KDL Schema
///
/// ```kdl
/// port 20555
/// host "127.0.0.1"
/// watch #true
/// debounce-ms 100
/// plantuml-server "https://www.plantuml.com/plantuml"
/// verify-render #false
/// reconnect-delay-ms 5000
/// refresh-interval-secs 30
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Port the HTTP server listens on
    pub port: Option<u16>,

    /// Address the HTTP server binds to
    pub host: Option<String>,

    /// Whether to run the file watcher
    pub watch: Option<bool>,

    /// Quiet period before a burst of file events is published
    pub debounce_ms: Option<u64>,

    /// Base URL of the PlantUML rendering server
    pub plantuml_server: Option<String>,

    /// Fetch rendered diagrams to confirm the server accepted them
    pub verify_render: Option<bool>,

    /// Live client: delay between reconnect attempts
    pub reconnect_delay_ms: Option<u64>,

    /// Live client: periodic refresh interval
    pub refresh_interval_secs: Option<u64>,
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn string_value(doc: &KdlDocument, name: &str) -> Option<String> {
    first_value(doc, name)
        .and_then(|v| v.as_string())
        .map(str::to_string)
}

fn u64_value(doc: &KdlDocument, name: &str) -> Option<u64> {
    first_value(doc, name)
        .and_then(|v| v.as_integer())
        .and_then(|i| u64::try_from(i).ok())
}

fn bool_value(doc: &KdlDocument, name: &str) -> Option<bool> {
    first_value(doc, name).and_then(|v| v.as_bool())
}

fn push_node(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}

impl DashboardConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from a KDL document. Unknown nodes and values of the
    /// wrong type are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            port: u64_value(doc, "port").and_then(|p| u16::try_from(p).ok()),
            host: string_value(doc, "host"),
            watch: bool_value(doc, "watch"),
            debounce_ms: u64_value(doc, "debounce-ms"),
            plantuml_server: string_value(doc, "plantuml-server"),
            verify_render: bool_value(doc, "verify-render"),
            reconnect_delay_ms: u64_value(doc, "reconnect-delay-ms"),
            refresh_interval_secs: u64_value(doc, "refresh-interval-secs"),
        }
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(port) = self.port {
            push_node(&mut doc, "port", KdlValue::Integer(port as i128));
        }
        if let Some(ref host) = self.host {
            push_node(&mut doc, "host", KdlValue::String(host.clone()));
        }
        if let Some(watch) = self.watch {
            push_node(&mut doc, "watch", KdlValue::Bool(watch));
        }
        if let Some(ms) = self.debounce_ms {
            push_node(&mut doc, "debounce-ms", KdlValue::Integer(ms as i128));
        }
        if let Some(ref server) = self.plantuml_server {
            push_node(&mut doc, "plantuml-server", KdlValue::String(server.clone()));
        }
        if let Some(verify) = self.verify_render {
            push_node(&mut doc, "verify-render", KdlValue::Bool(verify));
        }
        if let Some(ms) = self.reconnect_delay_ms {
            push_node(&mut doc, "reconnect-delay-ms", KdlValue::Integer(ms as i128));
        }
        if let Some(secs) = self.refresh_interval_secs {
            push_node(
                &mut doc,
                "refresh-interval-secs",
                KdlValue::Integer(secs as i128),
            );
        }

        doc
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.port == Some(0) {
            return Err("port must be between 1 and 65535".to_string());
        }
        if let Some(ref host) = self.host {
            if host.trim().is_empty() {
                return Err("host must not be empty".to_string());
            }
        }
        if self.debounce_ms == Some(0) {
            return Err("debounce-ms must be greater than 0".to_string());
        }
        if let Some(ref server) = self.plantuml_server {
            if !(server.starts_with("http://") || server.starts_with("https://")) {
                return Err(format!(
                    "plantuml-server must be an http(s) URL, got {:?}",
                    server
                ));
            }
        }
        if self.reconnect_delay_ms == Some(0) {
            return Err("reconnect-delay-ms must be greater than 0".to_string());
        }
        if self.refresh_interval_secs == Some(0) {
            return Err("refresh-interval-secs must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &DashboardConfig) {
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.host.is_some() {
            self.host = other.host.clone();
        }
        if other.watch.is_some() {
            self.watch = other.watch;
        }
        if other.debounce_ms.is_some() {
            self.debounce_ms = other.debounce_ms;
        }
        if other.plantuml_server.is_some() {
            self.plantuml_server = other.plantuml_server.clone();
        }
        if other.verify_render.is_some() {
            self.verify_render = other.verify_render;
        }
        if other.reconnect_delay_ms.is_some() {
            self.reconnect_delay_ms = other.reconnect_delay_ms;
        }
        if other.refresh_interval_secs.is_some() {
            self.refresh_interval_secs = other.refresh_interval_secs;
        }
    }

    /// Load and validate a config file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let doc: KdlDocument = content
            .parse()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}
