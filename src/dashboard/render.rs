//! PlantUML rendering through an external PlantUML server.
//!
//! Sources are base64-encoded (URL-safe alphabet) and addressed with the
//! server's `~1` prefix, which marks the payload as plain base64 rather
//! than deflate-compressed text.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use std::time::Duration;

use crate::models::RenderedDiagram;
use crate::{Error, Result};

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds image URLs for PlantUML sources, optionally checking that the
/// server actually renders them.
#[derive(Debug, Clone)]
pub struct PlantUmlRenderer {
    server: String,
    verify: bool,
    client: reqwest::Client,
}

impl PlantUmlRenderer {
    pub fn new(server: &str, verify: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            server: server.trim_end_matches('/').to_string(),
            verify,
            client,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// SVG and PNG URLs for a source. Pure; never touches the network.
    pub fn urls(&self, source: &str) -> RenderedDiagram {
        let encoded = URL_SAFE.encode(source.as_bytes());
        RenderedDiagram {
            svg: format!("{}/svg/~1{}", self.server, encoded),
            png: format!("{}/png/~1{}", self.server, encoded),
        }
    }

    /// Render a source. Empty sources are rejected with `InvalidInput`;
    /// when verification is on, an unreachable or failing server yields
    /// `RenderFailure`.
    pub async fn render(&self, source: &str) -> Result<RenderedDiagram> {
        if source.trim().is_empty() {
            return Err(Error::InvalidInput(
                "No PlantUML source provided".to_string(),
            ));
        }

        let rendered = self.urls(source);
        if self.verify {
            self.check(&rendered.svg).await?;
        }
        Ok(rendered)
    }

    async fn check(&self, url: &str) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::RenderFailure(format!("{}: {}", self.server, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RenderFailure(format!(
                "{} returned {}",
                self.server, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::RenderFailure(e.to_string()))?;
        if body.is_empty() {
            return Err(Error::RenderFailure(format!(
                "{} returned an empty image",
                self.server
            )));
        }
        tracing::debug!(bytes = body.len(), "Diagram render verified");
        Ok(())
    }
}
