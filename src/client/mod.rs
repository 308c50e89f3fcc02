//! Live terminal client for a running dashboard.
//!
//! Subscribes to `/ws`, re-fetches `/api/summary` on every change signal and
//! on a periodic timer, and prints each refresh. Lost connections are
//! retried at a fixed delay.

pub mod connection;

use chrono::{DateTime, Local, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::commands::Output;
use crate::dashboard::ServerMessage;
use crate::models::{ChangeSignal, Summary};
use crate::{Error, Result};
use connection::Connection;

/// Settings for [`run_watch`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Dashboard base URL, e.g. `http://127.0.0.1:20555`
    pub base_url: String,
    pub reconnect_delay: Duration,
    pub refresh_interval: Duration,
    pub human: bool,
    /// Exit after this many change notifications
    pub max_updates: Option<u64>,
}

/// What caused a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    Connect,
    FileChange,
    Timer,
}

/// One printed refresh.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryUpdate {
    pub at: DateTime<Utc>,
    pub trigger: RefreshTrigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeSignal>,
    pub summary: Summary,
}

impl Output for SummaryUpdate {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
    }

    fn to_human(&self) -> String {
        let time = self.at.with_timezone(&Local).format("%H:%M:%S");
        let cause = match (&self.trigger, &self.change) {
            (_, Some(change)) => format!("{} {}", change.event, change.path),
            (RefreshTrigger::Connect, None) => "connected".to_string(),
            (RefreshTrigger::Timer, None) => "refresh".to_string(),
            (RefreshTrigger::FileChange, None) => "change".to_string(),
        };
        format!("[{}] {}\n{}", time, cause, self.summary.to_human())
    }
}

fn base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// WebSocket endpoint for a dashboard base URL.
pub fn ws_url(base_url: &str) -> Result<String> {
    let base = base(base_url);
    if let Some(rest) = base.strip_prefix("http://") {
        Ok(format!("ws://{}/ws", rest))
    } else if let Some(rest) = base.strip_prefix("https://") {
        Ok(format!("wss://{}/ws", rest))
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        Ok(format!("{}/ws", base))
    } else {
        Err(Error::InvalidInput(format!(
            "dashboard URL must start with http:// or https://, got {:?}",
            base_url
        )))
    }
}

/// Fetch the global summary from a dashboard.
pub async fn fetch_summary(client: &reqwest::Client, base_url: &str) -> Result<Summary> {
    let url = format!("{}/api/summary", base(base_url));
    let response = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Other(format!("GET {}: {}", url, e)))?;
    response
        .json::<Summary>()
        .await
        .map_err(|e| Error::Other(format!("GET {}: {}", url, e)))
}

struct Printer {
    client: reqwest::Client,
    base_url: String,
    human: bool,
}

impl Printer {
    async fn refresh(&self, trigger: RefreshTrigger, change: Option<ChangeSignal>) {
        match fetch_summary(&self.client, &self.base_url).await {
            Ok(summary) => {
                let update = SummaryUpdate {
                    at: Utc::now(),
                    trigger,
                    change,
                    summary,
                };
                if self.human {
                    println!("{}\n", update.to_human());
                } else {
                    println!("{}", update.to_json());
                }
            }
            Err(e) => tracing::warn!(error = %e, "Summary refresh failed"),
        }
    }
}

/// Follow a dashboard until interrupted (or until `max_updates` changes
/// have been printed).
pub async fn run_watch(opts: &WatchOptions) -> Result<()> {
    let endpoint = ws_url(&opts.base_url)?;
    let printer = Printer {
        client: reqwest::Client::new(),
        base_url: opts.base_url.clone(),
        human: opts.human,
    };
    let mut conn = Connection::new(opts.reconnect_delay, Instant::now());
    let mut refresh = tokio::time::interval(opts.refresh_interval);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    refresh.tick().await;
    let mut updates: u64 = 0;

    loop {
        tokio::time::sleep(conn.wait_time(Instant::now())).await;

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(&endpoint).await {
            Ok(result) => result,
            Err(e) => {
                let wait = conn.on_disconnected(Instant::now());
                tracing::warn!(
                    url = %endpoint,
                    attempt = conn.state().attempt(),
                    retry_in_ms = wait.as_millis() as u64,
                    error = %e,
                    "Dashboard unreachable"
                );
                continue;
            }
        };

        conn.on_connected();
        tracing::info!(url = %endpoint, "Connected to dashboard");
        printer.refresh(RefreshTrigger::Connect, None).await;

        let (_write, mut read) = ws_stream.split();
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(ServerMessage::FileChange { data }) => {
                                    printer.refresh(RefreshTrigger::FileChange, Some(data)).await;
                                    updates += 1;
                                    if opts.max_updates.is_some_and(|max| updates >= max) {
                                        return Ok(());
                                    }
                                }
                                Ok(ServerMessage::Connected { version }) => {
                                    tracing::debug!(%version, "Server hello");
                                }
                                Ok(ServerMessage::Pong) => {}
                                Err(e) => tracing::debug!(error = %e, "Ignoring server message"),
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                _ = refresh.tick() => {
                    printer.refresh(RefreshTrigger::Timer, None).await;
                }
            }
        }

        let wait = conn.on_disconnected(Instant::now());
        tracing::warn!(
            retry_in_ms = wait.as_millis() as u64,
            "Dashboard connection lost"
        );
    }
}
