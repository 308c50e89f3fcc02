//! Live dashboard server.
//!
//! Serves the query API over HTTP and pushes change notifications to
//! WebSocket subscribers while a file watcher observes `.forge/`.

pub mod broadcast;
pub mod protocol;
pub mod render;
pub mod server;
pub mod watcher;
mod websocket;

pub use broadcast::{ConnectionManager, SubscriberId, Subscription};
pub use protocol::{ClientMessage, ServerMessage};
pub use render::PlantUmlRenderer;
pub use server::{AppState, router, serve, start_server};
pub use watcher::{ChangeWatcher, WatcherState};
