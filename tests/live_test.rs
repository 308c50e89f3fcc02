//! End-to-end tests for live updates: watcher, WebSocket push and the
//! `watch` client, all against an in-process server.

mod common;

use common::TestEnv;
use forge_dashboard::client::{self, WatchOptions};
use forge_dashboard::dashboard::{
    AppState, ChangeWatcher, ConnectionManager, PlantUmlRenderer, ServerMessage, serve,
};
use futures::{SinkExt, Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(10);

struct RunningServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    _watcher: ChangeWatcher,
}

impl RunningServer {
    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start(env: &TestEnv, listener: TcpListener) -> RunningServer {
    let store = forge_dashboard::storage::SourceStore::open(env.path());
    let connections = Arc::new(ConnectionManager::new());
    let mut watcher = ChangeWatcher::new(
        store.watch_roots(),
        Duration::from_millis(100),
        connections.clone(),
    );
    let watching = watcher.start().is_watching();
    let state = AppState::new(
        store,
        connections,
        PlantUmlRenderer::new("http://plantuml.test", false),
        watching,
    );

    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        serve(listener, state, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });

    RunningServer {
        addr,
        shutdown: Some(tx),
        _watcher: watcher,
    }
}

async fn start_server(env: &TestEnv) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    start(env, listener).await
}

/// Next text frame parsed as a server message.
async fn next_message<S>(read: &mut S) -> ServerMessage
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(TIMEOUT, read.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_connect_receives_hello_and_pong() {
    let env = TestEnv::sample();
    let server = start_server(&env).await;

    let (ws, _) = tokio_tungstenite::connect_async(server.ws_url())
        .await
        .unwrap();
    let (mut write, mut read) = ws.split();

    assert_eq!(
        next_message(&mut read).await,
        ServerMessage::Connected {
            version: forge_dashboard::VERSION.to_string()
        }
    );

    write
        .send(Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(next_message(&mut read).await, ServerMessage::Pong);
}

#[tokio::test]
async fn test_checkpoint_write_pushes_one_change() {
    let env = TestEnv::sample();
    let server = start_server(&env).await;

    let (ws, _) = tokio_tungstenite::connect_async(server.ws_url())
        .await
        .unwrap();
    let (_write, mut read) = ws.split();
    assert!(matches!(
        next_message(&mut read).await,
        ServerMessage::Connected { .. }
    ));

    env.checkpoint(
        "auth",
        r#"{"status": "completed", "completed_tasks": ["T1", "T2", "T3"]}"#,
    );

    match next_message(&mut read).await {
        ServerMessage::FileChange { data } => {
            assert!(data.path.ends_with("checkpoint.json"), "{}", data.path);
        }
        other => panic!("expected file_change, got {:?}", other),
    }

    // Pull-after-push sees the new state.
    let prds: serde_json::Value = reqwest::get(format!("{}/api/prds", server.base_url()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prds[0]["id"], "auth");
    assert_eq!(prds[0]["status"], "completed");
    assert_eq!(prds[0]["progressPercent"], 100);
    assert!(prds[0]["currentTask"].is_null());
}

#[tokio::test]
async fn test_changes_fan_out_to_all_subscribers() {
    let env = TestEnv::sample();
    let server = start_server(&env).await;

    let mut readers = Vec::new();
    for _ in 0..3 {
        let (ws, _) = tokio_tungstenite::connect_async(server.ws_url())
            .await
            .unwrap();
        let (write, mut read) = ws.split();
        assert!(matches!(
            next_message(&mut read).await,
            ServerMessage::Connected { .. }
        ));
        readers.push((write, read));
    }

    env.prd("search", "---\ntitle: Search\n---\n");

    for (_, read) in readers.iter_mut() {
        match next_message(read).await {
            ServerMessage::FileChange { data } => assert!(data.path.ends_with("search.md")),
            other => panic!("expected file_change, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_watch_client_prints_on_change() {
    let env = TestEnv::sample();
    let server = start_server(&env).await;

    let options = WatchOptions {
        base_url: server.base_url(),
        reconnect_delay: Duration::from_millis(100),
        refresh_interval: Duration::from_secs(60),
        human: false,
        max_updates: Some(1),
    };
    let watch = tokio::spawn(async move { client::run_watch(&options).await });

    // Give the client time to subscribe before changing anything.
    tokio::time::sleep(Duration::from_millis(500)).await;
    env.checkpoint("auth", r#"{"status": "completed"}"#);

    tokio::time::timeout(TIMEOUT, watch)
        .await
        .expect("watch client did not see the change")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_watch_client_reconnects() {
    let env = TestEnv::sample();

    // Reserve a port, then release it so the first attempts fail.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let options = WatchOptions {
        base_url: format!("http://{}", addr),
        reconnect_delay: Duration::from_millis(100),
        refresh_interval: Duration::from_secs(60),
        human: true,
        max_updates: Some(1),
    };
    let watch = tokio::spawn(async move { client::run_watch(&options).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let listener = TcpListener::bind(addr).await.unwrap();
    let _server = start(&env, listener).await;

    // Let the client reconnect, then trigger a change.
    tokio::time::sleep(Duration::from_millis(500)).await;
    env.prd("late", "---\ntitle: Late\n---\n");

    tokio::time::timeout(TIMEOUT, watch)
        .await
        .expect("watch client did not reconnect")
        .unwrap()
        .unwrap();
}
