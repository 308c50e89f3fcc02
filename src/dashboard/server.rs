//! Web server for the dashboard page, query API and live updates

use axum::{
    Json, Router,
    extract::{Path as AxumPath, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use super::broadcast::ConnectionManager;
use super::render::PlantUmlRenderer;
use super::watcher::ChangeWatcher;
use crate::commands::{self, DiagramList, PrdDetail, PrdList, TaskList};
use crate::config::ResolvedConfig;
use crate::models::{DiagramSource, ProgressView, RenderedDiagram, Summary};
use crate::storage::SourceStore;
use crate::{Error, Result};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Reader over the project's `.forge/` directory
    pub store: SourceStore,
    /// Live subscribers; the file watcher publishes through the same manager
    pub connections: Arc<ConnectionManager>,
    pub renderer: PlantUmlRenderer,
    /// Name of the project folder (for display in the page title)
    pub project_name: String,
    /// Whether the file watcher is running
    pub watching: bool,
}

impl AppState {
    pub fn new(
        store: SourceStore,
        connections: Arc<ConnectionManager>,
        renderer: PlantUmlRenderer,
        watching: bool,
    ) -> Self {
        let project_name = store
            .root()
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("Unknown")
            .to_string();
        Self {
            store,
            connections,
            renderer,
            project_name,
            watching,
        }
    }
}

/// Build the HTTP router for a state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/config", get(get_config))
        .route("/api/prds", get(get_prds))
        .route("/api/prds/:id", get(get_prd))
        .route("/api/prds/:id/tasks", get(get_tasks))
        .route("/api/prds/:id/progress", get(get_progress))
        .route("/api/prds/:id/diagrams", get(get_diagrams))
        .route("/api/prds/:id/diagrams/:name", get(get_diagram))
        .route("/api/render-plantuml", post(render_plantuml))
        .route("/api/summary", get(get_summary))
        .route("/ws", get(super::websocket::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Start the dashboard: file watcher, HTTP API and WebSocket endpoint.
///
/// Runs until Ctrl+C.
pub async fn start_server(store: SourceStore, config: &ResolvedConfig) -> Result<()> {
    if !store.exists() {
        tracing::warn!(
            forge_dir = %store.root().display(),
            "No .forge directory found; serving empty results"
        );
    }

    let connections = Arc::new(ConnectionManager::new());
    let mut watcher = ChangeWatcher::new(store.watch_roots(), config.debounce(), connections.clone());
    let watching = if config.watch() {
        watcher.start().is_watching()
    } else {
        tracing::info!("File watching disabled");
        false
    };

    let renderer = PlantUmlRenderer::new(config.plantuml_server(), config.verify_render());
    let state = AppState::new(store, connections, renderer, watching);

    let listener = TcpListener::bind((config.host(), config.port()))
        .await
        .map_err(|e| {
            Error::Other(format!(
                "Failed to bind {}:{}: {}",
                config.host(),
                config.port(),
                e
            ))
        })?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, project = %state.project_name, watching, "Dashboard listening");
    println!("Forge dashboard running at http://{}", addr);
    println!("Press Ctrl+C to stop");

    serve(listener, state, shutdown_signal()).await?;
    watcher.stop();
    tracing::info!("Dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// Error response: `{"error": "..."}` with a status derived from the error.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::RenderFailure(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "Request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Run a filesystem query off the async workers.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let value = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("query task failed: {}", e)))??;
    Ok(Json(value))
}

/// Serve the main HTML page
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("index.html"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigInfo {
    project_name: String,
    forge_dir: String,
    watching: bool,
    version: &'static str,
    git_commit: &'static str,
    build_timestamp: &'static str,
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigInfo> {
    Json(ConfigInfo {
        project_name: state.project_name.clone(),
        forge_dir: state.store.root().display().to_string(),
        watching: state.watching,
        version: crate::VERSION,
        git_commit: crate::GIT_COMMIT,
        build_timestamp: crate::BUILD_TIMESTAMP,
    })
}

async fn get_prds(State(state): State<AppState>) -> ApiResult<PrdList> {
    blocking(move || Ok(commands::list_prds(&state.store))).await
}

async fn get_prd(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> ApiResult<PrdDetail> {
    blocking(move || commands::show_prd(&state.store, &id)).await
}

async fn get_tasks(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> ApiResult<TaskList> {
    blocking(move || commands::prd_tasks(&state.store, &id)).await
}

async fn get_progress(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<ProgressView> {
    blocking(move || commands::prd_progress(&state.store, &id)).await
}

async fn get_diagrams(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<DiagramList> {
    blocking(move || commands::list_diagrams(&state.store, &id)).await
}

async fn get_diagram(
    State(state): State<AppState>,
    AxumPath((id, name)): AxumPath<(String, String)>,
) -> ApiResult<DiagramSource> {
    blocking(move || commands::show_diagram(&state.store, &id, &name)).await
}

async fn get_summary(State(state): State<AppState>) -> ApiResult<Summary> {
    blocking(move || Ok(commands::summary(&state.store))).await
}

#[derive(Deserialize)]
struct RenderRequest {
    #[serde(default)]
    source: Option<String>,
}

async fn render_plantuml(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RenderRequest>, JsonRejection>,
) -> ApiResult<RenderedDiagram> {
    let Json(request) =
        payload.map_err(|rejection| ApiError(Error::InvalidInput(rejection.body_text())))?;
    let source = request.source.unwrap_or_default();
    let rendered = state.renderer.render(&source).await?;
    Ok(Json(rendered))
}
