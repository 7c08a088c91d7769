//! Local HTTP endpoint exposing the review session to the viewer.
//!
//! Binds to 127.0.0.1 only. The session is built once at startup and
//! replaced wholesale by `POST /refresh`.

use crate::cli::Workspace;
use crate::diff::FilePatch;
use crate::error::AppError;
use crate::session::{analyze_file, FileDiff, Session};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

/// Default port for `review-refs serve`
pub const DEFAULT_PORT: u16 = 8080;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    workspace: Arc<Workspace>,
    session: Arc<RwLock<Session>>,
}

impl ServerState {
    pub fn new(workspace: Workspace, session: Session) -> Self {
        Self {
            workspace: Arc::new(workspace),
            session: Arc::new(RwLock::new(session)),
        }
    }
}

pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/session", get(get_session))
        .route("/refresh", post(refresh))
        .route("/analyze", post(analyze))
        .layer(cors)
        .with_state(state)
}

/// Build the session, then serve it until the workspace is cancelled.
pub async fn serve(workspace: Workspace, port: u16) -> Result<(), AppError> {
    log::info!(
        "[serve] building session for {}",
        workspace.source.repo_path().display()
    );
    let session = workspace.build_session(true).await?;
    let cancel = workspace.cancel.clone();
    let app = router(ServerState::new(workspace, session));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::io(format!("Failed to bind {addr}: {e}")))?;
    let local = listener.local_addr()?;
    log::info!("[serve] listening on http://{local}");
    println!("Serving review session on http://{local}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| AppError::io(format!("Server error: {e}")))?;

    log::info!("[serve] stopped");
    Ok(())
}

// --- Response types ---

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    /// Empty re-analyses every file in the session.
    #[serde(default)]
    filename: String,
}

fn error_response(err: AppError) -> Response {
    log::error!("[serve] {err}");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response()
}

// --- Handlers ---

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_session(State(state): State<ServerState>) -> Json<Session> {
    Json(state.session.read().await.clone())
}

async fn refresh(State(state): State<ServerState>) -> Result<Json<Session>, Response> {
    let session = state
        .workspace
        .build_session(true)
        .await
        .map_err(error_response)?;
    log::info!("[refresh] {} files", session.files.len());
    *state.session.write().await = session.clone();
    Ok(Json(session))
}

async fn analyze(
    State(state): State<ServerState>,
    Json(request): Json<AnalyzeRequest>,
) -> Json<Vec<FileDiff>> {
    let (root, targets): (PathBuf, Vec<FilePatch>) = {
        let session = state.session.read().await;
        let targets = session
            .files
            .iter()
            .filter(|f| request.filename.is_empty() || f.path == request.filename)
            .map(FileDiff::to_patch)
            .collect();
        (PathBuf::from(&session.repo.root), targets)
    };

    let workspace = &state.workspace;
    let mut results = Vec::with_capacity(targets.len());
    for patch in targets {
        let diff = analyze_file(&root, patch, workspace.finder(true), &workspace.config).await;
        log::info!(
            "[analyze] {}: {} spans",
            diff.path,
            diff.changed_spans.len()
        );
        results.push(diff);
    }
    Json(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::diff::FileStatus;
    use crate::session::Summary;
    use crate::sources::RepoInfo;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn sample_session(root: &str) -> Session {
        Session {
            repo: RepoInfo {
                root: root.to_owned(),
                branch: "feature".to_owned(),
                head: "abc123".to_owned(),
                base_ref: "main".to_owned(),
                base: "def456".to_owned(),
                remote: None,
                repo_name: None,
                repo_link: None,
            },
            files: vec![FileDiff {
                path: "README.md".to_owned(),
                status: FileStatus::Modified,
                language: None,
                patch: "@@ -1 +1 @@\n-old\n+new\n".to_owned(),
                additions: 1,
                deletions: 1,
                changed_spans: Vec::new(),
                analysis_error: None,
            }],
            summary: Summary {
                files: 1,
                add: 1,
                del: 1,
            },
            generated_at: "2026-01-01T00:00:00+00:00".to_owned(),
        }
    }

    async fn start(dir: &tempfile::TempDir) -> SocketAddr {
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let workspace = Workspace::open(dir.path().to_path_buf(), None, Config::default()).unwrap();
        let state = ServerState::new(workspace, sample_session(dir.path().to_str().unwrap()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await });
        addr
    }

    async fn send(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn body(response: &str) -> serde_json::Value {
        let (_, body) = response.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_session() {
        let dir = tempfile::tempdir().unwrap();
        let addr = start(&dir).await;

        let health = send(
            addr,
            "GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert_eq!(body(&health)["ok"], true);

        let session = send(
            addr,
            "GET /session HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(session.starts_with("HTTP/1.1 200"));
        let json = body(&session);
        assert_eq!(json["repo"]["baseRef"], "main");
        assert_eq!(json["files"][0]["path"], "README.md");
        assert_eq!(json["summary"]["add"], 1);
    }

    #[tokio::test]
    async fn test_analyze_unknown_file_returns_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let addr = start(&dir).await;

        let payload = r#"{"filename":"missing.go"}"#;
        let request = format!(
            "POST /analyze HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
            payload.len()
        );
        let response = send(addr, &request).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert_eq!(body(&response), serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_analyze_unsupported_language_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let addr = start(&dir).await;

        let payload = r#"{"filename":"README.md"}"#;
        let request = format!(
            "POST /analyze HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
            payload.len()
        );
        let response = send(addr, &request).await;
        let json = body(&response);
        assert_eq!(json[0]["path"], "README.md");
        assert_eq!(json[0]["changedSpans"], serde_json::json!([]));
    }
}
