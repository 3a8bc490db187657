//! HTTP routes over a shared [`ContentEngine`].

use std::{path::Path, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chiron_engine::{ContentEngine, EngineSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::loader::{DocumentLoader, LoaderError};

/// Shared handler state.
///
/// Engine operations hold the engine lock for their duration and are abandoned once
/// `shutdown` is cancelled. Reads go through the published snapshot and never take the lock.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Mutex<ContentEngine>>,
    snapshot: watch::Receiver<EngineSnapshot>,
    loader: Arc<dyn DocumentLoader>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: ContentEngine, loader: Arc<dyn DocumentLoader>, shutdown: CancellationToken) -> Self {
        Self {
            snapshot: engine.subscribe(),
            engine: Arc::new(Mutex::new(engine)),
            loader,
            shutdown,
        }
    }
}

/// Builds the application router. Unmatched paths are served from `static_dir`.
pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/content", post(load_content))
        .route("/htmlcontent", get(html_content))
        .route("/command", post(run_command))
        .route("/history", get(history))
        .route("/restart", post(restart))
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> &'static str {
    "OK"
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest {
    content_url: Option<String>,
}

async fn load_content(State(state): State<AppState>, Json(request): Json<ContentRequest>) -> StatusCode {
    let Some(content_url) = request.content_url.filter(|url| !url.trim().is_empty()) else {
        warn!("content requested without a contentUrl");
        return StatusCode::BAD_REQUEST;
    };
    info!(%content_url, "loading content");

    let document = match state.loader.load(&content_url).await {
        Ok(document) => document,
        Err(LoaderError::NotFound(url)) => {
            warn!(%url, "content not found");
            return StatusCode::NOT_FOUND;
        }
        Err(error) => {
            error!(%content_url, %error, "failed to fetch content");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let loaded = tokio::select! {
        loaded = async { state.engine.lock().await.load(document).await } => loaded,
        () = state.shutdown.cancelled() => {
            warn!(%content_url, "shutting down, content load abandoned");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    };
    match loaded {
        Ok(()) => StatusCode::OK,
        Err(error) => {
            error!(%content_url, %error, "failed to load content");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn html_content(State(state): State<AppState>) -> Response {
    let html = state.snapshot.borrow().html.clone();
    match html {
        Some(html) => Html(html).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandResponse {
    new_content: bool,
    command_output: String,
}

async fn run_command(State(state): State<AppState>, Json(request): Json<CommandRequest>) -> Response {
    let Some(command) = request.command else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    info!(%command, "running operator command");

    let executed = tokio::select! {
        executed = async { state.engine.lock().await.execute_operator_command(&command).await } => executed,
        () = state.shutdown.cancelled() => {
            warn!(%command, "shutting down, operator command abandoned");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };
    match executed {
        Ok(outcome) => Json(CommandResponse {
            new_content: outcome.advanced,
            command_output: outcome.output,
        })
        .into_response(),
        Err(error) => {
            error!(%command, %error, "operator command left the engine in a failed state");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn history(State(state): State<AppState>) -> Response {
    let history = state.snapshot.borrow().history.clone();
    match history {
        Some(records) => Json(records).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RestartRequest {
    #[serde(default)]
    hard: bool,
}

async fn restart(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RestartRequest::default()
    } else {
        match serde_json::from_slice::<RestartRequest>(&body) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "malformed restart request");
                return StatusCode::BAD_REQUEST;
            }
        }
    };
    info!(hard = request.hard, "restart requested");

    let restarted = if request.hard {
        // Cancelling first abandons any operation holding the engine; the server exits once
        // this request has finished tearing down.
        state.shutdown.cancel();
        state.engine.lock().await.restart().await
    } else {
        tokio::select! {
            restarted = async { state.engine.lock().await.restart().await } => restarted,
            () = state.shutdown.cancelled() => {
                warn!("shutting down, restart abandoned");
                return StatusCode::SERVICE_UNAVAILABLE;
            }
        }
    };
    if let Err(error) = restarted {
        error!(%error, "restart failed");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    if request.hard {
        info!("hard restart complete, shutting down");
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        io,
        path::{Path, PathBuf},
        sync::Mutex as StdMutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use chiron_cluster::{ClusterApi, ClusterError};
    use chiron_engine::{CommandError, CommandOutput, EngineConfig, FileSink, ShellExecutor};
    use chiron_types::{Document, ResourceKind};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use url::Url;

    use super::*;

    #[derive(Default)]
    struct StubLoader {
        documents: HashMap<String, Value>,
    }

    #[async_trait]
    impl DocumentLoader for StubLoader {
        async fn load(&self, content_url: &str) -> Result<Document, LoaderError> {
            match self.documents.get(content_url) {
                Some(document) => Ok(Document::from_value(document.clone())?),
                None => Err(LoaderError::NotFound(
                    Url::parse(&format!("http://{content_url}")).expect("test url"),
                )),
            }
        }
    }

    #[derive(Default)]
    struct StubCluster {
        deployments: StdMutex<Vec<String>>,
        deleted: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ClusterApi for StubCluster {
        async fn list(&self, kind: ResourceKind, _namespace: &str) -> Result<Vec<String>, ClusterError> {
            match kind {
                ResourceKind::Deployment => Ok(self.deployments.lock().unwrap().clone()),
                _ => Ok(Vec::new()),
            }
        }

        async fn delete(&self, kind: ResourceKind, name: &str, _namespace: &str) -> Result<(), ClusterError> {
            if kind == ResourceKind::Deployment {
                self.deployments.lock().unwrap().retain(|deployment| deployment != name);
            }
            self.deleted.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn apply(&self, _manifest: &str, _namespace: &str) -> Result<(), ClusterError> {
            Ok(())
        }
    }

    struct NullSink;

    #[async_trait]
    impl FileSink for NullSink {
        async fn write(&self, _path: &Path, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    struct EchoShell;

    #[async_trait]
    impl ShellExecutor for EchoShell {
        async fn run(&self, command: &str, _cwd: Option<&Path>) -> Result<CommandOutput, CommandError> {
            if let Some(message) = command.strip_prefix("fail ") {
                return Err(CommandError::Failed {
                    command: command.to_string(),
                    code: Some(1),
                    stdout: String::new(),
                    stderr: format!("{message}\n"),
                });
            }
            Ok(CommandOutput {
                stdout: format!("{command}\n"),
                stderr: String::new(),
            })
        }
    }

    struct Fixture {
        router: Router,
        cluster: Arc<StubCluster>,
        shutdown: CancellationToken,
    }

    fn fixture_with_static(static_dir: PathBuf) -> Fixture {
        let mut documents = HashMap::new();
        documents.insert(
            "content.local/tutorial.json".to_string(),
            json!([
                {"text": "<p>A</p>", "preCommands": [], "postChecks": [{"type": "POSTCHECK", "method": "COMMANDWAIT", "value": "ls -al"}]},
                {"text": "<p>B</p>", "postChecks": [{"method": "CHECKCOMMANDOUT", "value": "denied"}]}
            ]),
        );
        documents.insert(
            "content.local/waiting.json".to_string(),
            json!([
                {"text": "<p>W</p>", "preCommands": [{"method": "WAIT", "kind": "POD", "value": 1, "equalityOperator": "EQUALS"}]}
            ]),
        );
        documents.insert("content.local/broken.json".to_string(), json!({"not": "a list"}));

        let cluster = Arc::new(StubCluster::default());
        cluster.deployments.lock().unwrap().push("web".to_string());
        let engine = ContentEngine::new(
            EngineConfig::new("/work", &static_dir),
            cluster.clone(),
            Arc::new(NullSink),
            Arc::new(EchoShell),
        );
        let shutdown = CancellationToken::new();
        let state = AppState::new(engine, Arc::new(StubLoader { documents }), shutdown.clone());
        Fixture {
            router: router(state, static_dir),
            cluster,
            shutdown,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_static(PathBuf::from("/nonexistent-static"))
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn root_and_health_respond() {
        let fixture = fixture();
        assert_eq!(send(&fixture.router, "GET", "/", None).await, (StatusCode::OK, "OK".to_string()));
        assert_eq!(send(&fixture.router, "GET", "/health", None).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn content_route_maps_loader_outcomes_to_statuses() {
        let fixture = fixture();

        let (status, _) = send(&fixture.router, "POST", "/content", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&fixture.router, "POST", "/content", Some(json!({"contentUrl": "content.local/missing.json"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&fixture.router, "POST", "/content", Some(json!({"contentUrl": "content.local/broken.json"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = send(&fixture.router, "GET", "/htmlcontent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&fixture.router, "GET", "/history", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn commands_advance_through_the_tutorial() {
        let fixture = fixture();
        let (status, _) = send(&fixture.router, "POST", "/content", Some(json!({"contentUrl": "content.local/tutorial.json"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            send(&fixture.router, "GET", "/htmlcontent", None).await,
            (StatusCode::OK, "<p>A</p>".to_string())
        );

        let (status, body) = send(&fixture.router, "POST", "/command", Some(json!({"command": "pwd"}))).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body, json!({"newContent": false, "commandOutput": "pwd\n"}));

        let (_, body) = send(&fixture.router, "POST", "/command", Some(json!({"command": "ls -al"}))).await;
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["newContent"], json!(true));
        assert_eq!(send(&fixture.router, "GET", "/htmlcontent", None).await.1, "<p>B</p>");

        let (_, body) = send(&fixture.router, "POST", "/command", Some(json!({"command": "fail permission denied"}))).await;
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body, json!({"newContent": true, "commandOutput": "permission denied\n"}));

        let (status, body) = send(&fixture.router, "GET", "/history", None).await;
        assert_eq!(status, StatusCode::OK);
        let history: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(history.as_array().unwrap().len(), 2);
        assert_eq!(history[1]["commandAttempts"], json!(["pwd", "ls -al"]));
    }

    #[tokio::test]
    async fn command_without_a_command_is_rejected() {
        let fixture = fixture();
        let (status, _) = send(&fixture.router, "POST", "/command", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn soft_restart_resets_without_shutting_down() {
        let fixture = fixture();
        send(&fixture.router, "POST", "/content", Some(json!({"contentUrl": "content.local/tutorial.json"}))).await;

        let (status, _) = send(&fixture.router, "POST", "/restart", None).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(*fixture.cluster.deleted.lock().unwrap(), vec!["web".to_string()]);
        assert_eq!(send(&fixture.router, "GET", "/htmlcontent", None).await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&fixture.router, "GET", "/history", None).await.0, StatusCode::NOT_FOUND);
        assert!(!fixture.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn hard_restart_triggers_shutdown() {
        let fixture = fixture();
        let (status, _) = send(&fixture.router, "POST", "/restart", Some(json!({"hard": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(fixture.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn reads_and_hard_restart_do_not_wait_for_a_blocked_setup() {
        let fixture = fixture();
        let router = fixture.router.clone();
        let loading = tokio::spawn(async move {
            send(&router, "POST", "/content", Some(json!({"contentUrl": "content.local/waiting.json"})))
                .await
                .0
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let (status, _) = tokio::time::timeout(Duration::from_secs(2), send(&fixture.router, "GET", "/htmlcontent", None))
            .await
            .expect("htmlcontent answers during setup");
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = tokio::time::timeout(Duration::from_secs(2), send(&fixture.router, "GET", "/history", None))
            .await
            .expect("history answers during setup");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap().as_array().unwrap().len(), 1);

        let (status, _) = tokio::time::timeout(
            Duration::from_secs(2),
            send(&fixture.router, "POST", "/restart", Some(json!({"hard": true}))),
        )
        .await
        .expect("hard restart answers during setup");
        assert_eq!(status, StatusCode::OK);
        assert!(fixture.shutdown.is_cancelled());
        assert_eq!(loading.await.unwrap(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(*fixture.cluster.deleted.lock().unwrap(), vec!["web".to_string()]);
        assert_eq!(send(&fixture.router, "GET", "/htmlcontent", None).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unmatched_paths_fall_back_to_static_files() {
        let directory = tempfile::tempdir().unwrap();
        std::fs::write(directory.path().join("index.html"), "<html>terminal</html>").unwrap();
        let fixture = fixture_with_static(directory.path().to_path_buf());

        assert_eq!(
            send(&fixture.router, "GET", "/index.html", None).await,
            (StatusCode::OK, "<html>terminal</html>".to_string())
        );
        assert_eq!(send(&fixture.router, "GET", "/missing.png", None).await.0, StatusCode::NOT_FOUND);
    }
}
