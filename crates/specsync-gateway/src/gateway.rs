//! Main Gateway implementation
//!
//! JSON API over the project workspace plus a WebSocket feed of generation
//! events.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        rejection::JsonRejection,
        Multipart, Path, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Local};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use specsync_core::{
    ssot, ConsistencyValidator, EnginePreference, FillEngine, HistoryLog, HistoryRecord,
    MappingConfig, OutcomeStatus, TemplateOutcome, Workspace,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::events::{Event, EventHub};
use crate::{GatewayError, Result};

/// Gateway state shared across handlers
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub config: GatewayConfig,
    pub workspace: Workspace,
    pub events: EventHub,
    pub history: HistoryLog,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let workspace = Workspace::new(&config.project);
        let history = HistoryLog::in_dir(workspace.output_dir(), config.history_limit);

        Self {
            events: EventHub::new(config.event_capacity),
            workspace,
            history,
            config,
            shutdown_tx,
        }
    }

    fn engine(&self, requested: Option<EnginePreference>) -> FillEngine {
        FillEngine::new(&self.config.project)
            .with_preference(requested.unwrap_or(self.config.project.engine))
    }

    fn record_history(&self, engine: EnginePreference, outcomes: &[TemplateOutcome]) {
        let record = HistoryRecord {
            timestamp: Local::now(),
            engine: engine.to_string(),
            templates: outcomes.iter().map(|o| o.template.clone()).collect(),
            succeeded: outcomes.iter().filter(|o| o.is_success()).count(),
            failed: outcomes
                .iter()
                .filter(|o| o.status == OutcomeStatus::Error)
                .count(),
            results: serde_json::to_value(outcomes).unwrap_or(Value::Null),
        };
        if let Err(e) = self.history.append(record) {
            tracing::warn!("Failed to record generation history: {}", e);
        }
    }
}

/// Main Gateway
#[derive(Debug)]
pub struct Gateway {
    state: Arc<GatewayState>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateRequest {
    engine: Option<EnginePreference>,
    templates: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EngineRequest {
    engine: Option<EnginePreference>,
}

/// Empty body means "all defaults"
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| GatewayError::BadRequest(format!("invalid request: {}", e)))
}

fn json_object(payload: std::result::Result<Json<Value>, JsonRejection>) -> Result<Value> {
    let Json(value) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    match value.as_object() {
        Some(map) if !map.is_empty() => Ok(value),
        _ => Err(GatewayError::BadRequest("No data provided".to_string())),
    }
}

fn content_type(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".docx") || lower.ends_with(".docm") {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    } else if lower.ends_with(".xlsx") || lower.ends_with(".xlsm") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else if lower.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

impl Gateway {
    /// Create a new gateway with configuration
    pub fn new(config: GatewayConfig) -> Self {
        let state = Arc::new(GatewayState::new(config));
        Self { state }
    }

    /// Get gateway state
    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }

    /// Build the Axum router
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(Self::handle_health))
            .route("/ws", get(Self::handle_ws_upgrade))
            .route("/api/ssot", get(Self::handle_get_ssot).post(Self::handle_put_ssot))
            .route("/api/ssot/flatten", get(Self::handle_flatten))
            .route(
                "/api/mapping",
                get(Self::handle_get_mapping).post(Self::handle_put_mapping),
            )
            .route("/api/templates", get(Self::handle_templates))
            .route("/api/templates/upload", post(Self::handle_upload))
            .route("/api/templates/:name/scan", get(Self::handle_scan))
            .route("/api/generate", post(Self::handle_generate))
            .route("/api/generate/mapped", post(Self::handle_generate_mapped))
            .route("/api/validate", post(Self::handle_validate))
            .route("/api/download/:filename", get(Self::handle_download))
            .route("/api/history", get(Self::handle_history))
            .route("/api/status", get(Self::handle_status))
            .fallback(Self::handle_not_found)
            .layer(TraceLayer::new_for_http());

        let router = if self.state.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        };
        router.with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(&self) -> Result<()> {
        let addr = self.state.config.socket_addr()?;
        self.state.workspace.ensure_dirs()?;

        tracing::info!("Spec Sync Gateway starting on {}", addr);
        tracing::info!("Project root: {}", self.state.workspace.root().display());

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let router = self.build_router();
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown_rx.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
                tracing::info!("Gateway shutting down");
            })
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Shutdown the gateway
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
        tracing::info!("Gateway shutdown initiated");
    }

    // HTTP handlers

    async fn handle_health() -> impl IntoResponse {
        Json(json!({
            "status": "healthy",
            "version": crate::VERSION
        }))
    }

    async fn handle_not_found() -> Response {
        GatewayError::NotFound("Not found".to_string()).into_response()
    }

    async fn handle_get_ssot(State(state): State<Arc<GatewayState>>) -> Result<Json<Value>> {
        let store = state.workspace.ssot();
        let data = store.load()?;
        let modified: DateTime<Local> = std::fs::metadata(store.path())?.modified()?.into();

        Ok(Json(json!({
            "success": true,
            "data": data,
            "last_modified": modified,
        })))
    }

    async fn handle_put_ssot(
        State(state): State<Arc<GatewayState>>,
        payload: std::result::Result<Json<Value>, JsonRejection>,
    ) -> Result<Json<Value>> {
        let data = json_object(payload)?;
        let backup = state.workspace.ssot().save(data)?;
        state.events.publish(Event::SsotUpdated {
            timestamp: Local::now(),
        });

        Ok(Json(json!({
            "success": true,
            "message": "SSOT updated",
            "backup": backup.map(|p| p.display().to_string()),
        })))
    }

    async fn handle_flatten(State(state): State<Arc<GatewayState>>) -> Result<Json<Value>> {
        let data = state.workspace.ssot().load()?;
        Ok(Json(json!({
            "success": true,
            "data": ssot::flatten(&data),
        })))
    }

    async fn handle_get_mapping(State(state): State<Arc<GatewayState>>) -> Result<Json<Value>> {
        let data = state.workspace.mapping().load_raw()?;
        Ok(Json(json!({
            "success": true,
            "data": data,
        })))
    }

    async fn handle_put_mapping(
        State(state): State<Arc<GatewayState>>,
        payload: std::result::Result<Json<Value>, JsonRejection>,
    ) -> Result<Json<Value>> {
        let data = json_object(payload)?;
        MappingConfig::from_value(data.clone())
            .map_err(|e| GatewayError::BadRequest(format!("Invalid mapping: {}", e)))?;
        let backup = state.workspace.mapping().save_raw(data)?;
        state.events.publish(Event::MappingUpdated {
            timestamp: Local::now(),
        });

        Ok(Json(json!({
            "success": true,
            "message": "Mapping updated",
            "backup": backup.map(|p| p.display().to_string()),
        })))
    }

    async fn handle_templates(State(state): State<Arc<GatewayState>>) -> Result<Json<Value>> {
        let templates = state.workspace.list_templates()?;
        Ok(Json(json!({
            "success": true,
            "data": templates,
        })))
    }

    async fn handle_upload(
        State(state): State<Arc<GatewayState>>,
        mut multipart: Multipart,
    ) -> Result<Json<Value>> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| GatewayError::BadRequest(e.body_text()))?
        {
            if field.name() != Some("file") {
                continue;
            }
            let file_name = field.file_name().unwrap_or_default().to_string();
            if file_name.is_empty() {
                return Err(GatewayError::BadRequest("No file selected".to_string()));
            }
            let bytes = field
                .bytes()
                .await
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
            let info = state.workspace.save_template(&file_name, &bytes)?;

            return Ok(Json(json!({
                "success": true,
                "message": format!("Uploaded {}", info.name),
                "file": { "name": info.name, "size": info.size },
            })));
        }
        Err(GatewayError::BadRequest("No file provided".to_string()))
    }

    async fn handle_scan(
        State(state): State<Arc<GatewayState>>,
        Path(name): Path<String>,
    ) -> Result<Json<Value>> {
        let tokens = state.engine(None).scan_template(&name).await?;
        Ok(Json(json!({
            "success": true,
            "data": { "template": name, "tokens": tokens },
        })))
    }

    async fn handle_generate(
        State(state): State<Arc<GatewayState>>,
        body: Bytes,
    ) -> Result<Json<Value>> {
        let request: GenerateRequest = parse_body(&body)?;
        let engine = state.engine(request.engine);
        let templates = if request.templates.is_empty() {
            state
                .workspace
                .list_templates()?
                .into_iter()
                .map(|t| t.name)
                .collect()
        } else {
            request.templates
        };

        state.events.publish(Event::GenerateStart {
            timestamp: Local::now(),
            engine: engine.preference(),
            templates: templates.clone(),
        });

        let budget = state.config.generate_timeout_secs;
        let events = state.events.clone();
        let run = engine.fill_templates_with(&templates, |outcome| {
            events.publish(Event::GenerateProgress(outcome.clone()));
        });
        let outcomes = match tokio::time::timeout(Duration::from_secs(budget), run).await {
            Ok(Ok(report)) => report.outcomes,
            Ok(Err(e)) => {
                state.events.publish(Event::GenerateError {
                    timestamp: Local::now(),
                    error: e.to_string(),
                });
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!("Generation exceeded {}s, abandoning batch", budget);
                templates
                    .iter()
                    .map(|t| TemplateOutcome::failed(t, format!("Timed out after {}s", budget)))
                    .collect()
            }
        };

        state.events.publish(Event::GenerateComplete {
            timestamp: Local::now(),
            results: outcomes.clone(),
        });
        state.record_history(engine.preference(), &outcomes);

        Ok(Json(json!({
            "success": true,
            "results": outcomes,
        })))
    }

    async fn handle_generate_mapped(
        State(state): State<Arc<GatewayState>>,
        body: Bytes,
    ) -> Result<Json<Value>> {
        let request: EngineRequest = parse_body(&body)?;
        let engine = state.engine(request.engine);
        let budget = state.config.generate_timeout_secs;

        let report = match tokio::time::timeout(Duration::from_secs(budget), engine.generate_all()).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                state.events.publish(Event::GenerateError {
                    timestamp: Local::now(),
                    error: e.to_string(),
                });
                return Err(e.into());
            }
            Err(_) => return Err(GatewayError::Timeout(budget)),
        };

        state.events.publish(Event::GenerateComplete {
            timestamp: Local::now(),
            results: report.outcomes.clone(),
        });
        state.record_history(engine.preference(), &report.outcomes);

        Ok(Json(json!({
            "success": report.all_ok(),
            "results": report.outcomes,
        })))
    }

    async fn handle_validate(
        State(state): State<Arc<GatewayState>>,
        body: Bytes,
    ) -> Result<Response> {
        let request: EngineRequest = parse_body(&body)?;
        let preference = request.engine.unwrap_or(state.config.project.engine);
        let validator = ConsistencyValidator::new(&state.config.project).with_preference(preference);
        let budget = state.config.validate_timeout_secs;

        let report = tokio::time::timeout(Duration::from_secs(budget), validator.validate_all())
            .await
            .map_err(|_| GatewayError::Timeout(budget))??;

        if report.passed() {
            Ok(Json(json!({
                "success": true,
                "message": format!("{} document(s) consistent with the SSOT", report.checked.len()),
                "report": report,
            }))
            .into_response())
        } else {
            Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": format!("{} discrepancy(ies) found", report.discrepancies.len()),
                    "report": report,
                })),
            )
                .into_response())
        }
    }

    async fn handle_download(
        State(state): State<Arc<GatewayState>>,
        Path(filename): Path<String>,
    ) -> Result<Response> {
        let path = state.workspace.output_file(&filename)?;
        let bytes = tokio::fs::read(&path).await?;

        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
        Ok((
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(content_type(&filename))),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            bytes,
        )
            .into_response())
    }

    async fn handle_history(State(state): State<Arc<GatewayState>>) -> Result<Json<Value>> {
        let records = state.history.load()?;
        Ok(Json(json!({
            "success": true,
            "data": records,
        })))
    }

    async fn handle_status(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
        Json(json!({
            "success": true,
            "data": state.workspace.status(),
            "engine": state.config.project.engine,
            "version": crate::VERSION,
        }))
    }

    // WebSocket

    async fn handle_ws_upgrade(
        ws: WebSocketUpgrade,
        State(state): State<Arc<GatewayState>>,
    ) -> Response {
        ws.on_upgrade(move |socket| Self::handle_ws_connection(socket, state))
    }

    async fn handle_ws_connection(socket: WebSocket, state: Arc<GatewayState>) {
        let client_id = Uuid::new_v4();
        let (mut tx, mut rx) = socket.split();
        let mut events = state.events.subscribe();

        tracing::info!("WebSocket connected: {}", client_id);

        let greeting = Event::Connected {
            message: "Connected to Spec Sync".to_string(),
        };
        if let Err(e) = Self::send_event(&mut tx, &greeting).await {
            tracing::debug!("WebSocket {} closed before greeting: {}", client_id, e);
            return;
        }

        let mut send_task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if Self::send_event(&mut tx, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket {} lagged, {} event(s) dropped", client_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Clients only listen; anything they send is ignored
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = rx.next().await {
                if let Message::Close(_) = msg {
                    break;
                }
            }
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        tracing::info!("WebSocket disconnected: {}", client_id);
    }

    async fn send_event(tx: &mut SplitSink<WebSocket, Message>, event: &Event) -> Result<()> {
        let text = serde_json::to_string(event)?;
        tx.send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use specsync_core::testing::{write_docx, DocxSpec};
    use specsync_core::SpecSyncConfig;
    use tower::ServiceExt;

    const SSOT: &str = "product:\n  name: Widget\n  version: \"2.1\"\n";

    const MAPPING: &str = r#"
word_mappings:
  datasheet:
    file_path: templates/datasheet.docx
    mappings:
      product.name: ProductName
"#;

    fn project() -> (tempfile::TempDir, Gateway) {
        let dir = tempfile::tempdir().unwrap();
        let project = SpecSyncConfig::new()
            .with_root(dir.path())
            .with_engine(EnginePreference::Native);
        let gateway = Gateway::new(GatewayConfig::new().with_project(project.clone()));
        gateway.state().workspace.ensure_dirs().unwrap();

        std::fs::write(project.ssot_path(), SSOT).unwrap();
        std::fs::write(project.mapping_path(), MAPPING).unwrap();
        write_docx(
            &project.templates_dir().join("spec.docx"),
            &DocxSpec::new().paragraph("Model: {product.name} v{product.version}"),
        );
        write_docx(
            &project.templates_dir().join("datasheet.docx"),
            &DocxSpec::new().bookmark("Model: ", "ProductName", "____"),
        );
        (dir, gateway)
    }

    async fn call(gateway: &Gateway, request: Request<Body>) -> (StatusCode, Value) {
        let response = gateway.build_router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload(file_name: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "specsync-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                f = file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/templates/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, gateway) = project();
        let (status, body) = call(&gateway, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (_dir, gateway) = project();
        let (status, body) = call(&gateway, get_req("/api/nothing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_get_ssot() {
        let (_dir, gateway) = project();
        let (status, body) = call(&gateway, get_req("/api/ssot")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["product"]["name"], "Widget");
        assert!(body["last_modified"].is_string());
    }

    #[tokio::test]
    async fn test_missing_ssot_is_404() {
        let (_dir, gateway) = project();
        std::fs::remove_file(gateway.state().workspace.ssot().path()).unwrap();

        let (status, body) = call(&gateway, get_req("/api/ssot")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_update_ssot_emits_event() {
        let (_dir, gateway) = project();
        let mut events = gateway.state().events.subscribe();

        let (status, _) = call(&gateway, post_json("/api/ssot", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &gateway,
            post_json("/api/ssot", json!({"product": {"name": "Gadget"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(body["backup"].is_string());
        assert_eq!(events.recv().await.unwrap().name(), "ssot_updated");

        let (_, body) = call(&gateway, get_req("/api/ssot/flatten")).await;
        assert_eq!(body["data"]["product.name"], "Gadget");
    }

    #[tokio::test]
    async fn test_mapping_is_validated_before_save() {
        let (_dir, gateway) = project();

        let (status, _) = call(
            &gateway,
            post_json("/api/mapping", json!({"word_mappings": "not a table"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mapping = json!({
            "word_mappings": {
                "brochure": {
                    "file_path": "templates/brochure.docx",
                    "mappings": { "product.name": "Name" }
                }
            }
        });
        let (status, _) = call(&gateway, post_json("/api/mapping", mapping)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&gateway, get_req("/api/mapping")).await;
        assert_eq!(
            body["data"]["word_mappings"]["brochure"]["mappings"]["product.name"],
            "Name"
        );
    }

    #[tokio::test]
    async fn test_upload_checks_extension() {
        let (_dir, gateway) = project();

        let (status, _) = call(&gateway, upload("notes.txt", b"hello")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let bytes = specsync_core::testing::docx_bytes(&DocxSpec::new().paragraph("{product.name}"));
        let (status, body) = call(&gateway, upload("brochure.docx", &bytes)).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["file"]["name"], "brochure.docx");

        let (_, body) = call(&gateway, get_req("/api/templates")).await;
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert!(names.contains(&"brochure.docx"));
    }

    #[tokio::test]
    async fn test_scan_template() {
        let (_dir, gateway) = project();
        let (status, body) = call(&gateway, get_req("/api/templates/spec.docx/scan")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tokens"], json!(["product.name", "product.version"]));

        let (status, _) = call(&gateway, get_req("/api/templates/absent.docx/scan")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_generate_reports_progress_and_history() {
        let (_dir, gateway) = project();
        let mut events = gateway.state().events.subscribe();

        let (status, body) = call(
            &gateway,
            post_json("/api/generate", json!({"templates": ["spec.docx"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["results"][0]["status"], "success");
        assert_eq!(body["results"][0]["output"], "filled_spec.docx");

        let names: Vec<&str> = (0..3)
            .map(|_| events.try_recv().unwrap().name())
            .collect();
        assert_eq!(names, ["generate_start", "generate_progress", "generate_complete"]);

        let (_, body) = call(&gateway, get_req("/api/history")).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["succeeded"], 1);

        let response = gateway
            .build_router()
            .oneshot(get_req("/api/download/filled_spec.docx"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("filled_spec.docx"));
    }

    #[tokio::test]
    async fn test_generate_without_ssot_emits_error() {
        let (_dir, gateway) = project();
        std::fs::remove_file(gateway.state().workspace.ssot().path()).unwrap();
        let mut events = gateway.state().events.subscribe();

        let (status, body) = call(&gateway, post_json("/api/generate", json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        assert_eq!(events.try_recv().unwrap().name(), "generate_start");
        assert_eq!(events.try_recv().unwrap().name(), "generate_error");
    }

    #[tokio::test]
    async fn test_validate_before_and_after_generation() {
        let (_dir, gateway) = project();

        let (status, body) = call(&gateway, post_json("/api/validate", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["report"]["discrepancies"][0]["kind"], "missing_output");

        let (status, body) = call(
            &gateway,
            Request::builder()
                .method("POST")
                .uri("/api/generate/mapped")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["success"], true);

        let (status, body) = call(&gateway, post_json("/api/validate", json!({"engine": "pure"}))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_download_rejects_missing_and_traversal() {
        let (_dir, gateway) = project();
        let (status, _) = call(&gateway, get_req("/api/download/none.docx")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&gateway, get_req("/api/download/..")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status() {
        let (_dir, gateway) = project();
        let (status, body) = call(&gateway, get_req("/api/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ssot_exists"], true);
        assert_eq!(body["data"]["templates_count"], 2);
        assert_eq!(body["engine"], "pure");
    }

    #[tokio::test]
    async fn test_websocket_greets_and_forwards_events() {
        use tokio_tungstenite::tungstenite::Message as WsMessage;

        let (_dir, gateway) = project();
        let state = gateway.state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let gateway = Arc::new(gateway);
        let server = gateway.clone();
        tokio::spawn(async move { server.serve(listener).await });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        let next_json = |msg: WsMessage| -> Value {
            serde_json::from_str(msg.to_text().unwrap()).unwrap()
        };
        let greeting = next_json(ws.next().await.unwrap().unwrap());
        assert_eq!(greeting["event"], "connected");

        state.events.publish(Event::SsotUpdated {
            timestamp: Local::now(),
        });
        let event = next_json(ws.next().await.unwrap().unwrap());
        assert_eq!(event["event"], "ssot_updated");
        assert!(event["data"]["timestamp"].is_string());

        gateway.shutdown();
    }
}
