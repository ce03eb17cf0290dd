//! Scholar Web API
//!
//! 启动: cargo run --bin scholar-web --features web
//! 默认监听 http://127.0.0.1:8000（[server] 段或 SCHOLAR__SERVER__PORT 可改）
//!
//! `POST /chat` 以 NDJSON 流返回对话事件；带 `file` 字段时改为把文件写入知识库。

#![cfg(feature = "web")]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use scholar::agent::{
    confirm_action, direct_action, ingest_file_stream, process_message_stream, AgentComponents,
    SessionStore,
};
use scholar::config::load_config;
use scholar::core::{AgentError, Confirmation, PendingAction};
use scholar::dialogue::{DialogueEvent, EventEmitter, RequestHints};
use scholar::lms::LmsError;

const DEFAULT_SESSION: &str = "default";
const EVENT_BUFFER: usize = 32;

struct AppState {
    components: Arc<AgentComponents>,
    sessions: SessionStore,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "status": "error", "error": message.into() })))
}

fn lms_error(e: LmsError) -> ApiError {
    let status = match &e {
        LmsError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        LmsError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };
    tracing::warn!(error = %e, "LMS request failed");
    api_error(status, e.to_string())
}

/// 数字或字符串形式的 id 统一为字符串
fn id_string(v: Option<Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    course_id: Option<Value>,
    #[serde(default)]
    forum_id: Option<Value>,
    /// base64（可带 data URL 前缀）
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    #[serde(default)]
    session_id: Option<String>,
    confirmed: bool,
    #[serde(default)]
    original_request: Option<PendingAction>,
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectActionRequest {
    action: String,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default)]
    confirmed: bool,
}

fn session_key(id: Option<&str>) -> String {
    id.map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scholar::observability::init();

    let cfg = load_config(std::env::args().nth(1).map(Into::into))?;
    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let components = Arc::new(AgentComponents::from_config(cfg)?);
    let state = Arc::new(AppState {
        sessions: SessionStore::new(components.config.app.max_context_turns).with_limits(
            components.config.server.max_sessions,
            Duration::from_secs(components.config.server.session_idle_secs),
        ),
        components,
    });

    let app = Router::new()
        .route("/", get(|| async { Json(json!({"message": "Welcome to the Scholar academic assistant API"})) }))
        .route("/health", get(|| async { "OK" }))
        .route("/chat", post(chat))
        .route("/confirm-action", post(confirm))
        .route("/clear-memory", post(clear_memory))
        .route("/memory", get(memory))
        .route("/tools", get(tools))
        .route("/documents", get(documents))
        .route("/courses", get(courses))
        .route("/course-contents/:id", get(course_contents))
        .route("/direct-action", post(direct))
        .with_state(state);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            signal.cancel();
        }
    });

    tracing::info!("Scholar Web API: http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

/// 事件接收端 → NDJSON 响应体；客户端断开时响应体被丢弃，发送端随之失效
fn ndjson_response(rx: mpsc::Receiver<DialogueEvent>) -> Response {
    let stream = stream::unfold(rx, |mut rx| async move {
        let ev = rx.recv().await?;
        let line = format!("{}\n", ev.to_json_line());
        Some((Ok::<_, std::convert::Infallible>(Bytes::from(line)), rx))
    });
    let mut res = Response::new(Body::from_stream(stream));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/x-ndjson; charset=utf-8"),
    );
    res
}

/// POST /chat：对话（NDJSON 事件流）或文件入库
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let (emitter, rx) = EventEmitter::channel(EVENT_BUFFER);

    if let Some(file) = req.file.filter(|f| !f.trim().is_empty()) {
        let components = state.components.clone();
        let filename = req.filename;
        tokio::spawn(async move {
            let _ = ingest_file_stream(&components, &file, filename.as_deref(), &emitter).await;
        });
        return Ok(ndjson_response(rx));
    }

    let message = req
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "message or file is required"))?;
    let hints = RequestHints {
        course_id: id_string(req.course_id),
        forum_id: id_string(req.forum_id),
    };
    let session = state.sessions.get(&session_key(req.session_id.as_deref()));
    let components = state.components.clone();
    tokio::spawn(async move {
        let mut session = session.lock().await;
        process_message_stream(&components, &mut session, &message, &hints, &emitter).await;
    });
    Ok(ndjson_response(rx))
}

/// POST /confirm-action：确认或拒绝待发布的草稿
async fn confirm(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfirmRequest>,
) -> Json<Value> {
    let session = state.sessions.get(&session_key(req.session_id.as_deref()));
    let mut session = session.lock().await;
    let outcome = confirm_action(
        &state.components,
        &mut session,
        Confirmation {
            confirmed: req.confirmed,
            original_request: req.original_request,
        },
    )
    .await;
    Json(json!({
        "reply": outcome.reply(),
        "memory": session.memory.len(),
        "details": outcome,
    }))
}

/// POST /clear-memory
async fn clear_memory(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SessionQuery>,
) -> Json<Value> {
    let session = state.sessions.get(&session_key(q.session_id.as_deref()));
    session.lock().await.clear();
    Json(json!({"status": "success", "message": "Conversation history cleared"}))
}

/// GET /memory
async fn memory(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SessionQuery>,
) -> Json<Value> {
    let session = state.sessions.get(&session_key(q.session_id.as_deref()));
    let session = session.lock().await;
    let history = session.memory.get_history();
    Json(json!({
        "history": history,
        "size": history.len(),
        "pending_action": session.pending,
    }))
}

/// GET /tools
async fn tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.components.registry().to_json())
}

/// GET /documents：知识库中的文档及分块数
async fn documents(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let docs = state
        .components
        .knowledge
        .list_documents()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(json!({ "documents": docs })))
}

/// GET /courses
async fn courses(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let courses = state.components.lms.get_courses().await.map_err(lms_error)?;
    Ok(Json(json!({ "courses": courses })))
}

/// GET /course-contents/:id
async fn course_contents(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let contents = state
        .components
        .lms
        .get_course_contents(&course_id)
        .await
        .map_err(lms_error)?;
    Ok(Json(json!({ "course_id": course_id, "contents": contents })))
}

/// POST /direct-action：跳过意图识别直接执行工具
async fn direct(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DirectActionRequest>,
) -> Result<Json<Value>, ApiError> {
    match direct_action(&state.components, &req.action, &req.params, req.confirmed).await {
        Ok(result) => Ok(Json(json!({"status": "success", "result": result}))),
        Err(e) => {
            let status = match &e {
                AgentError::UnknownTool(_) => StatusCode::NOT_FOUND,
                AgentError::InvalidParameters { .. } => StatusCode::BAD_REQUEST,
                AgentError::ToolTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err(api_error(status, e.to_string()))
        }
    }
}
