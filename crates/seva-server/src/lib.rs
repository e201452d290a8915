pub mod assistant;
pub mod documents;
pub mod session;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use seva_config::Config;
use seva_contracts::{
    contracts_manifest, ContractsMetadata, CreateSessionRequest, DocumentSummary, ErrorBody,
    ErrorResponse, LanguageRequest, QuickAction, SessionView, StatusReport, TurnRequest,
    TurnResponse, API_VERSION,
};
use seva_kernel::intent::{quick_action, quick_actions};
use thiserror::Error;

use crate::assistant::Assistant;
use crate::documents::document_url;
use crate::session::{Driver, Session, Sessions};
use crate::store::{RecordService, RecordStore};

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    let store: Arc<dyn RecordService> =
        Arc::new(RecordStore::from_config(&cfg).map_err(|e| e.to_string())?);
    let assistant: Arc<dyn Assistant> =
        Arc::from(assistant::from_config(&cfg).map_err(|e| e.to_string())?);
    tracing::info!(
        store = %cfg.store.kind,
        assistant = %cfg.assistant.mode,
        "components ready"
    );
    Ok(router(AppState {
        driver: Arc::new(Driver::from_config(&cfg, store, assistant)),
        sessions: Arc::new(Sessions::default()),
    }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/contracts", get(contracts))
        .route("/v1/quick-actions", get(list_quick_actions))
        .route("/v1/sessions", post(create_session))
        .route(
            "/v1/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route("/v1/sessions/{session_id}/turns", post(post_turn))
        .route("/v1/sessions/{session_id}/clear", post(clear_session))
        .route("/v1/sessions/{session_id}/language", put(set_language))
        .route(
            "/v1/sessions/{session_id}/quick-actions/{key}",
            post(run_quick_action),
        )
        .route("/v1/users/{user_id}/records", get(user_records))
        .route("/v1/users/{user_id}/documents", get(user_documents))
        .route("/v1/documents/{document_id}", get(get_document))
        .with_state(state)
}

#[derive(Clone)]
struct AppState {
    driver: Arc<Driver>,
    sessions: Arc<Sessions>,
}

impl AppState {
    async fn session(&self, id: &str) -> Result<Arc<tokio::sync::Mutex<Session>>, ApiError> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("session {id}")))
    }

    async fn turn(&self, session_id: &str, text: &str) -> Result<TurnResponse, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::Validation("text must not be empty".to_string()));
        }
        let handle = self.session(session_id).await?;
        let mut session = handle.lock().await;
        let messages = self.driver.handle_turn(&mut session, text).await;
        Ok(TurnResponse {
            session_id: session.id.clone(),
            state: session.conversation.state,
            messages,
        })
    }
}

#[derive(Debug, Error)]
enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn contracts() -> Json<ContractsMetadata> {
    let manifest = contracts_manifest();
    Json(ContractsMetadata {
        api_version: API_VERSION.to_string(),
        openapi_sha256: manifest.openapi_sha256.to_string(),
        schema_set_sha256: manifest.schema_set_sha256.to_string(),
        built_at: manifest.built_at.to_string(),
        schemas: manifest
            .schemas
            .iter()
            .map(|s| (s.name.to_string(), s.sha256.to_string()))
            .collect(),
    })
}

async fn list_quick_actions() -> Json<Vec<QuickAction>> {
    Json(quick_actions())
}

async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let Json(req) = body?;
    if req.user_id.trim().is_empty() {
        return Err(ApiError::Validation("user_id must not be empty".to_string()));
    }
    let session = Session::new(
        req.user_id.trim(),
        req.language.unwrap_or_default(),
        req.citizen_email.filter(|e| !e.trim().is_empty()),
    );
    let view = session.view();
    state.sessions.insert(session).await;
    tracing::info!(session_id = %view.session_id, user_id = %view.user_id, "session created");
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = state.session(&session_id).await?;
    let session = handle.lock().await;
    Ok(Json(session.view()))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.sessions.remove(&session_id).await {
        return Err(ApiError::NotFound(format!("session {session_id}")));
    }
    tracing::info!(session_id = %session_id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn post_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<TurnResponse>, ApiError> {
    let Json(req) = body?;
    state.turn(&session_id, &req.text).await.map(Json)
}

async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = state.session(&session_id).await?;
    let mut session = handle.lock().await;
    session.clear();
    tracing::info!(session_id = %session.id, "session cleared");
    Ok(Json(session.view()))
}

async fn set_language(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<LanguageRequest>, JsonRejection>,
) -> Result<Json<SessionView>, ApiError> {
    let Json(req) = body?;
    let handle = state.session(&session_id).await?;
    let mut session = handle.lock().await;
    session.language = req.language;
    Ok(Json(session.view()))
}

async fn run_quick_action(
    State(state): State<AppState>,
    Path((session_id, key)): Path<(String, String)>,
) -> Result<Json<TurnResponse>, ApiError> {
    let action =
        quick_action(&key).ok_or_else(|| ApiError::NotFound(format!("quick action {key}")))?;
    state.turn(&session_id, &action.prompt).await.map(Json)
}

async fn user_records(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    state
        .driver
        .store()
        .status_report(&user_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn user_documents(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let reports = state
        .driver
        .store()
        .list_documents(&user_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(
        reports
            .into_iter()
            .map(|report| DocumentSummary {
                document_url: document_url(&report.id),
                id: report.id,
                scheme_name: report.scheme_name,
                created_at: report.created_at,
            })
            .collect(),
    ))
}

async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Response, ApiError> {
    let report = state
        .driver
        .store()
        .get_document(&document_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("document {document_id}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        report.body,
    )
        .into_response())
}
