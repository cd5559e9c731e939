use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;
use underwriting_core::{
    error::UnderwritingError,
    pipeline::AppCore,
    schema::{Document, NewDocument, ProcessRequest, RegisterUserRequest, UnderwritingResult},
};

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<AppCore>,
    pub prom: PrometheusHandle,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/process_underwriting", post(process_underwriting))
        .route("/get_underwriting_result", get(get_underwriting_result))
        .route("/users", post(register_user))
        .route("/users/:user_id/documents", post(add_document).get(list_documents))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `RUST_LOG`-style directives when given and valid, `info` otherwise.
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Wire-level error: `{"error": "..."}` with a status derived from the core error.
#[derive(Debug)]
pub struct ApiError(UnderwritingError);

impl From<UnderwritingError> for ApiError {
    fn from(e: UnderwritingError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self(UnderwritingError::InvalidInput(r.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            UnderwritingError::UserNotFound { .. } | UnderwritingError::ResultNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            UnderwritingError::UserExists { .. } => StatusCode::CONFLICT,
            UnderwritingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            UnderwritingError::NonFinitePrediction { .. } | UnderwritingError::Model { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(err = ?self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn process_underwriting(
    State(st): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    st.core.process_underwriting(&req.user_id)?;
    Ok(Json(json!({ "message": "Underwriting processed successfully" })))
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    pub user_id: Option<String>,
}

async fn get_underwriting_result(
    State(st): State<AppState>,
    Query(q): Query<ResultQuery>,
) -> Result<Json<UnderwritingResult>, ApiError> {
    // 缺少 user_id 与查无结果同样处理
    let user_id = q.user_id.unwrap_or_default();
    Ok(Json(st.core.underwriting_result(&user_id)?))
}

async fn register_user(
    State(st): State<AppState>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    st.core.register_user(&req.user_id)?;
    Ok((StatusCode::CREATED, Json(json!({ "user_id": req.user_id }))))
}

async fn add_document(
    State(st): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<NewDocument>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(doc) = payload?;
    let stored = st.core.add_document(&user_id, doc)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "document_id": stored.document_id })),
    ))
}

async fn list_documents(
    State(st): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(st.core.user_documents(&user_id)?))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(st): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, st.prom.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn log_filter_honours_global_debug() {
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
    }
}
