use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leadbox_core::{Inquiry, InquiryId, InquiryStatus, StatusCounts, StatusFilter};
use leadbox_store::{InquiryStore, NewInquiry, StoreError};

use crate::client::ClientRegistry;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Shared state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: InquiryStore,
    pub registry: Arc<ClientRegistry>,
}

/// REST-facing error: status code plus a JSON `error` body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub status: Option<String>,
    pub cursor: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub rows: Vec<Inquiry>,
    pub has_more: bool,
}

/// GET /api/inquiries: one page, newest first. `cursor` selects strictly
/// older rows; `status` filters server-side.
pub async fn list_inquiries(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<PageResponse>, ApiError> {
    let filter = match params.status.as_deref() {
        None => StatusFilter::All,
        Some(raw) => raw.parse().map_err(ApiError::bad_request)?,
    };
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let rows = state.store.list_page(filter, params.cursor, limit)?;
    let has_more = rows.len() == limit;
    Ok(Json(PageResponse { rows, has_more }))
}

/// GET /api/inquiries/counts
pub async fn get_counts(State(state): State<AppState>) -> Result<Json<StatusCounts>, ApiError> {
    Ok(Json(state.store.counts()?))
}

#[derive(Debug, Serialize)]
pub struct UnseenResponse {
    pub count: u64,
}

/// GET /api/inquiries/unseen: badge count.
pub async fn get_unseen(State(state): State<AppState>) -> Result<Json<UnseenResponse>, ApiError> {
    Ok(Json(UnseenResponse {
        count: state.store.unseen_count()?,
    }))
}

/// POST /api/inquiries: the booking form's intake path.
pub async fn create_inquiry(
    State(state): State<AppState>,
    Json(new): Json<NewInquiry>,
) -> Result<(StatusCode, Json<Inquiry>), ApiError> {
    if new.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let row = state.store.insert(new)?;
    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusBody {
    pub status: InquiryStatus,
}

/// PATCH /api/inquiries/{id}/status
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<Inquiry>, ApiError> {
    let id = InquiryId::from_raw(id);
    Ok(Json(state.store.set_status(&id, body.status)?))
}

#[derive(Debug, Serialize)]
pub struct SeenResponse {
    pub applied: bool,
}

/// POST /api/inquiries/{id}/seen: set-once; answers whether this call won.
pub async fn mark_seen(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SeenResponse>, ApiError> {
    let id = InquiryId::from_raw(id);
    let applied = state.store.mark_seen(&id, Utc::now())?;
    Ok(Json(SeenResponse { applied }))
}

/// DELETE /api/inquiries/{id}
pub async fn delete_inquiry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = InquiryId::from_raw(id);
    state.store.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub clients: usize,
}

/// GET /health: cheap store probe plus the live client count.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.unseen_count() {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                clients: state.registry.count(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unhealthy", "error": e.to_string() })),
        )
            .into_response(),
    }
}
