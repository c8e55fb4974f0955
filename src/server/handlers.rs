use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::describe::DescriptionError;
use crate::enrich::{EnrichError, Enrichment};
use crate::location::PlaceMetadata;

use super::state::AppState;

const DEFAULT_LANG: &str = "en";

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

impl From<EnrichError> for ApiError {
    fn from(err: EnrichError) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if err.is_generation_failure() {
            StatusCode::BAD_GATEWAY
        } else if matches!(err, EnrichError::Description(DescriptionError::Cancelled)) {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %err, "request failed");
        }
        api_error(status, err.to_string())
    }
}

/// Trim and drop empty query values.
fn param(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ─── GET /health ─────────────────────────────────────────────────

pub async fn health() -> &'static str {
    "ok"
}

// ─── GET /api/location ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct LocationQuery {
    pub name: Option<String>,
    pub lang: Option<String>,
    pub sub_region: Option<String>,
}

pub async fn location(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocationQuery>,
) -> Result<Json<Enrichment>, ApiError> {
    let start = Instant::now();

    let name = param(&params.name)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing 'name' parameter"))?;
    let lang = param(&params.lang).unwrap_or(DEFAULT_LANG);
    let hint = param(&params.sub_region);

    // Tripped if the client goes away before we finish.
    let cancel = CancelToken::new();
    let guard = cancel.drop_guard();
    let result = state.orchestrator.enrich(name, lang, hint, &cancel).await;
    guard.disarm();
    let enrichment = result?;

    info!(
        name,
        lang,
        cached = enrichment.cached,
        images = enrichment.images.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "GET /api/location"
    );
    Ok(Json(enrichment))
}

// ─── DELETE /api/descriptions ────────────────────────────────────

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub town_code: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted: usize,
}

pub async fn delete_descriptions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let (Some(town_code), Some(department)) = (param(&params.town_code), param(&params.department)) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing 'town_code' or 'department' parameter",
        ));
    };

    let deleted = state
        .orchestrator
        .invalidate(town_code, department)
        .await
        .map_err(|e| {
            warn!(town_code, department, error = %e, "description delete failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    info!(town_code, department, deleted, "DELETE /api/descriptions");
    Ok(Json(DeleteResponse { success: true, deleted }))
}

// ─── GET /api/nearest-town ───────────────────────────────────────

#[derive(Deserialize)]
pub struct NearestQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

fn parse_coord(raw: &Option<String>, field: &str) -> Result<f64, ApiError> {
    let value = param(raw).ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing 'lat' or 'lng' parameter"))?;
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, format!("Invalid '{}' value: {}", field, value)))
}

pub async fn nearest_town(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearestQuery>,
) -> Result<Json<PlaceMetadata>, ApiError> {
    let lat = parse_coord(&params.lat, "lat")?;
    let lng = parse_coord(&params.lng, "lng")?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(api_error(StatusCode::BAD_REQUEST, "Coordinates out of range"));
    }

    match state.orchestrator.nearest(lat, lng).await? {
        Some(meta) => {
            info!(lat, lng, town = %meta.name, "GET /api/nearest-town");
            Ok(Json(meta))
        }
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No town within range of {:.4}, {:.4}", lat, lng),
        )),
    }
}
