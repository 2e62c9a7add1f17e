use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use tracing::instrument;

use super::AppJson;
use crate::error::{AppError, AppResult};
use crate::filters::{Filters, WATCH_SORT_SAFELIST};
use crate::models::{
    MessageResponse, UpdateWatchRequest, WatchAttributes, WatchEnvelope, WatchListResponse,
};
use crate::state::AppState;
use crate::store::WatchFilter;
use crate::validation::Validator;

/// Optional precondition on `PATCH`: the version the client last saw.
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

/// Path ids that are not positive integers cannot name a record.
fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id >= 1)
        .ok_or(AppError::NotFound)
}

fn expected_version(headers: &HeaderMap) -> AppResult<Option<i32>> {
    let Some(value) = headers.get(EXPECTED_VERSION_HEADER) else {
        return Ok(None);
    };

    let value = value.to_str().map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Ok(None);
    }

    value.parse().map(Some).map_err(|_| {
        AppError::BadRequest("X-Expected-Version must be an integer version number".to_string())
    })
}

/// Create a new watch.
#[instrument(skip(state, attributes))]
pub async fn create_watch(
    State(state): State<AppState>,
    AppJson(attributes): AppJson<WatchAttributes>,
) -> AppResult<impl IntoResponse> {
    let watch = state.watches.create(attributes).await?;

    Ok((
        StatusCode::CREATED,
        [(LOCATION, format!("/v1/watches/{}", watch.id))],
        Json(WatchEnvelope { watch }),
    ))
}

/// Get a specific watch by id.
#[instrument(skip(state))]
pub async fn show_watch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<WatchEnvelope>> {
    let watch = state.watches.get(parse_id(&id)?).await?;
    Ok(Json(WatchEnvelope { watch }))
}

/// Partially update a watch.
///
/// The record is read before the body is decoded, so a missing id answers 404
/// whatever the body holds. Honors `X-Expected-Version` when present; the
/// write itself is always conditioned on the version that was read.
#[instrument(skip(state, headers, body))]
pub async fn update_watch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<AppJson<UpdateWatchRequest>, AppError>,
) -> AppResult<Json<WatchEnvelope>> {
    let id = parse_id(&id)?;
    let expected = expected_version(&headers)?;

    let current = state.watches.get(id).await?;
    let AppJson(changes) = body?;

    let watch = state.watches.update_record(current, changes, expected).await?;
    Ok(Json(WatchEnvelope { watch }))
}

/// Delete a watch.
#[instrument(skip(state))]
pub async fn delete_watch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.watches.delete(parse_id(&id)?).await?;

    Ok(Json(MessageResponse {
        message: "watch successfully deleted".to_string(),
    }))
}

/// List watches with optional `brand` / `dial_color` equality filters,
/// `page`, `page_size` and `sort` (`-` prefix for descending).
#[instrument(skip(state))]
pub async fn list_watches(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> AppResult<Json<WatchListResponse>> {
    let filter = WatchFilter {
        brand: query.get("brand").cloned().unwrap_or_default(),
        dial_color: query.get("dial_color").cloned().unwrap_or_default(),
    };

    let mut v = Validator::new();
    let page = Filters::from_query(&query, WATCH_SORT_SAFELIST, &mut v).resolve(&mut v);
    let Some(page) = page else {
        return Err(v.into_result().err().unwrap_or_else(|| {
            AppError::Internal("filter resolution failed without violations".to_string())
        }));
    };

    let (watches, metadata) = state.watches.list(&filter, &page).await?;
    Ok(Json(WatchListResponse { watches, metadata }))
}

/// JSON 404 for unmatched routes.
pub async fn not_found() -> AppError {
    AppError::NotFound
}
