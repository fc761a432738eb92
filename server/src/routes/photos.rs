use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, info, warn};
use visitmap_shared::{NewPhoto, PhotoPatch, PreviewPhoto};

use crate::routes::visits::normalize_owner_id;
use crate::state::AppState;
use crate::store::StoreError;

/// Preview lists are cached client-side for minutes; the HTTP layer must
/// not add a second, invalidation-blind cache on top.
const PREVIEW_CACHE_CONTROL: &str = "no-store";

pub async fn list_preview(
    State(state): State<AppState>,
    Path(visit_id): Path<i64>,
) -> Result<Response, StoreError> {
    state.observability.record_preview_request();
    let photos = state.store.list_photos(visit_id)?;
    debug!(visit_id, count = photos.len(), "preview listed");
    Ok((
        [(header::CACHE_CONTROL, PREVIEW_CACHE_CONTROL)],
        Json(photos),
    )
        .into_response())
}

pub async fn add_photo(
    State(state): State<AppState>,
    Path(visit_id): Path<i64>,
    Json(mut photo): Json<NewPhoto>,
) -> Result<(StatusCode, Json<PreviewPhoto>), StoreError> {
    let owner = normalize_owner_id(&photo.owner_id)
        .map(str::to_owned)
        .inspect_err(|_| state.observability.record_rejected_request())?;
    photo.owner_id = owner;

    let result = state
        .store
        .add_photo(visit_id, photo, state.max_photos_per_visit);
    let stored = record_write(&state, result)?;
    info!(visit_id, photo_id = stored.id, "photo added");
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn update_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<i64>,
    Json(patch): Json<PhotoPatch>,
) -> Result<Json<PreviewPhoto>, StoreError> {
    if patch.is_empty() {
        state.observability.record_rejected_request();
        return Err(StoreError::Invalid("patch has no fields".into()));
    }
    let updated = record_write(&state, state.store.update_photo(photo_id, patch))?;
    Ok(Json(updated))
}

#[derive(Deserialize)]
pub struct DeletePhotoQuery {
    #[serde(default)]
    pub url: String,
}

pub async fn delete_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<i64>,
    Query(query): Query<DeletePhotoQuery>,
) -> Result<StatusCode, StoreError> {
    let removed = record_write(&state, state.store.delete_photo(photo_id, &query.url))?;
    info!(
        photo_id,
        visit_id = removed.visit_record_id,
        "photo deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

fn record_write<T>(state: &AppState, result: Result<T, StoreError>) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            state.observability.record_photo_write();
            Ok(value)
        }
        Err(e) => {
            state.observability.record_rejected_request();
            warn!(error = %e, "photo write rejected");
            Err(e)
        }
    }
}
