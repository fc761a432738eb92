use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::{info, warn};
use visitmap_shared::{
    NotesUpdate, ToggleAction, ToggleRequest, ToggleResponse, VisitedEntry, is_region_id,
};

use crate::state::AppState;
use crate::store::StoreError;

pub async fn list_visited(
    State(state): State<AppState>,
    Path(raw_owner): Path<String>,
) -> Result<Json<Vec<VisitedEntry>>, StoreError> {
    let owner = normalize_owner_id(&raw_owner).inspect_err(|_| {
        state.observability.record_rejected_request();
    })?;
    Ok(Json(state.store.list_visited(owner)))
}

pub async fn toggle_visit(
    State(state): State<AppState>,
    Path(raw_owner): Path<String>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<ToggleResponse>, StoreError> {
    state.observability.record_toggle_request();

    let owner = match normalize_owner_id(&raw_owner) {
        Ok(owner) => owner,
        Err(e) => {
            state.observability.record_rejected_request();
            return Err(e);
        }
    };
    let region_id = request.region_id.trim();
    if !is_region_id(region_id) {
        state.observability.record_rejected_request();
        warn!(owner, region = region_id, "toggle rejected: invalid region id");
        return Err(StoreError::Invalid(format!(
            "{region_id:?} is not a region id"
        )));
    }

    let response = state.store.set_visited(
        owner,
        region_id,
        request.visited,
        request.color.as_deref(),
    );
    match response.action {
        ToggleAction::Added => state.observability.record_visit_added(),
        ToggleAction::Removed => state.observability.record_visit_removed(),
    }
    info!(
        owner,
        region = region_id,
        action = ?response.action,
        visit_id = ?response.id,
        "visit toggled"
    );
    Ok(Json(response))
}

pub async fn save_notes(
    State(state): State<AppState>,
    Path(visit_id): Path<i64>,
    Json(update): Json<NotesUpdate>,
) -> Result<StatusCode, StoreError> {
    match state.store.save_notes(visit_id, &update.notes) {
        Ok(()) => {
            state.observability.record_notes_save();
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            state.observability.record_rejected_request();
            warn!(visit_id, error = %e, "notes save rejected");
            Err(e)
        }
    }
}

pub(crate) fn normalize_owner_id(owner: &str) -> Result<&str, StoreError> {
    visitmap_shared::normalize_owner_id(owner).map_err(|reason| StoreError::Invalid(reason.into()))
}
